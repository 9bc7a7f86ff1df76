//! Table-tag registry: the sled analogue of `NodeDB::Query` (spec §4.1,
//! design note #3 — "a fixed-length array indexed by a compact query tag").
//!
//! There is no SQL layer underneath, so there is nothing to "compile" per
//! tag; instead each tag owns a byte prefix carved out of the single sled
//! tree's keyspace, and this module is the one place that knows how every
//! table's key is built. Table code never concatenates raw bytes itself.

use crate::codec::Encode;
use crate::types::{AssetId, Hash, Height, HeightPos, RowId, TxoId};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum Table {
    Param = 0,
    Counter = 1,
    State = 2,
    StateByHeightHash = 3,
    StateChildren = 4,
    Tip = 5,
    TipReachable = 6,
    StateBody = 7,
    Txo = 8,
    Kernel = 9,
    Event = 10,
    EventByKey = 11,
    Dummy = 12,
    Peer = 13,
    BbsMsg = 14,
    BbsByKey = 15,
    BbsByChannelTime = 16,
    Unique = 17,
    Cache = 18,
    Stream = 19,
    Asset = 20,
    AssetEvt = 21,
    ContractData = 22,
    ContractLog = 23,
    KrnInfo = 24,
    KrnInfoByCid = 25,
    /// Children waiting on a parent `(height, hash)` that hasn't arrived yet.
    StateOrphans = 26,
}

fn prefixed(table: Table, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + key.len());
    out.push(table as u8);
    out.extend_from_slice(key);
    out
}

/// Exclusive upper bound for a range scan over every key with `prefix` as a
/// prefix: increments `prefix` as a big-endian integer, carrying past any
/// trailing `0xFF` bytes. If the whole prefix is `0xFF` there is no finite
/// successor of this length, so the caller's whole-table upper bound is
/// used instead — still correct since it is itself an exclusive bound one
/// past the table's tag byte.
pub fn next_prefix(prefix: &[u8], table_fallback: Vec<u8>) -> Vec<u8> {
    let mut out = prefix.to_vec();
    for byte in out.iter_mut().rev() {
        if *byte == 0xFF {
            *byte = 0;
        } else {
            *byte += 1;
            return out;
        }
    }
    table_fallback
}

/// Lower bound of a table's key range (inclusive), for range scans.
pub fn table_lower_bound(table: Table) -> Vec<u8> {
    vec![table as u8]
}

/// Exclusive upper bound of a table's key range — one past the tag byte.
pub fn table_upper_bound(table: Table) -> Vec<u8> {
    vec![table as u8 + 1]
}

pub fn param_key(id: u32) -> Vec<u8> {
    prefixed(Table::Param, &id.to_be_bytes())
}

pub fn counter_key(name: &str) -> Vec<u8> {
    prefixed(Table::Counter, name.as_bytes())
}

pub fn state_key(row: RowId) -> Vec<u8> {
    prefixed(Table::State, &row.to_be_bytes())
}

pub fn state_by_height_hash_key(height: Height, hash: &Hash) -> Vec<u8> {
    let mut k = height.to_be_bytes().to_vec();
    k.extend_from_slice(hash.as_bytes());
    prefixed(Table::StateByHeightHash, &k)
}

pub fn state_children_key(parent_row: RowId, child_row: RowId) -> Vec<u8> {
    let mut k = parent_row.to_be_bytes().to_vec();
    k.extend_from_slice(&child_row.to_be_bytes());
    prefixed(Table::StateChildren, &k)
}

pub fn state_children_prefix(parent_row: RowId) -> Vec<u8> {
    prefixed(Table::StateChildren, &parent_row.to_be_bytes())
}

pub fn state_orphans_key(parent_height: Height, parent_hash: &Hash) -> Vec<u8> {
    let mut k = parent_height.to_be_bytes().to_vec();
    k.extend_from_slice(parent_hash.as_bytes());
    prefixed(Table::StateOrphans, &k)
}

pub fn tip_key(height: Height, row: RowId) -> Vec<u8> {
    let mut k = height.to_be_bytes().to_vec();
    k.extend_from_slice(&row.to_be_bytes());
    prefixed(Table::Tip, &k)
}

pub fn tip_reachable_key(chainwork: &[u8], row: RowId) -> Vec<u8> {
    let mut k = chainwork.to_vec();
    k.extend_from_slice(&row.to_be_bytes());
    prefixed(Table::TipReachable, &k)
}

pub fn state_body_key(row: RowId) -> Vec<u8> {
    prefixed(Table::StateBody, &row.to_be_bytes())
}

pub fn txo_key(id: TxoId) -> Vec<u8> {
    prefixed(Table::Txo, &id.to_be_bytes())
}

pub fn kernel_key(hash: &Hash, height: Height) -> Vec<u8> {
    let mut k = hash.to_bytes();
    k.extend_from_slice(&height.to_be_bytes());
    prefixed(Table::Kernel, &k)
}

pub fn kernel_prefix(hash: &Hash) -> Vec<u8> {
    prefixed(Table::Kernel, hash.as_bytes())
}

pub fn event_key(height: Height, idx: u32) -> Vec<u8> {
    let pos = HeightPos { height, idx };
    prefixed(Table::Event, &pos.to_bytes())
}

pub fn event_by_key_key(event_key_bytes: &[u8], height: Height, idx: u32) -> Vec<u8> {
    let mut k = event_key_bytes.to_vec();
    // descending (height, idx): invert so ascending byte order means most-recent-first
    k.extend_from_slice(&(!height).to_be_bytes());
    k.extend_from_slice(&(!idx).to_be_bytes());
    prefixed(Table::EventByKey, &k)
}

pub fn event_by_key_prefix(event_key_bytes: &[u8]) -> Vec<u8> {
    prefixed(Table::EventByKey, event_key_bytes)
}

pub fn dummy_key(key_id: &[u8]) -> Vec<u8> {
    prefixed(Table::Dummy, key_id)
}

pub fn peer_key(peer_id: &[u8; 33]) -> Vec<u8> {
    prefixed(Table::Peer, peer_id)
}

pub fn bbs_msg_key(row: RowId) -> Vec<u8> {
    prefixed(Table::BbsMsg, &row.to_be_bytes())
}

pub fn bbs_by_key_key(key: &Hash) -> Vec<u8> {
    prefixed(Table::BbsByKey, key.as_bytes())
}

pub fn bbs_by_channel_time_key(channel: u32, time: u64, row: RowId) -> Vec<u8> {
    let mut k = channel.to_be_bytes().to_vec();
    k.extend_from_slice(&time.to_be_bytes());
    k.extend_from_slice(&row.to_be_bytes());
    prefixed(Table::BbsByChannelTime, &k)
}

pub fn bbs_channel_prefix(channel: u32) -> Vec<u8> {
    prefixed(Table::BbsByChannelTime, &channel.to_be_bytes())
}

pub fn unique_key(key: &[u8]) -> Vec<u8> {
    prefixed(Table::Unique, key)
}

/// Primary cache row: `key -> {data, hit_stamp}` (sub-tagged `0x00` within
/// `Table::Cache`'s keyspace so the hit-order index below can share the
/// same table tag without a dedicated `Table` variant).
pub fn cache_key(key: &[u8]) -> Vec<u8> {
    let mut k = vec![0x00];
    k.extend_from_slice(key);
    prefixed(Table::Cache, &k)
}

/// Secondary ascending-hit-stamp index: `(hit_stamp, key) -> ()`, used to
/// find eviction candidates in O(log n) instead of a full table scan.
pub fn cache_index_key(hit_stamp: u64, key: &[u8]) -> Vec<u8> {
    let mut k = vec![0x01];
    k.extend_from_slice(&hit_stamp.to_be_bytes());
    k.extend_from_slice(key);
    prefixed(Table::Cache, &k)
}

pub fn cache_index_prefix() -> Vec<u8> {
    prefixed(Table::Cache, &[0x01])
}

pub fn stream_chunk_key(stream_type: u8, chunk_index: u64) -> Vec<u8> {
    let mut k = vec![stream_type];
    k.extend_from_slice(&chunk_index.to_be_bytes());
    prefixed(Table::Stream, &k)
}

pub fn stream_prefix(stream_type: u8) -> Vec<u8> {
    prefixed(Table::Stream, &[stream_type])
}

pub fn asset_key(id: AssetId) -> Vec<u8> {
    prefixed(Table::Asset, &id.to_be_bytes())
}

pub fn asset_evt_key(asset_id: AssetId, height: Height, idx: u64) -> Vec<u8> {
    let mut k = asset_id.to_be_bytes().to_vec();
    k.extend_from_slice(&(!height).to_be_bytes());
    k.extend_from_slice(&(!idx).to_be_bytes());
    prefixed(Table::AssetEvt, &k)
}

pub fn asset_evt_prefix(asset_id: AssetId) -> Vec<u8> {
    prefixed(Table::AssetEvt, &asset_id.to_be_bytes())
}

pub fn contract_data_key(key: &[u8]) -> Vec<u8> {
    prefixed(Table::ContractData, key)
}

pub fn contract_log_key(pos: HeightPos) -> Vec<u8> {
    prefixed(Table::ContractLog, &pos.to_bytes())
}

pub fn krn_info_key(pos: HeightPos) -> Vec<u8> {
    prefixed(Table::KrnInfo, &pos.to_bytes())
}

pub fn krn_info_by_cid_key(cid: &Hash, pos: HeightPos) -> Vec<u8> {
    let mut k = cid.to_bytes();
    k.extend_from_slice(&pos.to_bytes());
    prefixed(Table::KrnInfoByCid, &k)
}

pub fn krn_info_by_cid_prefix(cid: &Hash) -> Vec<u8> {
    prefixed(Table::KrnInfoByCid, cid.as_bytes())
}
