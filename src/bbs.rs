//! BBS store (spec §4.7): an ephemeral, channel-scoped peer broadcast bus.
//! Messages are indexed by key-hash (unique), by `(channel, time)` for
//! cursor-based fetch, and by monotonic row-id for replication streaming.
//! Running totals `{count, size}` are maintained incrementally.

use crate::codec::{Decode, Encode};
use crate::error::{DbError, DbResult};
use crate::keys::{
    self, bbs_by_channel_time_key, bbs_by_key_key, bbs_channel_prefix, bbs_msg_key, next_prefix, table_lower_bound, table_upper_bound, Table,
};
use crate::store::transaction::Transaction;
use crate::types::{BbsChannel, Hash, RowId, Timestamp};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BbsMsg {
    pub key: Hash,
    pub channel: BbsChannel,
    pub time: Timestamp,
    pub message: Vec<u8>,
    pub nonce: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BbsTotals {
    pub count: u64,
    pub size: u64,
}

impl Encode for BbsMsg {
    fn encode(&self, out: &mut Vec<u8>) {
        self.key.encode(out);
        self.channel.encode(out);
        self.time.encode(out);
        self.nonce.encode(out);
        (self.message.len() as u32).encode(out);
        out.extend_from_slice(&self.message);
    }
}

impl Decode for BbsMsg {
    fn decode(buf: &[u8]) -> Result<Self, crate::error::CodecError> {
        let key = Hash::decode(&buf[0..32])?;
        let channel = crate::codec::read_u32_be(&buf[32..36])?;
        let time = crate::codec::read_u64_be(&buf[36..44])?;
        let nonce = crate::codec::read_u64_be(&buf[44..52])?;
        let msg_len = crate::codec::read_u32_be(&buf[52..56])? as usize;
        let message = buf[56..56 + msg_len].to_vec();
        Ok(BbsMsg { key, channel, time, message, nonce })
    }
}

fn totals_key() -> Vec<u8> {
    keys::counter_key("bbs_totals")
}

pub fn bbs_totals(tx: &Transaction) -> DbResult<BbsTotals> {
    Ok(match tx.get(&totals_key())? {
        Some(b) => BbsTotals {
            count: crate::codec::read_u64_be(&b[0..8])?,
            size: crate::codec::read_u64_be(&b[8..16])?,
        },
        None => BbsTotals::default(),
    })
}

fn set_totals(tx: &mut Transaction, totals: BbsTotals) {
    let mut out = Vec::with_capacity(16);
    totals.count.encode(&mut out);
    totals.size.encode(&mut out);
    tx.put(totals_key(), out);
}

/// Inserts a message and bumps the running totals (spec §4.7 `BbsIns`).
/// Fails if `key` already exists (spec §3: `key` unique).
pub fn bbs_ins(tx: &mut Transaction, msg: BbsMsg) -> DbResult<RowId> {
    if tx.contains_key(&bbs_by_key_key(&msg.key))? {
        return Err(DbError::inconsistent(format!("bbs message key {} already exists", msg.key)));
    }
    let row = tx.next_id(&keys::counter_key("bbs"))?;
    let size = msg.message.len() as u64;
    tx.put(bbs_msg_key(row), msg.to_bytes());
    tx.put(bbs_by_key_key(&msg.key), row.to_be_bytes().to_vec());
    tx.put(bbs_by_channel_time_key(msg.channel, msg.time, row), Vec::new());

    let mut totals = bbs_totals(tx)?;
    totals.count += 1;
    totals.size += size;
    set_totals(tx, totals);
    Ok(row)
}

pub fn bbs_get(tx: &Transaction, row: RowId) -> DbResult<Option<BbsMsg>> {
    let Some(raw) = tx.get(&bbs_msg_key(row))? else { return Ok(None) };
    Ok(Some(BbsMsg::decode(&raw)?))
}

pub fn bbs_find_by_key(tx: &Transaction, key: &Hash) -> DbResult<Option<BbsMsg>> {
    let Some(raw) = tx.get(&bbs_by_key_key(key))? else { return Ok(None) };
    let row = crate::codec::read_u64_be(&raw)?;
    bbs_get(tx, row)
}

/// Deletes a message and decrements the running totals (spec §4.7 `BbsDel`).
pub fn bbs_del(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let Some(msg) = bbs_get(tx, row)? else { return Ok(()) };
    tx.remove(bbs_msg_key(row));
    tx.remove(bbs_by_key_key(&msg.key));
    tx.remove(bbs_by_channel_time_key(msg.channel, msg.time, row));

    let mut totals = bbs_totals(tx)?;
    totals.count = totals.count.saturating_sub(1);
    totals.size = totals.size.saturating_sub(msg.message.len() as u64);
    set_totals(tx, totals);
    Ok(())
}

/// Most recent post time across all channels (spec §4.7 `get_BbsMaxTime`).
pub fn bbs_max_time(tx: &Transaction) -> DbResult<Option<Timestamp>> {
    let lower = table_lower_bound(Table::BbsByChannelTime);
    let upper = table_upper_bound(Table::BbsByChannelTime);
    let mut best = None;
    for (k, _) in tx.scan_range(&lower, &upper)? {
        let time = crate::codec::read_u64_be(&k[1 + 4..1 + 12])?;
        best = Some(best.map_or(time, |b: Timestamp| b.max(time)));
    }
    Ok(best)
}

/// Messages on `channel` with `time >= from`, ascending (fetch-by-cursor).
pub fn bbs_fetch_channel(tx: &Transaction, channel: BbsChannel, from: Timestamp) -> DbResult<Vec<BbsMsg>> {
    let mut lower = bbs_channel_prefix(channel);
    lower.extend_from_slice(&from.to_be_bytes());
    let upper = next_prefix(&bbs_channel_prefix(channel), table_upper_bound(Table::BbsByChannelTime));
    let mut out = Vec::new();
    for (k, _) in tx.scan_range(&lower, &upper)? {
        let row = crate::codec::read_u64_be(&k[k.len() - 8..])?;
        if let Some(m) = bbs_get(tx, row)? {
            out.push(m);
        }
    }
    Ok(out)
}

/// Per-channel message counts (spec §4.7 `EnumBbs(IBbsHistogram)`).
pub fn enum_bbs_histogram(tx: &Transaction) -> DbResult<Vec<(BbsChannel, u64)>> {
    let lower = table_lower_bound(Table::BbsByChannelTime);
    let upper = table_upper_bound(Table::BbsByChannelTime);
    let mut counts: std::collections::BTreeMap<BbsChannel, u64> = Default::default();
    for (k, _) in tx.scan_range(&lower, &upper)? {
        let channel = crate::codec::read_u32_be(&k[1..5])?;
        *counts.entry(channel).or_default() += 1;
    }
    Ok(counts.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn msg(key: u8, size: usize) -> BbsMsg {
        BbsMsg { key: Hash([key; 32]), channel: 1, time: key as u64, message: vec![0u8; size], nonce: 0 }
    }

    /// S6: BBS totals.
    #[test]
    fn totals_track_inserts_and_deletes() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let r1 = bbs_ins(&mut tx, msg(1, 10)).unwrap();
        bbs_ins(&mut tx, msg(2, 20)).unwrap();
        bbs_ins(&mut tx, msg(3, 30)).unwrap();
        assert_eq!(bbs_totals(&tx).unwrap(), BbsTotals { count: 3, size: 60 });

        bbs_del(&mut tx, r1).unwrap();
        assert_eq!(bbs_totals(&tx).unwrap(), BbsTotals { count: 2, size: 50 });
    }

    #[test]
    fn key_uniqueness_is_enforced() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        bbs_ins(&mut tx, msg(1, 10)).unwrap();
        assert!(bbs_ins(&mut tx, msg(1, 5)).is_err());
    }

    #[test]
    fn max_time_tracks_latest_post() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        bbs_ins(&mut tx, msg(1, 1)).unwrap();
        bbs_ins(&mut tx, msg(9, 1)).unwrap();
        assert_eq!(bbs_max_time(&tx).unwrap(), Some(9));
    }

    /// `BbsChannel::MAX` used to overflow `channel + 1` when computing the
    /// fetch range's exclusive upper bound.
    #[test]
    fn fetch_channel_does_not_panic_on_max_channel() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let mut m = msg(1, 4);
        m.channel = u32::MAX;
        bbs_ins(&mut tx, m).unwrap();
        let found = bbs_fetch_channel(&tx, u32::MAX, 0).unwrap();
        assert_eq!(found.len(), 1);
    }
}
