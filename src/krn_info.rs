//! Kernel-info index (spec §4.10 continuation): one row per kernel
//! execution, ordered by `(height, index)`, with a secondary index keyed by
//! `cid` for "all executions of this contract up to height H" lookups.

use crate::error::DbResult;
use crate::keys::{krn_info_by_cid_key, krn_info_by_cid_prefix, krn_info_key, table_lower_bound, table_upper_bound, Table};
use crate::store::transaction::Transaction;
use crate::types::{Hash, HeightPos};

/// Records a kernel execution at `pos`, indexed under `cid` (spec §4.10
/// `KrnInfoInsert`).
pub fn krn_info_insert(tx: &mut Transaction, pos: HeightPos, cid: Hash, body: Vec<u8>) -> DbResult<()> {
    let mut row = cid.to_bytes();
    row.extend_from_slice(&body);
    tx.put(krn_info_key(pos), row);
    tx.put(krn_info_by_cid_key(&cid, pos), Vec::new());
    Ok(())
}

pub fn krn_info_get(tx: &Transaction, pos: HeightPos) -> DbResult<Option<(Hash, Vec<u8>)>> {
    let Some(raw) = tx.get(&krn_info_key(pos))? else { return Ok(None) };
    let cid = Hash::decode(&raw[..32])?;
    Ok(Some((cid, raw[32..].to_vec())))
}

/// Ascending `(height, idx)` enumeration in `[from, to]`.
pub fn krn_info_enum(tx: &Transaction, from: HeightPos, to: HeightPos) -> DbResult<Vec<(HeightPos, Hash, Vec<u8>)>> {
    let lower = krn_info_key(from);
    let mut upper = krn_info_key(to);
    upper.push(0x00);
    let mut out = Vec::new();
    for (k, raw) in tx.scan_range(&lower, &upper)? {
        let pos = HeightPos { height: crate::codec::read_u64_be(&k[1..9])?, idx: crate::codec::read_u32_be(&k[9..13])? };
        let cid = Hash::decode(&raw[..32])?;
        out.push((pos, cid, raw[32..].to_vec()));
    }
    Ok(out)
}

/// All executions of `cid` at height `<= max_height`, ascending (spec §4.10
/// `KrnInfoEnumByCid`).
pub fn krn_info_enum_by_cid(tx: &Transaction, cid: &Hash, max_height: u64) -> DbResult<Vec<HeightPos>> {
    let lower = krn_info_by_cid_prefix(cid);
    let mut upper = krn_info_by_cid_key(cid, HeightPos { height: max_height, idx: u32::MAX });
    upper.push(0x00);
    let mut out = Vec::new();
    for (k, _) in tx.scan_range(&lower, &upper)? {
        let tail = &k[k.len() - 12..];
        out.push(HeightPos {
            height: crate::codec::read_u64_be(&tail[..8])?,
            idx: crate::codec::read_u32_be(&tail[8..12])?,
        });
    }
    Ok(out)
}

/// Deletes every kernel-info row in `[from, to]`, including both indexes.
pub fn krn_info_del_range(tx: &mut Transaction, from: HeightPos, to: HeightPos) -> DbResult<()> {
    let lower = krn_info_key(from);
    let mut upper = krn_info_key(to);
    upper.push(0x00);
    let mut primary = Vec::new();
    for (k, raw) in tx.scan_range(&lower, &upper)? {
        let pos = HeightPos { height: crate::codec::read_u64_be(&k[1..9])?, idx: crate::codec::read_u32_be(&k[9..13])? };
        let cid = Hash::decode(&raw[..32])?;
        primary.push((k, cid, pos));
    }
    for (k, cid, pos) in primary {
        tx.remove(k);
        tx.remove(krn_info_by_cid_key(&cid, pos));
    }
    Ok(())
}

pub fn krn_info_table_bounds() -> (Vec<u8>, Vec<u8>) {
    (table_lower_bound(Table::KrnInfo), table_upper_bound(Table::KrnInfo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn enum_by_cid_respects_max_height() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let cid = Hash([1u8; 32]);
        krn_info_insert(&mut tx, HeightPos { height: 10, idx: 0 }, cid, b"a".to_vec()).unwrap();
        krn_info_insert(&mut tx, HeightPos { height: 20, idx: 0 }, cid, b"b".to_vec()).unwrap();
        krn_info_insert(&mut tx, HeightPos { height: 30, idx: 0 }, cid, b"c".to_vec()).unwrap();

        let found = krn_info_enum_by_cid(&tx, &cid, 20).unwrap();
        assert_eq!(found, vec![HeightPos { height: 10, idx: 0 }, HeightPos { height: 20, idx: 0 }]);
    }

    #[test]
    fn del_range_removes_both_indexes() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let cid = Hash([2u8; 32]);
        let pos = HeightPos { height: 5, idx: 0 };
        krn_info_insert(&mut tx, pos, cid, b"x".to_vec()).unwrap();
        krn_info_del_range(&mut tx, pos, pos).unwrap();

        assert!(krn_info_get(&tx, pos).unwrap().is_none());
        assert!(krn_info_enum_by_cid(&tx, &cid, u64::MAX).unwrap().is_empty());
    }
}
