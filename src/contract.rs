//! Contract data & logs (spec §4.10): an ordered key/value map over
//! variable-length keys with `prev`/`next` navigation, plus an append-only
//! log keyed by `(height, index)` with range enumeration/deletion.

use crate::error::DbResult;
use crate::keys::{contract_data_key, contract_log_key, table_lower_bound, table_upper_bound, Table};
use crate::store::transaction::Transaction;
use crate::types::HeightPos;

pub fn contract_data_set(tx: &mut Transaction, key: &[u8], value: Vec<u8>) -> DbResult<()> {
    tx.put(contract_data_key(key), value);
    Ok(())
}

pub fn contract_data_get(tx: &Transaction, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
    tx.get(&contract_data_key(key))
}

pub fn contract_data_del(tx: &mut Transaction, key: &[u8]) -> DbResult<()> {
    tx.remove(contract_data_key(key));
    Ok(())
}

/// The least key strictly greater than `k` (spec §4.10 `FindNext`).
pub fn contract_data_find_next(tx: &Transaction, k: &[u8]) -> DbResult<Option<(Vec<u8>, Vec<u8>)>> {
    let mut lower = contract_data_key(k);
    // exclusive lower bound: append a 0x00 byte, which sorts just after `k`
    // itself but before any key that has `k` as a strict prefix followed by
    // anything >= 0x01 — equivalently "the successor of k's key bytes".
    lower.push(0x00);
    let upper = table_upper_bound(Table::ContractData);
    Ok(tx.scan_range(&lower, &upper)?.into_iter().next().map(|(full_key, v)| (full_key[1..].to_vec(), v)))
}

/// The greatest key strictly less than `k` (spec §4.10 `FindPrev`).
pub fn contract_data_find_prev(tx: &Transaction, k: &[u8]) -> DbResult<Option<(Vec<u8>, Vec<u8>)>> {
    let lower = table_lower_bound(Table::ContractData);
    let upper = contract_data_key(k);
    Ok(tx.scan_range_rev(&lower, &upper)?.into_iter().next().map(|(full_key, v)| (full_key[1..].to_vec(), v)))
}

/// All keys in `[k_min, k_max]`, ascending (spec §4.10 `ContractDataEnum`).
pub fn contract_data_enum(tx: &Transaction, k_min: &[u8], k_max: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let lower = contract_data_key(k_min);
    let mut upper = contract_data_key(k_max);
    upper.push(0x00); // make the upper bound inclusive of k_max
    Ok(tx.scan_range(&lower, &upper)?.into_iter().map(|(k, v)| (k[1..].to_vec(), v)).collect())
}

/// Appends a log entry at `(height, index)` (spec §4.10 "append-only logs").
pub fn contract_log_append(tx: &mut Transaction, pos: HeightPos, key: Vec<u8>, value: Vec<u8>) -> DbResult<()> {
    let mut body = (key.len() as u32).to_be_bytes().to_vec();
    body.extend_from_slice(&key);
    body.extend_from_slice(&value);
    tx.put(contract_log_key(pos), body);
    Ok(())
}

pub fn contract_log_get(tx: &Transaction, pos: HeightPos) -> DbResult<Option<(Vec<u8>, Vec<u8>)>> {
    let Some(raw) = tx.get(&contract_log_key(pos))? else { return Ok(None) };
    let klen = crate::codec::read_u32_be(&raw)? as usize;
    let key = raw[4..4 + klen].to_vec();
    let value = raw[4 + klen..].to_vec();
    Ok(Some((key, value)))
}

/// Enumerates logs in `[from, to]`, ascending.
pub fn contract_log_enum(tx: &Transaction, from: HeightPos, to: HeightPos) -> DbResult<Vec<(HeightPos, Vec<u8>, Vec<u8>)>> {
    let lower = contract_log_key(from);
    let mut upper = contract_log_key(to);
    upper.push(0x00);
    let mut out = Vec::new();
    for (k, raw) in tx.scan_range(&lower, &upper)? {
        let pos = HeightPos { height: crate::codec::read_u64_be(&k[1..9])?, idx: crate::codec::read_u32_be(&k[9..13])? };
        let klen = crate::codec::read_u32_be(&raw)? as usize;
        let key = raw[4..4 + klen].to_vec();
        let value = raw[4 + klen..].to_vec();
        out.push((pos, key, value));
    }
    Ok(out)
}

/// Deletes every log entry in `[from, to]` (spec §4.10 "ranges are deletable").
pub fn contract_log_del_range(tx: &mut Transaction, from: HeightPos, to: HeightPos) -> DbResult<()> {
    let lower = contract_log_key(from);
    let mut upper = contract_log_key(to);
    upper.push(0x00);
    let victims: Vec<_> = tx.scan_range(&lower, &upper)?.into_iter().map(|(k, _)| k).collect();
    for k in victims {
        tx.remove(k);
    }
    Ok(())
}
