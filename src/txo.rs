//! TXO store (spec §4.6): the append-oriented UTXO index keyed by a
//! monotonic 64-bit id.

use crate::codec::{Decode, Encode};
use crate::error::{CodecError, DbResult};
use crate::keys::{table_upper_bound, txo_key, Table};
use crate::store::transaction::Transaction;
use crate::types::{Height, TxoId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxoRow {
    pub value: Vec<u8>,
    pub spend_height: Option<Height>,
}

impl Encode for TxoRow {
    fn encode(&self, out: &mut Vec<u8>) {
        match self.spend_height {
            Some(h) => {
                out.push(1);
                h.encode(out);
            }
            None => out.push(0),
        }
        out.extend_from_slice(&self.value);
    }
}

impl Decode for TxoRow {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let tag = *buf.first().ok_or(CodecError::TooShort { need: 1, have: 0 })?;
        let mut rest = &buf[1..];
        let spend_height = if tag == 1 {
            let h = crate::codec::read_u64_be(rest)?;
            rest = &rest[8..];
            Some(h)
        } else {
            None
        };
        Ok(TxoRow { value: rest.to_vec(), spend_height })
    }
}

/// Inserts a new TXO (spec §4.6 `TxoAdd`). Ids are expected monotonic but
/// that ordering is the caller's responsibility — this just stores the row.
pub fn txo_add(tx: &mut Transaction, id: TxoId, value: Vec<u8>) -> DbResult<()> {
    tx.put(txo_key(id), TxoRow { value, spend_height: None }.to_bytes());
    Ok(())
}

pub fn txo_get(tx: &Transaction, id: TxoId) -> DbResult<Option<TxoRow>> {
    let Some(raw) = tx.get(&txo_key(id))? else { return Ok(None) };
    Ok(Some(TxoRow::decode(&raw)?))
}

/// Stamps the spend height (spec §4.6 `TxoSetSpent`).
pub fn txo_set_spent(tx: &mut Transaction, id: TxoId, height: Height) -> DbResult<()> {
    let mut row = txo_get(tx, id)?.ok_or_else(|| crate::error::DbError::inconsistent(format!("TxoSetSpent: txo {id} missing")))?;
    row.spend_height = Some(height);
    tx.put(txo_key(id), row.to_bytes());
    Ok(())
}

/// Compacts a spent TXO to commitment-only (spec §4.6 `TxoSetValue`).
pub fn txo_set_value(tx: &mut Transaction, id: TxoId, value: Vec<u8>) -> DbResult<()> {
    let mut row = txo_get(tx, id)?.ok_or_else(|| crate::error::DbError::inconsistent(format!("TxoSetValue: txo {id} missing")))?;
    row.value = value;
    tx.put(txo_key(id), row.to_bytes());
    Ok(())
}

/// Deletes every TXO with id >= `id` (spec §4.6 `TxoDelFrom`).
pub fn txo_del_from(tx: &mut Transaction, id: TxoId) -> DbResult<()> {
    let lower = txo_key(id);
    let upper = table_upper_bound(Table::Txo);
    let victims: Vec<_> = tx.scan_range(&lower, &upper)?.into_iter().map(|(k, _)| k).collect();
    for k in victims {
        tx.remove(k);
    }
    Ok(())
}

/// Enumerates TXOs starting at `id0` ascending.
pub fn txo_enum_from(tx: &Transaction, id0: TxoId) -> DbResult<Vec<(TxoId, TxoRow)>> {
    let lower = txo_key(id0);
    let upper = table_upper_bound(Table::Txo);
    let mut out = Vec::new();
    for (k, v) in tx.scan_range(&lower, &upper)? {
        let id = crate::codec::read_u64_be(&k[1..])?;
        out.push((id, TxoRow::decode(&v)?));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn add_spend_and_compact_round_trip() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        txo_add(&mut tx, 1, vec![0xAA; 8]).unwrap();
        txo_add(&mut tx, 2, vec![0xBB; 8]).unwrap();
        assert!(txo_get(&tx, 1).unwrap().unwrap().spend_height.is_none());

        txo_set_spent(&mut tx, 1, 100).unwrap();
        assert_eq!(txo_get(&tx, 1).unwrap().unwrap().spend_height, Some(100));

        txo_set_value(&mut tx, 1, vec![0xCC; 4]).unwrap();
        assert_eq!(txo_get(&tx, 1).unwrap().unwrap().value, vec![0xCC; 4]);
    }

    #[test]
    fn del_from_removes_tail() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        for id in 1..=5u64 {
            txo_add(&mut tx, id, vec![id as u8]).unwrap();
        }
        txo_del_from(&mut tx, 3).unwrap();
        assert!(txo_get(&tx, 2).unwrap().is_some());
        assert!(txo_get(&tx, 3).unwrap().is_none());
        assert!(txo_get(&tx, 5).unwrap().is_none());
    }

    #[test]
    fn enum_from_is_ascending() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        for id in [5u64, 1, 3] {
            txo_add(&mut tx, id, vec![]).unwrap();
        }
        let ids: Vec<_> = txo_enum_from(&tx, 0).unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
    }
}
