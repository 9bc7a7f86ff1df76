//! Dummy store (spec §4.6): scheduled-at-height key-IDs used to deterministically
//! plant decoy outputs. Unique by key-ID.

use crate::error::DbResult;
use crate::keys::{dummy_key, table_lower_bound, table_upper_bound, Table};
use crate::store::transaction::Transaction;
use crate::types::Height;

pub fn dummy_set(tx: &mut Transaction, key_id: &[u8], height: Height) -> DbResult<()> {
    tx.put(dummy_key(key_id), height.to_be_bytes().to_vec());
    Ok(())
}

pub fn dummy_get(tx: &Transaction, key_id: &[u8]) -> DbResult<Option<Height>> {
    Ok(match tx.get(&dummy_key(key_id))? {
        Some(b) => Some(crate::codec::read_u64_be(&b)?),
        None => None,
    })
}

pub fn dummy_del(tx: &mut Transaction, key_id: &[u8]) -> DbResult<()> {
    tx.remove(dummy_key(key_id));
    Ok(())
}

/// Earliest scheduled dummy, with its height (spec §4.6 `GetLowestDummy`).
/// Scans the whole table since it's keyed by key-ID, not height; dummies
/// are expected to be a small working set.
pub fn get_lowest_dummy(tx: &Transaction) -> DbResult<Option<(Vec<u8>, Height)>> {
    let lower = table_lower_bound(Table::Dummy);
    let upper = table_upper_bound(Table::Dummy);
    let mut best: Option<(Vec<u8>, Height)> = None;
    for (k, v) in tx.scan_range(&lower, &upper)? {
        let height = crate::codec::read_u64_be(&v)?;
        let key_id = k[1..].to_vec();
        if best.as_ref().map_or(true, |(_, h)| height < *h) {
            best = Some((key_id, height));
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn lowest_dummy_is_earliest_scheduled() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        dummy_set(&mut tx, b"a", 50).unwrap();
        dummy_set(&mut tx, b"b", 10).unwrap();
        dummy_set(&mut tx, b"c", 30).unwrap();
        let (key, height) = get_lowest_dummy(&tx).unwrap().unwrap();
        assert_eq!(key, b"b");
        assert_eq!(height, 10);
    }

    #[test]
    fn unique_by_key_id() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        dummy_set(&mut tx, b"a", 1).unwrap();
        dummy_set(&mut tx, b"a", 2).unwrap();
        assert_eq!(dummy_get(&tx, b"a").unwrap(), Some(2));
    }
}
