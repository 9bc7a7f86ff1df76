//! Unique store (spec §4.8): a small key/value table with unique-insert
//! semantics, used as a building block elsewhere (e.g. BBS key uniqueness
//! follows the same pattern inline) and exposed directly for ad-hoc
//! singleton facts the node wants to record.

use crate::error::DbResult;
use crate::keys::unique_key;
use crate::store::transaction::Transaction;

/// Inserts `(k, v)` only if `k` is absent. Returns `false` without
/// modifying the existing row if it already exists (spec §4.8
/// `UniqueInsertSafe`).
pub fn unique_insert_safe(tx: &mut Transaction, k: &[u8], v: Option<&[u8]>) -> DbResult<bool> {
    let key = unique_key(k);
    if tx.contains_key(&key)? {
        return Ok(false);
    }
    tx.put(key, v.map(|b| b.to_vec()).unwrap_or_default());
    Ok(true)
}

pub fn unique_find(tx: &Transaction, k: &[u8]) -> DbResult<Option<Vec<u8>>> {
    tx.get(&unique_key(k))
}

/// Removes `k`; raises an inconsistency fault if it was absent (spec §4.8
/// `UniqueDeleteStrict`).
pub fn unique_delete_strict(tx: &mut Transaction, k: &[u8]) -> DbResult<()> {
    let key = unique_key(k);
    if !tx.contains_key(&key)? {
        return Err(crate::error::DbError::inconsistent("UniqueDeleteStrict: key absent"));
    }
    tx.remove(key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn insert_safe_refuses_duplicate_without_overwriting() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        assert!(unique_insert_safe(&mut tx, b"k", Some(b"v1")).unwrap());
        assert!(!unique_insert_safe(&mut tx, b"k", Some(b"v2")).unwrap());
        assert_eq!(unique_find(&tx, b"k").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn delete_strict_raises_on_missing_key() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        assert!(unique_delete_strict(&mut tx, b"missing").is_err());
    }
}
