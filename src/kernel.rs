//! Kernel store (spec §4.6): `(hash, height)` pairs, duplicates allowed.
//! `FindKernel` returns the maximum height seen for a given hash, since
//! different blocks may legitimately contain an identical kernel.

use crate::error::DbResult;
use crate::keys::{kernel_key, kernel_prefix, next_prefix, table_upper_bound, Table};
use crate::store::transaction::Transaction;
use crate::types::{Hash, Height};

pub fn kernel_insert(tx: &mut Transaction, hash: &Hash, height: Height) -> DbResult<()> {
    tx.put(kernel_key(hash, height), Vec::new());
    Ok(())
}

/// Maximum height recorded for `hash`, or `None` if it was never inserted
/// (spec §4.6 `FindKernel`).
pub fn find_kernel(tx: &Transaction, hash: &Hash) -> DbResult<Option<Height>> {
    let lower = kernel_prefix(hash);
    // one past the tail of this hash's 32-byte prefix block
    let upper = next_prefix(&lower, table_upper_bound(Table::Kernel));
    let mut best = None;
    for (k, _) in tx.scan_range(&lower, &upper)? {
        let height = crate::codec::read_u64_be(&k[1 + 32..])?;
        best = Some(best.map_or(height, |b: Height| b.max(height)));
    }
    Ok(best)
}

pub fn kernel_delete(tx: &mut Transaction, hash: &Hash, height: Height) -> DbResult<()> {
    tx.remove(kernel_key(hash, height));
    Ok(())
}

/// Diagnostics-only full-table bound, mirroring `state_table_bounds`.
pub fn kernel_table_bounds() -> (Vec<u8>, Vec<u8>) {
    (crate::keys::table_lower_bound(Table::Kernel), table_upper_bound(Table::Kernel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn find_kernel_returns_max_height_for_duplicates() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let h = Hash([9u8; 32]);
        kernel_insert(&mut tx, &h, 10).unwrap();
        kernel_insert(&mut tx, &h, 25).unwrap();
        kernel_insert(&mut tx, &h, 3).unwrap();
        assert_eq!(find_kernel(&tx, &h).unwrap(), Some(25));
    }

    #[test]
    fn unknown_kernel_is_none() {
        let store = Store::open_temporary().unwrap();
        let tx = store.begin();
        assert_eq!(find_kernel(&tx, &Hash([1u8; 32])).unwrap(), None);
    }

    /// A hash whose last byte is `0xFF` used to invert the scan's exclusive
    /// upper bound and panic inside `BTreeMap::range`.
    #[test]
    fn find_kernel_does_not_panic_on_trailing_0xff_hash() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let h = Hash([0xFFu8; 32]);
        kernel_insert(&mut tx, &h, 5).unwrap();
        assert_eq!(find_kernel(&tx, &h).unwrap(), Some(5));
    }
}
