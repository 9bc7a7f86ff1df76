//! Transaction scope (spec §4.1). A scoped acquisition of the single outer
//! write transaction: destruction without an explicit `commit()` rolls back.
//!
//! Mirrors `NodeDB::Transaction`, but where the original relies on SQLite's
//! own `BEGIN`/`COMMIT`/`ROLLBACK`, this keeps every write staged in memory
//! (an overlay over the underlying sled tree plus a batch to flush on
//! commit) so rollback is simply "never touched disk" — no undo log needed.

use std::collections::BTreeMap;

use crate::error::DbResult;
use crate::store::Store;

pub(crate) enum Staged {
    Put(Vec<u8>),
    Remove,
}

/// A scoped write transaction over one [`Store`].
///
/// At most one should be in flight per `Store` at a time (spec §5: "single
/// writer discipline"); nothing in this type enforces that across threads
/// because the node runtime guarantees it externally.
pub struct Transaction<'a> {
    pub(crate) store: &'a Store,
    pub(crate) overlay: BTreeMap<Vec<u8>, Staged>,
    rows_changed: u64,
    committed: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Transaction {
            store,
            overlay: BTreeMap::new(),
            rows_changed: 0,
            committed: false,
        }
    }

    /// Read-your-writes lookup: overlay first, then the underlying tree.
    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        if let Some(staged) = self.overlay.get(key) {
            return Ok(match staged {
                Staged::Put(v) => Some(v.clone()),
                Staged::Remove => None,
            });
        }
        Ok(self.store.db.get(key)?.map(|iv| iv.to_vec()))
    }

    pub fn contains_key(&self, key: &[u8]) -> DbResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.overlay.insert(key, Staged::Put(value));
        self.rows_changed += 1;
    }

    pub fn remove(&mut self, key: Vec<u8>) {
        self.overlay.insert(key, Staged::Remove);
        self.rows_changed += 1;
    }

    /// Merged ascending-order scan over `[lower, upper)` across the
    /// underlying tree and this transaction's overlay (read-your-writes for
    /// range queries — needed by every `Enum*` operation in spec §4).
    pub fn scan_range(&self, lower: &[u8], upper: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        // A degenerate (inverted or empty) range has no members; `BTreeMap::range`
        // panics on `start > end`, so callers building an upper bound by
        // incrementing a prefix (which can wrap) must be tolerated here too.
        if lower >= upper {
            return Ok(Vec::new());
        }
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();
        for entry in self.store.db.range(lower.to_vec()..upper.to_vec()) {
            let (k, v) = entry?;
            merged.insert(k.to_vec(), Some(v.to_vec()));
        }
        for (k, staged) in self.overlay.range(lower.to_vec()..upper.to_vec()) {
            match staged {
                Staged::Put(v) => {
                    merged.insert(k.clone(), Some(v.clone()));
                }
                Staged::Remove => {
                    merged.insert(k.clone(), None);
                }
            }
        }
        Ok(merged.into_iter().filter_map(|(k, v)| v.map(|v| (k, v))).collect())
    }

    pub fn scan_range_rev(&self, lower: &[u8], upper: &[u8]) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut v = self.scan_range(lower, upper)?;
        v.reverse();
        Ok(v)
    }

    /// Allocates the next id from a named monotonic counter (the
    /// auto-increment row-id analogue, `NodeDB::get_AutoincrementID`).
    pub fn next_id(&mut self, counter: &[u8]) -> DbResult<u64> {
        let current = self.get(counter)?.map(|b| {
            let mut arr = [0u8; 8];
            arr.copy_from_slice(&b);
            u64::from_be_bytes(arr)
        }).unwrap_or(0);
        let next = current + 1;
        self.put(counter.to_vec(), next.to_be_bytes().to_vec());
        Ok(next)
    }

    /// Number of staged mutations so far (spec §4.1 `get_RowsChanged`).
    pub fn rows_changed(&self) -> u64 {
        self.rows_changed
    }

    /// Applies all staged writes atomically and fires the store's
    /// `notify-modified` hook if at least one row changed.
    pub fn commit(mut self) -> DbResult<()> {
        if !self.overlay.is_empty() {
            let mut batch = sled::Batch::default();
            for (k, staged) in std::mem::take(&mut self.overlay) {
                match staged {
                    Staged::Put(v) => batch.insert(k, v),
                    Staged::Remove => batch.remove(k),
                }
            }
            self.store.db.apply_batch(batch)?;
        }
        self.committed = true;
        if self.rows_changed > 0 {
            self.store.notify_modified();
        }
        Ok(())
    }
}

impl<'a> Drop for Transaction<'a> {
    fn drop(&mut self) {
        if !self.committed && !self.overlay.is_empty() {
            log::debug!("rolling back transaction with {} staged writes", self.overlay.len());
        }
        // Nothing to undo: staged writes never touched the underlying tree.
    }
}
