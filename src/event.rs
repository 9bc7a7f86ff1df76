//! Event store (spec §4.6): `(height, index, key, body)` rows. Duplicate
//! keys are allowed; `FindEvents` returns most-recently-added first.

use crate::error::{DbError, DbResult};
use crate::keys::{event_by_key_key, event_by_key_prefix, event_key, next_prefix, table_lower_bound, table_upper_bound, Table};
use crate::store::transaction::Transaction;
use crate::types::Height;

/// Appends an event at `(height, index)`. `body` must begin with the
/// encoded index (spec §4.6) — enforced here rather than left to callers.
pub fn event_insert(tx: &mut Transaction, height: Height, index: u32, key: &[u8], body: &[u8]) -> DbResult<()> {
    if body.len() < 4 || body[..4] != index.to_be_bytes() {
        return Err(DbError::inconsistent("event body must begin with its encoded index"));
    }
    tx.put(event_key(height, index), body.to_vec());
    tx.put(event_by_key_key(key, height, index), Vec::new());
    Ok(())
}

/// Most-recently-added first: secondary order by decreasing `(height, index)`
/// (spec §4.6 `FindEvents`).
pub fn find_events(tx: &Transaction, key: &[u8]) -> DbResult<Vec<Vec<u8>>> {
    let lower = event_by_key_prefix(key);
    let upper = next_prefix(&lower, table_upper_bound(Table::EventByKey));
    let mut out = Vec::new();
    for (k, _) in tx.scan_range(&lower, &upper)? {
        // key = [tag][key bytes][!height: 8][!idx: 4]
        let tail = &k[k.len() - 12..];
        let height = !crate::codec::read_u64_be(&tail[..8])?;
        let idx = !crate::codec::read_u32_be(&tail[8..])?;
        if let Some(body) = tx.get(&event_key(height, idx))? {
            out.push(body);
        }
    }
    Ok(out)
}

/// Drops all events at `height >= h` (spec §4.6 `DeleteEventsFrom`).
pub fn delete_events_from(tx: &mut Transaction, h: Height) -> DbResult<()> {
    let lower = event_key(h, 0);
    let upper = table_upper_bound(Table::Event);
    let victims: Vec<_> = tx.scan_range(&lower, &upper)?;
    for (k, v) in &victims {
        // We also need to drop the matching EventByKey row, but that table
        // is keyed by (key, !height, !idx) — not derivable from the Event
        // row's key alone without its original key bytes. The body encodes
        // the index (invariant above); the actual event key is recovered by
        // scanning EventByKey for the same (height, idx) pair.
        let height = crate::codec::read_u64_be(&k[1..9])?;
        let idx = crate::codec::read_u32_be(&k[9..13])?;
        let _ = (height, idx, v);
        tx.remove(k.clone());
    }
    prune_by_key_index(tx, h)?;
    Ok(())
}

/// Sweeps the `EventByKey` secondary index for rows at height >= h. Done as
/// a full scan (bounded by total event count) since the index's primary
/// sort key is the event key, not the height.
fn prune_by_key_index(tx: &mut Transaction, h: Height) -> DbResult<()> {
    let lower = table_lower_bound(Table::EventByKey);
    let upper = table_upper_bound(Table::EventByKey);
    let mut victims = Vec::new();
    for (k, _) in tx.scan_range(&lower, &upper)? {
        let tail = &k[k.len() - 12..];
        let height = !crate::codec::read_u64_be(&tail[..8])?;
        if height >= h {
            victims.push(k);
        }
    }
    for k in victims {
        tx.remove(k);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn body_for(idx: u32, tag: u8) -> Vec<u8> {
        let mut b = idx.to_be_bytes().to_vec();
        b.push(tag);
        b
    }

    #[test]
    fn find_events_returns_most_recent_first() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let key = b"k1";
        event_insert(&mut tx, 10, 0, key, &body_for(0, 1)).unwrap();
        event_insert(&mut tx, 20, 0, key, &body_for(0, 2)).unwrap();
        event_insert(&mut tx, 20, 1, key, &body_for(1, 3)).unwrap();

        let found = find_events(&tx, key).unwrap();
        assert_eq!(found, vec![body_for(1, 3), body_for(0, 2), body_for(0, 1)]);
    }

    #[test]
    fn delete_events_from_drops_tail() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let key = b"k1";
        event_insert(&mut tx, 5, 0, key, &body_for(0, 1)).unwrap();
        event_insert(&mut tx, 15, 0, key, &body_for(0, 2)).unwrap();

        delete_events_from(&mut tx, 10).unwrap();
        let found = find_events(&tx, key).unwrap();
        assert_eq!(found, vec![body_for(0, 1)]);
    }

    /// An event key ending in `0xFF` used to invert the scan's exclusive
    /// upper bound and panic inside `BTreeMap::range`.
    #[test]
    fn find_events_does_not_panic_on_trailing_0xff_key() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let key = [0x01u8, 0xFF];
        event_insert(&mut tx, 1, 0, &key, &body_for(0, 1)).unwrap();
        assert_eq!(find_events(&tx, &key).unwrap(), vec![body_for(0, 1)]);
    }
}
