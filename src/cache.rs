//! Content-addressed cache (spec §4.8): a size-bounded map evicted by a
//! hit-weighted policy. A monotonic hit counter stamps every insert and
//! every successful find; when the total size exceeds the configured max,
//! rows are evicted in ascending hit-stamp order (least-recently-bumped
//! first) until it fits again. The aggregate `{HitCounter, SizeMax,
//! SizeCurrent}` lives under a single parameter row (spec §6 `CacheState`)
//! so recovery after a crash needs no recomputation.

use crate::codec::{Decode, Encode};
use crate::error::DbResult;
use crate::keys::{cache_index_key, cache_index_prefix, cache_key};
use crate::store::param::{param_get, param_set, ParamId};
use crate::store::transaction::Transaction;
use crate::types::CacheState;

#[derive(Clone, Debug)]
struct CacheRow {
    data: Vec<u8>,
    hit_stamp: u64,
}

impl Encode for CacheRow {
    fn encode(&self, out: &mut Vec<u8>) {
        self.hit_stamp.encode(out);
        out.extend_from_slice(&self.data);
    }
}

impl Decode for CacheRow {
    fn decode(buf: &[u8]) -> Result<Self, crate::error::CodecError> {
        let hit_stamp = crate::codec::read_u64_be(buf)?;
        Ok(CacheRow { data: buf[8..].to_vec(), hit_stamp })
    }
}

pub fn cache_state(tx: &Transaction) -> DbResult<CacheState> {
    let (_, blob) = param_get(tx, ParamId::CacheState)?;
    Ok(match blob {
        Some(b) => CacheState::decode(&b)?,
        None => CacheState { hit_counter: 0, size_max: 0, size_current: 0 },
    })
}

fn set_cache_state(tx: &mut Transaction, state: CacheState) -> DbResult<()> {
    param_set(tx, ParamId::CacheState, None, Some(&state.to_bytes()))
}

/// May shrink immediately, evicting until the new bound is satisfied
/// (spec §4.8 `CacheSetMaxSize`).
pub fn cache_set_max_size(tx: &mut Transaction, size_max: u64) -> DbResult<()> {
    let mut state = cache_state(tx)?;
    state.size_max = size_max;
    set_cache_state(tx, state)?;
    evict_until_fits(tx)
}

/// Inserts or overwrites `key`. If this pushes `size_current` over
/// `size_max`, entries are evicted in ascending hit-stamp order until it
/// fits (spec §4.8, §8 S3).
pub fn cache_insert(tx: &mut Transaction, key: &[u8], data: Vec<u8>) -> DbResult<()> {
    let mut state = cache_state(tx)?;
    let new_size = data.len() as u64;

    if let Some(existing) = get_row(tx, key)? {
        tx.remove(cache_index_key(existing.hit_stamp, key));
        state.size_current = state.size_current.saturating_sub(existing.data.len() as u64);
    }

    state.hit_counter += 1;
    let stamp = state.hit_counter;
    let row = CacheRow { data, hit_stamp: stamp };
    tx.put(cache_key(key), row.to_bytes());
    tx.put(cache_index_key(stamp, key), Vec::new());
    state.size_current += new_size;
    set_cache_state(tx, state)?;

    evict_until_fits(tx)
}

fn get_row(tx: &Transaction, key: &[u8]) -> DbResult<Option<CacheRow>> {
    let Some(raw) = tx.get(&cache_key(key))? else { return Ok(None) };
    Ok(Some(CacheRow::decode(&raw)?))
}

/// Looks up `key`, bumping its hit-stamp to the current counter on a hit
/// (spec §4.8 `CacheFind`).
pub fn cache_find(tx: &mut Transaction, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
    let Some(row) = get_row(tx, key)? else { return Ok(None) };
    let mut state = cache_state(tx)?;
    state.hit_counter += 1;
    let new_stamp = state.hit_counter;

    tx.remove(cache_index_key(row.hit_stamp, key));
    tx.put(cache_index_key(new_stamp, key), Vec::new());
    tx.put(cache_key(key), CacheRow { data: row.data.clone(), hit_stamp: new_stamp }.to_bytes());
    set_cache_state(tx, state)?;

    Ok(Some(row.data))
}

pub fn cache_remove(tx: &mut Transaction, key: &[u8]) -> DbResult<()> {
    let Some(row) = get_row(tx, key)? else { return Ok(()) };
    tx.remove(cache_key(key));
    tx.remove(cache_index_key(row.hit_stamp, key));
    let mut state = cache_state(tx)?;
    state.size_current = state.size_current.saturating_sub(row.data.len() as u64);
    set_cache_state(tx, state)
}

fn evict_until_fits(tx: &mut Transaction) -> DbResult<()> {
    loop {
        let state = cache_state(tx)?;
        if state.size_current <= state.size_max {
            return Ok(());
        }
        let lower = cache_index_prefix();
        let mut upper = cache_index_prefix();
        *upper.last_mut().unwrap() += 1;
        let Some((idx_key, _)) = tx.scan_range(&lower, &upper)?.into_iter().next() else {
            // Nothing left to evict but still over budget: leave as-is
            // rather than loop forever (can happen if size_max was set
            // below a single entry's size).
            return Ok(());
        };
        // idx_key = [tag][0x01][hit_stamp: 8][key bytes...]
        let key = idx_key[1 + 1 + 8..].to_vec();
        cache_remove(tx, &key)?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    /// S3: cache eviction.
    #[test]
    fn lowest_hit_stamp_is_evicted_first() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        cache_set_max_size(&mut tx, 100).unwrap();

        cache_insert(&mut tx, b"k1", vec![0u8; 60]).unwrap();
        cache_insert(&mut tx, b"k2", vec![0u8; 60]).unwrap();

        assert_eq!(cache_find(&mut tx, b"k1").unwrap(), None);
        assert_eq!(cache_find(&mut tx, b"k2").unwrap(), Some(vec![0u8; 60]));
        assert_eq!(cache_state(&tx).unwrap().size_current, 60);
    }

    #[test]
    fn find_bumps_recency_protecting_from_eviction() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        cache_set_max_size(&mut tx, 100).unwrap();
        cache_insert(&mut tx, b"k1", vec![0u8; 50]).unwrap();
        cache_insert(&mut tx, b"k2", vec![0u8; 40]).unwrap();
        // Touch k1 so it's now more recent than k2.
        cache_find(&mut tx, b"k1").unwrap();
        cache_insert(&mut tx, b"k3", vec![0u8; 30]).unwrap();

        assert_eq!(cache_find(&mut tx, b"k2").unwrap(), None);
        assert!(cache_find(&mut tx, b"k1").unwrap().is_some());
        assert!(cache_find(&mut tx, b"k3").unwrap().is_some());
    }

    #[test]
    fn set_max_size_shrinks_immediately() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        cache_set_max_size(&mut tx, 1000).unwrap();
        cache_insert(&mut tx, b"k1", vec![0u8; 50]).unwrap();
        cache_insert(&mut tx, b"k2", vec![0u8; 50]).unwrap();

        cache_set_max_size(&mut tx, 60).unwrap();
        assert!(cache_state(&tx).unwrap().size_current <= 60);
    }
}
