//! Insert, lookup, delete, and ancestor/descendant navigation for the state
//! tree (spec §4.3 "Insert", "Delete", "Ancestor/descendant navigation").

use crate::codec::{Decode, Encode};
use crate::error::{DbError, DbResult};
use crate::keys::{
    self, state_by_height_hash_key, state_children_key, state_children_prefix, state_key,
    state_orphans_key, table_lower_bound, table_upper_bound, Table,
};
use crate::state::tips::{tip_add, tip_del};
use crate::state::StateRow;
use crate::store::transaction::Transaction;
use crate::types::{ChainWork, Hash, Height, RowId};

fn encode_orphan_rows(rows: &[RowId]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rows.len() * 8);
    for r in rows {
        r.encode(&mut out);
    }
    out
}

fn decode_orphan_rows(buf: &[u8]) -> DbResult<Vec<RowId>> {
    let mut out = Vec::with_capacity(buf.len() / 8);
    for chunk in buf.chunks(8) {
        out.push(u64::decode(chunk)?);
    }
    Ok(out)
}

/// Inserts a new state. Fails if `(height, hash)` already exists.
/// Resolves `prev_row` by looking up `(height-1, prev_hash)`; if absent,
/// `prev_row` is stored as 0 and the back-link is patched later by
/// `patch_orphans` when the parent is inserted (spec §4.3 S2).
pub fn insert_state(
    tx: &mut Transaction,
    height: Height,
    hash: Hash,
    prev_hash: Hash,
    pow: Vec<u8>,
    chainwork: ChainWork,
) -> DbResult<RowId> {
    let hh_key = state_by_height_hash_key(height, &hash);
    if tx.contains_key(&hh_key)? {
        return Err(DbError::inconsistent(format!("state ({height}, {hash}) already exists")));
    }

    let prev_row = if height == 0 {
        0
    } else {
        find_state_by_height_hash(tx, height - 1, &prev_hash)?.unwrap_or(0)
    };

    let row = tx.next_id(&keys::counter_key("state"))?;

    let state = StateRow {
        row,
        height,
        hash,
        prev_row,
        prev_hash,
        pow,
        flags: Default::default(),
        next_count: 0,
        next_functional_count: 0,
        chainwork,
        txo_hi: 0,
        inputs: Vec::new(),
        extra: Vec::new(),
    };
    tx.put(state_key(row), state.to_bytes());
    tx.put(hh_key, row.to_be_bytes().to_vec());

    if prev_row != 0 {
        bump_next_count(tx, prev_row, 1)?;
        tip_del(tx, get_state(tx, prev_row)?.height, prev_row)?;
        tx.put(state_children_key(prev_row, row), Vec::new());
    } else if height > 0 {
        // Parent not here yet: remember this child against the parent's key.
        let orphan_key = state_orphans_key(height - 1, &prev_hash);
        let mut rows = match tx.get(&orphan_key)? {
            Some(b) => decode_orphan_rows(&b)?,
            None => Vec::new(),
        };
        rows.push(row);
        tx.put(orphan_key, encode_orphan_rows(&rows));
    }

    tip_add(tx, height, row)?;
    patch_orphans(tx, &state_for_row(tx, row)?)?;

    Ok(row)
}

/// After `parent` is inserted, re-parents any previously-orphaned children
/// that were waiting on `(parent.height, parent.hash)` (`StateUpdPrevRow`).
fn patch_orphans(tx: &mut Transaction, parent: &StateRow) -> DbResult<()> {
    let orphan_key = state_orphans_key(parent.height, &parent.hash);
    let Some(raw) = tx.get(&orphan_key)? else {
        return Ok(());
    };
    let children = decode_orphan_rows(&raw)?;
    tx.remove(orphan_key);

    for child_row in children {
        let mut child = get_state(tx, child_row)?;
        child.prev_row = parent.row;
        tx.put(state_key(child_row), child.to_bytes());
        tx.put(state_children_key(parent.row, child_row), Vec::new());
        bump_next_count(tx, parent.row, 1)?;
        tip_del(tx, parent.height, parent.row)?;
    }
    Ok(())
}

fn state_for_row(tx: &Transaction, row: RowId) -> DbResult<StateRow> {
    get_state(tx, row)
}

pub(crate) fn bump_next_count(tx: &mut Transaction, row: RowId, delta: i32) -> DbResult<()> {
    let mut state = get_state(tx, row)?;
    state.next_count = (state.next_count as i64 + delta as i64).max(0) as u32;
    tx.put(state_key(row), state.to_bytes());
    Ok(())
}

pub(crate) fn bump_next_functional_count(tx: &mut Transaction, row: RowId, delta: i32) -> DbResult<()> {
    let mut state = get_state(tx, row)?;
    state.next_functional_count = (state.next_functional_count as i64 + delta as i64).max(0) as u32;
    tx.put(state_key(row), state.to_bytes());
    Ok(())
}

pub fn get_state(tx: &Transaction, row: RowId) -> DbResult<StateRow> {
    let raw = tx.get(&state_key(row))?.ok_or_else(|| DbError::inconsistent(format!("state row {row} missing")))?;
    let mut s = StateRow::decode(&raw)?;
    s.row = row;
    Ok(s)
}

pub fn get_state_hash(tx: &Transaction, row: RowId) -> DbResult<Hash> {
    Ok(get_state(tx, row)?.hash)
}

pub fn find_state_by_height_hash(tx: &Transaction, height: Height, hash: &Hash) -> DbResult<Option<RowId>> {
    let Some(raw) = tx.get(&state_by_height_hash_key(height, hash))? else {
        return Ok(None);
    };
    Ok(Some(u64::decode(&raw)?))
}

/// Deletes a childless state; decrements the parent's counters and restores
/// it to `Tip` if it is now childless. Returns the parent row (0 if none).
pub fn delete_state(tx: &mut Transaction, row: RowId) -> DbResult<RowId> {
    let state = get_state(tx, row)?;
    if state.next_count != 0 {
        return Err(DbError::inconsistent(format!("cannot delete state {row}: has children")));
    }

    tx.remove(state_key(row));
    tx.remove(state_by_height_hash_key(state.height, &state.hash));
    tip_del(tx, state.height, row)?;

    if state.prev_row != 0 {
        tx.remove(state_children_key(state.prev_row, row));
        bump_next_count(tx, state.prev_row, -1)?;
        let parent = get_state(tx, state.prev_row)?;
        if parent.next_count == 0 {
            tip_add(tx, parent.height, state.prev_row)?;
        }
    } else if state.height > 0 {
        // Remove from the orphan index if it was still waiting on a parent.
        let orphan_key = state_orphans_key(state.height - 1, &state.prev_hash);
        if let Some(raw) = tx.get(&orphan_key)? {
            let mut rows = decode_orphan_rows(&raw)?;
            rows.retain(|&r| r != row);
            if rows.is_empty() {
                tx.remove(orphan_key);
            } else {
                tx.put(orphan_key, encode_orphan_rows(&rows));
            }
        }
    }

    Ok(state.prev_row)
}

/// All states at a given height.
pub fn enum_states_at(tx: &Transaction, height: Height) -> DbResult<Vec<StateRow>> {
    let lower = state_by_height_hash_key(height, &Hash::zero());
    let upper = state_by_height_hash_key(height + 1, &Hash::zero());
    let mut out = Vec::new();
    for (_, v) in tx.scan_range(&lower, &upper)? {
        let row = u64::decode(&v)?;
        out.push(get_state(tx, row)?);
    }
    Ok(out)
}

/// The children of `row` (states at `height(row)+1` whose `prev_row == row`).
pub fn enum_ancestors(tx: &Transaction, row: RowId) -> DbResult<Vec<StateRow>> {
    let lower = state_children_prefix(row);
    let upper = state_children_prefix(row + 1);
    let mut out = Vec::new();
    for (k, _) in tx.scan_range(&lower, &upper)? {
        // key = [tag][parent_row: 8][child_row: 8]
        let child_row = u64::decode(&k[1 + 8..])?;
        out.push(get_state(tx, child_row)?);
    }
    Ok(out)
}

pub fn get_prev(tx: &Transaction, row: RowId) -> DbResult<Option<RowId>> {
    let state = get_state(tx, row)?;
    Ok(if state.prev_row == 0 { None } else { Some(state.prev_row) })
}

/// Bounds of the entire state table (for diagnostics/maintenance walks).
pub fn state_table_bounds() -> (Vec<u8>, Vec<u8>) {
    (table_lower_bound(Table::State), table_upper_bound(Table::State))
}
