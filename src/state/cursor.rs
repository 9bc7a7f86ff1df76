//! Cursor & reorg (spec §4.3). `CursorRow`/`CursorHeight` name the current
//! main-branch tip. `Active` is set/cleared *only* through `move_fwd` /
//! `move_back`; a reorg is a sequence of `move_back` down to the common
//! ancestor followed by `move_fwd` along the new branch.

use crate::error::{DbError, DbResult};
use crate::keys::state_key;
use crate::state::tree::get_state;
use crate::store::param::{param_int_get_def, param_int_set, ParamId};
use crate::store::transaction::Transaction;
use crate::types::{RowId, StateFlags};

pub fn cursor_row(tx: &Transaction) -> DbResult<RowId> {
    param_int_get_def(tx, ParamId::CursorRow, 0)
}

pub fn cursor_height(tx: &Transaction) -> DbResult<u64> {
    param_int_get_def(tx, ParamId::CursorHeight, 0)
}

fn set_cursor(tx: &mut Transaction, row: RowId, height: u64) -> DbResult<()> {
    param_int_set(tx, ParamId::CursorRow, row)?;
    param_int_set(tx, ParamId::CursorHeight, height)
}

/// Sets `Active` on `row` and advances the cursor to it. `row` must be a
/// reachable child of the current cursor (spec §4.3 `MoveFwd`).
pub fn move_fwd(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let state = get_state(tx, row)?;
    if !state.flags.contains(StateFlags::REACHABLE) {
        return Err(DbError::inconsistent(format!("MoveFwd onto non-reachable state {row}")));
    }
    let cur = cursor_row(tx)?;
    if cur != 0 && state.prev_row != cur {
        return Err(DbError::inconsistent(format!(
            "MoveFwd({row}) is not a child of the current cursor {cur}"
        )));
    }

    let mut s = state;
    s.flags.insert(StateFlags::ACTIVE);
    tx.put(state_key(row), s.to_bytes());
    log::debug!("cursor advancing to height {} row {row}", s.height);
    set_cursor(tx, row, s.height)
}

/// Clears `Active` on `row` and retreats the cursor to its parent
/// (spec §4.3 `MoveBack`). `row` must be the current cursor.
pub fn move_back(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let cur = cursor_row(tx)?;
    if cur != row {
        return Err(DbError::inconsistent(format!("MoveBack({row}) but cursor is at {cur}")));
    }
    let mut state = get_state(tx, row)?;
    state.flags.remove(StateFlags::ACTIVE);
    tx.put(state_key(row), state.to_bytes());

    let (parent_row, parent_height) = if state.prev_row == 0 {
        (0, 0)
    } else {
        let parent = get_state(tx, state.prev_row)?;
        (parent.row, parent.height)
    };
    log::debug!("cursor retreating from height {} to {parent_height}", state.height);
    set_cursor(tx, parent_row, parent_height)
}

/// Reorganizes onto `target`: walks back from the current cursor to the
/// true lowest common ancestor with `target`'s branch, then forward from
/// that ancestor (inclusive) to `target`. Returns the rows moved back and
/// forward, in the order applied.
///
/// On the very first reorg (cursor never activated, `cursor_row == 0`)
/// there is nothing to walk back from, so the walk forward starts at
/// `target`'s own root rather than skipping it — otherwise that root (e.g.
/// genesis) would never get `Active` set (spec §4.3, §8 S1).
pub fn reorg_to(tx: &mut Transaction, target: RowId) -> DbResult<(Vec<RowId>, Vec<RowId>)> {
    let mut forward_path = Vec::new();
    let mut cursor = target;
    loop {
        forward_path.push(cursor);
        let s = get_state(tx, cursor)?;
        if s.prev_row == 0 {
            break;
        }
        cursor = s.prev_row;
    }
    forward_path.reverse();

    let mut backward = Vec::new();
    let mut cur = cursor_row(tx)?;
    let ancestor_index = loop {
        if cur == 0 {
            break None;
        }
        if let Some(idx) = forward_path.iter().position(|&r| r == cur) {
            break Some(idx);
        }
        move_back(tx, cur)?;
        backward.push(cur);
        cur = cursor_row(tx)?;
    };

    // An ancestor found mid-path is already `Active`; skip past it. No
    // ancestor found (bootstrap, or a cursor rooted outside `target`'s
    // branch) means the whole forward path needs activating, from its root.
    let start = ancestor_index.map_or(0, |idx| idx + 1);

    let mut forward = Vec::new();
    for row in forward_path.into_iter().skip(start) {
        move_fwd(tx, row)?;
        forward.push(row);
    }
    Ok((backward, forward))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::reachability::set_state_functional;
    use crate::state::tips::enum_functional_tips;
    use crate::state::tree::insert_state;
    use crate::store::Store;
    use crate::types::{Hash, StateFlags};

    fn mark_functional(tx: &mut Transaction, row: RowId) {
        set_state_functional(tx, row).unwrap();
    }

    /// S1: fork and reorg.
    #[test]
    fn fork_and_reorg() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();

        let g = insert_state(&mut tx, 0, Hash([1u8; 32]), Hash::zero(), vec![], 1).unwrap();
        let g_hash = get_state(&tx, g).unwrap().hash;
        let a = insert_state(&mut tx, 1, Hash([2u8; 32]), g_hash, vec![], 2).unwrap();
        let b = insert_state(&mut tx, 1, Hash([3u8; 32]), g_hash, vec![], 3).unwrap();

        mark_functional(&mut tx, g);
        mark_functional(&mut tx, a);
        mark_functional(&mut tx, b);

        assert_eq!(enum_functional_tips(&tx).unwrap(), vec![b, a]);

        move_fwd(&mut tx, g).unwrap();
        move_fwd(&mut tx, a).unwrap();
        assert!(get_state(&tx, a).unwrap().flags.contains(StateFlags::ACTIVE));

        move_back(&mut tx, a).unwrap();
        move_fwd(&mut tx, b).unwrap();

        assert!(get_state(&tx, g).unwrap().flags.contains(StateFlags::ACTIVE));
        assert!(get_state(&tx, b).unwrap().flags.contains(StateFlags::ACTIVE));
        assert!(!get_state(&tx, a).unwrap().flags.contains(StateFlags::ACTIVE));
        assert_eq!(cursor_row(&tx).unwrap(), b);
    }

    #[test]
    fn reorg_to_walks_common_ancestor() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let g = insert_state(&mut tx, 0, Hash([1u8; 32]), Hash::zero(), vec![], 1).unwrap();
        let g_hash = get_state(&tx, g).unwrap().hash;
        let a = insert_state(&mut tx, 1, Hash([2u8; 32]), g_hash, vec![], 2).unwrap();
        let b = insert_state(&mut tx, 1, Hash([3u8; 32]), g_hash, vec![], 3).unwrap();
        mark_functional(&mut tx, g);
        mark_functional(&mut tx, a);
        mark_functional(&mut tx, b);

        let (back0, fwd0) = reorg_to(&mut tx, a).unwrap();
        assert_eq!(back0, Vec::<RowId>::new());
        assert_eq!(fwd0, vec![g, a]);
        assert_eq!(cursor_row(&tx).unwrap(), a);
        assert!(get_state(&tx, g).unwrap().flags.contains(StateFlags::ACTIVE));
        assert!(get_state(&tx, a).unwrap().flags.contains(StateFlags::ACTIVE));

        let (back, fwd) = reorg_to(&mut tx, b).unwrap();
        assert_eq!(back, vec![a]);
        assert_eq!(fwd, vec![b]);
        assert_eq!(cursor_row(&tx).unwrap(), b);
        assert!(get_state(&tx, g).unwrap().flags.contains(StateFlags::ACTIVE));
        assert!(get_state(&tx, b).unwrap().flags.contains(StateFlags::ACTIVE));
        assert!(!get_state(&tx, a).unwrap().flags.contains(StateFlags::ACTIVE));
    }
}
