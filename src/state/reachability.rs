//! Flag discipline and reachability propagation (spec §4.3).
//!
//! `Functional` is set directly by [`crate::state::body::set_state_block`] +
//! `set_state_functional`. `Reachable` is derived: a functional state becomes
//! reachable the moment its parent is reachable (or it is the genesis, which
//! has no parent in the DB); reachability then propagates depth-first to
//! functional children (`OnStateReachable` in the original). Losing
//! functionality clears `Reachable` transitively forward from that state.

use crate::error::DbResult;
use crate::keys::state_key;
use crate::state::tips::{tip_reachable_add, tip_reachable_del};
use crate::state::tree::{bump_next_functional_count, enum_ancestors, get_state};
use crate::store::transaction::Transaction;
use crate::types::{RowId, StateFlags};

fn put(tx: &mut Transaction, row: RowId, flags: StateFlags) -> DbResult<()> {
    let mut state = get_state(tx, row)?;
    state.flags = flags;
    tx.put(state_key(row), state.to_bytes());
    Ok(())
}

/// Sets `Functional` and, if the parent is genesis or already reachable,
/// propagates `Reachable` forward. Mirrors `NodeDB::SetStateFunctional`.
pub fn set_state_functional(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let mut state = get_state(tx, row)?;
    if state.flags.contains(StateFlags::FUNCTIONAL) {
        return Ok(());
    }
    state.flags.insert(StateFlags::FUNCTIONAL);
    put(tx, row, state.flags)?;

    let parent_reachable = if state.prev_row == 0 {
        // Genesis (no parent recorded in the DB) is reachable by definition.
        state.height == 0
    } else {
        get_state(tx, state.prev_row)?.flags.contains(StateFlags::REACHABLE)
    };

    if parent_reachable {
        on_state_reachable(tx, row)?;
    }
    Ok(())
}

/// Marks `row` reachable and recurses into its functional children
/// (`NodeDB::OnStateReachable`).
pub fn on_state_reachable(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let mut state = get_state(tx, row)?;
    if state.flags.contains(StateFlags::REACHABLE) {
        return Ok(());
    }
    state.flags.insert(StateFlags::REACHABLE);
    put(tx, row, state.flags)?;

    if state.prev_row != 0 {
        let parent = get_state(tx, state.prev_row)?;
        if parent.next_functional_count == 0 {
            // Parent can no longer be a reachable tip: it is about to gain
            // a reachable functional child.
            tip_reachable_del(tx, parent.chainwork, parent.row)?;
        }
        bump_next_functional_count(tx, state.prev_row, 1)?;
    }

    if state.next_functional_count == 0 {
        tip_reachable_add(tx, state.chainwork, row)?;
    }

    for child in enum_ancestors(tx, row)? {
        if child.flags.contains(StateFlags::FUNCTIONAL) && !child.flags.contains(StateFlags::REACHABLE) {
            on_state_reachable(tx, child.row)?;
        }
    }
    Ok(())
}

/// Clears `Functional` (and therefore `Reachable`/`Active`, which are
/// strictly nested under it) and propagates the loss of reachability
/// forward to descendants.
pub fn clear_state_functional(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let mut state = get_state(tx, row)?;
    if !state.flags.contains(StateFlags::FUNCTIONAL) {
        return Ok(());
    }
    let was_reachable = state.flags.contains(StateFlags::REACHABLE);
    state.flags.remove(StateFlags::FUNCTIONAL | StateFlags::REACHABLE | StateFlags::ACTIVE);
    put(tx, row, state.flags)?;

    if was_reachable {
        clear_reachable_forward(tx, row)?;
    }
    Ok(())
}

fn clear_reachable_forward(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let state = get_state(tx, row)?;
    if state.next_functional_count == 0 {
        tip_reachable_del(tx, state.chainwork, row)?;
    }
    if state.prev_row != 0 {
        bump_next_functional_count(tx, state.prev_row, -1)?;
        let parent = get_state(tx, state.prev_row)?;
        if parent.next_functional_count == 0 && parent.flags.contains(StateFlags::REACHABLE) {
            // Parent just lost its last reachable functional child: it
            // regains reachable-tip status.
            tip_reachable_add(tx, parent.chainwork, parent.row)?;
        }
    }

    for child in enum_ancestors(tx, row)? {
        if child.flags.contains(StateFlags::REACHABLE) {
            let mut c = child;
            c.flags.remove(StateFlags::REACHABLE | StateFlags::ACTIVE);
            put(tx, c.row, c.flags)?;
            clear_reachable_forward(tx, c.row)?;
        }
    }
    Ok(())
}
