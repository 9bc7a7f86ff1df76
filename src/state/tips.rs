//! Tip and TipReachable derived tables (spec §3, §4.3). These views are
//! kept coherent with the `State` table on every mutation inside the same
//! transaction — they are never reconstructed across transactions.

use crate::codec::Encode;
use crate::error::DbResult;
use crate::keys::{table_lower_bound, table_upper_bound, tip_key, tip_reachable_key, Table};
use crate::state::tree::get_state;
use crate::store::transaction::Transaction;
use crate::types::{chainwork_be_bytes, ChainWork, Height, RowId};

pub fn tip_add(tx: &mut Transaction, height: Height, row: RowId) -> DbResult<()> {
    tx.put(tip_key(height, row), Vec::new());
    Ok(())
}

pub fn tip_del(tx: &mut Transaction, height: Height, row: RowId) -> DbResult<()> {
    tx.remove(tip_key(height, row));
    Ok(())
}

pub fn tip_reachable_add(tx: &mut Transaction, chainwork: ChainWork, row: RowId) -> DbResult<()> {
    tx.put(tip_reachable_key(&chainwork_be_bytes(chainwork), row), Vec::new());
    Ok(())
}

pub fn tip_reachable_del(tx: &mut Transaction, chainwork: ChainWork, row: RowId) -> DbResult<()> {
    tx.remove(tip_reachable_key(&chainwork_be_bytes(chainwork), row));
    Ok(())
}

/// All tips, height ascending (spec §4.3 `EnumTips`).
pub fn enum_tips(tx: &Transaction) -> DbResult<Vec<RowId>> {
    let lower = table_lower_bound(Table::Tip);
    let upper = table_upper_bound(Table::Tip);
    let mut out = Vec::new();
    for (k, _) in tx.scan_range(&lower, &upper)? {
        // key = [tag][height: 8][row: 8], already height-ascending.
        let row = u64::from_be_bytes(k[1 + 8..1 + 16].try_into().unwrap());
        out.push(row);
    }
    Ok(out)
}

/// Reachable tips ordered by chainwork descending (spec §4.3 `EnumFunctionalTips`).
pub fn enum_functional_tips(tx: &Transaction) -> DbResult<Vec<RowId>> {
    let lower = table_lower_bound(Table::TipReachable);
    let upper = table_upper_bound(Table::TipReachable);
    let mut rows: Vec<RowId> = tx
        .scan_range(&lower, &upper)?
        .into_iter()
        .map(|(k, _)| u64::from_be_bytes(k[1 + 16..1 + 24].try_into().unwrap()))
        .collect();
    rows.reverse(); // scan_range is ascending by chainwork; we want descending
    Ok(rows)
}

/// Lowest-chainwork reachable tip whose chainwork strictly exceeds `w`
/// (spec §4.3 `FindStateWorkGreater`), used to decide whether to reorg.
pub fn find_state_work_greater(tx: &Transaction, w: ChainWork) -> DbResult<Option<RowId>> {
    let lower = tip_reachable_key(&chainwork_be_bytes(w.saturating_add(1)), 0);
    let upper = table_upper_bound(Table::TipReachable);
    let mut best: Option<RowId> = None;
    for (k, _) in tx.scan_range(&lower, &upper)? {
        let row = u64::from_be_bytes(k[1 + 16..1 + 24].try_into().unwrap());
        best = Some(row);
        break; // ascending order: first hit is the lowest qualifying chainwork
    }
    Ok(best)
}

pub fn is_tip(tx: &Transaction, height: Height, row: RowId) -> DbResult<bool> {
    tx.contains_key(&tip_key(height, row))
}

pub fn is_tip_reachable(tx: &Transaction, chainwork: ChainWork, row: RowId) -> DbResult<bool> {
    tx.contains_key(&tip_reachable_key(&chainwork_be_bytes(chainwork), row))
}
