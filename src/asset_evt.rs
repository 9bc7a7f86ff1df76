//! Asset event log (spec §4.9): appended per asset, enumerated backward by
//! `(asset-id, height)`.

use crate::error::DbResult;
use crate::keys::{asset_evt_key, asset_evt_prefix, table_upper_bound, Table};
use crate::store::transaction::Transaction;
use crate::types::{AssetId, Height};

pub fn asset_evt_insert(tx: &mut Transaction, asset_id: AssetId, height: Height, idx: u64, body: Vec<u8>) -> DbResult<()> {
    tx.put(asset_evt_key(asset_id, height, idx), body);
    Ok(())
}

/// Backward enumeration (most recent `(height, idx)` first) for `asset_id`.
pub fn asset_evt_enum(tx: &Transaction, asset_id: AssetId) -> DbResult<Vec<Vec<u8>>> {
    let lower = asset_evt_prefix(asset_id);
    let mut upper = asset_evt_prefix(asset_id + 1);
    if asset_id == u64::MAX {
        upper = table_upper_bound(Table::AssetEvt);
    }
    Ok(tx.scan_range(&lower, &upper)?.into_iter().map(|(_, v)| v).collect())
}

/// Truncates every asset's event log from `h` onward (spec §4.9
/// `AssetEvtsDeleteFrom`).
pub fn asset_evts_delete_from(tx: &mut Transaction, h: Height) -> DbResult<()> {
    let lower = crate::keys::table_lower_bound(Table::AssetEvt);
    let upper = table_upper_bound(Table::AssetEvt);
    let mut victims = Vec::new();
    for (k, _) in tx.scan_range(&lower, &upper)? {
        // key tail = [!height: 8][!idx: 8]
        let tail = &k[k.len() - 16..];
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

    #[test]
    fn enumerates_most_recent_first() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        asset_evt_insert(&mut tx, 1, 10, 0, b"a".to_vec()).unwrap();
        asset_evt_insert(&mut tx, 1, 20, 0, b"b".to_vec()).unwrap();
        asset_evt_insert(&mut tx, 2, 5, 0, b"c".to_vec()).unwrap();

        assert_eq!(asset_evt_enum(&tx, 1).unwrap(), vec![b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn delete_from_truncates_all_assets() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        asset_evt_insert(&mut tx, 1, 10, 0, b"a".to_vec()).unwrap();
        asset_evt_insert(&mut tx, 1, 20, 0, b"b".to_vec()).unwrap();
        asset_evts_delete_from(&mut tx, 15).unwrap();
        assert_eq!(asset_evt_enum(&tx, 1).unwrap(), vec![b"a".to_vec()]);
    }
}
