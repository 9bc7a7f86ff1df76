//! Asset registry (spec §4.9): fungible-asset ids allocated densely from 1
//! by a lowest-free-slot allocator. `AssetsCount` tracks the maximum
//! ever-used id; `AssetsCountUsed` tracks the live cardinality. Both are
//! kept in sync as parameters rather than recomputed by scanning, since a
//! fresh-slot search already has to look at neighboring rows.

use crate::codec::{Decode, Encode};
use crate::error::{DbError, DbResult};
use crate::keys::{asset_key, table_lower_bound, table_upper_bound, Table};
use crate::store::param::{param_int_get_def, param_int_set, ParamId};
use crate::store::transaction::Transaction;
use crate::types::{AssetId, Height, PeerId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetRow {
    pub owner: PeerId,
    pub value: u64,
    pub lock_height: Height,
    pub metadata: Vec<u8>,
    pub used: bool,
}

impl Encode for AssetRow {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.used as u8);
        out.extend_from_slice(&self.owner);
        self.value.encode(out);
        self.lock_height.encode(out);
        out.extend_from_slice(&self.metadata);
    }
}

impl Decode for AssetRow {
    fn decode(buf: &[u8]) -> Result<Self, crate::error::CodecError> {
        let used = buf[0] != 0;
        let owner: PeerId = buf[1..34].try_into().unwrap();
        let value = crate::codec::read_u64_be(&buf[34..42])?;
        let lock_height = crate::codec::read_u64_be(&buf[42..50])?;
        let metadata = buf[50..].to_vec();
        Ok(AssetRow { owner, value, lock_height, metadata, used })
    }
}

pub fn assets_count(tx: &Transaction) -> DbResult<AssetId> {
    param_int_get_def(tx, ParamId::AssetsCount, 0)
}

pub fn assets_count_used(tx: &Transaction) -> DbResult<u64> {
    param_int_get_def(tx, ParamId::AssetsCountUsed, 0)
}

pub fn asset_get(tx: &Transaction, id: AssetId) -> DbResult<Option<AssetRow>> {
    let Some(raw) = tx.get(&asset_key(id))? else { return Ok(None) };
    Ok(Some(AssetRow::decode(&raw)?))
}

fn lowest_free_id(tx: &Transaction) -> DbResult<AssetId> {
    let count = assets_count(tx)?;
    for id in 1..=count {
        if asset_get(tx, id)?.map_or(true, |a| !a.used) {
            return Ok(id);
        }
    }
    Ok(count + 1)
}

/// Allocates or claims an asset id (spec §4.9 `AssetAdd`). `id == 0` picks
/// the lowest free slot; otherwise `id` must currently be free.
pub fn asset_add(tx: &mut Transaction, id: AssetId, owner: PeerId, value: u64, lock_height: Height, metadata: Vec<u8>) -> DbResult<AssetId> {
    let id = if id == 0 { lowest_free_id(tx)? } else {
        if asset_get(tx, id)?.is_some_and(|a| a.used) {
            return Err(DbError::inconsistent(format!("AssetAdd: id {id} is already in use")));
        }
        id
    };

    tx.put(asset_key(id), AssetRow { owner, value, lock_height, metadata, used: true }.to_bytes());

    let count = assets_count(tx)?;
    if id > count {
        param_int_set(tx, ParamId::AssetsCount, id)?;
    }
    param_int_set(tx, ParamId::AssetsCountUsed, assets_count_used(tx)? + 1)?;
    Ok(id)
}

/// Marks `id`'s slot unused (metadata zeroed, slot retained) and, if it was
/// the current maximum, shrinks `AssetsCount` to the new maximum used id —
/// which may cascade through a run of trailing unused slots (spec §4.9
/// `AssetDelete`, §8 S4).
pub fn asset_delete(tx: &mut Transaction, id: AssetId) -> DbResult<()> {
    let Some(mut row) = asset_get(tx, id)? else { return Ok(()) };
    if !row.used {
        return Ok(());
    }
    row.used = false;
    row.metadata.clear();
    row.value = 0;
    tx.put(asset_key(id), row.to_bytes());
    param_int_set(tx, ParamId::AssetsCountUsed, assets_count_used(tx)?.saturating_sub(1))?;

    let count = assets_count(tx)?;
    if id == count {
        let mut new_max = count;
        while new_max > 0 {
            match asset_get(tx, new_max)? {
                Some(a) if a.used => break,
                _ => new_max -= 1,
            }
        }
        param_int_set(tx, ParamId::AssetsCount, new_max)?;
    }
    Ok(())
}

/// All used assets, ascending by id.
pub fn enum_assets(tx: &Transaction) -> DbResult<Vec<(AssetId, AssetRow)>> {
    let lower = table_lower_bound(Table::Asset);
    let upper = table_upper_bound(Table::Asset);
    let mut out = Vec::new();
    for (k, v) in tx.scan_range(&lower, &upper)? {
        let id = crate::codec::read_u64_be(&k[1..])?;
        let row = AssetRow::decode(&v)?;
        if row.used {
            out.push((id, row));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn add(tx: &mut Transaction) -> AssetId {
        asset_add(tx, 0, [0u8; 33], 0, 0, vec![]).unwrap()
    }

    /// S4: asset slot reuse.
    #[test]
    fn slot_reuse_and_count_shrink() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();

        assert_eq!(add(&mut tx), 1);
        assert_eq!(add(&mut tx), 2);
        assert_eq!(add(&mut tx), 3);

        asset_delete(&mut tx, 2).unwrap();
        assert_eq!(add(&mut tx), 2);

        assert_eq!(assets_count(&tx).unwrap(), 3);
        assert_eq!(assets_count_used(&tx).unwrap(), 3);

        asset_delete(&mut tx, 3).unwrap();
        assert_eq!(assets_count(&tx).unwrap(), 2);
    }

    #[test]
    fn explicit_id_must_be_free() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        asset_add(&mut tx, 5, [0u8; 33], 0, 0, vec![]).unwrap();
        assert!(asset_add(&mut tx, 5, [0u8; 33], 0, 0, vec![]).is_err());
    }

    #[test]
    fn cascading_count_shrink_past_multiple_unused_slots() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        add(&mut tx); // 1
        add(&mut tx); // 2
        add(&mut tx); // 3
        asset_delete(&mut tx, 2).unwrap();
        asset_delete(&mut tx, 3).unwrap();
        assert_eq!(assets_count(&tx).unwrap(), 1);
    }
}
