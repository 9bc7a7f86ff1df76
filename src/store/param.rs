//! Parameter store (spec §4.2). A small key-value map of singleton node
//! parameters, keyed by a closed, numbered catalogue (SPEC_FULL B.1),
//! grounded directly on `NodeDB::ParamID::Enum`.

use crate::codec::{Decode, Encode};
use crate::error::DbResult;
use crate::keys::param_key;
use crate::store::transaction::Transaction;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u32)]
pub enum ParamId {
    DbVer = 0,
    CursorRow = 1,
    CursorHeight = 2,
    /// Height starting from which and below original blocks are erased.
    FossilHeight = 3,
    CfgChecksum = 4,
    MyId = 5,
    /// Hash of keys used to scan and record events.
    EventsOwnerId = 6,
    /// Height starting from which and below TXO info is totally erased.
    HeightTxoLo = 7,
    /// Height starting from which and below TXO info is compacted (commitment only).
    HeightTxoHi = 8,
    SyncData = 9,
    LastRecoveryHeight = 10,
    /// Including unused. The last element is guaranteed to be used.
    AssetsCount = 11,
    /// Number of "live" assets.
    AssetsCountUsed = 12,
    /// Pseudo-random, reset each time events are rescanned.
    EventsSerif = 13,
    /// Used for 2-stage migration; see `Flags1Bits`.
    Flags1 = 14,
    CacheState = 15,
    /// Formerly shielded-output count. Readable only, for migration (spec §9).
    Deprecated3 = 16,
}

/// Bits packed into the `Flags1` parameter's integer value.
pub mod flags1 {
    /// Set when a two-stage migration left work for a higher layer to finish
    /// (spec §4.11, §9).
    pub const PENDING_REBUILD_NON_STD: u64 = 1;
}

/// Upserts a row with either an integer or blob value. Passing `None` for a
/// column clears it. Exactly one of the two is normally populated (spec §4.2).
pub fn param_set(tx: &mut Transaction, id: ParamId, int_val: Option<u64>, blob_val: Option<&[u8]>) -> DbResult<()> {
    if id == ParamId::Deprecated3 {
        return Err(crate::error::DbError::inconsistent("ParamSet: Deprecated3 is readable-only, retained for migration"));
    }
    let mut payload = Vec::new();
    match (int_val, blob_val) {
        (Some(i), None) => {
            payload.push(1u8);
            i.encode(&mut payload);
        }
        (None, Some(b)) => {
            payload.push(2u8);
            payload.extend_from_slice(b);
        }
        (None, None) => {
            tx.remove(param_key(id as u32));
            return Ok(());
        }
        (Some(_), Some(_)) => {
            payload.push(3u8);
            // Not representable with the 1/2 tag scheme alone; store int then blob.
        }
    }
    if payload.first() == Some(&3) {
        let i = int_val.unwrap();
        let b = blob_val.unwrap();
        payload.clear();
        payload.push(3u8);
        i.encode(&mut payload);
        payload.extend_from_slice(b);
    }
    tx.put(param_key(id as u32), payload);
    Ok(())
}

/// Returns `(int_val, blob_val)`, both `None` if the parameter is absent.
pub fn param_get(tx: &Transaction, id: ParamId) -> DbResult<(Option<u64>, Option<Vec<u8>>)> {
    let Some(raw) = tx.get(&param_key(id as u32))? else {
        return Ok((None, None));
    };
    if raw.is_empty() {
        return Ok((None, None));
    }
    match raw[0] {
        1 => Ok((Some(u64::decode(&raw[1..])?), None)),
        2 => Ok((None, Some(raw[1..].to_vec()))),
        3 => {
            let i = u64::decode(&raw[1..9])?;
            Ok((Some(i), Some(raw[9..].to_vec())))
        }
        other => Err(crate::error::CodecError::InvalidTag(other).into()),
    }
}

pub fn param_int_get_def(tx: &Transaction, id: ParamId, default: u64) -> DbResult<u64> {
    Ok(param_get(tx, id)?.0.unwrap_or(default))
}

pub fn param_int_set(tx: &mut Transaction, id: ParamId, val: u64) -> DbResult<()> {
    param_set(tx, id, Some(val), None)
}

/// No-op if the parameter is absent (spec §4.2 `ParamDelSafe`). Guarded so
/// an absent parameter doesn't stage a spurious `Remove` and inflate
/// `Transaction::rows_changed` (SPEC_FULL B's `assert_one_row_changed`
/// relies on that count matching rows actually touched).
pub fn param_del_safe(tx: &mut Transaction, id: ParamId) -> DbResult<()> {
    let key = param_key(id as u32);
    if tx.contains_key(&key)? {
        tx.remove(key);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::config::Config;

    fn open_tmp() -> (tempdir::TempDir, Store) {
        let dir = tempdir::TempDir::new("ledgerdb-param").unwrap();
        let cfg = Config::new(dir.path());
        let store = Store::open(cfg).unwrap();
        (dir, store)
    }

    #[test]
    fn set_get_and_default() {
        let (_dir, store) = open_tmp();
        let mut tx = store.begin();
        assert_eq!(param_int_get_def(&tx, ParamId::FossilHeight, 42).unwrap(), 42);
        param_int_set(&mut tx, ParamId::FossilHeight, 7).unwrap();
        assert_eq!(param_int_get_def(&tx, ParamId::FossilHeight, 42).unwrap(), 7);
        tx.commit().unwrap();

        let tx2 = store.begin();
        assert_eq!(param_int_get_def(&tx2, ParamId::FossilHeight, 0).unwrap(), 7);
    }

    #[test]
    fn del_safe_is_noop_if_absent() {
        let (_dir, store) = open_tmp();
        let mut tx = store.begin();
        param_del_safe(&mut tx, ParamId::MyId).unwrap();
        tx.commit().unwrap();
    }

    #[test]
    fn del_safe_on_absent_param_does_not_count_as_a_row_change() {
        let (_dir, store) = open_tmp();
        let mut tx = store.begin();
        let before = tx.rows_changed();
        param_del_safe(&mut tx, ParamId::MyId).unwrap();
        assert_eq!(tx.rows_changed(), before);
    }

    #[test]
    fn deprecated3_is_readable_but_not_writable() {
        let (_dir, store) = open_tmp();
        let mut tx = store.begin();
        assert!(param_set(&mut tx, ParamId::Deprecated3, Some(1), None).is_err());
        // still readable (defaults to absent rather than erroring)
        assert_eq!(param_get(&tx, ParamId::Deprecated3).unwrap(), (None, None));
    }

    #[test]
    fn blob_and_int_are_independent_columns() {
        let (_dir, store) = open_tmp();
        let mut tx = store.begin();
        param_set(&mut tx, ParamId::SyncData, None, Some(b"hello")).unwrap();
        let (i, b) = param_get(&tx, ParamId::SyncData).unwrap();
        assert_eq!(i, None);
        assert_eq!(b.as_deref(), Some(&b"hello"[..]));
    }
}
