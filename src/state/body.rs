//! Block-body store (spec §4.4): perishable body, eternal body, rollback
//! blob, and the peer that delivered the state, stored against the state
//! row. Three cascading deletes map to fossilization levels.

use crate::codec::{Decode, Encode};
use crate::error::{CodecError, DbResult};
use crate::keys::state_body_key;
use crate::store::transaction::Transaction;
use crate::types::{PeerId, RowId};

#[derive(Clone, Debug, Default)]
pub struct StateBlock {
    pub perishable: Option<Vec<u8>>,
    pub eternal: Option<Vec<u8>>,
    pub rollback: Option<Vec<u8>>,
    pub peer: Option<PeerId>,
}

fn encode_opt_blob(out: &mut Vec<u8>, v: &Option<Vec<u8>>) {
    match v {
        Some(b) => {
            (b.len() as u32).encode(out);
            out.extend_from_slice(b);
        }
        None => u32::MAX.encode(out),
    }
}

fn decode_opt_blob(buf: &mut &[u8]) -> Result<Option<Vec<u8>>, CodecError> {
    let len = crate::codec::read_u32_be(buf)?;
    *buf = &buf[4..];
    if len == u32::MAX {
        return Ok(None);
    }
    let len = len as usize;
    let bytes = buf.get(..len).ok_or(CodecError::TooShort { need: len, have: buf.len() })?;
    *buf = &buf[len..];
    Ok(Some(bytes.to_vec()))
}

impl Encode for StateBlock {
    fn encode(&self, out: &mut Vec<u8>) {
        encode_opt_blob(out, &self.perishable);
        encode_opt_blob(out, &self.eternal);
        encode_opt_blob(out, &self.rollback);
        match &self.peer {
            Some(p) => {
                out.push(1);
                out.extend_from_slice(p);
            }
            None => out.push(0),
        }
    }
}

impl Decode for StateBlock {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut b = buf;
        let perishable = decode_opt_blob(&mut b)?;
        let eternal = decode_opt_blob(&mut b)?;
        let rollback = decode_opt_blob(&mut b)?;
        let has_peer = *b.first().ok_or(CodecError::TooShort { need: 1, have: 0 })?;
        b = &b[1..];
        let peer = if has_peer == 1 {
            let p: PeerId = b.get(..33).ok_or(CodecError::TooShort { need: 33, have: b.len() })?.try_into().unwrap();
            Some(p)
        } else {
            None
        };
        Ok(StateBlock { perishable, eternal, rollback, peer })
    }
}

/// Stores the three body blobs and the delivering peer against `row`
/// (spec §4.4 `SetStateBlock`).
pub fn set_state_block(tx: &mut Transaction, row: RowId, perishable: Option<Vec<u8>>, eternal: Option<Vec<u8>>, peer: Option<PeerId>) -> DbResult<()> {
    let mut block = get_state_block(tx, row)?.unwrap_or_default();
    block.perishable = perishable;
    block.eternal = eternal;
    block.peer = peer;
    tx.put(state_body_key(row), block.to_bytes());
    Ok(())
}

/// Stores the rollback blob against `row`, independent of
/// [`set_state_block`] (the original `NodeDB::SetStateBlock` signature
/// takes only perishable/eternal/peer; the rollback buffer is written
/// separately once it is computed while applying the block).
pub fn set_state_rollback(tx: &mut Transaction, row: RowId, rollback: Option<Vec<u8>>) -> DbResult<()> {
    let mut block = get_state_block(tx, row)?.unwrap_or_default();
    block.rollback = rollback;
    tx.put(state_body_key(row), block.to_bytes());
    Ok(())
}

pub fn get_state_block(tx: &Transaction, row: RowId) -> DbResult<Option<StateBlock>> {
    let Some(raw) = tx.get(&state_body_key(row))? else {
        return Ok(None);
    };
    Ok(Some(StateBlock::decode(&raw)?))
}

/// Fossilization level 1: drop perishable body and peer, keep eternal +
/// rollback (`DelStateBlockPP`).
pub fn del_state_block_pp(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let Some(mut block) = get_state_block(tx, row)? else { return Ok(()) };
    block.perishable = None;
    block.peer = None;
    if block.eternal.is_none() && block.rollback.is_none() {
        tx.remove(state_body_key(row));
    } else {
        tx.put(state_body_key(row), block.to_bytes());
    }
    Ok(())
}

/// Fossilization level 2: additionally drop rollback (`DelStateBlockPPR`).
pub fn del_state_block_ppr(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    let Some(mut block) = get_state_block(tx, row)? else { return Ok(()) };
    block.perishable = None;
    block.peer = None;
    block.rollback = None;
    if block.eternal.is_none() {
        tx.remove(state_body_key(row));
    } else {
        tx.put(state_body_key(row), block.to_bytes());
    }
    Ok(())
}

/// Fossilization level 3: drop everything body-related (`DelStateBlockAll`).
pub fn del_state_block_all(tx: &mut Transaction, row: RowId) -> DbResult<()> {
    tx.remove(state_body_key(row));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::tree::insert_state;
    use crate::store::Store;
    use crate::types::Hash;

    #[test]
    fn round_trips_body_blobs() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let g = insert_state(&mut tx, 0, Hash([1u8; 32]), Hash::zero(), vec![], 1).unwrap();
        set_state_block(&mut tx, g, Some(b"perish".to_vec()), Some(b"eternal".to_vec()), Some([7u8; 33])).unwrap();
        let block = get_state_block(&tx, g).unwrap().unwrap();
        assert_eq!(block.perishable.as_deref(), Some(&b"perish"[..]));
        assert_eq!(block.eternal.as_deref(), Some(&b"eternal"[..]));
        assert_eq!(block.peer, Some([7u8; 33]));
    }

    #[test]
    fn cascading_deletes_drop_progressively() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let g = insert_state(&mut tx, 0, Hash([1u8; 32]), Hash::zero(), vec![], 1).unwrap();
        set_state_block(&mut tx, g, Some(b"p".to_vec()), Some(b"e".to_vec()), Some([1u8; 33])).unwrap();

        del_state_block_pp(&mut tx, g).unwrap();
        let block = get_state_block(&tx, g).unwrap().unwrap();
        assert!(block.perishable.is_none());
        assert!(block.peer.is_none());
        assert_eq!(block.eternal.as_deref(), Some(&b"e"[..]));

        del_state_block_all(&mut tx, g).unwrap();
        assert!(get_state_block(&tx, g).unwrap().is_none());
    }

    #[test]
    fn del_pp_keeps_rollback_del_ppr_drops_it() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let g = insert_state(&mut tx, 0, Hash([1u8; 32]), Hash::zero(), vec![], 1).unwrap();
        set_state_block(&mut tx, g, Some(b"p".to_vec()), Some(b"e".to_vec()), Some([1u8; 33])).unwrap();
        set_state_rollback(&mut tx, g, Some(b"rb".to_vec())).unwrap();

        del_state_block_pp(&mut tx, g).unwrap();
        let block = get_state_block(&tx, g).unwrap().unwrap();
        assert_eq!(block.rollback.as_deref(), Some(&b"rb"[..]));
        assert_eq!(block.eternal.as_deref(), Some(&b"e"[..]));

        del_state_block_ppr(&mut tx, g).unwrap();
        let block = get_state_block(&tx, g).unwrap().unwrap();
        assert!(block.rollback.is_none());
        assert_eq!(block.eternal.as_deref(), Some(&b"e"[..]));
    }
}
