//! State tree store (spec §4.3) — the largest component: rows keyed by
//! `(height, hash)`, flag discipline, tip/reachable-tip maintenance, and the
//! cursor/reorg algorithm.

pub mod body;
pub mod cursor;
pub mod reachability;
pub mod tips;
pub mod tree;

use crate::codec::{read_u32_be, read_u64_be, Decode, Encode};
use crate::error::CodecError;
use crate::types::{ChainWork, Hash, Height, RowId, StateFlags, TxoId};

/// One row of the state tree (spec §3 `State`).
#[derive(Clone, Debug)]
pub struct StateRow {
    pub row: RowId,
    pub height: Height,
    pub hash: Hash,
    /// 0 if the parent is not (yet) present in the database.
    pub prev_row: RowId,
    pub prev_hash: Hash,
    /// Opaque proof-of-work header bytes (validation is out of scope).
    pub pow: Vec<u8>,
    pub flags: StateFlags,
    pub next_count: u32,
    pub next_functional_count: u32,
    pub chainwork: ChainWork,
    /// TXO id upper bound reached by this state (`set_StateTxosAndExtra`).
    pub txo_hi: TxoId,
    /// Packed, sorted `StateInput` array.
    pub inputs: Vec<u8>,
    pub extra: Vec<u8>,
}

impl Encode for StateRow {
    fn encode(&self, out: &mut Vec<u8>) {
        self.height.encode(out);
        self.hash.encode(out);
        self.prev_row.encode(out);
        self.prev_hash.encode(out);
        (self.pow.len() as u32).encode(out);
        out.extend_from_slice(&self.pow);
        self.flags.encode(out);
        self.next_count.encode(out);
        self.next_functional_count.encode(out);
        (self.chainwork as u128).to_be_bytes().iter().for_each(|b| out.push(*b));
        self.txo_hi.encode(out);
        (self.inputs.len() as u32).encode(out);
        out.extend_from_slice(&self.inputs);
        (self.extra.len() as u32).encode(out);
        out.extend_from_slice(&self.extra);
    }
}

impl Decode for StateRow {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut b = buf;
        let height = take_u64(&mut b)?;
        let hash = take_hash(&mut b)?;
        let prev_row = take_u64(&mut b)?;
        let prev_hash = take_hash(&mut b)?;
        let pow_len = take_u32(&mut b)? as usize;
        let pow = take_vec(&mut b, pow_len)?;
        let flags = StateFlags::from_bits_truncate(take_u32(&mut b)?);
        let next_count = take_u32(&mut b)?;
        let next_functional_count = take_u32(&mut b)?;
        let chainwork = take_u128(&mut b)?;
        let txo_hi = take_u64(&mut b)?;
        let inputs_len = take_u32(&mut b)? as usize;
        let inputs = take_vec(&mut b, inputs_len)?;
        let extra_len = take_u32(&mut b)? as usize;
        let extra = take_vec(&mut b, extra_len)?;
        Ok(StateRow {
            row: 0,
            height,
            hash,
            prev_row,
            prev_hash,
            pow,
            flags,
            next_count,
            next_functional_count,
            chainwork,
            txo_hi,
            inputs,
            extra,
        })
    }
}

fn take_u64(b: &mut &[u8]) -> Result<u64, CodecError> {
    let v = read_u64_be(b)?;
    *b = &b[8..];
    Ok(v)
}

fn take_u32(b: &mut &[u8]) -> Result<u32, CodecError> {
    let v = read_u32_be(b)?;
    *b = &b[4..];
    Ok(v)
}

fn take_u128(b: &mut &[u8]) -> Result<u128, CodecError> {
    let bytes = b.get(..16).ok_or(CodecError::TooShort { need: 16, have: b.len() })?;
    *b = &b[16..];
    Ok(u128::from_be_bytes(bytes.try_into().unwrap()))
}

fn take_hash(b: &mut &[u8]) -> Result<Hash, CodecError> {
    let bytes = b.get(..32).ok_or(CodecError::TooShort { need: 32, have: b.len() })?;
    let h = Hash::decode(bytes)?;
    *b = &b[32..];
    Ok(h)
}

fn take_vec(b: &mut &[u8], n: usize) -> Result<Vec<u8>, CodecError> {
    let bytes = b.get(..n).ok_or(CodecError::TooShort { need: n, have: b.len() })?;
    let v = bytes.to_vec();
    *b = &b[n..];
    Ok(v)
}
