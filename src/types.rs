//! Domain types and the fixed binary layouts that cross the storage
//! boundary (spec §6): `StateInput`, `HeightPosPacked`, `CacheState`.

use std::fmt;

use bitflags::bitflags;

use crate::codec::{read_u32_be, read_u64_be, Decode, Encode};
use crate::error::CodecError;

pub type Height = u64;
pub type TxoId = u64;
pub type RowId = u64;
pub type AssetId = u64;
pub type PeerId = [u8; 33];
pub type BbsChannel = u32;
pub type Timestamp = u64;

/// Cumulative chain work. The original tracks this as an arbitrary-precision
/// big integer (`Difficulty::Raw`); a `u128` is more than enough range for
/// any PoW chain's accumulated work and keeps comparisons a plain integer
/// compare instead of a byte-array one.
pub type ChainWork = u128;

pub(crate) fn chainwork_be_bytes(w: ChainWork) -> [u8; 16] {
    w.to_be_bytes()
}

/// 32-byte content hash: block hashes, kernel hashes, BBS message keys, cids.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub const fn zero() -> Self {
        Hash([0u8; 32])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", hex::encode(self.0))
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash {
    fn from(b: [u8; 32]) -> Self {
        Hash(b)
    }
}

impl Encode for Hash {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.0);
    }
}

impl Decode for Hash {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; 32] = buf.try_into().map_err(|_| CodecError::TooShort { need: 32, have: buf.len() })?;
        Ok(Hash(arr))
    }
}

bitflags! {
    /// State flag bits (spec §4.3). Strictly nested: `Active ⊆ Reachable ⊆ Functional`.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct StateFlags: u32 {
        /// Body present.
        const FUNCTIONAL = 0x1;
        /// Path to genesis exists with all states functional.
        const REACHABLE  = 0x2;
        /// On the current main branch.
        const ACTIVE     = 0x4;
    }
}

impl StateFlags {
    /// Invariant check: `Active ⇒ Reachable ⇒ Functional`.
    pub fn is_coherent(self) -> bool {
        if self.contains(StateFlags::ACTIVE) && !self.contains(StateFlags::REACHABLE) {
            return false;
        }
        if self.contains(StateFlags::REACHABLE) && !self.contains(StateFlags::FUNCTIONAL) {
            return false;
        }
        true
    }
}

impl Encode for StateFlags {
    fn encode(&self, out: &mut Vec<u8>) {
        self.bits().encode(out);
    }
}

impl Decode for StateFlags {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let bits = u32::decode(buf)?;
        Ok(StateFlags::from_bits_truncate(bits))
    }
}

/// `{CommX: 32-byte big-int, Txo_AndY: u64}` packed input reference
/// (spec §6). The high bit of `txo_and_y` encodes the commitment's
/// `y`-parity; the remaining 63 bits are the TXO id.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StateInput {
    pub comm_x: [u8; 32],
    pub txo_and_y: u64,
}

impl StateInput {
    const Y_BIT: u64 = 1 << 63;

    pub fn new(txo: TxoId, comm_x: [u8; 32], y_parity: bool) -> Self {
        debug_assert!(txo < Self::Y_BIT, "txo id must fit in 63 bits");
        let mut txo_and_y = txo;
        if y_parity {
            txo_and_y |= Self::Y_BIT;
        }
        StateInput { comm_x, txo_and_y }
    }

    pub fn txo_id(&self) -> TxoId {
        self.txo_and_y & !Self::Y_BIT
    }

    pub fn y_parity(&self) -> bool {
        self.txo_and_y & Self::Y_BIT != 0
    }
}

impl PartialOrd for StateInput {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StateInput {
    /// Compares first by `comm_x`, then by the rest (spec §6 `IsLess`).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.comm_x.cmp(&other.comm_x).then(self.txo_and_y.cmp(&other.txo_and_y))
    }
}

impl Encode for StateInput {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.comm_x);
        self.txo_and_y.encode(out);
    }
}

impl Decode for StateInput {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != 40 {
            return Err(CodecError::TooShort { need: 40, have: buf.len() });
        }
        let comm_x: [u8; 32] = buf[..32].try_into().unwrap();
        let txo_and_y = read_u64_be(&buf[32..40])?;
        Ok(StateInput { comm_x, txo_and_y })
    }
}

/// Big-endian `{Height: 8 bytes, Idx: 4 bytes}` sortable composite key
/// (spec §6), used for contract logs and kernel-info.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct HeightPos {
    pub height: Height,
    pub idx: u32,
}

impl HeightPos {
    pub const MIN: HeightPos = HeightPos { height: 0, idx: 0 };
    pub const MAX: HeightPos = HeightPos { height: u64::MAX, idx: u32::MAX };
}

impl Encode for HeightPos {
    fn encode(&self, out: &mut Vec<u8>) {
        self.height.encode(out);
        self.idx.encode(out);
    }
}

impl Decode for HeightPos {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != 12 {
            return Err(CodecError::TooShort { need: 12, have: buf.len() });
        }
        let height = read_u64_be(&buf[..8])?;
        let idx = read_u32_be(&buf[8..12])?;
        Ok(HeightPos { height, idx })
    }
}

/// Packed `{HitCounter, SizeMax, SizeCurrent}` cache aggregate (spec §4.8,
/// §6), persisted under a single parameter row so recovery is trivial.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CacheState {
    pub hit_counter: u64,
    pub size_max: u64,
    pub size_current: u64,
}

impl Encode for CacheState {
    fn encode(&self, out: &mut Vec<u8>) {
        self.hit_counter.encode(out);
        self.size_max.encode(out);
        self.size_current.encode(out);
    }
}

impl Decode for CacheState {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != 24 {
            return Err(CodecError::TooShort { need: 24, have: buf.len() });
        }
        Ok(CacheState {
            hit_counter: read_u64_be(&buf[0..8])?,
            size_max: read_u64_be(&buf[8..16])?,
            size_current: read_u64_be(&buf[16..24])?,
        })
    }
}

/// Peer reputation row (spec §3 `Peer`).
#[derive(Clone, Debug)]
pub struct PeerData {
    pub id: PeerId,
    pub rating: u32,
    pub address: u64,
    pub last_seen: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_input_round_trips_txo_and_parity() {
        let si = StateInput::new(12345, [7u8; 32], true);
        assert_eq!(si.txo_id(), 12345);
        assert!(si.y_parity());
        let bytes = si.to_bytes();
        let back = StateInput::decode(&bytes).unwrap();
        assert_eq!(si, back);
    }

    #[test]
    fn state_input_orders_by_comm_x_first() {
        let a = StateInput::new(5, [1u8; 32], false);
        let b = StateInput::new(1, [2u8; 32], false);
        assert!(a < b);
    }

    #[test]
    fn height_pos_round_trips_and_orders() {
        let a = HeightPos { height: 10, idx: 3 };
        let b = HeightPos { height: 10, idx: 4 };
        assert!(a < b);
        let bytes = a.to_bytes();
        assert_eq!(HeightPos::decode(&bytes).unwrap(), a);
    }

    #[test]
    fn state_flags_enforce_nesting() {
        assert!(StateFlags::empty().is_coherent());
        assert!(StateFlags::FUNCTIONAL.is_coherent());
        assert!((StateFlags::FUNCTIONAL | StateFlags::REACHABLE).is_coherent());
        assert!(!(StateFlags::ACTIVE).is_coherent());
        assert!(!(StateFlags::REACHABLE).is_coherent());
    }
}
