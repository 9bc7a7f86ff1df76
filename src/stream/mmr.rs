//! `StreamMmr`: a Flat Merkle Mountain Range over a stream of hashes
//! (spec §4.5, §9 design note #2).
//!
//! Nodes (leaves and interior parents alike) are written into a single flat,
//! append-only position space in postorder: each "peak" — the root of a
//! complete binary subtree covering a power-of-two run of leaves — occupies
//! a contiguous block of positions with its own hash as the block's last
//! entry. This is the classic Peter Todd / Grin flat-MMR layout. Appending
//! a leaf writes it at the next free position, then folds it into any
//! trailing peaks of equal height (a binary-counter increment), writing one
//! new parent hash per fold. Because earlier peaks' positions never move,
//! shrinking to `n` leaves is just "forget everything past the structural
//! size for `n`" — no rehashing, and re-appending the same leaves after a
//! shrink reproduces the exact same positions and root (spec §8 S5).
//!
//! The two MMR flavors share this traversal engine and differ only in how
//! leaves are fetched/stored: [`LeafProvider`] is the seam (spec §9 design
//! note #2 — "model as an engine parameterized by a leaf provider
//! capability").

use crate::error::DbResult;
use crate::stream::{stream_len, stream_read, stream_resize, stream_write};
use crate::store::transaction::Transaction;
use crate::types::Hash;

pub const HASH_LEN: u64 = 32;

/// Pluggable leaf access. The default (used directly by `StreamMmr`) simply
/// stores leaves inline in the flat array like any other node. `StatesMmr`
/// overrides `load_leaf` to read the state tree instead, since that's
/// always present and cheaper than a second copy in the stream.
pub trait LeafProvider {
    /// Returns the leaf's hash if this provider has an authoritative copy
    /// (e.g. the state tree); `None` falls back to the flat array itself.
    fn load_leaf(&self, _tx: &Transaction, _leaf_index: u64) -> DbResult<Option<Hash>> {
        Ok(None)
    }
}

/// The default leaf provider: no override, every leaf lives in the stream.
pub struct InlineLeaves;
impl LeafProvider for InlineLeaves {}

/// Structural shape of a Flat MMR holding `leaf_count` leaves: total node
/// count, and the peaks left-to-right as `(height, flat_position)`. Pure
/// function of `leaf_count` — no I/O, no hashing.
pub fn mmr_structure(leaf_count: u64) -> (u64, Vec<(u32, u64)>) {
    let mut peaks = Vec::new();
    let mut acc = 0u64;
    for h in (0..64u32).rev() {
        if (leaf_count >> h) & 1 == 1 {
            let subtree_size = (1u64 << (h + 1)) - 1;
            acc += subtree_size;
            peaks.push((h, acc - 1));
        }
    }
    (acc, peaks)
}

/// 64-entry direct-mapped write-back cache over recently touched positions
/// (spec §4.5: "accelerates sequential append/root patterns"). Purely a
/// performance aid — every lookup falls back to the stream on a miss.
struct PositionCache {
    slots: [Option<(u64, Hash)>; 64],
}

impl PositionCache {
    fn new() -> Self {
        PositionCache { slots: [None; 64] }
    }

    fn get(&self, pos: u64) -> Option<Hash> {
        match self.slots[(pos % 64) as usize] {
            Some((p, h)) if p == pos => Some(h),
            _ => None,
        }
    }

    fn put(&mut self, pos: u64, hash: Hash) {
        self.slots[(pos % 64) as usize] = Some((pos, hash));
    }
}

/// Combines two child hashes into a parent hash. Real deployments inject a
/// cryptographic hasher (blake2/sha256/etc., out of scope per spec §1
/// Non-goals); this default is a cheap, deterministic, non-cryptographic
/// mix good enough to exercise the MMR's structural invariants in tests.
pub trait MmrHasher {
    fn combine(&self, left: &Hash, right: &Hash) -> Hash;
}

/// The crate's built-in placeholder combiner (see [`MmrHasher`]).
pub struct XorFoldHasher;
impl MmrHasher for XorFoldHasher {
    fn combine(&self, left: &Hash, right: &Hash) -> Hash {
        let mut out = [0u8; 32];
        for i in 0..32 {
            out[i] = left.0[i].wrapping_add(right.0[i]).rotate_left(1) ^ left.0[31 - i];
        }
        Hash(out)
    }
}

pub struct StreamMmr<'p, P: LeafProvider = InlineLeaves, H: MmrHasher = XorFoldHasher> {
    pub stream_type: u8,
    pub leaves: &'p P,
    pub hasher: H,
    /// Whether row-0 (leaf) hashes are stored in the stream at all, or
    /// recomputed on demand via the leaf provider (spec §4.5 `bStoreH0`).
    pub store_h0: bool,
    cache: std::cell::RefCell<PositionCache>,
}

impl<'p, P: LeafProvider> StreamMmr<'p, P, XorFoldHasher> {
    pub fn new(stream_type: u8, leaves: &'p P) -> Self {
        StreamMmr { stream_type, leaves, hasher: XorFoldHasher, store_h0: true, cache: std::cell::RefCell::new(PositionCache::new()) }
    }
}

impl<'p, P: LeafProvider, H: MmrHasher> StreamMmr<'p, P, H> {
    fn leaf_count_key(&self) -> Vec<u8> {
        crate::keys::counter_key(&format!("mmr_leaves_{}", self.stream_type))
    }

    pub fn leaf_count(&self, tx: &Transaction) -> DbResult<u64> {
        Ok(match tx.get(&self.leaf_count_key())? {
            Some(b) => u64::from_be_bytes(b.try_into().unwrap()),
            None => 0,
        })
    }

    fn set_leaf_count(&self, tx: &mut Transaction, n: u64) {
        tx.put(self.leaf_count_key(), n.to_be_bytes().to_vec());
    }

    fn read_node(&self, tx: &Transaction, pos: u64) -> DbResult<Hash> {
        if let Some(h) = self.cache.borrow().get(pos) {
            return Ok(h);
        }
        let mut buf = [0u8; 32];
        stream_read(tx, self.stream_type, pos * HASH_LEN, &mut buf)?;
        let hash = Hash(buf);
        self.cache.borrow_mut().put(pos, hash);
        Ok(hash)
    }

    fn write_node(&self, tx: &mut Transaction, pos: u64, hash: &Hash) -> DbResult<()> {
        stream_write(tx, self.stream_type, pos * HASH_LEN, &hash.0)?;
        self.cache.borrow_mut().put(pos, *hash);
        Ok(())
    }

    /// Reads the element at a leaf position, honoring the leaf provider and
    /// `store_h0` (spec §4.5: `StatesMmr::LoadElement` reads the state tree
    /// directly at leaf positions instead of the stream).
    fn load_leaf_hash(&self, tx: &Transaction, leaf_index: u64, fallback_pos: u64) -> DbResult<Hash> {
        if let Some(h) = self.leaves.load_leaf(tx, leaf_index)? {
            return Ok(h);
        }
        if !self.store_h0 {
            return Err(crate::error::DbError::inconsistent(
                "leaf not stored (bStoreH0=false) and no leaf provider override supplied a value",
            ));
        }
        self.read_node(tx, fallback_pos)
    }

    /// Appends a leaf hash, folding it into any same-height trailing peaks.
    /// Writes are always forwarded to the stream (spec §4.5), even when a
    /// leaf provider also holds an authoritative copy.
    pub fn append(&self, tx: &mut Transaction, leaf_hash: Hash) -> DbResult<u64> {
        let leaf_count = self.leaf_count(tx)?;
        let (old_size, old_peaks) = mmr_structure(leaf_count);

        let mut pos = old_size;
        let mut cur = leaf_hash;
        let mut height = 0u32;
        if self.store_h0 {
            self.write_node(tx, pos, &cur)?;
        }

        let mut remaining: Vec<(u32, u64)> = old_peaks;
        loop {
            match remaining.last().copied() {
                Some((h, p)) if h == height => {
                    remaining.pop();
                    let left = self.read_node(tx, p)?;
                    let parent = self.hasher.combine(&left, &cur);
                    pos += 1;
                    self.write_node(tx, pos, &parent)?;
                    cur = parent;
                    height += 1;
                }
                _ => break,
            }
        }

        self.set_leaf_count(tx, leaf_count + 1);
        Ok(leaf_count + 1)
    }

    /// The bagged root of all current peaks (right-to-left fold). Returns
    /// the zero hash for an empty MMR.
    pub fn root(&self, tx: &Transaction) -> DbResult<Hash> {
        let leaf_count = self.leaf_count(tx)?;
        let (_, peaks) = mmr_structure(leaf_count);
        let mut iter = peaks.iter().rev();
        let Some(&(_, first_pos)) = iter.next() else {
            return Ok(Hash::zero());
        };
        let mut acc = self.read_node(tx, first_pos)?;
        for &(_, pos) in iter {
            let h = self.read_node(tx, pos)?;
            acc = self.hasher.combine(&h, &acc);
        }
        Ok(acc)
    }

    /// Shrinks (or grows back to a previously-reached size) the leaf count.
    /// No rehashing: positions below the new structural size are an exact,
    /// stable prefix of the old array (spec §8 S5).
    pub fn resize_to(&self, tx: &mut Transaction, new_leaf_count: u64) -> DbResult<()> {
        let (new_size, _) = mmr_structure(new_leaf_count);
        stream_resize(tx, self.stream_type, new_size * HASH_LEN)?;
        self.set_leaf_count(tx, new_leaf_count);
        self.cache.borrow_mut().slots = [None; 64];
        Ok(())
    }

    /// Total bytes the flat array currently occupies, for diagnostics.
    pub fn flat_len(&self, tx: &Transaction) -> DbResult<u64> {
        stream_len(tx, self.stream_type)
    }

    /// Returns the hash at a leaf's position, consulting the leaf provider
    /// first (spec §4.5 `LoadElement`).
    pub fn get_leaf(&self, tx: &Transaction, leaf_index: u64) -> DbResult<Option<Hash>> {
        let leaf_count = self.leaf_count(tx)?;
        if leaf_index >= leaf_count {
            return Ok(None);
        }
        let pos = leaf_flat_pos(leaf_index);
        Ok(Some(self.load_leaf_hash(tx, leaf_index, pos)?))
    }
}

/// Flat position of the `leaf_index`-th leaf (0-based), derived by summing
/// the sizes of all peaks strictly to its left at the moment it was the
/// newest leaf (i.e. within an MMR of `leaf_index + 1` leaves, it is always
/// the very last element appended before any folding — so its position is
/// simply `mmr_structure(leaf_index).0`, the flat size *before* it was
/// inserted).
pub fn leaf_flat_pos(leaf_index: u64) -> u64 {
    mmr_structure(leaf_index).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn leaf(n: u8) -> Hash {
        let mut b = [0u8; 32];
        b[0] = n;
        Hash(b)
    }

    #[test]
    fn structure_matches_hand_derivation_for_four_leaves() {
        // 4 leaves -> single height-2 peak, 7 total nodes, root at pos 6.
        let (size, peaks) = mmr_structure(4);
        assert_eq!(size, 7);
        assert_eq!(peaks, vec![(2, 6)]);

        // 3 leaves -> peaks at height1 (pos2) and height0 (pos3).
        let (size3, peaks3) = mmr_structure(3);
        assert_eq!(size3, 4);
        assert_eq!(peaks3, vec![(1, 2), (0, 3)]);
    }

    #[test]
    fn append_and_root_are_deterministic() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let leaves = InlineLeaves;
        let mmr = StreamMmr::new(9, &leaves);
        for i in 0..4u8 {
            mmr.append(&mut tx, leaf(i)).unwrap();
        }
        assert_eq!(mmr.leaf_count(&tx).unwrap(), 4);
        let root1 = mmr.root(&tx).unwrap();

        // Recomputing by hand via peak positions should match.
        let p01 = mmr.hasher.combine(&leaf(0), &leaf(1));
        let p23 = mmr.hasher.combine(&leaf(2), &leaf(3));
        let expected = mmr.hasher.combine(&p01, &p23);
        assert_eq!(root1, expected);
    }

    /// S5: append 7, shrink to 5, re-append 2 identical leaves, root matches.
    #[test]
    fn shrink_then_reappend_reproduces_root() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let leaves = InlineLeaves;
        let mmr = StreamMmr::new(3, &leaves);
        let all: Vec<Hash> = (0..7u8).map(leaf).collect();
        for h in &all {
            mmr.append(&mut tx, *h).unwrap();
        }
        let root7 = mmr.root(&tx).unwrap();

        mmr.resize_to(&mut tx, 5).unwrap();
        assert_eq!(mmr.leaf_count(&tx).unwrap(), 5);

        mmr.append(&mut tx, all[5]).unwrap();
        mmr.append(&mut tx, all[6]).unwrap();
        let root7b = mmr.root(&tx).unwrap();
        assert_eq!(root7, root7b);
    }

    #[test]
    fn resize_to_same_size_is_a_no_op() {
        let store = Store::open_temporary().unwrap();
        let mut tx = store.begin();
        let leaves = InlineLeaves;
        let mmr = StreamMmr::new(4, &leaves);
        for i in 0..5u8 {
            mmr.append(&mut tx, leaf(i)).unwrap();
        }
        let root_before = mmr.root(&tx).unwrap();
        mmr.resize_to(&mut tx, 5).unwrap();
        assert_eq!(mmr.root(&tx).unwrap(), root_before);
    }
}
