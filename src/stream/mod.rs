//! Stream engine (spec §4.5): a flat logical byte array per `(stream-type,
//! offset)`, physically chunked into fixed-size blobs so a small read/write
//! never pulls a whole stream through memory — the `sled` analogue of
//! "incremental BLOB I/O" (spec §9 design notes, §4.1).
//!
//! On top of this, [`mmr`] implements the Flat Merkle Mountain Range
//! (`StreamMmr`), and [`states_mmr`] specializes it so leaves are read
//! straight out of the state tree (`StatesMmr`).

pub mod mmr;
pub mod states_mmr;

use crate::error::DbResult;
use crate::keys::{self, next_prefix, stream_chunk_key, stream_prefix, table_upper_bound, Table};
use crate::store::transaction::Transaction;

/// Size of one physical chunk (spec §4.5 `s_StreamBlob`). Chosen as a
/// reasonable incremental-I/O granularity; not part of the on-disk format's
/// semantics (only affects how many chunk blobs a given length is split
/// across).
pub const CHUNK_SIZE: usize = 4096;

/// The stream kinds this crate wires up (spec §4.5, SPEC_FULL B.5). Shielded
/// pool streams from the original are out of scope; `Custom` lets an
/// embedder run its own MMR (e.g. an asset-commitment tree) over the same
/// mechanism without this crate knowing its shape.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StreamType {
    StatesMmr,
    /// An embedder-defined MMR sharing this mechanism; `u8` is the caller's
    /// own sub-tag, offset away from the built-in kinds below.
    Custom(u8),
}

impl StreamType {
    const CUSTOM_BASE: u8 = 16;

    pub fn tag(self) -> u8 {
        match self {
            StreamType::StatesMmr => 0,
            StreamType::Custom(n) => Self::CUSTOM_BASE.saturating_add(n),
        }
    }
}

fn len_counter_key(stream_type: u8) -> Vec<u8> {
    keys::counter_key(&format!("stream_len_{stream_type}"))
}

/// Logical length in bytes of a stream (0 if never written).
pub fn stream_len(tx: &Transaction, stream_type: u8) -> DbResult<u64> {
    Ok(match tx.get(&len_counter_key(stream_type))? {
        Some(b) => u64::from_be_bytes(b.try_into().unwrap()),
        None => 0,
    })
}

fn set_stream_len(tx: &mut Transaction, stream_type: u8, len: u64) {
    tx.put(len_counter_key(stream_type), len.to_be_bytes().to_vec());
}

fn chunk_of(offset: u64) -> (u64, usize) {
    (offset / CHUNK_SIZE as u64, (offset % CHUNK_SIZE as u64) as usize)
}

/// Reads `buf.len()` bytes starting at `offset`. The whole range must lie
/// within `[0, stream_len)` (spec §8 invariant 8).
pub fn stream_read(tx: &Transaction, stream_type: u8, offset: u64, buf: &mut [u8]) -> DbResult<()> {
    let mut remaining = buf.len();
    let mut off = offset;
    let mut out_pos = 0usize;
    while remaining > 0 {
        let (chunk_idx, in_chunk) = chunk_of(off);
        let chunk = tx.get(&stream_chunk_key(stream_type, chunk_idx))?.unwrap_or_default();
        let avail = chunk.len().saturating_sub(in_chunk);
        let n = remaining.min(avail);
        if n == 0 {
            // Reading past a short last chunk within bounds shouldn't happen
            // if the caller respects stream_len, but zero-fill defensively
            // rather than panic on a slice that's one chunk short.
            buf[out_pos..out_pos + remaining].fill(0);
            break;
        }
        buf[out_pos..out_pos + n].copy_from_slice(&chunk[in_chunk..in_chunk + n]);
        out_pos += n;
        off += n as u64;
        remaining -= n;
    }
    Ok(())
}

/// Writes `data` starting at `offset`, extending the stream's logical
/// length if the write runs past the current end.
pub fn stream_write(tx: &mut Transaction, stream_type: u8, offset: u64, data: &[u8]) -> DbResult<()> {
    let mut remaining = data.len();
    let mut off = offset;
    let mut in_pos = 0usize;
    while remaining > 0 {
        let (chunk_idx, in_chunk) = chunk_of(off);
        let key = stream_chunk_key(stream_type, chunk_idx);
        let mut chunk = tx.get(&key)?.unwrap_or_default();
        let needed = in_chunk + remaining.min(CHUNK_SIZE - in_chunk);
        if chunk.len() < needed {
            chunk.resize(needed, 0);
        }
        let n = (needed - in_chunk).min(remaining);
        chunk[in_chunk..in_chunk + n].copy_from_slice(&data[in_pos..in_pos + n]);
        tx.put(key, chunk);
        in_pos += n;
        off += n as u64;
        remaining -= n;
    }
    let new_len = offset + data.len() as u64;
    if new_len > stream_len(tx, stream_type)? {
        set_stream_len(tx, stream_type, new_len);
    }
    Ok(())
}

/// Grows or shrinks a stream to exactly `new_len` bytes (spec §4.5
/// `StreamResize(n, n0)`). Growing zero-fills the new tail; shrinking
/// deletes trailing chunks and truncates the new last chunk.
pub fn stream_resize(tx: &mut Transaction, stream_type: u8, new_len: u64) -> DbResult<()> {
    let old_len = stream_len(tx, stream_type)?;
    if new_len == old_len {
        return Ok(());
    }
    if new_len > old_len {
        let zeros = vec![0u8; (new_len - old_len) as usize];
        stream_write(tx, stream_type, old_len, &zeros)?;
        return Ok(());
    }

    // Shrinking: drop every chunk fully past new_len, truncate the one
    // chunk straddling the new boundary.
    let (last_chunk_idx, in_chunk) = chunk_of(new_len.saturating_sub(1));
    let (old_last_chunk_idx, _) = chunk_of(old_len.saturating_sub(1));
    for idx in (last_chunk_idx + 1)..=old_last_chunk_idx {
        tx.remove(stream_chunk_key(stream_type, idx));
    }
    if new_len > 0 {
        let key = stream_chunk_key(stream_type, last_chunk_idx);
        if let Some(mut chunk) = tx.get(&key)? {
            chunk.truncate(in_chunk + 1);
            tx.put(key, chunk);
        }
    } else {
        tx.remove(stream_chunk_key(stream_type, 0));
    }
    set_stream_len(tx, stream_type, new_len);
    Ok(())
}

/// Deletes every chunk of a stream, for diagnostics/maintenance use.
pub fn stream_clear(tx: &mut Transaction, stream_type: u8) -> DbResult<()> {
    let lower = stream_prefix(stream_type);
    let upper = next_prefix(&lower, table_upper_bound(Table::Stream));
    for (k, _) in tx.scan_range(&lower, &upper)? {
        tx.remove(k);
    }
    set_stream_len(tx, stream_type, 0);
    Ok(())
}
