//! Binary encode/decode for the values that cross the sled boundary.
//!
//! This plays the role of `NodeDB::Recordset`'s typed `put`/`get` pairs and
//! the teacher's `xelis_common::serializer::Serializer` trait: one place
//! that knows how every domain type is laid out as bytes, so table code
//! never hand-rolls `to_le_bytes` calls inline.

use crate::error::CodecError;

pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);

    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

pub trait Decode: Sized {
    fn decode(buf: &[u8]) -> Result<Self, CodecError>;
}

pub(crate) fn take<'a>(buf: &mut &'a [u8], n: usize) -> Result<&'a [u8], CodecError> {
    if buf.len() < n {
        return Err(CodecError::TooShort { need: n, have: buf.len() });
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

pub(crate) fn ensure_consumed(buf: &[u8]) -> Result<(), CodecError> {
    if buf.is_empty() {
        Ok(())
    } else {
        Err(CodecError::TrailingBytes)
    }
}

impl Encode for u32 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for u32 {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut b = buf;
        let bytes = take(&mut b, 4)?;
        ensure_consumed(b)?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }
}

impl Encode for u64 {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for u64 {
    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut b = buf;
        let bytes = take(&mut b, 8)?;
        ensure_consumed(b)?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }
}

/// Reads a big-endian `u64`/`u32` prefix without requiring the whole buffer
/// to be exactly that size (used when a key is a fixed prefix followed by a
/// variable-length tail, e.g. contract data keys).
pub(crate) fn read_u64_be(buf: &[u8]) -> Result<u64, CodecError> {
    let bytes = buf.get(..8).ok_or(CodecError::TooShort { need: 8, have: buf.len() })?;
    Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
}

pub(crate) fn read_u32_be(buf: &[u8]) -> Result<u32, CodecError> {
    let bytes = buf.get(..4).ok_or(CodecError::TooShort { need: 4, have: buf.len() })?;
    Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
}
