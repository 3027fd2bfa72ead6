//! Low-level protobuf primitive read/write operations.
//!
//! This module provides `WireWriter` and `WireReader` for direct byte
//! manipulation of protobuf-encoded data. They are used by the schema-driven
//! codec in `protoz`, which decides per field descriptor which primitive to
//! call.

use prost::encoding::{WireType, decode_key, decode_varint, encode_key, encode_varint};

use crate::error::{Error, Result};

#[inline]
pub fn encode_zigzag32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

#[inline]
pub fn decode_zigzag32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

#[inline]
pub fn encode_zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

#[inline]
pub fn decode_zigzag64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Low-level protobuf writer appending to a byte vector.
pub struct WireWriter<'a> {
    buffer: &'a mut Vec<u8>,
    start_offset: usize,
}

impl<'a> WireWriter<'a> {
    /// Create a new writer for the given buffer.
    #[inline]
    pub fn new(buffer: &'a mut Vec<u8>) -> Self {
        let start_offset = buffer.len();
        Self {
            buffer,
            start_offset,
        }
    }

    /// Number of bytes written through this writer.
    #[inline(always)]
    pub fn position(&self) -> usize {
        self.buffer.len() - self.start_offset
    }

    #[inline]
    pub fn write_key(&mut self, number: u32, wire_type: WireType) {
        encode_key(number, wire_type, &mut *self.buffer);
    }

    #[inline]
    pub fn write_varint(&mut self, v: u64) {
        encode_varint(v, &mut *self.buffer);
    }

    /// Negative int32 values are sign-extended to ten bytes, as protobuf requires.
    #[inline]
    pub fn write_int32(&mut self, v: i32) {
        self.write_varint(v as i64 as u64);
    }

    #[inline]
    pub fn write_int64(&mut self, v: i64) {
        self.write_varint(v as u64);
    }

    #[inline]
    pub fn write_uint32(&mut self, v: u32) {
        self.write_varint(u64::from(v));
    }

    #[inline]
    pub fn write_uint64(&mut self, v: u64) {
        self.write_varint(v);
    }

    #[inline]
    pub fn write_sint32(&mut self, v: i32) {
        self.write_varint(u64::from(encode_zigzag32(v)));
    }

    #[inline]
    pub fn write_sint64(&mut self, v: i64) {
        self.write_varint(encode_zigzag64(v));
    }

    #[inline]
    pub fn write_bool(&mut self, v: bool) {
        self.buffer.push(if v { 1 } else { 0 });
    }

    #[inline]
    pub fn write_fixed32(&mut self, v: u32) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn write_fixed64(&mut self, v: u64) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn write_sfixed32(&mut self, v: i32) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn write_sfixed64(&mut self, v: i64) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn write_float(&mut self, v: f32) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    #[inline]
    pub fn write_double(&mut self, v: f64) {
        self.buffer.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a length-prefixed byte run (strings, bytes, submessages, packed runs).
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.buffer.extend_from_slice(bytes);
    }

    /// Append bytes verbatim (pre-encoded unknown fields).
    #[inline]
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }
}

/// Low-level protobuf reader over a borrowed byte slice.
pub struct WireReader<'a> {
    input: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    /// Create a new reader for the given input bytes.
    #[inline]
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, position: 0 }
    }

    /// Current read position.
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Remaining bytes available.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.input.len() - self.position
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Raw input between two positions previously returned by `position()`.
    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &'a [u8] {
        &self.input[start..end]
    }

    #[inline]
    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof);
        }
        let bytes = &self.input[self.position..self.position + count];
        self.position += count;
        Ok(bytes)
    }

    #[inline]
    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a field key, returning the field number and wire type.
    #[inline]
    pub fn read_key(&mut self) -> Result<(u32, WireType)> {
        let mut rest = &self.input[self.position..];
        let before = rest.len();
        let key = decode_key(&mut rest)?;
        self.position += before - rest.len();
        Ok(key)
    }

    #[inline]
    pub fn read_varint(&mut self) -> Result<u64> {
        let mut rest = &self.input[self.position..];
        let before = rest.len();
        let v = decode_varint(&mut rest)?;
        self.position += before - rest.len();
        Ok(v)
    }

    /// Truncates to the low 32 bits, as protobuf does for int32.
    #[inline]
    pub fn read_int32(&mut self) -> Result<i32> {
        Ok(self.read_varint()? as i32)
    }

    #[inline]
    pub fn read_int64(&mut self) -> Result<i64> {
        Ok(self.read_varint()? as i64)
    }

    #[inline]
    pub fn read_uint32(&mut self) -> Result<u32> {
        Ok(self.read_varint()? as u32)
    }

    #[inline]
    pub fn read_uint64(&mut self) -> Result<u64> {
        self.read_varint()
    }

    #[inline]
    pub fn read_sint32(&mut self) -> Result<i32> {
        Ok(decode_zigzag32(self.read_varint()? as u32))
    }

    #[inline]
    pub fn read_sint64(&mut self) -> Result<i64> {
        Ok(decode_zigzag64(self.read_varint()?))
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_varint()? != 0)
    }

    #[inline]
    pub fn read_fixed32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_fixed64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_sfixed32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_sfixed64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take_array()?))
    }

    #[inline]
    pub fn read_double(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take_array()?))
    }

    /// Read a length-prefixed byte run.
    #[inline]
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(Error::LengthOverflow(len));
        }
        self.take(len as usize)
    }

    /// Skip the value of a field whose key has already been read.
    pub fn skip_value(&mut self, number: u32, wire_type: WireType) -> Result<()> {
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::SixtyFourBit => {
                self.take(8)?;
            }
            WireType::ThirtyTwoBit => {
                self.take(4)?;
            }
            WireType::LengthDelimited => {
                self.read_bytes()?;
            }
            WireType::StartGroup | WireType::EndGroup => {
                return Err(Error::GroupNotSupported(number));
            }
        }
        Ok(())
    }
}
