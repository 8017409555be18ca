//! Wire primitive reader/writer
//!
//! Low-level protobuf-style encoding primitives shared by the schema codec:
//! varints, tags, fixed32 and length-delimited fields. The reader tracks a
//! read position over a borrowed slice; the writer appends to a `BytesMut`.

use bytes::{BufMut, BytesMut};

use crate::error::DecodeError;

/// Wire type for varint-encoded fields
pub const WIRE_VARINT: u8 = 0;
/// Wire type for 8-byte fixed-width fields
pub const WIRE_FIXED64: u8 = 1;
/// Wire type for length-delimited fields
pub const WIRE_LEN: u8 = 2;
/// Wire type for 4-byte fixed-width fields
pub const WIRE_FIXED32: u8 = 5;

/// Reader over an immutable payload slice
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Check if there are bytes remaining to read
    #[inline]
    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Read a base-128 varint
    pub fn read_varint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or(DecodeError::TruncatedVarint)?;
            self.pos += 1;

            if shift >= 64 {
                return Err(DecodeError::TruncatedVarint);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Read a field tag; returns (field number, wire type)
    pub fn read_tag(&mut self) -> Result<(u32, u8), DecodeError> {
        let tag = self.read_varint()?;
        Ok(((tag >> 3) as u32, (tag & 0x7) as u8))
    }

    /// Read a fixed-width 32-bit value (little-endian)
    pub fn read_fixed32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a fixed-width 64-bit value (little-endian)
    pub fn read_fixed64(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a length-delimited chunk (length prefix then raw bytes)
    pub fn read_len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_varint()?;
        if len > self.remaining() as u64 {
            return Err(DecodeError::LengthOverrun { len });
        }
        self.read_bytes(len as usize)
    }

    /// Read an exact number of raw bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], DecodeError> {
        if count > self.remaining() {
            return Err(DecodeError::Truncated {
                need: count,
                have: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Skip over one field value of the given wire type
    pub fn skip(&mut self, wire_type: u8, field: u32) -> Result<(), DecodeError> {
        match wire_type {
            WIRE_VARINT => {
                self.read_varint()?;
            }
            WIRE_FIXED64 => {
                self.read_bytes(8)?;
            }
            WIRE_LEN => {
                self.read_len_delimited()?;
            }
            WIRE_FIXED32 => {
                self.read_bytes(4)?;
            }
            other => {
                return Err(DecodeError::WireType {
                    field: format!("#{field}"),
                    expected: WIRE_VARINT,
                    got: other,
                });
            }
        }
        Ok(())
    }
}

/// Writer that appends wire primitives to a growable buffer
#[derive(Debug, Default)]
pub struct WireWriter {
    data: BytesMut,
}

impl WireWriter {
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write a base-128 varint
    pub fn write_varint(&mut self, mut value: u64) {
        loop {
            let byte = (value & 0x7f) as u8;
            value >>= 7;
            if value == 0 {
                self.data.put_u8(byte);
                return;
            }
            self.data.put_u8(byte | 0x80);
        }
    }

    /// Write a field tag
    pub fn write_tag(&mut self, field: u32, wire_type: u8) {
        self.write_varint((u64::from(field) << 3) | u64::from(wire_type));
    }

    /// Write a fixed-width 32-bit value (little-endian)
    pub fn write_fixed32(&mut self, value: u32) {
        self.data.put_u32_le(value);
    }

    /// Write a length-delimited chunk
    pub fn write_len_delimited(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.data.put_slice(bytes);
    }

    /// Consume the writer and return the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.to_vec()
    }
}
