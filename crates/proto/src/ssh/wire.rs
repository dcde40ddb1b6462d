//! Encoding and decoding of SSH primitive types (RFC 4251 Section 5).
//!
//! All multi-byte integers are big-endian. Strings and byte strings are
//! length-prefixed with a `uint32`. Arbitrary-precision integers (`mpint`)
//! use two's-complement minimal encoding: leading zero octets are dropped,
//! and a single zero octet is inserted when the high bit of the first octet
//! would otherwise be set. Zero is encoded as the empty string.
//!
//! # Example
//!
//! ```rust
//! use halyard_proto::ssh::wire::{WireReader, WireWriter};
//!
//! let mut writer = WireWriter::new();
//! writer.put_u32(42);
//! writer.put_string("session");
//! let bytes = writer.into_bytes();
//!
//! let mut reader = WireReader::new(&bytes);
//! assert_eq!(reader.read_u32().unwrap(), 42);
//! assert_eq!(reader.read_string().unwrap(), "session");
//! ```

use bytes::{BufMut, BytesMut};
use halyard_platform::{HalyardError, HalyardResult};
use num_bigint::BigUint;

/// Writer for SSH wire-format values.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: BytesMut,
}

impl WireWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
        }
    }

    /// Appends a single byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Appends a boolean as one byte (0 or 1).
    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(if value { 1 } else { 0 });
    }

    /// Appends a big-endian `uint32`.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Appends a big-endian `uint64`.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.put_u64(value);
    }

    /// Appends raw bytes without a length prefix.
    pub fn put_raw(&mut self, data: &[u8]) {
        self.buf.put_slice(data);
    }

    /// Appends a length-prefixed byte string.
    pub fn put_byte_string(&mut self, data: &[u8]) {
        self.buf.put_u32(data.len() as u32);
        self.buf.put_slice(data);
    }

    /// Appends a length-prefixed UTF-8 string.
    pub fn put_string(&mut self, s: &str) {
        self.put_byte_string(s.as_bytes());
    }

    /// Appends a comma-separated name-list.
    pub fn put_name_list(&mut self, names: &[String]) {
        self.put_string(&names.join(","));
    }

    /// Appends an `mpint` (minimal two's-complement encoding).
    pub fn put_mpint(&mut self, value: &BigUint) {
        self.put_raw(&encode_mpint(&value.to_bytes_be()));
    }

    /// Appends an `mpint` from big-endian magnitude bytes.
    pub fn put_mpint_bytes(&mut self, magnitude: &[u8]) {
        self.put_raw(&encode_mpint(magnitude));
    }

    /// Consumes the writer and returns the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Encodes a big-endian magnitude as an SSH `mpint` (with length prefix).
///
/// Leading zeros are trimmed; a zero octet is prepended when the high bit of
/// the first octet is set so the value stays non-negative.
pub fn encode_mpint(magnitude: &[u8]) -> Vec<u8> {
    let trimmed: &[u8] = {
        let mut start = 0;
        while start < magnitude.len() && magnitude[start] == 0 {
            start += 1;
        }
        &magnitude[start..]
    };

    if trimmed.is_empty() {
        return vec![0, 0, 0, 0];
    }

    let needs_padding = trimmed[0] & 0x80 != 0;
    let length = trimmed.len() + usize::from(needs_padding);

    let mut result = Vec::with_capacity(4 + length);
    result.extend_from_slice(&(length as u32).to_be_bytes());
    if needs_padding {
        result.push(0);
    }
    result.extend_from_slice(trimmed);
    result
}

/// Reader for SSH wire-format values.
///
/// Tracks an offset into a borrowed byte slice; truncated reads report the
/// offset in the error.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a reader over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Current read offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, length: usize) -> HalyardResult<&'a [u8]> {
        if self.remaining() < length {
            return Err(HalyardError::Protocol(format!(
                "data truncated: need {} bytes at offset {}, {} remain",
                length,
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + length];
        self.offset += length;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> HalyardResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a boolean (any non-zero byte is true).
    pub fn read_bool(&mut self) -> HalyardResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads a big-endian `uint32`.
    pub fn read_u32(&mut self) -> HalyardResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a big-endian `uint64`.
    pub fn read_u64(&mut self) -> HalyardResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Reads `length` raw bytes.
    pub fn read_raw(&mut self, length: usize) -> HalyardResult<&'a [u8]> {
        self.take(length)
    }

    /// Reads a length-prefixed byte string.
    pub fn read_byte_string(&mut self) -> HalyardResult<&'a [u8]> {
        let length = self.read_u32()? as usize;
        self.take(length)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> HalyardResult<String> {
        let bytes = self.read_byte_string()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| HalyardError::Protocol("string contains invalid UTF-8".to_string()))
    }

    /// Reads a comma-separated name-list.
    pub fn read_name_list(&mut self) -> HalyardResult<Vec<String>> {
        let s = self.read_string()?;
        if s.is_empty() {
            return Ok(Vec::new());
        }
        Ok(s.split(',').map(String::from).collect())
    }

    /// Reads an `mpint` as an unsigned big integer.
    ///
    /// Negative values are not used by this engine and are rejected.
    pub fn read_mpint(&mut self) -> HalyardResult<BigUint> {
        let bytes = self.read_byte_string()?;
        if !bytes.is_empty() && bytes[0] & 0x80 != 0 {
            return Err(HalyardError::Protocol(
                "negative mpint value".to_string(),
            ));
        }
        Ok(BigUint::from_bytes_be(bytes))
    }

    /// Returns the unread remainder of the input.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.offset..];
        self.offset = self.data.len();
        rest
    }
}
