//! Binary serialization contract shared by all encodable types.
//!
//! Sequences are encoded with an 8-byte little-endian length prefix followed
//! by their elements, recursively. Every encodable entity knows its exact
//! serialized size up front, encodes into a preallocated buffer, and decodes
//! in place, reporting the number of bytes written or consumed.

use std::io;
use thiserror::Error;

/// Error raised while encoding or decoding binary payloads.
///
/// Decoding errors carry the number of bytes already consumed so that a
/// caller can locate exactly where a stream went bad, together with the
/// sub-field that was being processed.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The input ended before the field could be fully decoded.
    #[error("truncated input while decoding {context}: needed {needed} more bytes after {consumed} consumed")]
    Truncated {
        /// The sub-field being decoded.
        context: &'static str,
        /// Number of missing bytes.
        needed: usize,
        /// Bytes consumed before the truncation was detected.
        consumed: usize,
    },

    /// The output buffer cannot hold the field being encoded.
    #[error("buffer too small while encoding {context}: needed {needed} more bytes after {written} written")]
    BufferTooSmall {
        /// The sub-field being encoded.
        context: &'static str,
        /// Number of missing bytes.
        needed: usize,
        /// Bytes written before the overflow was detected.
        written: usize,
    },

    /// The input decoded to a structurally invalid value.
    #[error("malformed {context} after {consumed} bytes consumed: {reason}")]
    Malformed {
        /// The sub-field being decoded.
        context: &'static str,
        /// Bytes consumed before the field was rejected.
        consumed: usize,
        /// Why the field was rejected.
        reason: String,
    },

    /// An underlying I/O operation failed.
    #[error("i/o error after {consumed} bytes: {source}")]
    Io {
        /// Bytes transferred before the failure.
        consumed: usize,
        /// The underlying error.
        source: io::Error,
    },
}

/// Exact serialized size of an object, computable without encoding it.
pub trait BinarySize {
    /// The number of bytes the object occupies once encoded.
    fn binary_size(&self) -> usize;
}

/// Encoding into byte buffers and writers.
pub trait Encode: BinarySize {
    /// Encode the object into `buf` and return the number of bytes written,
    /// which equals [`BinarySize::binary_size`] on success.
    fn encode_into(&self, buf: &mut [u8]) -> Result<usize, SerialError>;

    /// Encode the object into a newly allocated buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.binary_size()];
        let written = self
            .encode_into(&mut buf)
            .expect("a buffer of binary_size bytes always fits the encoding");
        debug_assert_eq!(written, buf.len());
        buf
    }

    /// Write exactly [`BinarySize::binary_size`] bytes to `w`.
    fn write_to<W: io::Write>(&self, w: &mut W) -> Result<usize, SerialError> {
        let bytes = self.to_bytes();
        w.write_all(&bytes)
            .map_err(|source| SerialError::Io { consumed: 0, source })?;
        Ok(bytes.len())
    }
}

/// Decoding from byte buffers and readers.
pub trait Decode {
    /// Decode the object in place from `buf` and return the number of bytes
    /// consumed. Existing storage is reused; a sequence is only reallocated
    /// when its encoded length differs from the current one.
    fn decode_from(&mut self, buf: &[u8]) -> Result<usize, SerialError>;

    /// Read exactly [`BinarySize::binary_size`] bytes from `r` and decode
    /// them. The receiver must already be allocated to the encoded shape.
    fn read_from<R: io::Read>(&mut self, r: &mut R) -> Result<usize, SerialError>
    where
        Self: BinarySize,
    {
        let mut buf = vec![0u8; self.binary_size()];
        r.read_exact(&mut buf)
            .map_err(|source| SerialError::Io { consumed: 0, source })?;
        self.decode_from(&buf)
    }
}

/// Cursor writing little-endian fields into a preallocated byte slice.
pub struct ByteWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWriter<'a> {
    /// Wrap `buf` in a fresh cursor.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The number of bytes written so far.
    pub fn written(&self) -> usize {
        self.pos
    }

    fn reserve(&mut self, n: usize, context: &'static str) -> Result<(), SerialError> {
        if self.pos + n > self.buf.len() {
            Err(SerialError::BufferTooSmall {
                context,
                needed: self.pos + n - self.buf.len(),
                written: self.pos,
            })
        } else {
            Ok(())
        }
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8, context: &'static str) -> Result<(), SerialError> {
        self.reserve(1, context)?;
        self.buf[self.pos] = v;
        self.pos += 1;
        Ok(())
    }

    /// Write a little-endian u64.
    pub fn write_u64(&mut self, v: u64, context: &'static str) -> Result<(), SerialError> {
        self.reserve(8, context)?;
        self.buf[self.pos..self.pos + 8].copy_from_slice(&v.to_le_bytes());
        self.pos += 8;
        Ok(())
    }

    /// Write a raw byte slice.
    pub fn write_bytes(&mut self, v: &[u8], context: &'static str) -> Result<(), SerialError> {
        self.reserve(v.len(), context)?;
        self.buf[self.pos..self.pos + v.len()].copy_from_slice(v);
        self.pos += v.len();
        Ok(())
    }

    /// Write a slice of little-endian u64 values, without a length prefix.
    pub fn write_u64_slice(&mut self, v: &[u64], context: &'static str) -> Result<(), SerialError> {
        self.reserve(8 * v.len(), context)?;
        for vi in v {
            self.buf[self.pos..self.pos + 8].copy_from_slice(&vi.to_le_bytes());
            self.pos += 8;
        }
        Ok(())
    }
}

/// Cursor reading little-endian fields from a byte slice.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Wrap `buf` in a fresh cursor.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The number of bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], SerialError> {
        if self.pos + n > self.buf.len() {
            Err(SerialError::Truncated {
                context,
                needed: self.pos + n - self.buf.len(),
                consumed: self.pos,
            })
        } else {
            let out = &self.buf[self.pos..self.pos + n];
            self.pos += n;
            Ok(out)
        }
    }

    /// Read a single byte.
    pub fn read_u8(&mut self, context: &'static str) -> Result<u8, SerialError> {
        Ok(self.take(1, context)?[0])
    }

    /// Read a little-endian u64.
    pub fn read_u64(&mut self, context: &'static str) -> Result<u64, SerialError> {
        let bytes = self.take(8, context)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize, context: &'static str) -> Result<&'a [u8], SerialError> {
        self.take(n, context)
    }

    /// Read `out.len()` little-endian u64 values, without a length prefix.
    pub fn read_u64_slice(
        &mut self,
        out: &mut [u64],
        context: &'static str,
    ) -> Result<(), SerialError> {
        let bytes = self.take(8 * out.len(), context)?;
        for (o, chunk) in out.iter_mut().zip(bytes.chunks_exact(8)) {
            *o = u64::from_le_bytes(chunk.try_into().expect("8 bytes"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trip() {
        let mut buf = vec![0u8; 25];
        let mut w = ByteWriter::new(&mut buf);
        w.write_u64(0xdead_beef, "a").unwrap();
        w.write_u8(7, "b").unwrap();
        w.write_u64_slice(&[1, u64::MAX], "c").unwrap();
        assert_eq!(w.written(), 25);

        let mut r = ByteReader::new(&buf);
        assert_eq!(r.read_u64("a").unwrap(), 0xdead_beef);
        assert_eq!(r.read_u8("b").unwrap(), 7);
        let mut out = [0u64; 2];
        r.read_u64_slice(&mut out, "c").unwrap();
        assert_eq!(out, [1, u64::MAX]);
        assert_eq!(r.consumed(), 25);
    }

    #[test]
    fn truncation_reports_consumed_bytes() {
        let buf = vec![0u8; 10];
        let mut r = ByteReader::new(&buf);
        r.read_u64("head").unwrap();
        match r.read_u64("tail") {
            Err(SerialError::Truncated {
                context, consumed, ..
            }) => {
                assert_eq!(context, "tail");
                assert_eq!(consumed, 8);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
