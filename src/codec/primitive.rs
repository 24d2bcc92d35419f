//! Endian-normalized encoding for the fixed-width scalars every MCD struct
//! is built from.
//!
//! The wire format is little-endian regardless of host byte order. Rust's
//! `to_le_bytes`/`from_le_bytes` already do the right thing on both
//! little-endian and big-endian hosts, so unlike the reference
//! implementation's `HOST_BIG_ENDIAN` branch this module needs no manual
//! byte-reversal: the compiler's definition of "little-endian" is exactly
//! the wire's.

use crate::codec::CodecError;

/// A cursor over an immutable byte slice used while unmarshalling.
///
/// Every `read_*` method advances the cursor and returns an error rather
/// than panicking when the slice is exhausted.
#[derive(Debug)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor over `buf` starting at offset zero.
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes consumed so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Number of bytes remaining.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::ShortBuffer {
                needed: n,
                available: self.remaining(),
            });
        }
        let Some(slice) = self.buf.get(self.pos..self.pos + n) else {
            return Err(CodecError::ShortBuffer {
                needed: n,
                available: self.remaining(),
            });
        };
        self.pos += n;
        Ok(slice)
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let slice = self.take(1)?;
        let Some(byte) = slice.first() else {
            return Err(CodecError::ShortBuffer {
                needed: 1,
                available: 0,
            });
        };
        Ok(*byte)
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        let slice = self.take(2)?;
        let Ok(arr) = <[u8; 2]>::try_from(slice) else {
            return Err(CodecError::ShortBuffer {
                needed: 2,
                available: slice.len(),
            });
        };
        Ok(u16::from_le_bytes(arr))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let slice = self.take(4)?;
        let Ok(arr) = <[u8; 4]>::try_from(slice) else {
            return Err(CodecError::ShortBuffer {
                needed: 4,
                available: slice.len(),
            });
        };
        Ok(u32::from_le_bytes(arr))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let slice = self.take(8)?;
        let Ok(arr) = <[u8; 8]>::try_from(slice) else {
            return Err(CodecError::ShortBuffer {
                needed: 8,
                available: slice.len(),
            });
        };
        Ok(u64::from_le_bytes(arr))
    }

    /// Reads a boolean encoded as a single byte; any non-zero byte decodes
    /// to `true`.
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }
}

/// Appends a `u8` in wire form.
pub fn write_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

/// Appends a little-endian `u16`.
pub fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Appends a little-endian `u32`.
pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Appends a little-endian `u64`.
pub fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Appends a boolean as a single non-zero/zero byte.
pub fn write_bool(buf: &mut Vec<u8>, v: bool) {
    write_u8(buf, u8::from(v));
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(0x0102_0304_u32)]
    #[case(0_u32)]
    #[case(u32::MAX)]
    fn u32_round_trips(#[case] value: u32) {
        let mut buf = Vec::new();
        write_u32(&mut buf, value);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(cursor.read_u32().unwrap(), value);
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn encodes_little_endian_on_the_wire() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 0x0102_0304);
        assert_eq!(buf, vec![0x04, 0x03, 0x02, 0x01]);
    }

    #[rstest]
    #[case(0u8, false)]
    #[case(1u8, true)]
    #[case(0xFFu8, true)]
    fn bool_non_zero_decodes_true(#[case] byte: u8, #[case] expected: bool) {
        let mut cursor = Cursor::new(std::slice::from_ref(&byte));
        assert_eq!(cursor.read_bool().unwrap(), expected);
    }

    #[test]
    fn short_buffer_is_an_error_not_a_panic() {
        let buf = [0x01_u8];
        let mut cursor = Cursor::new(&buf);
        assert!(matches!(
            cursor.read_u32(),
            Err(CodecError::ShortBuffer { needed: 4, available: 1 })
        ));
    }
}
