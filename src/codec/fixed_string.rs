//! Fixed-length, zero-padded character arrays, the wire form used for every
//! name/key/host field in the connection info and struct codec.

use crate::codec::CodecError;
use crate::codec::primitive::{Cursor, write_u32};

/// A fixed-length character field, `N` bytes wide on the wire, zero-padded
/// and never null-terminated.
///
/// Marshalled as `length: u32, bytes: N×u8` where `length` always equals
/// `N` (the reference implementation uses this redundant prefix as a
/// forward-compatibility escape hatch; see `SPEC_FULL.md` §9).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedString<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedString<N> {
    /// An all-zero field.
    #[must_use]
    pub const fn empty() -> Self {
        Self { bytes: [0; N] }
    }

    /// Builds a fixed string from a `&str`, truncating or zero-padding to
    /// `N` bytes. Truncation happens on byte boundaries; callers passing
    /// non-ASCII text that would split a multi-byte character at the
    /// boundary should pre-truncate themselves.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        let mut bytes = [0_u8; N];
        let src = s.as_bytes();
        let n = src.len().min(N);
        if let (Some(dst), Some(src)) = (bytes.get_mut(..n), src.get(..n)) {
            dst.copy_from_slice(src);
        }
        Self { bytes }
    }

    /// The raw zero-padded byte array.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// Returns the value as a `&str`, with trailing NUL bytes trimmed. Not
    /// valid UTF-8 decodes to an empty string rather than panicking.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let end = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.bytes.len());
        let Some(slice) = self.bytes.get(..end) else {
            return "";
        };
        std::str::from_utf8(slice).unwrap_or("")
    }

    /// Appends this field's wire representation: a `u32` length prefix
    /// (always `N`) followed by the `N` raw bytes.
    pub fn marshal(&self, buf: &mut Vec<u8>) {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "N is a compile-time const generic bounded by field sizes well under u32::MAX"
        )]
        write_u32(buf, N as u32);
        buf.extend_from_slice(&self.bytes);
    }

    /// Parses this field's wire representation, validating that the wire
    /// length prefix equals the compile-time size `N`.
    pub fn unmarshal(cursor: &mut Cursor<'_>) -> Result<Self, CodecError> {
        let wire_len = cursor.read_u32()?;
        #[allow(
            clippy::cast_possible_truncation,
            reason = "N is a compile-time const generic bounded by field sizes well under u32::MAX"
        )]
        let expected = N as u32;
        if wire_len != expected {
            return Err(CodecError::FixedStringLengthMismatch {
                wire: wire_len,
                expected,
            });
        }
        let raw = cursor.read_bytes(N)?;
        let mut bytes = [0_u8; N];
        bytes.copy_from_slice(raw);
        Ok(Self { bytes })
    }
}

impl<const N: usize> std::fmt::Debug for FixedString<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FixedString").field(&self.as_str()).finish()
    }
}

impl<const N: usize> Default for FixedString<N> {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("127.0.0.1")]
    fn round_trips_through_wire_bytes(#[case] input: &str) {
        let field = FixedString::<32>::from_str_lossy(input);
        let mut buf = Vec::new();
        field.marshal(&mut buf);
        let mut cursor = Cursor::new(&buf);
        let decoded = FixedString::<32>::unmarshal(&mut cursor).unwrap();
        assert_eq!(decoded.as_str(), input);
    }

    #[test]
    fn truncates_to_field_width() {
        let field = FixedString::<4>::from_str_lossy("abcdef");
        assert_eq!(field.as_str(), "abcd");
    }

    #[test]
    fn length_prefix_equals_compile_time_size() {
        let field = FixedString::<8>::from_str_lossy("ab");
        let mut buf = Vec::new();
        field.marshal(&mut buf);
        let mut cursor = Cursor::new(&buf);
        assert_eq!(cursor.read_u32().unwrap(), 8);
    }

    #[test]
    fn rejects_mismatched_length_prefix() {
        let mut buf = Vec::new();
        write_u32(&mut buf, 4); // wrong: field below is 8 wide
        buf.extend_from_slice(&[0_u8; 8]);
        let mut cursor = Cursor::new(&buf);
        let err = FixedString::<8>::unmarshal(&mut cursor).unwrap_err();
        assert_eq!(
            err,
            CodecError::FixedStringLengthMismatch {
                wire: 4,
                expected: 8
            }
        );
    }
}
