//! The RPC codec: primitive encoding (§4.A), value encoding (§4.B), and the
//! per-RPC request/response wrappers (§4.C).

pub mod fixed_string;
pub mod primitive;
pub mod request;
pub mod value;

pub use fixed_string::FixedString;

use thiserror::Error;

/// Errors raised while marshalling or unmarshalling MCD wire values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes remained in the buffer than the value being decoded
    /// requires.
    #[error("short buffer: needed {needed} bytes, had {available}")]
    ShortBuffer {
        /// Bytes the decode step required.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },
    /// A fixed-length string's declared length did not match the field's
    /// compile-time size.
    #[error("fixed string length mismatch: wire said {wire}, field is {expected}")]
    FixedStringLengthMismatch {
        /// Length read from the wire.
        wire: u32,
        /// Compile-time size of the field.
        expected: u32,
    },
    /// A tagged trigger union had zero or more than one inner presence
    /// flag set.
    #[error("trigger union had {set_flags} variants marked present, expected exactly 1")]
    UnionNotExclusive {
        /// Number of inner presence flags observed set.
        set_flags: u32,
    },
    /// An enum discriminant on the wire did not correspond to any known
    /// variant.
    #[error("unknown discriminant {value} for {type_name}")]
    UnknownDiscriminant {
        /// The type being decoded.
        type_name: &'static str,
        /// The unrecognized wire value.
        value: u32,
    },
    /// `unmarshal` consumed a number of bytes different from the `length`
    /// prefix that accompanied the value.
    #[error("length mismatch: expected {expected} bytes, unmarshalled {actual}")]
    LengthMismatch {
        /// Length declared by the sender.
        expected: u32,
        /// Length actually consumed while decoding.
        actual: u32,
    },
}
