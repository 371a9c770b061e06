//! Wire-level decode errors.

use thiserror::Error;

/// Errors produced while decoding canonical wire bytes.
///
/// Encoding is infallible; only decoding of untrusted input can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// The input ended before the value was complete.
    #[error("unexpected end of input: needed {needed} more bytes, {remaining} left")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A boolean byte was neither `0x00` nor `0x01`.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A varuint-prefixed length exceeded the caller's limit.
    #[error("length {len} exceeds limit {max}")]
    LengthExceedsLimit { len: u64, max: u64 },

    /// A discriminant byte did not name a known variant.
    #[error("invalid {what} discriminant {value:#04x}")]
    InvalidEnum { what: &'static str, value: u8 },

    /// Bytes remained after the value was fully decoded.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}
