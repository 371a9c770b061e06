//! Deterministic binary serialization for consensus payloads.
//!
//! Every wire type has exactly one encoding: integers are little-endian,
//! variable-length collections are prefixed with a compact varuint, and
//! booleans are a single `0x00`/`0x01` byte. Two honest nodes encoding the
//! same value always produce the same bytes, which is what makes payload
//! hashes meaningful across implementations.
//!
//! The crate deliberately knows nothing about consensus: it provides the
//! [`BinWriter`]/[`BinReader`] pair plus the [`Encode`]/[`Decode`] traits
//! that the payload crate builds on.

mod error;
mod reader;
mod writer;

pub use error::WireError;
pub use reader::BinReader;
pub use writer::BinWriter;

/// A type with a canonical binary encoding.
pub trait Encode {
    /// Append the canonical encoding of `self` to `w`.
    fn encode(&self, w: &mut BinWriter);

    /// Encode into a fresh byte vector.
    fn to_bytes(&self) -> Vec<u8> {
        let mut w = BinWriter::new();
        self.encode(&mut w);
        w.into_bytes()
    }
}

/// A type decodable from its canonical binary encoding.
pub trait Decode: Sized {
    /// Decode one value from the reader, consuming exactly its encoding.
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError>;

    /// Decode a value from `bytes`, rejecting trailing garbage.
    fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        let mut r = BinReader::new(bytes);
        let value = Self::decode(&mut r)?;
        r.expect_eof()?;
        Ok(value)
    }
}
