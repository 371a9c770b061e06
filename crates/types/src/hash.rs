//! 32-byte content hash.

use std::fmt;
use std::str::FromStr;

use dbft_wire::{BinReader, BinWriter, Decode, Encode, WireError};
use thiserror::Error;

/// Error parsing a hash from its hex representation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HexError {
    #[error("expected 64 hex characters, got {0}")]
    BadLength(usize),
    #[error("invalid hex: {0}")]
    BadDigit(#[from] hex::FromHexError),
}

/// A 32-byte blake3 hash.
///
/// Used for transaction identity, payload identity, header identity and the
/// merkle root. The zero hash doubles as the "no previous block" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const SIZE: usize = 32;

    /// The all-zero hash.
    pub const ZERO: Hash = Hash([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps log lines readable.
        write!(f, "{}", &hex::encode(self.0)[..8])
    }
}

impl FromStr for Hash {
    type Err = HexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(HexError::BadLength(s.len()));
        }
        let bytes = hex::decode(s)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }
}

impl Encode for Hash {
    fn encode(&self, w: &mut BinWriter) {
        w.write_bytes(&self.0);
    }
}

impl Decode for Hash {
    fn decode(r: &mut BinReader<'_>) -> Result<Self, WireError> {
        Ok(Self(r.read_exact::<32>()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_stable() {
        assert_eq!(Hash::digest(b"abc"), Hash::digest(b"abc"));
        assert_ne!(Hash::digest(b"abc"), Hash::digest(b"abd"));
    }

    #[test]
    fn digest_matches_blake3_test_vector() {
        use hex_literal::hex;
        assert_eq!(
            Hash::digest(b"abc").as_bytes(),
            &hex!("6437b3ac38465133ffb63b75273a8db548c558465d79db03fd359c6cd5bd9d85")
        );
    }

    #[test]
    fn hex_round_trip() {
        let h = Hash::digest(b"round trip");
        let parsed: Hash = h.to_string().parse().unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn rejects_bad_hex() {
        assert!(matches!(
            "abcd".parse::<Hash>(),
            Err(HexError::BadLength(4))
        ));
        assert!("zz".repeat(32).parse::<Hash>().is_err());
    }

    #[test]
    fn wire_round_trip() {
        let h = Hash::digest(b"wire");
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), Hash::SIZE);
        assert_eq!(Hash::from_bytes(&bytes).unwrap(), h);
    }
}
