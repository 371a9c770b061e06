//! Canonical binary writer.

use bytes::{BufMut, BytesMut};

use crate::Encode;

/// Append-only writer producing the canonical encoding.
///
/// Varuints follow the compact convention: values below `0xFD` are a single
/// byte; larger values are tagged `0xFD`/`0xFE`/`0xFF` followed by a
/// little-endian u16/u32/u64. The writer always emits the shortest form, so
/// encoding is canonical.
#[derive(Debug, Default)]
pub struct BinWriter {
    buf: BytesMut,
}

impl BinWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.put_u16_le(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.put_u32_le(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.put_u64_le(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.put_u8(v as u8);
    }

    /// Raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Compact varuint.
    pub fn write_var_uint(&mut self, v: u64) {
        if v < 0xFD {
            self.buf.put_u8(v as u8);
        } else if v <= u16::MAX as u64 {
            self.buf.put_u8(0xFD);
            self.buf.put_u16_le(v as u16);
        } else if v <= u32::MAX as u64 {
            self.buf.put_u8(0xFE);
            self.buf.put_u32_le(v as u32);
        } else {
            self.buf.put_u8(0xFF);
            self.buf.put_u64_le(v);
        }
    }

    /// Varuint length prefix followed by the raw bytes.
    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_uint(bytes.len() as u64);
        self.buf.put_slice(bytes);
    }

    /// Varuint count prefix followed by each element's encoding.
    pub fn write_array<T: Encode>(&mut self, items: &[T]) {
        self.write_var_uint(items.len() as u64);
        for item in items {
            item.encode(self);
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut w = BinWriter::new();
        w.write_u16(0x0102);
        w.write_u32(0x03040506);
        assert_eq!(w.into_bytes(), vec![0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);
    }

    #[test]
    fn var_uint_picks_shortest_form() {
        let cases: &[(u64, usize)] = &[
            (0, 1),
            (0xFC, 1),
            (0xFD, 3),
            (0xFFFF, 3),
            (0x1_0000, 5),
            (0xFFFF_FFFF, 5),
            (0x1_0000_0000, 9),
        ];
        for &(v, expected_len) in cases {
            let mut w = BinWriter::new();
            w.write_var_uint(v);
            assert_eq!(w.len(), expected_len, "value {v:#x}");
        }
    }

    #[test]
    fn var_bytes_prefixes_length() {
        let mut w = BinWriter::new();
        w.write_var_bytes(&[0xAA, 0xBB]);
        assert_eq!(w.into_bytes(), vec![2, 0xAA, 0xBB]);
    }
}
