//! Typed cursors over byte slices.
//!
//! [`ByteWriter`] grows a buffer and is the single source of truth for the
//! packed layouts; [`ByteReader`] walks one with an endian-flip flag fixed
//! at construction. Scalars flip, opaque byte runs never do.

use byteorder::{ByteOrder, NativeEndian};
use glam::Vec3;

use crate::errors::{RaynetError, Result};

/// Growable byte buffer with typed, order-aware writes.
///
/// A [`Self::swapped`] writer emits every scalar byte-reversed, which is
/// how a sender produces the peer's byte order when the endian handshake
/// showed a mismatch.
#[derive(Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
    swap: bool,
}

/// Marker returned by [`ByteWriter::begin_section`], consumed by
/// [`ByteWriter::end_section`] to patch the section's length prefix.
#[derive(Debug, Clone, Copy)]
#[must_use]
pub struct SectionMark(usize);

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            swap: false,
        }
    }

    /// Writer that byte-reverses every scalar record.
    pub fn swapped() -> Self {
        Self {
            buf: Vec::new(),
            swap: true,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        let v = if self.swap { v.swap_bytes() } else { v };
        let mut b = [0u8; 2];
        NativeEndian::write_u16(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    pub fn write_u32(&mut self, v: u32) {
        let v = if self.swap { v.swap_bytes() } else { v };
        let mut b = [0u8; 4];
        NativeEndian::write_u32(&mut b, v);
        self.buf.extend_from_slice(&b);
    }

    pub fn write_i16(&mut self, v: i16) {
        self.write_u16(v as u16);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    /// Opaque bytes, never flipped.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed, NUL-terminated name: `u8 len` counts the terminator.
    pub fn write_name(&mut self, name: &str) {
        debug_assert!(name.len() < 255);
        self.write_u8((name.len() + 1) as u8);
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.push(0);
    }

    /// Reserve a `u32` length prefix; [`Self::end_section`] fills it in with
    /// the number of bytes written since.
    pub fn begin_section(&mut self) -> SectionMark {
        let mark = SectionMark(self.buf.len());
        self.write_u32(0);
        mark
    }

    pub fn end_section(&mut self, mark: SectionMark) {
        let len = (self.buf.len() - mark.0 - 4) as u32;
        let len = if self.swap { len.swap_bytes() } else { len };
        NativeEndian::write_u32(&mut self.buf[mark.0..mark.0 + 4], len);
    }
}

/// Read cursor over a byte slice.
///
/// Constructed once per stream with the flip flag the endian handshake
/// produced; every scalar read honors it, [`Self::read_bytes`] does not.
#[derive(Debug)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
    flip: bool,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8], flip: bool) -> Self {
        Self { buf, pos: 0, flip }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn flips(&self) -> bool {
        self.flip
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(RaynetError::Truncated {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let v = NativeEndian::read_u16(self.take(2)?);
        Ok(if self.flip { v.swap_bytes() } else { v })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let v = NativeEndian::read_u32(self.take(4)?);
        Ok(if self.flip { v.swap_bytes() } else { v })
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Opaque bytes, never flipped.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.take(n)
    }

    /// Counterpart of [`ByteWriter::write_name`].
    pub fn read_name(&mut self) -> Result<String> {
        let len = self.read_u8()? as usize;
        let raw = self.take(len)?;
        let trimmed = raw.strip_suffix(&[0]).unwrap_or(raw);
        Ok(String::from_utf8_lossy(trimmed).into_owned())
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip_native() {
        let mut w = ByteWriter::new();
        w.write_u16(0xBEEF);
        w.write_u32(0xDEAD_BEEF);
        w.write_f32(1.5);
        w.write_i16(-7);
        let buf = w.into_vec();

        let mut r = ByteReader::new(&buf, false);
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_i16().unwrap(), -7);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn scalar_round_trip_swapped() {
        let mut w = ByteWriter::swapped();
        w.write_u32(0x0102_0304);
        w.write_f32(-2.25);
        let buf = w.into_vec();

        // A flipping reader undoes a swapping writer bit-exactly.
        let mut r = ByteReader::new(&buf, true);
        assert_eq!(r.read_u32().unwrap(), 0x0102_0304);
        assert_eq!(r.read_f32().unwrap(), -2.25);
    }

    #[test]
    fn opaque_bytes_never_flip() {
        let mut w = ByteWriter::swapped();
        w.write_bytes(&[1, 2, 3, 4]);
        let buf = w.into_vec();
        let mut r = ByteReader::new(&buf, true);
        assert_eq!(r.read_bytes(4).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn section_length_patched() {
        let mut w = ByteWriter::new();
        let mark = w.begin_section();
        w.write_u32(11);
        w.write_u8(200);
        w.end_section(mark);
        let buf = w.into_vec();

        let mut r = ByteReader::new(&buf, false);
        assert_eq!(r.read_u32().unwrap(), 5);
        assert_eq!(r.read_u32().unwrap(), 11);
        assert_eq!(r.read_u8().unwrap(), 200);
    }

    #[test]
    fn name_round_trip() {
        let mut w = ByteWriter::new();
        w.write_name("turret");
        let buf = w.into_vec();
        assert_eq!(buf.len(), 1 + 6 + 1);
        let mut r = ByteReader::new(&buf, false);
        assert_eq!(r.read_name().unwrap(), "turret");
    }

    #[test]
    fn truncated_read_reports_remaining() {
        let buf = [0u8; 2];
        let mut r = ByteReader::new(&buf, false);
        match r.read_u32() {
            Err(crate::errors::RaynetError::Truncated { needed, remaining }) => {
                assert_eq!(needed, 4);
                assert_eq!(remaining, 2);
            }
            other => panic!("expected truncation, got {other:?}"),
        }
    }
}
