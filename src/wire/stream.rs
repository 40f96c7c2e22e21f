//! Blocking socket transfer.
//!
//! Every transfer is all-or-error: `send_all` writes exactly its buffer,
//! `recv_all` reads exactly its buffer, short transfers retry inside the
//! standard library and a closed peer surfaces as an `Io` error the caller
//! propagates upward.

use std::io::{Read, Write};

use glam::Vec3;

use crate::errors::Result;
use crate::wire::{ByteReader, ByteWriter};

/// Write exactly `buf.len()` bytes.
pub fn send_all<W: Write>(w: &mut W, buf: &[u8]) -> Result<()> {
    w.write_all(buf)?;
    Ok(())
}

/// Read exactly `buf.len()` bytes.
pub fn recv_all<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf)?;
    Ok(())
}

/// A socket (or any `Read + Write`) with the connection's flip flag baked
/// in. Scalar sends are converted *to* the peer's byte order and scalar
/// receives *from* it, so a master built with `flip = false` and an
/// observer built from the endian probe speak the same wire bytes.
#[derive(Debug)]
pub struct WireStream<S> {
    inner: S,
    flip: bool,
}

impl<S: Read + Write> WireStream<S> {
    pub fn new(inner: S, flip: bool) -> Self {
        Self { inner, flip }
    }

    pub fn flips(&self) -> bool {
        self.flip
    }

    /// Replace the flip flag once the endian handshake has run.
    pub fn set_flip(&mut self, flip: bool) {
        self.flip = flip;
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    fn writer(&self) -> ByteWriter {
        if self.flip {
            ByteWriter::swapped()
        } else {
            ByteWriter::new()
        }
    }

    // ------------------------------------------------------------------
    // Sends
    // ------------------------------------------------------------------

    pub fn send_u8(&mut self, v: u8) -> Result<()> {
        send_all(&mut self.inner, &[v])
    }

    pub fn send_u16(&mut self, v: u16) -> Result<()> {
        let mut w = self.writer();
        w.write_u16(v);
        send_all(&mut self.inner, &w.into_vec())
    }

    pub fn send_u32(&mut self, v: u32) -> Result<()> {
        let mut w = self.writer();
        w.write_u32(v);
        send_all(&mut self.inner, &w.into_vec())
    }

    pub fn send_f32(&mut self, v: f32) -> Result<()> {
        let mut w = self.writer();
        w.write_f32(v);
        send_all(&mut self.inner, &w.into_vec())
    }

    pub fn send_vec3(&mut self, v: Vec3) -> Result<()> {
        let mut w = self.writer();
        w.write_vec3(v);
        send_all(&mut self.inner, &w.into_vec())
    }

    pub fn send_bytes(&mut self, buf: &[u8]) -> Result<()> {
        send_all(&mut self.inner, buf)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Receives
    // ------------------------------------------------------------------

    pub fn recv_u8(&mut self) -> Result<u8> {
        let mut b = [0u8; 1];
        recv_all(&mut self.inner, &mut b)?;
        Ok(b[0])
    }

    pub fn recv_u16(&mut self) -> Result<u16> {
        let mut b = [0u8; 2];
        recv_all(&mut self.inner, &mut b)?;
        ByteReader::new(&b, self.flip).read_u16()
    }

    pub fn recv_u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        recv_all(&mut self.inner, &mut b)?;
        ByteReader::new(&b, self.flip).read_u32()
    }

    pub fn recv_i16(&mut self) -> Result<i16> {
        let mut b = [0u8; 2];
        recv_all(&mut self.inner, &mut b)?;
        ByteReader::new(&b, self.flip).read_i16()
    }

    pub fn recv_f32(&mut self) -> Result<f32> {
        let mut b = [0u8; 4];
        recv_all(&mut self.inner, &mut b)?;
        ByteReader::new(&b, self.flip).read_f32()
    }

    pub fn recv_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(
            self.recv_f32()?,
            self.recv_f32()?,
            self.recv_f32()?,
        ))
    }

    pub fn recv_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        recv_all(&mut self.inner, buf)
    }

    pub fn recv_vec(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        recv_all(&mut self.inner, &mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stream_scalars_flip_symmetrically() {
        // A flipping sender produces bytes a native reader sees reversed.
        let mut tx = WireStream::new(Cursor::new(Vec::new()), true);
        tx.send_u32(0x0A0B_0C0D).unwrap();
        tx.send_f32(3.5).unwrap();
        let bytes = tx.get_ref().get_ref().clone();

        let mut rx = WireStream::new(Cursor::new(bytes.clone()), true);
        assert_eq!(rx.recv_u32().unwrap(), 0x0A0B_0C0D);
        assert_eq!(rx.recv_f32().unwrap(), 3.5);

        let mut native = WireStream::new(Cursor::new(bytes), false);
        assert_eq!(native.recv_u32().unwrap(), 0x0D0C_0B0A);
    }

    #[test]
    fn recv_on_short_stream_errors() {
        let mut rx = WireStream::new(Cursor::new(vec![1u8, 2]), false);
        assert!(rx.recv_u32().is_err());
    }
}
