//! User-segment memory access.
//!
//! File data crosses the kernel boundary through these traits rather than
//! through raw pointers into the user segment.  The kernel boundary
//! supplies the real implementation (page-table walks, fault handling);
//! plain byte slices implement them for kernel-internal copies and tests.

use crate::error::Result;

/// A readable user-space buffer.
pub trait UserBuf {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads one byte at `off`.
    fn read_byte(&self, off: usize) -> Result<u8>;

    /// Reads `dst.len()` bytes starting at `off`.
    fn read_bytes(&self, off: usize, dst: &mut [u8]) -> Result<()> {
        for (i, b) in dst.iter_mut().enumerate() {
            *b = self.read_byte(off + i)?;
        }
        Ok(())
    }
}

/// A writable user-space buffer.
pub trait UserBufMut {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes one byte at `off`.
    fn write_byte(&mut self, off: usize, val: u8) -> Result<()>;

    /// Writes `src` starting at `off`.
    fn write_bytes(&mut self, off: usize, src: &[u8]) -> Result<()> {
        for (i, &b) in src.iter().enumerate() {
            self.write_byte(off + i, b)?;
        }
        Ok(())
    }

    /// Writes `n` zero bytes starting at `off`.  Hole reads land here.
    fn fill_zero(&mut self, off: usize, n: usize) -> Result<()> {
        for i in 0..n {
            self.write_byte(off + i, 0)?;
        }
        Ok(())
    }
}

impl UserBuf for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn read_byte(&self, off: usize) -> Result<u8> {
        Ok(self[off])
    }

    fn read_bytes(&self, off: usize, dst: &mut [u8]) -> Result<()> {
        dst.copy_from_slice(&self[off..off + dst.len()]);
        Ok(())
    }
}

impl UserBufMut for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn write_byte(&mut self, off: usize, val: u8) -> Result<()> {
        self[off] = val;
        Ok(())
    }

    fn write_bytes(&mut self, off: usize, src: &[u8]) -> Result<()> {
        self[off..off + src.len()].copy_from_slice(src);
        Ok(())
    }

    fn fill_zero(&mut self, off: usize, n: usize) -> Result<()> {
        for b in &mut self[off..off + n] {
            *b = 0;
        }
        Ok(())
    }
}
