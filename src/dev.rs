//! The block-device seam.
//!
//! The cache is the only component that talks to a device, and it does so
//! through `BlockDevice::submit` alone.  A request carries the buffer's
//! data block; the cache sets the buffer's `locked` flag before submitting
//! and performs the `uptodate`/`dirty` transitions a completion interrupt
//! would perform once `submit` returns.

use std::sync::Mutex;
use std::sync::PoisonError;

use crate::error::{Error, Result};
use crate::param::BLOCK_SIZE;

/// What a request asks the device to do.  The `*Ahead` kinds are
/// speculative: the submitter does not wait for them and ignores failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    Read,
    Write,
    ReadAhead,
    WriteAhead,
}

impl IoKind {
    pub fn is_read(self) -> bool {
        matches!(self, IoKind::Read | IoKind::ReadAhead)
    }
}

/// One block transfer.  For reads the device fills `data`; for writes it
/// consumes it.
pub struct Request<'a> {
    pub kind: IoKind,
    pub blockno: u32,
    pub data: &'a mut [u8; BLOCK_SIZE],
}

pub trait BlockDevice: Send + Sync {
    /// Performs one block transfer.  Completion is signalled by returning;
    /// the cache owns the buffer-state transitions around this call.
    fn submit(&self, req: Request<'_>) -> Result<()>;

    /// Whether the medium was changed since the last check.  Removable
    /// media report `true` once per change; fixed devices never do.
    fn check_media_change(&self) -> bool {
        false
    }
}

/// A RAM-backed block device.
///
/// Serves as the root disk in tests and keeps a log of completed requests
/// so callers can assert on I/O ordering (e.g. that a dirty victim was
/// written out before its buffer was recycled).
pub struct RamDisk {
    data: Mutex<Vec<u8>>,
    log: Mutex<Vec<(IoKind, u32)>>,
}

impl RamDisk {
    pub fn new(nblocks: usize) -> Self {
        Self::from_image(vec![0; nblocks * BLOCK_SIZE])
    }

    /// Builds the disk around an existing image; the length must be a
    /// whole number of blocks.
    pub fn from_image(image: Vec<u8>) -> Self {
        assert_eq!(image.len() % BLOCK_SIZE, 0, "partial trailing block");
        Self {
            data: Mutex::new(image),
            log: Mutex::new(Vec::new()),
        }
    }

    pub fn nblocks(&self) -> usize {
        self.lock_data().len() / BLOCK_SIZE
    }

    /// A copy of the current image.
    pub fn snapshot(&self) -> Vec<u8> {
        self.lock_data().clone()
    }

    /// Drains the request log.
    pub fn take_log(&self) -> Vec<(IoKind, u32)> {
        std::mem::take(&mut *self.log.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn lock_data(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BlockDevice for RamDisk {
    fn submit(&self, req: Request<'_>) -> Result<()> {
        let mut data = self.lock_data();
        let start = req.blockno as usize * BLOCK_SIZE;
        let end = start + BLOCK_SIZE;
        if end > data.len() {
            return Err(Error::Io);
        }
        match req.kind {
            IoKind::Read | IoKind::ReadAhead => req.data.copy_from_slice(&data[start..end]),
            IoKind::Write | IoKind::WriteAhead => data[start..end].copy_from_slice(req.data),
        }
        drop(data);
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((req.kind, req.blockno));
        Ok(())
    }
}
