//! Filesystem implementation.  Layers, bottom to top:
//!   + Buffers: the block cache (`bio`), sole owner of device I/O.
//!   + Bitmaps: allocators for on-disk inodes and data zones.
//!   + Inodes: the in-memory inode table, block mapping, truncation.
//!   + Directories: inodes with special contents (lists of other inodes!).
//!   + Names: paths like /usr/src/mfs for convenient naming.
//!
//! `Mfs` bundles the tables the original kernel kept as globals: the
//! buffer cache, the inode table, the superblock table and the system
//! file table.  The descriptor-level entry points live in `sysfile`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::bio::Bcache;
use crate::file::Ftable;
use crate::lock::SpinLock;

pub mod bitmap;
pub mod inode;
pub mod path;
pub mod stat;
pub mod superblock;

pub use inode::InodePtr;
pub use stat::{Mode, Stat};

pub(crate) use inode::Itable;
pub(crate) use superblock::MountTable;

/// The filesystem core: every shared table behind its own lock.
pub struct Mfs {
    pub(crate) bcache: Bcache,
    pub(crate) itable: Itable,
    pub(crate) mounts: MountTable,
    pub(crate) ftable: Ftable,
    pub(crate) root_dev: SpinLock<u32>,
}

impl Mfs {
    /// Creates a core with `nbuf` cache buffers.  Register a device and
    /// `mount_root` before resolving any path.
    pub fn new(nbuf: usize) -> Self {
        Self {
            bcache: Bcache::new(nbuf),
            itable: Itable::new(),
            mounts: MountTable::new(),
            ftable: Ftable::new(),
            root_dev: SpinLock::new(0),
        }
    }

    /// Makes `disk` available as device `dev`.
    pub fn register_device(&self, dev: u32, disk: std::sync::Arc<dyn crate::dev::BlockDevice>) {
        self.bcache.register_device(dev, disk);
    }

    /// Writes all modified inodes and buffers back to their devices.
    pub fn sync(&self) {
        self.sync_inodes(); /* write out inodes into buffers */
        self.bcache.flush_all();
    }

    /// Flushes one device: buffers, then inodes dirtied meanwhile, then
    /// the buffers those inode writes dirtied.
    pub fn sync_dev(&self, dev: u32) {
        self.bcache.flush_dev(dev);
        self.sync_inodes();
        self.bcache.flush_dev(dev);
    }
}

/// Seconds since the epoch, the timestamp unit of the on-disk format.
pub(crate) fn current_time() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
