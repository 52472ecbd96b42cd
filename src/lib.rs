//! A block-addressed Minix-v1 filesystem core.
//!
//! This crate carries the filesystem heart of an early UNIX-like kernel:
//! the buffer cache, the bitmap allocators, the in-memory inode table,
//! file-block mapping, path resolution with chroot and mount-point
//! semantics, a bounded mount table, and pipe inodes.  Device drivers,
//! character I/O, scheduling and executable loading are external
//! collaborators; the only thing the core asks of a device is
//! `BlockDevice::submit`.
//!
//! `fs::Mfs` owns every shared table.  A typical embedding registers a
//! block device, mounts it as root, and drives the descriptor-level
//! calls in `sysfile` with a `Proc` describing the calling task:
//!
//! ```ignore
//! let fs = Mfs::new(NR_BUFFERS);
//! fs.register_device(ROOT_DEV, Arc::new(disk));
//! fs.mount_root(ROOT_DEV)?;
//! let mut proc = fs.init_proc();
//! let fd = fs.open(&mut proc, b"/etc/motd", OpenFlags::O_RDONLY, 0)?;
//! ```

#[macro_use]
mod printk;

pub mod bio;
pub mod dev;
pub mod error;
pub mod file;
pub mod fs;
pub mod lock;
pub mod param;
pub mod pipe;
pub mod proc;
pub mod sysfile;
pub mod user;

pub use error::{Error, Result};
pub use fs::{Mfs, Mode, Stat};
pub use proc::{Proc, SIGPIPE};
pub use sysfile::{OpenFlags, SEEK_CUR, SEEK_END, SEEK_SET};
