//! The per-process state the filesystem core cares about.
//!
//! Process creation, scheduling and signal delivery live outside this
//! subsystem; a `Proc` is just the slice of a task the filesystem reads
//! and writes: credentials, the file-creation mask, the root and working
//! directories, the open-file table and the pending-signal mask.

use crate::error::{Error, Result};
use crate::fs::{InodePtr, Mfs};
use crate::param::NR_OPEN;

/// Signal number raised on a writer whose pipe has no readers.
pub const SIGPIPE: u32 = 13;

pub struct Proc {
    pub uid: u16,
    pub euid: u16,
    pub gid: u8,
    pub egid: u8,
    /// File-creation mode mask.
    pub umask: u16,
    /// Root directory; `..` never resolves above it.
    pub(crate) root: Option<InodePtr>,
    /// Current working directory.
    pub(crate) pwd: Option<InodePtr>,
    /// Descriptors: indices into the system file table.
    pub(crate) files: [Option<usize>; NR_OPEN],
    /// Pending-signal bitmask; bit `n-1` is signal `n`.
    pub signal: u32,
}

impl Proc {
    pub fn suser(&self) -> bool {
        self.euid == 0
    }

    /// Whether `sig` is pending, without clearing it.
    pub fn signal_pending(&self, sig: u32) -> bool {
        self.signal & (1 << (sig - 1)) != 0
    }

    pub(crate) fn raise(&mut self, sig: u32) {
        self.signal |= 1 << (sig - 1);
    }

    /// Lowest free descriptor, the slot every descriptor-returning call
    /// must use.
    pub(crate) fn free_fd(&self) -> Result<usize> {
        self.files
            .iter()
            .position(|f| f.is_none())
            .ok_or(Error::MFile)
    }
}

impl Mfs {
    /// A process rooted at (and working in) the mounted root directory,
    /// with superuser credentials and no open files.
    pub fn init_proc(&self) -> Proc {
        let dev = self.root_dev();
        assert_ne!(dev, 0, "init_proc before mount_root");
        let root = self
            .iget(dev, crate::param::ROOT_INO)
            .expect("unable to read root i-node");
        let pwd = self.idup(&root);
        Proc {
            uid: 0,
            euid: 0,
            gid: 0,
            egid: 0,
            umask: 0o022,
            root: Some(root),
            pwd: Some(pwd),
            files: [None; NR_OPEN],
            signal: 0,
        }
    }

    /// Releases everything a process holds: open files, then the working
    /// and root directory references.
    pub fn exit_proc(&self, proc: &mut Proc) {
        for fd in 0..NR_OPEN {
            if proc.files[fd].is_some() {
                let _ = self.close(proc, fd);
            }
        }
        if let Some(pwd) = proc.pwd.take() {
            self.iput(pwd);
        }
        if let Some(root) = proc.root.take() {
            self.iput(root);
        }
    }
}
