//! Errors reported to the layers above the filesystem core.
//!
//! Corruption of kernel state (double-freed bitmap bits, releasing an
//! unreferenced inode, a mangled free list) is not an `Error`; those
//! conditions panic, since continuing would scribble on the disk.

/// Unix-style error kinds surfaced by filesystem operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// I/O error.
    Io,
    /// No such file or directory.
    NoEnt,
    /// Permission denied.
    Acces,
    /// Operation not permitted.
    Perm,
    /// File exists.
    Exist,
    /// Not a directory.
    NotDir,
    /// Is a directory.
    IsDir,
    /// Directory not empty.
    NotEmpty,
    /// No space left on device.
    NoSpc,
    /// Not enough memory.
    NoMem,
    /// Device or resource busy.
    Busy,
    /// Cross-device link.
    XDev,
    /// Bad file descriptor.
    BadF,
    /// Invalid argument.
    Inval,
    /// Too many open files in this process.
    MFile,
    /// Too many open files in the system.
    NFile,
    /// Broken pipe.
    Pipe,
    /// Illegal seek.
    SPipe,
    /// Block device required.
    NotBlk,
    /// No such device.
    NoDev,
    /// No such device or address.
    NxIo,
    /// Bad user-space address.
    Fault,
}

pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    /// The conventional errno value, for callers that speak numbers.
    pub fn errno(self) -> i32 {
        match self {
            Error::Io => 5,
            Error::NoEnt => 2,
            Error::Acces => 13,
            Error::Perm => 1,
            Error::Exist => 17,
            Error::NotDir => 20,
            Error::IsDir => 21,
            Error::NotEmpty => 39,
            Error::NoSpc => 28,
            Error::NoMem => 12,
            Error::Busy => 16,
            Error::XDev => 18,
            Error::BadF => 9,
            Error::Inval => 22,
            Error::MFile => 24,
            Error::NFile => 23,
            Error::Pipe => 32,
            Error::SPipe => 29,
            Error::NotBlk => 15,
            Error::NoDev => 19,
            Error::NxIo => 6,
            Error::Fault => 14,
        }
    }
}
