//! Support functions for system calls that involve file descriptors.
//!
//! Everything here is a thin layer over `open_namei`, the file table and
//! the per-inode I/O routines: validate the descriptor, dispatch on the
//! inode flavor, keep the file position up to date.

use bitflags::bitflags;
use scopeguard::guard;

use crate::error::{Error, Result};
use crate::fs::inode::Content;
use crate::fs::stat::{Mode, Stat};
use crate::fs::{current_time, Mfs};
use crate::param::NR_OPEN;
use crate::proc::Proc;
use crate::user::{UserBuf, UserBufMut};

bitflags! {
    /// Open flags.  The low two bits are the access mode.
    pub struct OpenFlags: u32 {
        const O_RDONLY = 0;
        const O_WRONLY = 0o1;
        const O_RDWR = 0o2;
        const O_CREAT = 0o100;
        const O_EXCL = 0o200;
        const O_TRUNC = 0o1000;
        const O_APPEND = 0o2000;
    }
}

/// `lseek` origins.
pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

impl Mfs {
    /// Opens (and possibly creates) the file named by `path`, returning
    /// the lowest free descriptor.
    pub fn open(&self, proc: &mut Proc, path: &[u8], flags: OpenFlags, mode: u16) -> Result<usize> {
        let fd = proc.free_fd()?;
        let acc = flags.bits() & 0o3;
        let fidx = self.alloc_file(flags, acc != 0o1, acc == 0o1 || acc == 0o2)?;
        let inode = match self.open_namei(proc, path, flags, mode) {
            Ok(inode) => inode,
            Err(e) => {
                self.discard_file(fidx);
                return Err(e);
            }
        };
        {
            let guard = self.ilock(&inode);
            if guard.mode.is_blk() {
                let dev = guard.rdev() as u32;
                drop(guard);
                self.check_disk_change(dev);
            }
        }
        self.install_file_inode(fidx, inode);
        proc.files[fd] = Some(fidx);
        Ok(fd)
    }

    pub fn creat(&self, proc: &mut Proc, path: &[u8], mode: u16) -> Result<usize> {
        self.open(
            proc,
            path,
            OpenFlags::O_CREAT | OpenFlags::O_TRUNC | OpenFlags::O_WRONLY,
            mode,
        )
    }

    pub fn close(&self, proc: &mut Proc, fd: usize) -> Result<()> {
        if fd >= NR_OPEN {
            return Err(Error::BadF);
        }
        let fidx = proc.files[fd].take().ok_or(Error::BadF)?;
        if let Some(inode) = self.put_file(fidx) {
            self.iput(inode);
        }
        Ok(())
    }

    /// Duplicates a descriptor onto the lowest free slot.
    pub fn dup(&self, proc: &mut Proc, fd: usize) -> Result<usize> {
        let fidx = *proc
            .files
            .get(fd)
            .and_then(|f| f.as_ref())
            .ok_or(Error::BadF)?;
        let newfd = proc.free_fd()?;
        self.dup_file(fidx);
        proc.files[newfd] = Some(fidx);
        Ok(newfd)
    }

    /// Repositions a descriptor.  Pipes cannot seek.
    pub fn lseek(&self, proc: &mut Proc, fd: usize, offset: i64, origin: i32) -> Result<u32> {
        let fidx = *proc
            .files
            .get(fd)
            .and_then(|f| f.as_ref())
            .ok_or(Error::BadF)?;
        let (_, _, _, pos, ip) = self.file_snapshot(fidx)?;
        let ip = guard(ip, |ip| self.iput(ip));
        if self.inode_is_pipe(&ip) {
            return Err(Error::SPipe);
        }
        let new = match origin {
            SEEK_SET => offset,
            SEEK_CUR => pos as i64 + offset,
            SEEK_END => {
                let size = self.ilock(&ip).size;
                size as i64 + offset
            }
            _ => return Err(Error::Inval),
        };
        if new < 0 {
            return Err(Error::Inval);
        }
        self.set_file_pos(fidx, new as u32);
        Ok(new as u32)
    }

    /// Reads from a descriptor into `buf`, advancing the file position.
    pub fn read<B: UserBufMut + ?Sized>(
        &self,
        proc: &mut Proc,
        fd: usize,
        buf: &mut B,
        count: usize,
    ) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let fidx = *proc
            .files
            .get(fd)
            .and_then(|f| f.as_ref())
            .ok_or(Error::BadF)?;
        let (readable, _, _, pos, ip) = self.file_snapshot(fidx)?;
        let ip = guard(ip, |ip| self.iput(ip));

        if self.inode_is_pipe(&ip) {
            if !readable {
                return Err(Error::Io);
            }
            return self.read_pipe(&ip, buf, count);
        }
        let (mode, rdev, size) = {
            let g = self.ilock(&ip);
            (g.mode, g.rdev(), g.size)
        };
        if mode.is_chr() {
            return Err(Error::NoDev);
        }
        if mode.is_blk() {
            let mut p = pos;
            let done = self.block_read(rdev as u32, &mut p, buf, count)?;
            self.set_file_pos(fidx, p);
            return Ok(done);
        }
        if mode.is_dir() || mode.is_reg() {
            let count = count.min((size as usize).saturating_sub(pos as usize));
            if count == 0 {
                return Ok(0);
            }
            let mut g = self.ilock(&ip);
            let mut p = pos;
            let done = self.file_read(&mut g, &mut p, buf, count)?;
            drop(g);
            self.set_file_pos(fidx, p);
            return Ok(done);
        }
        printk!("(Read)inode->i_mode={:06o}", mode.0);
        Err(Error::Inval)
    }

    /// Writes `buf` to a descriptor, advancing the file position.
    pub fn write<B: UserBuf + ?Sized>(
        &self,
        proc: &mut Proc,
        fd: usize,
        buf: &B,
        count: usize,
    ) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }
        let fidx = *proc
            .files
            .get(fd)
            .and_then(|f| f.as_ref())
            .ok_or(Error::BadF)?;
        let (_, writable, flags, pos, ip) = self.file_snapshot(fidx)?;
        let ip = guard(ip, |ip| self.iput(ip));

        if self.inode_is_pipe(&ip) {
            if !writable {
                return Err(Error::Io);
            }
            return self.write_pipe(proc, &ip, buf, count);
        }
        let (mode, rdev) = {
            let g = self.ilock(&ip);
            (g.mode, g.rdev())
        };
        if mode.is_chr() {
            return Err(Error::NoDev);
        }
        if mode.is_blk() {
            let mut p = pos;
            let done = self.block_write(rdev as u32, &mut p, buf, count)?;
            self.set_file_pos(fidx, p);
            return Ok(done);
        }
        if mode.is_reg() {
            let mut g = self.ilock(&ip);
            let mut p = pos;
            let done = self.file_write(&mut g, flags, &mut p, buf, count)?;
            drop(g);
            if !flags.contains(OpenFlags::O_APPEND) {
                self.set_file_pos(fidx, p);
            }
            return Ok(done);
        }
        /* directories are written through link and friends only */
        printk!("(Write)inode->i_mode={:06o}", mode.0);
        Err(Error::Inval)
    }

    /// Creates a pipe; returns (read end, write end).
    pub fn pipe(&self, proc: &mut Proc) -> Result<(usize, usize)> {
        let f0 = self.alloc_file(OpenFlags::O_RDONLY, true, false)?;
        let f1 = match self.alloc_file(OpenFlags::O_WRONLY, false, true) {
            Ok(f1) => f1,
            Err(e) => {
                self.discard_file(f0);
                return Err(e);
            }
        };
        let fd0 = match proc.free_fd() {
            Ok(fd) => fd,
            Err(e) => {
                self.discard_file(f0);
                self.discard_file(f1);
                return Err(e);
            }
        };
        proc.files[fd0] = Some(f0);
        let fd1 = match proc.free_fd() {
            Ok(fd) => fd,
            Err(e) => {
                proc.files[fd0] = None;
                self.discard_file(f0);
                self.discard_file(f1);
                return Err(e);
            }
        };
        proc.files[fd1] = Some(f1);

        let inode = self.get_pipe_inode();
        let second = self.pipe_second_ref(&inode);
        self.install_file_inode(f0, inode);
        self.install_file_inode(f1, second);
        Ok((fd0, fd1))
    }

    /// Metadata of the file named by `path`.
    pub fn stat(&self, proc: &Proc, path: &[u8]) -> Result<Stat> {
        let ip = self.namei(proc, path)?;
        let st = self.stat_inode(&ip);
        self.iput(ip);
        Ok(st)
    }

    /// Metadata of an open descriptor.
    pub fn fstat(&self, proc: &Proc, fd: usize) -> Result<Stat> {
        let fidx = *proc
            .files
            .get(fd)
            .and_then(|f| f.as_ref())
            .ok_or(Error::BadF)?;
        let (_, _, _, _, ip) = self.file_snapshot(fidx)?;
        let st = self.stat_inode(&ip);
        self.iput(ip);
        Ok(st)
    }

    fn stat_inode(&self, ip: &crate::fs::InodePtr) -> Stat {
        let g = self.ilock(ip);
        Stat {
            dev: g.dev,
            ino: g.inum,
            mode: g.mode,
            nlink: g.nlinks,
            uid: g.uid,
            gid: g.gid,
            rdev: g.rdev(),
            size: match g.content {
                Content::Pipe(_) => 0,
                _ => g.size,
            },
            atime: g.atime,
            mtime: g.mtime,
            ctime: g.ctime,
        }
    }

    /// Checks accessibility of `path` against the *real* ids.
    pub fn access(&self, proc: &Proc, path: &[u8], mode: u16) -> Result<()> {
        let mode = mode & 0o007;
        let ip = self.namei(proc, path).map_err(|_| Error::Acces)?;
        // Read the owner fields before the inode goes back: the slot may
        // be reused the moment it is released.
        let (perms, uid, gid) = {
            let g = self.ilock(&ip);
            (g.mode.perms(), g.uid, g.gid)
        };
        self.iput(ip);
        let mut res = perms;
        if proc.uid == uid {
            res >>= 6;
        } else if proc.gid == gid {
            res >>= 3;
        }
        if res & 0o007 & mode == mode {
            return Ok(());
        }
        /*
         * The super-user gets everything except execute, which needs at
         * least one x bit somewhere.
         */
        if proc.uid == 0 && (mode & 1 == 0 || perms & 0o111 != 0) {
            return Ok(());
        }
        Err(Error::Acces)
    }

    /// Changes the working directory.
    pub fn chdir(&self, proc: &mut Proc, path: &[u8]) -> Result<()> {
        let ip = self.namei(proc, path)?;
        {
            let g = self.ilock(&ip);
            if !g.mode.is_dir() {
                drop(g);
                self.iput(ip);
                return Err(Error::NotDir);
            }
        }
        if let Some(old) = proc.pwd.replace(ip) {
            self.iput(old);
        }
        Ok(())
    }

    /// Changes the root directory: `..` will not resolve above it.
    pub fn chroot(&self, proc: &mut Proc, path: &[u8]) -> Result<()> {
        let ip = self.namei(proc, path)?;
        {
            let g = self.ilock(&ip);
            if !g.mode.is_dir() {
                drop(g);
                self.iput(ip);
                return Err(Error::NotDir);
            }
        }
        if let Some(old) = proc.root.replace(ip) {
            self.iput(old);
        }
        Ok(())
    }

    /// Changes permission bits.  Owner or superuser only.
    pub fn chmod(&self, proc: &Proc, path: &[u8], mode: u16) -> Result<()> {
        let ip = self.namei(proc, path)?;
        let ip = guard(ip, |ip| self.iput(ip));
        let mut g = self.ilock(&ip);
        if proc.euid != g.uid && !proc.suser() {
            return Err(Error::Acces);
        }
        g.mode = Mode((mode & 0o7777) | (g.mode.0 & !0o7777));
        g.mark_dirty();
        Ok(())
    }

    /// Changes ownership.  Superuser only in this filesystem.
    pub fn chown(&self, proc: &Proc, path: &[u8], uid: u16, gid: u8) -> Result<()> {
        let ip = self.namei(proc, path)?;
        let ip = guard(ip, |ip| self.iput(ip));
        if !proc.suser() {
            return Err(Error::Acces);
        }
        let mut g = self.ilock(&ip);
        g.uid = uid;
        g.gid = gid;
        g.mark_dirty();
        Ok(())
    }

    /// Sets access and modification times, defaulting both to now.
    pub fn utime(&self, proc: &Proc, path: &[u8], times: Option<(u32, u32)>) -> Result<()> {
        let ip = self.namei(proc, path)?;
        let (atime, mtime) = times.unwrap_or_else(|| {
            let now = current_time();
            (now, now)
        });
        let mut g = self.ilock(&ip);
        g.atime = atime;
        g.mtime = mtime;
        g.mark_dirty();
        drop(g);
        self.iput(ip);
        Ok(())
    }
}
