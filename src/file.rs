//! The system file table and file-level I/O.
//!
//! A file table entry joins an inode reference with an access mode and a
//! position; processes share entries through `dup` and inheritance, so
//! the entry is reference counted.  `file_read`/`file_write` move bytes
//! between user buffers and a regular file's blocks; `block_read`/
//! `block_write` do the same against a raw block device, read-modify-
//! writing partial blocks through the cache.

use crate::bio::Buf;
use crate::error::{Error, Result};
use crate::fs::inode::{InodeGuard, InodePtr};
use crate::fs::{current_time, Mfs};
use crate::lock::SpinLock;
use crate::param::{BLOCK_SIZE, BLOCK_SIZE_BITS, NR_FILE};
use crate::sysfile::OpenFlags;
use crate::user::{UserBuf, UserBufMut};

pub(crate) struct File {
    pub count: u32,
    pub flags: OpenFlags,
    pub readable: bool,
    pub writable: bool,
    pub inode: Option<InodePtr>,
    pub pos: u32,
}

impl File {
    const fn empty() -> Self {
        Self {
            count: 0,
            flags: OpenFlags::empty(),
            readable: false,
            writable: false,
            inode: None,
            pos: 0,
        }
    }
}

pub(crate) struct Ftable {
    slots: SpinLock<[File; NR_FILE]>,
}

impl Ftable {
    pub fn new() -> Self {
        Self {
            slots: SpinLock::new(array_macro::array![_ => File::empty(); NR_FILE]),
        }
    }
}

impl Mfs {
    /// Claims a free file table entry.
    pub(crate) fn alloc_file(
        &self,
        flags: OpenFlags,
        readable: bool,
        writable: bool,
    ) -> Result<usize> {
        let mut slots = self.ftable.slots.lock();
        let idx = slots
            .iter()
            .position(|f| f.count == 0)
            .ok_or(Error::NFile)?;
        slots[idx] = File::empty();
        slots[idx].count = 1;
        slots[idx].flags = flags;
        slots[idx].readable = readable;
        slots[idx].writable = writable;
        Ok(idx)
    }

    /// Attaches the inode an entry describes.
    pub(crate) fn install_file_inode(&self, idx: usize, inode: InodePtr) {
        let mut slots = self.ftable.slots.lock();
        debug_assert!(slots[idx].count > 0);
        slots[idx].inode = Some(inode);
        slots[idx].pos = 0;
    }

    /// Releases a never-installed entry on an aborted open.
    pub(crate) fn discard_file(&self, idx: usize) {
        let mut slots = self.ftable.slots.lock();
        debug_assert!(slots[idx].inode.is_none());
        slots[idx].count = 0;
    }

    pub(crate) fn dup_file(&self, idx: usize) {
        self.ftable.slots.lock()[idx].count += 1;
    }

    /// Drops one reference; on the last one the inode comes back to the
    /// caller for `iput`.
    pub(crate) fn put_file(&self, idx: usize) -> Option<InodePtr> {
        let mut slots = self.ftable.slots.lock();
        if slots[idx].count == 0 {
            panic!("Close: file count is 0");
        }
        slots[idx].count -= 1;
        if slots[idx].count > 0 {
            return None;
        }
        slots[idx].inode.take()
    }

    /// Mode, flags, position and a fresh inode reference for one entry.
    pub(crate) fn file_snapshot(
        &self,
        idx: usize,
    ) -> Result<(bool, bool, OpenFlags, u32, InodePtr)> {
        let slots = self.ftable.slots.lock();
        let f = &slots[idx];
        if f.count == 0 {
            return Err(Error::BadF);
        }
        let ip = self.idup(f.inode.as_ref().ok_or(Error::BadF)?);
        Ok((f.readable, f.writable, f.flags, f.pos, ip))
    }

    pub(crate) fn set_file_pos(&self, idx: usize, pos: u32) {
        self.ftable.slots.lock()[idx].pos = pos;
    }

    /// Reads from a regular file or directory through the block map.
    /// Holes read as zeros without touching a buffer.
    pub(crate) fn file_read<B: UserBufMut + ?Sized>(
        &self,
        guard: &mut InodeGuard<'_>,
        pos: &mut u32,
        buf: &mut B,
        count: usize,
    ) -> Result<usize> {
        let dev = guard.dev;
        let mut left = count;
        let mut done = 0;
        while left > 0 {
            let nr = guard.bmap(*pos as usize / BLOCK_SIZE);
            let bh: Option<Buf<'_>> = if nr != 0 {
                match self.bcache.bread(dev, nr) {
                    Ok(bh) => Some(bh),
                    Err(_) => break,
                }
            } else {
                None
            };
            let offset = *pos as usize % BLOCK_SIZE;
            let chars = (BLOCK_SIZE - offset).min(left);
            *pos += chars as u32;
            left -= chars;
            match bh {
                Some(bh) => buf.write_bytes(done, &bh.data()[offset..offset + chars])?,
                None => buf.fill_zero(done, chars)?,
            }
            done += chars;
        }
        guard.atime = current_time();
        if done == 0 {
            return Err(Error::Io);
        }
        Ok(done)
    }

    /// Writes into a regular file, materializing holes and extending the
    /// size as it goes.  A partial write leaves a shorter but valid file.
    pub(crate) fn file_write<B: UserBuf + ?Sized>(
        &self,
        guard: &mut InodeGuard<'_>,
        flags: OpenFlags,
        pos: &mut u32,
        buf: &B,
        count: usize,
    ) -> Result<usize> {
        /*
         * ok, append may not work when many processes are writing at the
         * same time, but so what.  That way lies madness anyway.
         */
        let mut p = if flags.contains(OpenFlags::O_APPEND) {
            guard.size
        } else {
            *pos
        };
        let dev = guard.dev;
        let mut done = 0;
        let mut err = Error::NoSpc;
        while done < count {
            let block = guard.create_block(p as usize / BLOCK_SIZE);
            if block == 0 {
                err = Error::NoSpc;
                break;
            }
            let mut bh = match self.bcache.bread(dev, block) {
                Ok(bh) => bh,
                Err(e) => {
                    err = e;
                    break;
                }
            };
            let offset = p as usize % BLOCK_SIZE;
            let chars = (BLOCK_SIZE - offset).min(count - done);
            bh.mark_dirty();
            let res = buf.read_bytes(done, &mut bh.data_mut()[offset..offset + chars]);
            drop(bh);
            if let Err(e) = res {
                err = e;
                break;
            }
            p += chars as u32;
            if p > guard.size {
                guard.size = p;
                guard.mark_dirty();
            }
            done += chars;
        }
        let now = current_time();
        guard.mtime = now;
        if !flags.contains(OpenFlags::O_APPEND) {
            *pos = p;
            guard.ctime = now;
        }
        if done == 0 && count > 0 {
            return Err(err);
        }
        Ok(done)
    }

    /// Reads from a block device through the cache, with a two-block
    /// readahead.
    pub(crate) fn block_read<B: UserBufMut + ?Sized>(
        &self,
        dev: u32,
        pos: &mut u32,
        buf: &mut B,
        count: usize,
    ) -> Result<usize> {
        let mut block = *pos >> BLOCK_SIZE_BITS;
        let mut offset = *pos as usize & (BLOCK_SIZE - 1);
        let mut left = count;
        let mut done = 0;
        while left > 0 {
            let chars = (BLOCK_SIZE - offset).min(left);
            let bh = match self.bcache.breada(dev, block, &[block + 1, block + 2]) {
                Ok(bh) => bh,
                Err(_) => {
                    if done > 0 {
                        return Ok(done);
                    }
                    return Err(Error::Io);
                }
            };
            buf.write_bytes(done, &bh.data()[offset..offset + chars])?;
            block += 1;
            offset = 0;
            *pos += chars as u32;
            done += chars;
            left -= chars;
        }
        Ok(done)
    }

    /// Writes to a block device through the cache.  Partial blocks are
    /// read first so the rest of the block survives.
    pub(crate) fn block_write<B: UserBuf + ?Sized>(
        &self,
        dev: u32,
        pos: &mut u32,
        buf: &B,
        count: usize,
    ) -> Result<usize> {
        let mut block = *pos >> BLOCK_SIZE_BITS;
        let mut offset = *pos as usize & (BLOCK_SIZE - 1);
        let mut left = count;
        let mut done = 0;
        while left > 0 {
            let chars = (BLOCK_SIZE - offset).min(left);
            let mut bh = if chars == BLOCK_SIZE {
                self.bcache.getblk(dev, block)
            } else {
                match self.bcache.breada(dev, block, &[block + 1, block + 2]) {
                    Ok(bh) => bh,
                    Err(_) => {
                        if done > 0 {
                            return Ok(done);
                        }
                        return Err(Error::Io);
                    }
                }
            };
            let res = buf.read_bytes(done, &mut bh.data_mut()[offset..offset + chars]);
            bh.mark_dirty();
            if chars == BLOCK_SIZE {
                bh.mark_uptodate();
            }
            drop(bh);
            res?;
            block += 1;
            offset = 0;
            *pos += chars as u32;
            done += chars;
            left -= chars;
        }
        Ok(done)
    }
}
