//! Path resolution and directory operations.
//!
//! Directories are files whose content is a sequence of 16-byte entries.
//! `find_entry`/`add_entry` search and grow a single directory;
//! `get_dir`/`dir_namei`/`namei`/`open_namei` walk whole paths, honoring
//! the process root (`..` never escapes a chroot jail) and mount points
//! (`..` at a mounted root steps into the parent filesystem).
//!
//! `add_entry` hands back a claimed slot whose `inum` is still 0; the
//! claim holds the containing buffer locked, so the caller cannot sleep
//! another task into the same slot before `commit` fills it in.

use scopeguard::ScopeGuard;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::bio::{Buf, BufData};
use crate::error::{Error, Result};
use crate::fs::inode::{Content, InodeData, InodeGuard, InodePtr};
use crate::fs::stat::{Mode, S_IFDIR, S_IFREG, S_ISVTX};
use crate::fs::{current_time, Mfs};
use crate::param::{DIR_ENTRIES_PER_BLOCK, NAME_LEN, ROOT_INO};
use crate::proc::Proc;
use crate::sysfile::OpenFlags;

/// One on-disk directory entry.  `inum == 0` marks a free slot.
#[repr(C)]
#[derive(Clone, Copy, Default, AsBytes, FromBytes)]
pub struct Dirent {
    pub inum: u16,
    pub name: [u8; NAME_LEN],
}

pub const DIRENT_SIZE: usize = core::mem::size_of::<Dirent>();
const_assert_eq!(DIRENT_SIZE, 16);

impl Dirent {
    fn read_at(data: &BufData, off: usize) -> Self {
        let mut de = Dirent::default();
        de.as_bytes_mut().copy_from_slice(&data[off..off + DIRENT_SIZE]);
        de
    }

    /// Whether this is a live entry named `name`.  `name` must already be
    /// clamped to `NAME_LEN`.
    fn is(&self, name: &[u8]) -> bool {
        if self.inum == 0 || name.len() > NAME_LEN {
            return false;
        }
        if name.len() < NAME_LEN && self.name[name.len()] != 0 {
            return false;
        }
        &self.name[..name.len()] == name
    }
}

/// Where `find_entry` found a name: enough to re-read and update the
/// entry without keeping its buffer locked across inode operations.
pub(crate) struct DirentPos {
    pub block: u32,
    pub offset: usize,
    pub inum: u16,
}

/// A claimed free directory slot with its name already written.  Holding
/// it keeps the containing buffer locked; `commit` stores the inode
/// number and releases it.  There is deliberately no other way out.
pub(crate) struct EntrySlot<'s> {
    buf: Buf<'s>,
    offset: usize,
}

impl EntrySlot<'_> {
    pub(crate) fn commit(mut self, inum: u16) {
        self.buf.data_mut()[self.offset..self.offset + 2].copy_from_slice(&inum.to_le_bytes());
        self.buf.mark_dirty();
    }
}

pub(crate) const MAY_EXEC: u16 = 1;
pub(crate) const MAY_WRITE: u16 = 2;
pub(crate) const MAY_READ: u16 = 4;

/// Permission needed for each open access mode.
fn acc_mode(flags: OpenFlags) -> u16 {
    [MAY_READ, MAY_WRITE, MAY_READ | MAY_WRITE, 7][(flags.bits() & 0o3) as usize]
}

/// Checks read/write/execute permission against the effective ids.
/// Not even root may touch a deleted file.
pub(crate) fn permission(inode: &InodeData, proc: &Proc, mask: u16) -> bool {
    let mut mode = inode.mode.0;
    if inode.dev != 0 && inode.nlinks == 0 {
        return false;
    } else if proc.euid == inode.uid {
        mode >>= 6;
    } else if proc.egid == inode.gid {
        mode >>= 3;
    }
    (mode & mask & 0o007) == mask || proc.suser()
}

/// Applies the filename-length policy: truncate to `NAME_LEN`, or reject
/// over-long names when the `no-truncate` feature is on.  Empty names are
/// never valid.
fn clamp_name(name: &[u8]) -> Option<&[u8]> {
    if name.is_empty() {
        return None;
    }
    #[cfg(feature = "no-truncate")]
    {
        if name.len() > NAME_LEN {
            return None;
        }
    }
    Some(&name[..name.len().min(NAME_LEN)])
}

impl Mfs {
    /// Searches directory `dir` for `name`.
    ///
    /// Handles the two `..` special cases before looking anything up: at
    /// the process root `..` degrades to `.`, and at a mounted
    /// filesystem's root `dir` is exchanged for the mount point (hence
    /// `&mut`: the caller's reference may be traded for another).
    pub(crate) fn find_entry(
        &self,
        proc: &Proc,
        dir: &mut InodePtr,
        name: &[u8],
    ) -> Result<Option<DirentPos>> {
        let mut name = match clamp_name(name) {
            Some(n) => n,
            None => return Ok(None),
        };

        if name == b".." {
            if proc.root.as_ref().map_or(false, |r| r.slot() == dir.slot()) {
                // '..' in a pseudo-root results in a faked '.'.
                name = b".";
            } else {
                let (dev, inum) = self.inode_id(dir);
                if inum == ROOT_INO {
                    // '..' over a mount point moves into the directory the
                    // filesystem is mounted on.
                    let swapped = {
                        let sguard = self.get_super(dev);
                        match sguard.as_ref().and_then(|g| g.sb.as_ref()) {
                            Some(sb) => sb.imount.as_ref().map(|im| self.idup(im)),
                            None => None,
                        }
                    };
                    if let Some(new_dir) = swapped {
                        let old = core::mem::replace(dir, new_dir);
                        self.iput(old);
                    }
                }
            }
        }

        let mut guard = self.ilock(dir);
        let dev = guard.dev;
        let entries = guard.size as usize / DIRENT_SIZE;
        if guard.zones()[0] == 0 {
            return Ok(None);
        }
        let mut i = 0;
        while i < entries {
            let blk_index = i / DIR_ENTRIES_PER_BLOCK;
            let block = guard.bmap(blk_index);
            if block == 0 {
                i = (blk_index + 1) * DIR_ENTRIES_PER_BLOCK;
                continue;
            }
            let bh = match self.bcache.bread(dev, block) {
                Ok(bh) => bh,
                Err(_) => {
                    i = (blk_index + 1) * DIR_ENTRIES_PER_BLOCK;
                    continue;
                }
            };
            let first = i % DIR_ENTRIES_PER_BLOCK;
            let last = DIR_ENTRIES_PER_BLOCK.min(entries - blk_index * DIR_ENTRIES_PER_BLOCK);
            for j in first..last {
                let de = Dirent::read_at(bh.data(), j * DIRENT_SIZE);
                if de.is(name) {
                    return Ok(Some(DirentPos {
                        block,
                        offset: j * DIRENT_SIZE,
                        inum: de.inum,
                    }));
                }
            }
            i = (blk_index + 1) * DIR_ENTRIES_PER_BLOCK;
        }
        Ok(None)
    }

    /// Claims a free entry in `dir` (growing the directory by one entry if
    /// it has no holes), writes `name` into it, and returns the slot for
    /// the caller to `commit`.
    pub(crate) fn add_entry<'s>(&'s self, dir: &InodePtr, name: &[u8]) -> Result<EntrySlot<'s>> {
        let name = clamp_name(name).ok_or(Error::NoEnt)?;
        let mut guard = self.ilock(dir);
        let dev = guard.dev;
        if guard.zones()[0] == 0 {
            return Err(Error::NoEnt);
        }
        let mut i = 0;
        loop {
            let blk_index = i / DIR_ENTRIES_PER_BLOCK;
            let block = guard.create_block(blk_index);
            if block == 0 {
                return Err(Error::NoSpc);
            }
            let mut bh = match self.bcache.bread(dev, block) {
                Ok(bh) => bh,
                Err(_) => {
                    i = (blk_index + 1) * DIR_ENTRIES_PER_BLOCK;
                    continue;
                }
            };
            let first = i % DIR_ENTRIES_PER_BLOCK;
            for j in first..DIR_ENTRIES_PER_BLOCK {
                let now = current_time();
                let at_end = (i + 1) * DIRENT_SIZE > guard.size as usize;
                if at_end {
                    // No reusable hole anywhere: append a fresh entry.
                    guard.size = ((i + 1) * DIRENT_SIZE) as u32;
                    guard.ctime = now;
                    guard.mark_dirty();
                }
                let free = at_end || Dirent::read_at(bh.data(), j * DIRENT_SIZE).inum == 0;
                if free {
                    guard.mtime = now;
                    let off = j * DIRENT_SIZE;
                    let mut de = Dirent::default();
                    de.name[..name.len()].copy_from_slice(name);
                    bh.data_mut()[off..off + DIRENT_SIZE].copy_from_slice(de.as_bytes());
                    bh.mark_dirty();
                    drop(guard);
                    return Ok(EntrySlot { buf: bh, offset: off });
                }
                i += 1;
            }
        }
    }

    /// Walks `path` up to (but not including) its final component,
    /// starting from the process root or working directory.
    fn get_dir(&self, proc: &Proc, path: &[u8]) -> Result<InodePtr> {
        let root = proc.root.as_ref().unwrap_or_else(|| panic!("No root inode"));
        let mut rest: &[u8];
        let mut inode = if path.first() == Some(&b'/') {
            rest = &path[1..];
            self.idup(root)
        } else if !path.is_empty() {
            rest = path;
            self.idup(proc.pwd.as_ref().unwrap_or_else(|| panic!("No cwd inode")))
        } else {
            return Err(Error::NoEnt); /* empty name is bad */
        };

        loop {
            {
                let guard = self.ilock(&inode);
                if !guard.mode.is_dir() {
                    drop(guard);
                    self.iput(inode);
                    return Err(Error::NotDir);
                }
                if !permission(&guard, proc, MAY_EXEC) {
                    drop(guard);
                    self.iput(inode);
                    return Err(Error::Acces);
                }
            }
            let split = rest.iter().position(|&c| c == b'/');
            let name = match split {
                Some(at) => &rest[..at],
                // Final component: the caller deals with it.
                None => return Ok(inode),
            };
            rest = &rest[split.unwrap() + 1..];

            match self.find_entry(proc, &mut inode, name)? {
                Some(pos) => {
                    let (dev, _) = self.inode_id(&inode);
                    self.iput(inode);
                    inode = self.iget(dev, pos.inum)?;
                }
                None => {
                    self.iput(inode);
                    return Err(Error::NoEnt);
                }
            }
        }
    }

    /// Resolves `path` to its parent directory plus the final component
    /// (which may be empty for paths ending in `/`).
    pub(crate) fn dir_namei<'p>(
        &self,
        proc: &Proc,
        path: &'p [u8],
    ) -> Result<(InodePtr, &'p [u8])> {
        let dir = self.get_dir(proc, path)?;
        let basename = match path.iter().rposition(|&c| c == b'/') {
            Some(at) => &path[at + 1..],
            None => path,
        };
        Ok((dir, basename))
    }

    /// Resolves `path` fully, updating the access time on success.
    pub fn namei(&self, proc: &Proc, path: &[u8]) -> Result<InodePtr> {
        let (dir, base) = self.dir_namei(proc, path)?;
        if base.is_empty() {
            /* special case: '/usr/' etc */
            return Ok(dir);
        }
        let mut dir = scopeguard::guard(dir, |d| self.iput(d));
        let pos = self
            .find_entry(proc, &mut dir, base)?
            .ok_or(Error::NoEnt)?;
        let (dev, _) = self.inode_id(&dir);
        drop(dir);
        let inode = self.iget(dev, pos.inum)?;
        {
            let mut guard = self.ilock(&inode);
            guard.atime = current_time();
            guard.mark_dirty();
        }
        Ok(inode)
    }

    /// namei for open: almost the whole open routine.
    pub(crate) fn open_namei(
        &self,
        proc: &Proc,
        path: &[u8],
        mut flags: OpenFlags,
        mode: u16,
    ) -> Result<InodePtr> {
        if flags.contains(OpenFlags::O_TRUNC) && flags.bits() & 0o3 == 0 {
            // Truncation needs write access even on a read-only open.
            flags |= OpenFlags::O_WRONLY;
        }
        let mode = (mode & 0o777 & !proc.umask) | S_IFREG;

        let (dir, base) = self.dir_namei(proc, path)?;
        if base.is_empty() {
            if flags.bits() & 0o3 == 0
                && !flags.intersects(OpenFlags::O_CREAT | OpenFlags::O_TRUNC)
            {
                return Ok(dir);
            }
            self.iput(dir);
            return Err(Error::IsDir);
        }
        let mut dir = scopeguard::guard(dir, |d| self.iput(d));

        let pos = self.find_entry(proc, &mut dir, base)?;
        let pos = match pos {
            Some(pos) => pos,
            None => {
                if !flags.contains(OpenFlags::O_CREAT) {
                    return Err(Error::NoEnt);
                }
                {
                    let guard = self.ilock(&dir);
                    if !permission(&guard, proc, MAY_WRITE) {
                        return Err(Error::Acces);
                    }
                }
                let (dev, _) = self.inode_id(&dir);
                let inode = self.new_inode(proc, dev)?;
                {
                    let mut guard = self.ilock(&inode);
                    guard.mode = Mode(mode);
                    guard.mark_dirty();
                }
                let slot = match self.add_entry(&dir, base) {
                    Ok(slot) => slot,
                    Err(e) => {
                        let mut guard = self.ilock(&inode);
                        guard.nlinks -= 1;
                        drop(guard);
                        self.iput(inode);
                        return Err(e);
                    }
                };
                let inum = self.inode_id(&inode).1;
                slot.commit(inum);
                return Ok(inode);
            }
        };

        let (dev, _) = self.inode_id(&dir);
        drop(dir);
        if flags.contains(OpenFlags::O_EXCL) {
            return Err(Error::Exist);
        }
        let inode = self.iget(dev, pos.inum).map_err(|_| Error::Acces)?;
        {
            let mut guard = self.ilock(&inode);
            if (guard.mode.is_dir() && flags.bits() & 0o3 != 0)
                || !permission(&guard, proc, acc_mode(flags))
            {
                drop(guard);
                self.iput(inode);
                return Err(Error::Perm);
            }
            guard.atime = current_time();
            if flags.contains(OpenFlags::O_TRUNC) {
                guard.truncate();
            }
        }
        Ok(inode)
    }

    /// Creates a special (or regular) file node.  Privileged.
    pub fn mknod(&self, proc: &Proc, path: &[u8], mode: u16, dev: u16) -> Result<()> {
        if !proc.suser() {
            return Err(Error::Perm);
        }
        let (dir, base) = self.dir_namei(proc, path)?;
        let mut dir = scopeguard::guard(dir, |d| self.iput(d));
        if base.is_empty() {
            return Err(Error::NoEnt);
        }
        {
            let guard = self.ilock(&dir);
            if !permission(&guard, proc, MAY_WRITE) {
                return Err(Error::Perm);
            }
        }
        if self.find_entry(proc, &mut dir, base)?.is_some() {
            return Err(Error::Exist);
        }
        let (ddev, _) = self.inode_id(&dir);
        let inode = self.new_inode(proc, ddev)?;
        let inode = scopeguard::guard(inode, |ip| self.iput(ip));
        {
            let mut guard = self.ilock(&inode);
            guard.mode = Mode(mode);
            if guard.mode.is_device() {
                guard.content = Content::Dev(dev);
            }
            let now = current_time();
            guard.mtime = now;
            guard.atime = now;
            guard.mark_dirty();
        }
        let slot = match self.add_entry(&dir, base) {
            Ok(slot) => slot,
            Err(e) => {
                let mut guard = self.ilock(&inode);
                guard.nlinks = 0;
                drop(guard);
                return Err(e);
            }
        };
        slot.commit(self.inode_id(&inode).1);
        Ok(())
    }

    /// Creates a directory containing `.` and `..`.
    pub fn mkdir(&self, proc: &Proc, path: &[u8], mode: u16) -> Result<()> {
        let (dir, base) = self.dir_namei(proc, path)?;
        let mut dir = scopeguard::guard(dir, |d| self.iput(d));
        if base.is_empty() {
            return Err(Error::NoEnt);
        }
        {
            let guard = self.ilock(&dir);
            if !permission(&guard, proc, MAY_WRITE) {
                return Err(Error::Perm);
            }
        }
        if self.find_entry(proc, &mut dir, base)?.is_some() {
            return Err(Error::Exist);
        }
        let (ddev, dir_inum) = self.inode_id(&dir);
        let inode = self.new_inode(proc, ddev)?;
        let inum = self.inode_id(&inode).1;

        let block;
        {
            let mut guard = self.ilock(&inode);
            guard.size = 2 * DIRENT_SIZE as u32;
            let now = current_time();
            guard.mtime = now;
            guard.atime = now;
            guard.mark_dirty();
            block = self.new_block(ddev);
            if block == 0 {
                guard.nlinks -= 1;
                drop(guard);
                self.iput(inode);
                return Err(Error::NoSpc);
            }
            guard.zones_mut()[0] = block as u16;

            let mut dirb = match self.bcache.bread(ddev, block) {
                Ok(bh) => bh,
                Err(e) => {
                    drop(guard);
                    self.free_block(ddev, block);
                    let mut guard = self.ilock(&inode);
                    guard.nlinks -= 1;
                    guard.zones_mut()[0] = 0;
                    drop(guard);
                    self.iput(inode);
                    return Err(e);
                }
            };
            let mut dot = Dirent::default();
            dot.inum = inum;
            dot.name[0] = b'.';
            dirb.data_mut()[..DIRENT_SIZE].copy_from_slice(dot.as_bytes());
            let mut dotdot = Dirent::default();
            dotdot.inum = dir_inum;
            dotdot.name[..2].copy_from_slice(b"..");
            dirb.data_mut()[DIRENT_SIZE..2 * DIRENT_SIZE].copy_from_slice(dotdot.as_bytes());
            guard.nlinks = 2;
            dirb.mark_dirty();
            drop(dirb);
            guard.mode = Mode(S_IFDIR | (mode & 0o777 & !proc.umask));
            guard.mark_dirty();
        }

        let slot = match self.add_entry(&dir, base) {
            Ok(slot) => slot,
            Err(e) => {
                self.free_block(ddev, block);
                let mut guard = self.ilock(&inode);
                guard.nlinks = 0;
                guard.zones_mut()[0] = 0;
                drop(guard);
                self.iput(inode);
                return Err(e);
            }
        };
        slot.commit(inum);
        {
            let mut guard = self.ilock(&dir);
            guard.nlinks += 1;
            guard.mark_dirty();
        }
        self.iput(ScopeGuard::into_inner(dir));
        self.iput(inode);
        Ok(())
    }

    /// Whether a directory holds nothing but `.` and `..`.
    fn empty_dir(&self, guard: &mut InodeGuard<'_>) -> bool {
        let dev = guard.dev;
        let len = guard.size as usize / DIRENT_SIZE;
        let first = guard.zones()[0];
        if len < 2 || first == 0 {
            printk!("warning - bad directory on dev {:#06x}", dev);
            return false;
        }
        let bh = match self.bcache.bread(dev, first as u32) {
            Ok(bh) => bh,
            Err(_) => {
                printk!("warning - bad directory on dev {:#06x}", dev);
                return false;
            }
        };
        let dot = Dirent::read_at(bh.data(), 0);
        let dotdot = Dirent::read_at(bh.data(), DIRENT_SIZE);
        if dot.inum != guard.inum || dotdot.inum == 0 || !dot.is(b".") || !dotdot.is(b"..") {
            printk!("warning - bad directory on dev {:#06x}", dev);
            return false;
        }
        drop(bh);

        let mut nr = 2;
        while nr < len {
            let blk_index = nr / DIR_ENTRIES_PER_BLOCK;
            let block = guard.bmap(blk_index);
            if block == 0 {
                nr = (blk_index + 1) * DIR_ENTRIES_PER_BLOCK;
                continue;
            }
            let bh = match self.bcache.bread(dev, block) {
                Ok(bh) => bh,
                Err(_) => return false,
            };
            let first = nr % DIR_ENTRIES_PER_BLOCK;
            let last = DIR_ENTRIES_PER_BLOCK.min(len - blk_index * DIR_ENTRIES_PER_BLOCK);
            for j in first..last {
                if Dirent::read_at(bh.data(), j * DIRENT_SIZE).inum != 0 {
                    return false;
                }
            }
            nr = (blk_index + 1) * DIR_ENTRIES_PER_BLOCK;
        }
        true
    }

    /// Removes an empty directory.
    pub fn rmdir(&self, proc: &Proc, path: &[u8]) -> Result<()> {
        let (dir, base) = self.dir_namei(proc, path)?;
        let mut dir = scopeguard::guard(dir, |d| self.iput(d));
        if base.is_empty() {
            return Err(Error::NoEnt);
        }
        {
            let guard = self.ilock(&dir);
            if !permission(&guard, proc, MAY_WRITE) {
                return Err(Error::Perm);
            }
        }
        let pos = self
            .find_entry(proc, &mut dir, base)?
            .ok_or(Error::NoEnt)?;
        let (ddev, _) = self.inode_id(&dir);
        let inode = self.iget(ddev, pos.inum).map_err(|_| Error::Perm)?;
        let inode = scopeguard::guard(inode, |ip| self.iput(ip));

        let (dir_mode, dir_dev) = {
            let guard = self.ilock(&dir);
            (guard.mode, guard.dev)
        };
        {
            let guard = self.ilock(&inode);
            if dir_mode.0 & S_ISVTX != 0 && !proc.suser() && guard.uid != proc.euid {
                return Err(Error::Perm);
            }
            if guard.dev != dir_dev || self.inode_ref_count(&inode) > 1 {
                return Err(Error::Perm);
            }
        }
        if inode.slot() == dir.slot() {
            /* we may not delete ".", but "../dir" is ok */
            return Err(Error::Perm);
        }
        {
            let mut guard = self.ilock(&inode);
            if !guard.mode.is_dir() {
                return Err(Error::NotDir);
            }
            if !self.empty_dir(&mut guard) {
                return Err(Error::NotEmpty);
            }
            if guard.nlinks != 2 {
                printk!("empty directory has nlink!=2 ({})", guard.nlinks);
            }
        }
        self.clear_dirent(&dir, pos)?;
        {
            let mut guard = self.ilock(&inode);
            guard.nlinks = 0;
            guard.mark_dirty();
        }
        {
            let mut guard = self.ilock(&dir);
            guard.nlinks -= 1;
            let now = current_time();
            guard.ctime = now;
            guard.mtime = now;
            guard.mark_dirty();
        }
        Ok(())
    }

    /// Removes a directory entry for a non-directory.
    pub fn unlink(&self, proc: &Proc, path: &[u8]) -> Result<()> {
        let (dir, base) = self.dir_namei(proc, path)?;
        let mut dir = scopeguard::guard(dir, |d| self.iput(d));
        if base.is_empty() {
            return Err(Error::NoEnt);
        }
        {
            let guard = self.ilock(&dir);
            if !permission(&guard, proc, MAY_WRITE) {
                return Err(Error::Perm);
            }
        }
        let pos = self
            .find_entry(proc, &mut dir, base)?
            .ok_or(Error::NoEnt)?;
        let (ddev, _) = self.inode_id(&dir);
        let inode = self.iget(ddev, pos.inum)?;
        let inode = scopeguard::guard(inode, |ip| self.iput(ip));

        let (dir_mode, dir_uid) = {
            let guard = self.ilock(&dir);
            (guard.mode, guard.uid)
        };
        {
            let mut guard = self.ilock(&inode);
            if dir_mode.0 & S_ISVTX != 0
                && !proc.suser()
                && proc.euid != guard.uid
                && proc.euid != dir_uid
            {
                return Err(Error::Perm);
            }
            if guard.mode.is_dir() {
                return Err(Error::Perm);
            }
            if guard.nlinks == 0 {
                printk!(
                    "Deleting nonexistent file ({:#06x}:{}), {}",
                    guard.dev,
                    guard.inum,
                    guard.nlinks
                );
                guard.nlinks = 1;
            }
        }
        self.clear_dirent(&dir, pos)?;
        {
            let mut guard = self.ilock(&inode);
            guard.nlinks -= 1;
            guard.ctime = current_time();
            guard.mark_dirty();
        }
        Ok(())
    }

    /// Zeroes the entry found at `pos`, re-verifying that it still names
    /// the same inode (the buffer was not kept locked across the checks).
    fn clear_dirent(&self, dir: &InodePtr, pos: DirentPos) -> Result<()> {
        let guard = self.ilock(dir);
        let dev = guard.dev;
        let mut bh = self.bcache.bread(dev, pos.block)?;
        let de = Dirent::read_at(bh.data(), pos.offset);
        if de.inum != pos.inum {
            return Err(Error::NoEnt);
        }
        bh.data_mut()[pos.offset..pos.offset + 2].copy_from_slice(&0u16.to_le_bytes());
        bh.mark_dirty();
        Ok(())
    }

    /// Makes a new name for an existing file.  Directories and
    /// cross-device links are refused.
    pub fn link(&self, proc: &Proc, oldpath: &[u8], newpath: &[u8]) -> Result<()> {
        let oldinode = self.namei(proc, oldpath)?;
        let oldinode = scopeguard::guard(oldinode, |ip| self.iput(ip));
        {
            let guard = self.ilock(&oldinode);
            if guard.mode.is_dir() {
                return Err(Error::Perm);
            }
        }
        let (dir, base) = self
            .dir_namei(proc, newpath)
            .map_err(|_| Error::Acces)?;
        let mut dir = scopeguard::guard(dir, |d| self.iput(d));
        if base.is_empty() {
            return Err(Error::Perm);
        }
        let (ddev, _) = self.inode_id(&dir);
        let (odev, oinum) = self.inode_id(&oldinode);
        if ddev != odev {
            return Err(Error::XDev);
        }
        {
            let guard = self.ilock(&dir);
            if !permission(&guard, proc, MAY_WRITE) {
                return Err(Error::Acces);
            }
        }
        if self.find_entry(proc, &mut dir, base)?.is_some() {
            return Err(Error::Exist);
        }
        let slot = self.add_entry(&dir, base)?;
        slot.commit(oinum);
        {
            let mut guard = self.ilock(&oldinode);
            guard.nlinks += 1;
            guard.ctime = current_time();
            guard.mark_dirty();
        }
        Ok(())
    }
}
