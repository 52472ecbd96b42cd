//! Inodes.
//!
//! An inode describes a single unnamed file: its type, owner, size and the
//! list of blocks holding its content.  On disk an inode is a 32-byte
//! record; the kernel keeps a fixed table of in-memory copies to provide a
//! place for synchronizing access by multiple tasks.  The in-memory copy
//! adds bookkeeping that never reaches the disk: the reference count, the
//! lock, the dirty and mount-point flags, and the access time.
//!
//! * Referencing: a table slot is free if its count is zero.  `iget` finds
//!   or loads an inode and takes a reference; `iput` drops one.  When the
//!   last reference to an inode with no remaining links is dropped, the
//!   inode's blocks and its on-disk record are freed before the slot is
//!   reused.
//! * Locking: the table's control lock guards identity, counts and flags.
//!   A slot's long-term lock (the `locked` flag plus its wait channel)
//!   must be held to read or modify the inode body; `ilock` returns a
//!   guard that holds it.  `iget` takes references without locking so
//!   callers can keep inodes across sleeps and only lock them briefly.
//! * Every sleep in here is followed by re-verification: identities and
//!   counts may change while a task waits.

use core::cell::UnsafeCell;
use core::mem;

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::error::Result;
use crate::fs::stat::Mode;
use crate::fs::{current_time, Mfs};
use crate::lock::{SleepableLock, WaitChannel};
use crate::param::{INODES_PER_BLOCK, MAX_BLOCKS, NR_DIRECT, NR_INDIRECT, NR_INODE, ROOT_INO};
use crate::pipe::PipeRing;

/// On-disk inode record.
#[repr(C)]
#[derive(Clone, Copy, Default, AsBytes, FromBytes)]
pub struct DInode {
    pub mode: u16,
    pub uid: u16,
    pub size: u32,
    pub mtime: u32,
    pub gid: u8,
    pub nlinks: u8,
    /// 0..6 direct, 7 single-indirect, 8 double-indirect.
    pub zone: [u16; 9],
}

const_assert_eq!(core::mem::size_of::<DInode>(), 32);

/// What an in-memory inode's "data area" is.
///
/// The on-disk format overloads `zone[0]` as the device number of special
/// files, and the original kernel smuggled a pipe's page address through
/// the size field; in memory these are separate variants instead.
pub enum Content {
    /// Regular files and directories: the zone pointer array.
    Blocks([u16; 9]),
    /// Character and block special files: the device number.
    Dev(u16),
    /// A pipe's ring buffer.  Never written to disk.
    Pipe(PipeRing),
}

/// In-memory inode body.  Protected by the slot's long-term lock.
pub struct InodeData {
    pub dev: u32,
    pub inum: u16,
    pub mode: Mode,
    pub uid: u16,
    pub gid: u8,
    pub nlinks: u8,
    pub size: u32,
    pub atime: u32,
    pub mtime: u32,
    pub ctime: u32,
    pub content: Content,
}

impl Default for InodeData {
    fn default() -> Self {
        Self {
            dev: 0,
            inum: 0,
            mode: Mode(0),
            uid: 0,
            gid: 0,
            nlinks: 0,
            size: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            content: Content::Blocks([0; 9]),
        }
    }
}

/// Per-slot bookkeeping, guarded by the table's control lock.
#[derive(Default)]
pub(crate) struct IEntry {
    pub dev: u32,
    pub inum: u16,
    pub count: u32,
    pub locked: bool,
    pub dirty: bool,
    pub pipe: bool,
    pub mounted: bool,
}

pub(crate) struct ICtrl {
    pub e: [IEntry; NR_INODE],
    /// Round-robin position of the empty-slot scan.
    last: usize,
}

pub(crate) struct InodeCell {
    pub wait: WaitChannel,
    data: UnsafeCell<InodeData>,
}

pub(crate) struct Itable {
    pub ctrl: SleepableLock<ICtrl>,
    pub cells: [InodeCell; NR_INODE],
}

// Inode bodies are only touched while the slot's lock flag is held (or,
// for claiming paths, while the control lock shows count == 0).
unsafe impl Sync for Itable {}

impl Itable {
    pub fn new() -> Self {
        Self {
            ctrl: SleepableLock::new(ICtrl {
                e: array_macro::array![_ => IEntry::default(); NR_INODE],
                last: 0,
            }),
            cells: array_macro::array![_ => InodeCell {
                wait: WaitChannel::new(),
                data: UnsafeCell::new(InodeData::default()),
            }; NR_INODE],
        }
    }
}

/// A counted reference to an inode table slot.  Obtained from `iget` (or
/// `idup`) and must be returned with `iput`.
#[must_use]
pub struct InodePtr {
    pub(crate) idx: usize,
}

impl InodePtr {
    pub(crate) fn slot(&self) -> usize {
        self.idx
    }
}

/// A locked inode.  Dereferences to the inode body; dropping it unlocks.
pub struct InodeGuard<'s> {
    fs: &'s Mfs,
    idx: usize,
}

impl core::ops::Deref for InodeGuard<'_> {
    type Target = InodeData;

    fn deref(&self) -> &InodeData {
        // The guard holds the slot's lock.
        unsafe { &*self.fs.itable.cells[self.idx].data.get() }
    }
}

impl core::ops::DerefMut for InodeGuard<'_> {
    fn deref_mut(&mut self) -> &mut InodeData {
        unsafe { &mut *self.fs.itable.cells[self.idx].data.get() }
    }
}

impl Drop for InodeGuard<'_> {
    fn drop(&mut self) {
        let mut c = self.fs.itable.ctrl.lock();
        c.e[self.idx].locked = false;
        drop(c);
        self.fs.itable.cells[self.idx].wait.wakeup();
    }
}

impl<'s> InodeGuard<'s> {
    /// Marks the inode modified so it is written back on `iput`/`sync`.
    pub fn mark_dirty(&self) {
        self.fs.itable.ctrl.lock().e[self.idx].dirty = true;
    }

    /// References currently held on this inode.
    pub fn ref_count(&self) -> u32 {
        self.fs.itable.ctrl.lock().e[self.idx].count
    }

    /// Device number of a special file, 0 for anything else.
    pub fn rdev(&self) -> u16 {
        match self.content {
            Content::Dev(d) => d,
            _ => 0,
        }
    }

    pub(crate) fn zones(&self) -> &[u16; 9] {
        match &self.content {
            Content::Blocks(z) => z,
            _ => panic!("zone access on special inode"),
        }
    }

    pub(crate) fn zones_mut(&mut self) -> &mut [u16; 9] {
        match &mut self.content {
            Content::Blocks(z) => z,
            _ => panic!("zone access on special inode"),
        }
    }

    /// Wakes every task sleeping on this inode.
    pub(crate) fn wakeup(&self) {
        self.fs.itable.cells[self.idx].wait.wakeup();
    }

    /// Releases the inode and waits for a wakeup, then re-locks it.  The
    /// caller must re-check whatever condition it slept for.
    pub(crate) fn sleep(&mut self) {
        let fs = self.fs;
        let idx = self.idx;
        let mut c = fs.itable.ctrl.lock();
        c.e[idx].locked = false;
        fs.itable.cells[idx].wait.wakeup();
        c = fs.itable.cells[idx].wait.sleep(c);
        while c.e[idx].locked {
            c = fs.itable.cells[idx].wait.sleep(c);
        }
        c.e[idx].locked = true;
    }

    /// Maps file block `block` to its on-disk block number, 0 for a hole.
    pub(crate) fn bmap(&mut self, block: usize) -> u32 {
        self.bmap_internal(block, false)
    }

    /// Like `bmap`, but allocates any missing intermediate or leaf block.
    /// Returns 0 when the device is full.
    pub(crate) fn create_block(&mut self, block: usize) -> u32 {
        self.bmap_internal(block, true)
    }

    fn bmap_internal(&mut self, block: usize, create: bool) -> u32 {
        if block >= MAX_BLOCKS {
            panic!("_bmap: block>big");
        }
        let fs = self.fs;
        let dev = self.dev;

        if block < NR_DIRECT {
            if create && self.zones()[block] == 0 {
                let b = fs.new_block(dev);
                if b != 0 {
                    self.zones_mut()[block] = b as u16;
                    self.ctime = current_time();
                    self.mark_dirty();
                }
            }
            return self.zones()[block] as u32;
        }

        let block = block - NR_DIRECT;
        if block < NR_INDIRECT {
            if create && self.zones()[7] == 0 {
                let b = fs.new_block(dev);
                if b != 0 {
                    self.zones_mut()[7] = b as u16;
                    self.ctime = current_time();
                    self.mark_dirty();
                }
            }
            let ind = self.zones()[7];
            if ind == 0 {
                return 0;
            }
            let mut bh = match fs.bcache.bread(dev, ind as u32) {
                Ok(bh) => bh,
                Err(_) => return 0,
            };
            let mut entry = bh.data().get_u16(block);
            if create && entry == 0 {
                let b = fs.new_block(dev);
                if b != 0 {
                    entry = b as u16;
                    bh.data_mut().put_u16(block, entry);
                    bh.mark_dirty();
                }
            }
            return entry as u32;
        }

        let block = block - NR_INDIRECT;
        if create && self.zones()[8] == 0 {
            let b = fs.new_block(dev);
            if b != 0 {
                self.zones_mut()[8] = b as u16;
                self.ctime = current_time();
                self.mark_dirty();
            }
        }
        let dind = self.zones()[8];
        if dind == 0 {
            return 0;
        }
        let mut bh = match fs.bcache.bread(dev, dind as u32) {
            Ok(bh) => bh,
            Err(_) => return 0,
        };
        let mut ind = bh.data().get_u16(block >> 9);
        if create && ind == 0 {
            let b = fs.new_block(dev);
            if b != 0 {
                ind = b as u16;
                bh.data_mut().put_u16(block >> 9, ind);
                bh.mark_dirty();
            }
        }
        drop(bh);
        if ind == 0 {
            return 0;
        }
        let mut bh = match fs.bcache.bread(dev, ind as u32) {
            Ok(bh) => bh,
            Err(_) => return 0,
        };
        let mut entry = bh.data().get_u16(block & 511);
        if create && entry == 0 {
            let b = fs.new_block(dev);
            if b != 0 {
                entry = b as u16;
                bh.data_mut().put_u16(block & 511, entry);
                bh.mark_dirty();
            }
        }
        entry as u32
    }

    /// Discards the inode's contents: every data block, the indirect
    /// blocks themselves, and the size.  Only files and directories are
    /// truncatable.
    pub(crate) fn truncate(&mut self) {
        if !(self.mode.is_reg() || self.mode.is_dir()) {
            return;
        }
        let fs = self.fs;
        let dev = self.dev;
        for i in 0..NR_DIRECT {
            let z = self.zones()[i];
            if z != 0 {
                fs.free_block(dev, z as u32);
                self.zones_mut()[i] = 0;
            }
        }
        free_ind(fs, dev, self.zones()[7]);
        free_dind(fs, dev, self.zones()[8]);
        self.zones_mut()[7] = 0;
        self.zones_mut()[8] = 0;
        self.size = 0;
        self.mark_dirty();
        let now = current_time();
        self.mtime = now;
        self.ctime = now;
    }
}

/// Frees every block a single-indirect block points at, then the indirect
/// block itself.
fn free_ind(fs: &Mfs, dev: u32, block: u16) {
    if block == 0 {
        return;
    }
    if let Ok(bh) = fs.bcache.bread(dev, block as u32) {
        for i in 0..NR_INDIRECT {
            let z = bh.data().get_u16(i);
            if z != 0 {
                fs.free_block(dev, z as u32);
            }
        }
    }
    fs.free_block(dev, block as u32);
}

/// Frees a double-indirect tree: each first-level entry is itself a
/// single-indirect block.
fn free_dind(fs: &Mfs, dev: u32, block: u16) {
    if block == 0 {
        return;
    }
    if let Ok(bh) = fs.bcache.bread(dev, block as u32) {
        for i in 0..NR_INDIRECT {
            let z = bh.data().get_u16(i);
            if z != 0 {
                free_ind(fs, dev, z);
            }
        }
    }
    fs.free_block(dev, block as u32);
}

impl Mfs {
    /// Finds the in-memory inode `(dev, inum)`, loading it from disk if
    /// necessary, and takes a reference.  Looking up a mount point
    /// transparently yields the root of the filesystem mounted there.
    pub(crate) fn iget(&self, dev: u32, inum: u16) -> Result<InodePtr> {
        if dev == 0 {
            panic!("iget with dev==0");
        }
        let mut dev = dev;
        let mut inum = inum;
        'restart: loop {
            // Claim an empty slot up front; if the inode turns out to be
            // resident the slot is just dropped again.  Taking it first
            // keeps scan-and-install atomic under the control lock.
            let empty = self.get_empty_inode();
            let mut c = self.itable.ctrl.lock();
            let mut i = 0;
            while i < NR_INODE {
                if c.e[i].dev != dev || c.e[i].inum != inum {
                    i += 1;
                    continue;
                }
                while c.e[i].locked {
                    c = self.itable.cells[i].wait.sleep(c);
                }
                if c.e[i].dev != dev || c.e[i].inum != inum {
                    // Repurposed while we slept; rescan from the top.
                    i = 0;
                    continue;
                }
                c.e[i].count += 1;
                let mounted = c.e[i].mounted;
                drop(c);
                if mounted {
                    // A filesystem is mounted here: swap in its root.
                    match self.covering_super(i) {
                        Some(mounted_dev) => {
                            self.iput(InodePtr { idx: i });
                            self.iput(empty);
                            dev = mounted_dev;
                            inum = ROOT_INO;
                            continue 'restart;
                        }
                        None => {
                            printk!("Mounted inode hasn't got sb");
                            self.iput(empty);
                            return Ok(InodePtr { idx: i });
                        }
                    }
                }
                self.iput(empty);
                return Ok(InodePtr { idx: i });
            }

            // Not resident: install it in the empty slot and read it in.
            let idx = empty.idx;
            c.e[idx].dev = dev;
            c.e[idx].inum = inum;
            c.e[idx].locked = true;
            drop(c);
            {
                // The lock flag is ours; fill the body.
                let data = unsafe { &mut *self.itable.cells[idx].data.get() };
                data.dev = dev;
                data.inum = inum;
            }
            self.read_inode(idx, dev, inum);
            let mut c = self.itable.ctrl.lock();
            c.e[idx].locked = false;
            drop(c);
            self.itable.cells[idx].wait.wakeup();
            return Ok(empty);
        }
    }

    /// Takes an additional reference to an inode.
    pub(crate) fn idup(&self, ip: &InodePtr) -> InodePtr {
        let mut c = self.itable.ctrl.lock();
        debug_assert!(c.e[ip.idx].count > 0);
        c.e[ip.idx].count += 1;
        InodePtr { idx: ip.idx }
    }

    /// Drops a reference to an in-memory inode.  If that was the last
    /// reference, the slot can be recycled; if the inode also has no links
    /// left, its data blocks and on-disk record are freed first.
    pub fn iput(&self, ip: InodePtr) {
        let i = ip.idx;
        let mut c = self.itable.ctrl.lock();
        while c.e[i].locked {
            c = self.itable.cells[i].wait.sleep(c);
        }
        if c.e[i].count == 0 {
            panic!("iput: trying to free free inode");
        }

        if c.e[i].pipe {
            self.itable.cells[i].wait.wakeup();
            c.e[i].count -= 1;
            if c.e[i].count > 0 {
                return;
            }
            // Last reference: release the ring page and clear the slot.
            c.e[i].locked = true;
            drop(c);
            self.clear_inode_slot(i);
            return;
        }

        if c.e[i].dev == 0 {
            c.e[i].count -= 1;
            return;
        }

        // Data is stable here: the slot is unlocked and we hold the
        // control lock, so no guard can appear under us.
        let mode = unsafe { (*self.itable.cells[i].data.get()).mode };
        if mode.is_blk() {
            let dev = unsafe {
                match (*self.itable.cells[i].data.get()).content {
                    Content::Dev(d) => d as u32,
                    _ => 0,
                }
            };
            drop(c);
            self.sync_dev(dev);
            c = self.itable.ctrl.lock();
            while c.e[i].locked {
                c = self.itable.cells[i].wait.sleep(c);
            }
        }

        loop {
            if c.e[i].count > 1 {
                c.e[i].count -= 1;
                return;
            }
            let nlinks = unsafe { (*self.itable.cells[i].data.get()).nlinks };
            if nlinks == 0 {
                c.e[i].locked = true;
                drop(c);
                let mut guard = InodeGuard { fs: self, idx: i };
                guard.truncate();
                // Keep the slot locked through the on-disk free.
                mem::forget(guard);
                self.free_inode_slot(i);
                return;
            }
            if c.e[i].dirty {
                c.e[i].locked = true;
                drop(c);
                self.write_inode_slot(i);
                c = self.itable.ctrl.lock();
                c.e[i].dirty = false;
                c.e[i].locked = false;
                self.itable.cells[i].wait.wakeup();
                // We slept; the state may have changed, so go again.
                while c.e[i].locked {
                    c = self.itable.cells[i].wait.sleep(c);
                }
                continue;
            }
            c.e[i].count -= 1;
            return;
        }
    }

    /// Locks an inode for reading and writing its body.
    pub(crate) fn ilock<'s>(&'s self, ip: &'s InodePtr) -> InodeGuard<'s> {
        let mut c = self.itable.ctrl.lock();
        debug_assert!(c.e[ip.idx].count > 0);
        while c.e[ip.idx].locked {
            c = self.itable.cells[ip.idx].wait.sleep(c);
        }
        c.e[ip.idx].locked = true;
        InodeGuard {
            fs: self,
            idx: ip.idx,
        }
    }

    /// Finds a table slot with no references, preferring clean unlocked
    /// ones, flushing a dirty one if it must.  Fatal when every slot is
    /// referenced.  The returned reference points at a zeroed body.
    pub(crate) fn get_empty_inode(&self) -> InodePtr {
        let mut c = self.itable.ctrl.lock();
        loop {
            let mut found = None;
            for _ in 0..NR_INODE {
                c.last = (c.last + 1) % NR_INODE;
                let i = c.last;
                if c.e[i].count == 0 {
                    if found.is_none() {
                        found = Some(i);
                    }
                    if !c.e[i].dirty && !c.e[i].locked {
                        found = Some(i);
                        break;
                    }
                }
            }
            let i = match found {
                Some(i) => i,
                None => {
                    for (n, e) in c.e.iter().enumerate() {
                        printk!("{:2}: dev={:#06x} inum={}", n, e.dev, e.inum);
                    }
                    panic!("No free inodes in mem");
                }
            };
            loop {
                while c.e[i].locked {
                    c = self.itable.cells[i].wait.sleep(c);
                }
                if !c.e[i].dirty {
                    break;
                }
                c.e[i].locked = true;
                drop(c);
                self.write_inode_slot(i);
                c = self.itable.ctrl.lock();
                c.e[i].dirty = false;
                c.e[i].locked = false;
                self.itable.cells[i].wait.wakeup();
            }
            if c.e[i].count != 0 {
                // Grabbed while we flushed; start over.
                continue;
            }
            c.e[i] = IEntry::default();
            c.e[i].count = 1;
            // count was 0 and we hold the control lock: no guard exists.
            unsafe {
                *self.itable.cells[i].data.get() = InodeData::default();
            }
            return InodePtr { idx: i };
        }
    }

    /// Stamps identity onto a freshly claimed slot (new inodes that have
    /// no on-disk record to read yet).
    pub(crate) fn adopt_inode(&self, ip: &InodePtr, dev: u32, inum: u16) {
        let mut c = self.itable.ctrl.lock();
        debug_assert_eq!(c.e[ip.idx].count, 1);
        c.e[ip.idx].dev = dev;
        c.e[ip.idx].inum = inum;
        while c.e[ip.idx].locked {
            c = self.itable.cells[ip.idx].wait.sleep(c);
        }
        c.e[ip.idx].locked = true;
        drop(c);
        {
            let data = unsafe { &mut *self.itable.cells[ip.idx].data.get() };
            data.dev = dev;
            data.inum = inum;
        }
        let mut c = self.itable.ctrl.lock();
        c.e[ip.idx].locked = false;
        drop(c);
        self.itable.cells[ip.idx].wait.wakeup();
    }

    /// Reads the on-disk record into slot `idx`.  The slot lock is held by
    /// the caller.
    fn read_inode(&self, idx: usize, dev: u32, inum: u16) {
        let block = {
            let sguard = self
                .get_super(dev)
                .unwrap_or_else(|| panic!("trying to read inode without dev"));
            sguard.sb.as_ref().unwrap().iblock(inum)
        };
        let bh = self
            .bcache
            .bread(dev, block)
            .unwrap_or_else(|_| panic!("unable to read i-node block"));
        let off = (inum as usize - 1) % INODES_PER_BLOCK * core::mem::size_of::<DInode>();
        let mut dinode = DInode::default();
        dinode
            .as_bytes_mut()
            .copy_from_slice(&bh.data()[off..off + core::mem::size_of::<DInode>()]);
        drop(bh);

        let data = unsafe { &mut *self.itable.cells[idx].data.get() };
        data.mode = Mode(dinode.mode);
        data.uid = dinode.uid;
        data.gid = dinode.gid;
        data.nlinks = dinode.nlinks;
        data.size = dinode.size;
        data.mtime = dinode.mtime;
        data.atime = dinode.mtime;
        data.ctime = dinode.mtime;
        data.content = if data.mode.is_device() {
            Content::Dev(dinode.zone[0])
        } else {
            Content::Blocks(dinode.zone)
        };
    }

    /// Writes slot `idx` back to its inode block.  The slot lock is held
    /// by the caller; the dirty flag is cleared by the caller afterwards.
    pub(crate) fn write_inode_slot(&self, idx: usize) {
        let data = unsafe { &*self.itable.cells[idx].data.get() };
        if data.dev == 0 {
            return;
        }
        let block = {
            let sguard = self
                .get_super(data.dev)
                .unwrap_or_else(|| panic!("trying to write inode without device"));
            sguard.sb.as_ref().unwrap().iblock(data.inum)
        };
        let mut bh = self
            .bcache
            .bread(data.dev, block)
            .unwrap_or_else(|_| panic!("unable to read i-node block"));
        let dinode = DInode {
            mode: data.mode.0,
            uid: data.uid,
            size: data.size,
            mtime: data.mtime,
            gid: data.gid,
            nlinks: data.nlinks,
            zone: match &data.content {
                Content::Blocks(z) => *z,
                Content::Dev(d) => {
                    let mut z = [0; 9];
                    z[0] = *d;
                    z
                }
                Content::Pipe(_) => panic!("writing pipe inode to disk"),
            },
        };
        let off = (data.inum as usize - 1) % INODES_PER_BLOCK * core::mem::size_of::<DInode>();
        bh.data_mut()[off..off + core::mem::size_of::<DInode>()]
            .copy_from_slice(dinode.as_bytes());
        bh.mark_dirty();
    }

    /// Writes every dirty non-pipe inode into its buffer.
    pub fn sync_inodes(&self) {
        for i in 0..NR_INODE {
            let mut c = self.itable.ctrl.lock();
            while c.e[i].locked {
                c = self.itable.cells[i].wait.sleep(c);
            }
            if c.e[i].dirty && !c.e[i].pipe && c.e[i].dev != 0 {
                c.e[i].locked = true;
                drop(c);
                self.write_inode_slot(i);
                let mut c = self.itable.ctrl.lock();
                c.e[i].dirty = false;
                c.e[i].locked = false;
                drop(c);
                self.itable.cells[i].wait.wakeup();
            }
        }
    }

    /// Forgets every in-memory inode of a removed device.  References that
    /// are still live are reported; the kernel cannot do better.
    pub(crate) fn invalidate_inodes(&self, dev: u32) {
        for i in 0..NR_INODE {
            let mut c = self.itable.ctrl.lock();
            while c.e[i].locked {
                c = self.itable.cells[i].wait.sleep(c);
            }
            if c.e[i].dev == dev {
                if c.e[i].count != 0 {
                    printk!("inode in use on removed disk");
                }
                c.e[i].dev = 0;
                c.e[i].dirty = false;
            }
        }
    }

    /// Allocates a pipe inode: no device, no on-disk record, a one-page
    /// ring as content, and one reference for each end.
    pub(crate) fn get_pipe_inode(&self) -> InodePtr {
        let ip = self.get_empty_inode();
        {
            let mut c = self.itable.ctrl.lock();
            c.e[ip.idx].locked = true;
            drop(c);
            let data = unsafe { &mut *self.itable.cells[ip.idx].data.get() };
            data.content = Content::Pipe(PipeRing::new());
            let mut c = self.itable.ctrl.lock();
            c.e[ip.idx].count = 2; /* sum of readers/writers */
            c.e[ip.idx].pipe = true;
            c.e[ip.idx].locked = false;
            drop(c);
            self.itable.cells[ip.idx].wait.wakeup();
        }
        ip
    }

    /// The second reference taken by `get_pipe_inode`, materialized as a
    /// pointer for the writing end.
    pub(crate) fn pipe_second_ref(&self, ip: &InodePtr) -> InodePtr {
        debug_assert!(self.itable.ctrl.lock().e[ip.idx].pipe);
        InodePtr { idx: ip.idx }
    }

    pub(crate) fn inode_ref_count(&self, ip: &InodePtr) -> u32 {
        self.itable.ctrl.lock().e[ip.idx].count
    }

    /// The (device, inode number) identity behind a reference.
    pub(crate) fn inode_id(&self, ip: &InodePtr) -> (u32, u16) {
        let c = self.itable.ctrl.lock();
        (c.e[ip.idx].dev, c.e[ip.idx].inum)
    }

    pub(crate) fn inode_is_pipe(&self, ip: &InodePtr) -> bool {
        self.itable.ctrl.lock().e[ip.idx].pipe
    }

    pub(crate) fn inode_is_mount_point(&self, ip: &InodePtr) -> bool {
        self.itable.ctrl.lock().e[ip.idx].mounted
    }

    pub(crate) fn set_mount_point(&self, ip: &InodePtr, mounted: bool) {
        let mut c = self.itable.ctrl.lock();
        c.e[ip.idx].mounted = mounted;
        if mounted {
            c.e[ip.idx].dirty = true;
        }
    }

    /// Whether any in-core inode of `dev` is still referenced.
    pub(crate) fn any_inode_in_use(&self, dev: u32) -> bool {
        let c = self.itable.ctrl.lock();
        c.e.iter().any(|e| e.dev == dev && e.count > 0)
    }

    /// (dev, inum, count, nlinks) of a slot whose lock the caller holds.
    pub(crate) fn inode_slot_state(&self, idx: usize) -> (u32, u16, u32, u8) {
        let c = self.itable.ctrl.lock();
        let data = unsafe { &*self.itable.cells[idx].data.get() };
        (c.e[idx].dev, c.e[idx].inum, c.e[idx].count, data.nlinks)
    }

    /// Zeroes a slot whose lock the caller holds, releasing its reference
    /// and waking any waiters.
    pub(crate) fn clear_inode_slot(&self, idx: usize) {
        let mut c = self.itable.ctrl.lock();
        debug_assert!(c.e[idx].locked);
        unsafe {
            *self.itable.cells[idx].data.get() = InodeData::default();
        }
        c.e[idx] = IEntry::default();
        drop(c);
        self.itable.cells[idx].wait.wakeup();
    }
}
