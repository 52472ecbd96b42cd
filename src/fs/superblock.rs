//! Superblocks and the mount table.
//!
//! A fixed table of `NR_SUPER` slots describes the mounted filesystems.
//! Each slot is guarded by its own lock; holding the slot's guard is the
//! per-superblock lock that serializes bitmap updates and mount state.
//! The bitmap blocks of a mounted filesystem stay pinned in the buffer
//! cache from `read_super` until `put_super`.

use arrayvec::ArrayVec;
use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::bio::BufHandle;
use crate::error::{Error, Result};
use crate::fs::inode::InodePtr;
use crate::fs::Mfs;
use crate::lock::{SleepableLock, SleepableLockGuard};
use crate::param::{INODES_PER_BLOCK, I_MAP_SLOTS, NR_SUPER, ROOT_INO, SUPER_MAGIC, Z_MAP_SLOTS};
use crate::proc::Proc;

/// On-disk superblock, block 1 of the device.
#[repr(C)]
#[derive(Clone, Copy, Default, AsBytes, FromBytes)]
pub struct DSuperBlock {
    pub ninodes: u16,
    pub nzones: u16,
    pub imap_blocks: u16,
    pub zmap_blocks: u16,
    pub firstdatazone: u16,
    pub log_zone_size: u16,
    pub max_size: u32,
    pub magic: u16,
    pub pad: u16,
}

const_assert_eq!(core::mem::size_of::<DSuperBlock>(), 20);

/// A mounted filesystem.
pub struct SuperBlock {
    pub ninodes: u16,
    pub nzones: u16,
    pub imap_blocks: u16,
    pub zmap_blocks: u16,
    pub firstdatazone: u16,
    pub log_zone_size: u16,
    pub max_size: u32,
    /// Pinned buffers holding the inode bitmap.
    pub imap: ArrayVec<BufHandle, I_MAP_SLOTS>,
    /// Pinned buffers holding the zone bitmap.
    pub zmap: ArrayVec<BufHandle, Z_MAP_SLOTS>,
    /// Root inode of this filesystem, held only for the root device.
    pub isup: Option<InodePtr>,
    /// The inode this filesystem is mounted over.  The reference is kept
    /// for the whole mount; `umount` releases it.
    pub imount: Option<InodePtr>,
    pub rd_only: bool,
}

impl SuperBlock {
    /// Block holding the on-disk inode `inum`.
    pub fn iblock(&self, inum: u16) -> u32 {
        2 + self.imap_blocks as u32
            + self.zmap_blocks as u32
            + (inum as u32 - 1) / INODES_PER_BLOCK as u32
    }
}

pub struct SuperSlot {
    pub dev: u32,
    pub sb: Option<SuperBlock>,
}

pub type SuperGuard<'s> = SleepableLockGuard<'s, SuperSlot>;

pub struct MountTable {
    slots: [SleepableLock<SuperSlot>; NR_SUPER],
}

impl MountTable {
    pub fn new() -> Self {
        Self {
            slots: array_macro::array![_ => SleepableLock::new(SuperSlot { dev: 0, sb: None }); NR_SUPER],
        }
    }
}

impl Mfs {
    /// Returns the mounted superblock for `dev`, holding its lock.
    pub(crate) fn get_super(&self, dev: u32) -> Option<SuperGuard<'_>> {
        if dev == 0 {
            return None;
        }
        for slot in &self.mounts.slots {
            let guard = slot.lock();
            if guard.dev == dev {
                return Some(guard);
            }
        }
        None
    }

    /// If the inode table slot `idx` has a filesystem mounted on it,
    /// returns that filesystem's device.
    pub(crate) fn covering_super(&self, idx: usize) -> Option<u32> {
        for slot in &self.mounts.slots {
            let guard = slot.lock();
            if let Some(sb) = &guard.sb {
                if sb.imount.as_ref().map_or(false, |ip| ip.slot() == idx) {
                    return Some(guard.dev);
                }
            }
        }
        None
    }

    /// Reads the superblock of `dev` into a free table slot, pinning its
    /// bitmap buffers.  Returns the existing slot if `dev` is mounted.
    pub(crate) fn read_super(&self, dev: u32) -> Result<SuperGuard<'_>> {
        if dev == 0 {
            return Err(Error::NoDev);
        }
        self.check_disk_change(dev);
        if let Some(guard) = self.get_super(dev) {
            return Ok(guard);
        }
        let mut guard = self
            .mounts
            .slots
            .iter()
            .find_map(|slot| {
                let guard = slot.lock();
                if guard.dev == 0 {
                    Some(guard)
                } else {
                    None
                }
            })
            .ok_or(Error::Busy)?;
        guard.dev = dev;

        let mut dsb = DSuperBlock::default();
        match self.bcache.bread(dev, 1) {
            Ok(buf) => dsb
                .as_bytes_mut()
                .copy_from_slice(&buf.data()[..core::mem::size_of::<DSuperBlock>()]),
            Err(e) => {
                guard.dev = 0;
                return Err(e);
            }
        }
        if dsb.magic != SUPER_MAGIC
            || dsb.imap_blocks == 0
            || dsb.zmap_blocks == 0
            || dsb.imap_blocks as usize > I_MAP_SLOTS
            || dsb.zmap_blocks as usize > Z_MAP_SLOTS
        {
            guard.dev = 0;
            return Err(Error::Inval);
        }

        let mut imap: ArrayVec<BufHandle, I_MAP_SLOTS> = ArrayVec::new();
        let mut zmap: ArrayVec<BufHandle, Z_MAP_SLOTS> = ArrayVec::new();
        let mut block = 2;
        let mut ok = true;
        for _ in 0..dsb.imap_blocks {
            match self.bcache.bread(dev, block) {
                Ok(buf) => {
                    imap.push(buf.pin());
                    block += 1;
                }
                Err(_) => {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            for _ in 0..dsb.zmap_blocks {
                match self.bcache.bread(dev, block) {
                    Ok(buf) => {
                        zmap.push(buf.pin());
                        block += 1;
                    }
                    Err(_) => {
                        ok = false;
                        break;
                    }
                }
            }
        }
        if !ok {
            for h in imap {
                self.bcache.release(h);
            }
            for h in zmap {
                self.bcache.release(h);
            }
            guard.dev = 0;
            return Err(Error::Io);
        }

        // Bit 0 of each bitmap is a sentinel: never hand out object 0.
        self.bcache.lock_buf(&imap[0]).data_mut()[0] |= 1;
        self.bcache.lock_buf(&zmap[0]).data_mut()[0] |= 1;

        guard.sb = Some(SuperBlock {
            ninodes: dsb.ninodes,
            nzones: dsb.nzones,
            imap_blocks: dsb.imap_blocks,
            zmap_blocks: dsb.zmap_blocks,
            firstdatazone: dsb.firstdatazone,
            log_zone_size: dsb.log_zone_size,
            max_size: dsb.max_size,
            imap,
            zmap,
            isup: None,
            imount: None,
            rd_only: false,
        });
        Ok(guard)
    }

    /// Forgets the superblock of `dev`, unpinning its bitmap buffers.
    /// Refuses the root device and any still-mounted filesystem.
    pub(crate) fn put_super(&self, dev: u32) {
        if dev == self.root_dev() {
            printk!("root diskette changed: prepare for armageddon");
            return;
        }
        let mut guard = match self.get_super(dev) {
            Some(guard) => guard,
            None => return,
        };
        if guard.sb.as_ref().map_or(false, |sb| sb.imount.is_some()) {
            printk!("Mounted disk changed - tssk, tssk");
            return;
        }
        guard.dev = 0;
        if let Some(sb) = guard.sb.take() {
            debug_assert!(sb.isup.is_none());
            for h in sb.imap {
                self.bcache.release(h);
            }
            for h in sb.zmap {
                self.bcache.release(h);
            }
        }
    }

    /// Asks the driver whether the medium changed; if so, drops everything
    /// cached for the device.  Called on mount and on open of a block
    /// device.
    pub fn check_disk_change(&self, dev: u32) {
        let changed = self
            .bcache
            .device(dev)
            .map_or(false, |disk| disk.check_media_change());
        if !changed {
            return;
        }
        if self.get_super(dev).is_some() {
            self.put_super(dev);
        }
        self.invalidate_inodes(dev);
        self.bcache.invalidate(dev);
    }

    /// Mounts the filesystem on the block device named by `dev_path` over
    /// the directory named by `dir_path`.  The directory's reference is
    /// deliberately kept: it pins the mount until `umount`.
    pub fn mount(&self, proc: &Proc, dev_path: &[u8], dir_path: &[u8], rd_only: bool) -> Result<()> {
        let dev = self.blkdev_of(proc, dev_path, Error::Perm)?;
        let dir = self.namei(proc, dir_path)?;
        let dir = scopeguard::guard(dir, |dir| self.iput(dir));
        let (dir_inum, dir_mode) = {
            let guard = self.ilock(&dir);
            (guard.inum, guard.mode)
        };
        if self.inode_ref_count(&dir) != 1 || dir_inum == ROOT_INO {
            return Err(Error::Busy);
        }
        if !dir_mode.is_dir() {
            return Err(Error::Perm);
        }

        let mut sguard = self.read_super(dev)?;
        let sb = sguard.sb.as_mut().unwrap();
        if sb.imount.is_some() {
            return Err(Error::Busy);
        }
        if self.inode_is_mount_point(&dir) {
            return Err(Error::Perm);
        }
        sb.rd_only = rd_only;
        let dir = scopeguard::ScopeGuard::into_inner(dir);
        self.set_mount_point(&dir, true);
        sb.imount = Some(dir); /* NOTE! we don't iput the dir */
        Ok(())
    }

    /// Unmounts the filesystem on the block device named by `dev_path`.
    pub fn umount(&self, proc: &Proc, dev_path: &[u8]) -> Result<()> {
        let dev = self.blkdev_of(proc, dev_path, Error::NotBlk)?;
        if dev == self.root_dev() {
            return Err(Error::Busy);
        }
        {
            let mut sguard = self.get_super(dev).ok_or(Error::NoEnt)?;
            let sb = sguard.sb.as_mut().ok_or(Error::NoEnt)?;
            if sb.imount.is_none() {
                return Err(Error::NoEnt);
            }
            if !self.inode_is_mount_point(sb.imount.as_ref().unwrap()) {
                printk!("Mounted inode has i_mount=0");
            }
            if self.any_inode_in_use(dev) {
                return Err(Error::Busy);
            }
            let mount_point = sb.imount.take().unwrap();
            self.set_mount_point(&mount_point, false);
            drop(sguard);
            self.iput(mount_point);
        }
        self.put_super(dev);
        self.sync_dev(dev);
        Ok(())
    }

    /// Resolves a path to a block special file and returns its device
    /// number; `type_err` is reported when it names something else.
    fn blkdev_of(&self, proc: &Proc, path: &[u8], type_err: Error) -> Result<u32> {
        let ip = self.namei(proc, path)?;
        let ip = scopeguard::guard(ip, |ip| self.iput(ip));
        let guard = self.ilock(&ip);
        if !guard.mode.is_blk() {
            return Err(type_err);
        }
        Ok(guard.rdev() as u32)
    }

    /// Reads the root filesystem's superblock and pins its root inode.
    /// Must run before any path resolution.
    pub fn mount_root(&self, dev: u32) -> Result<()> {
        drop(self.read_super(dev)?);
        let root = self.iget(dev, ROOT_INO)?;
        let root2 = self.idup(&root);
        {
            let mut sguard = self.get_super(dev).unwrap();
            let sb = sguard.sb.as_mut().unwrap();
            sb.isup = Some(root);
            sb.imount = Some(root2);

            let mut free = 0;
            for bit in 0..sb.nzones as usize {
                let buf = self.bcache.lock_buf(&sb.zmap[bit >> 13]);
                if buf.data()[(bit & 8191) >> 3] & (1 << (bit & 7)) == 0 {
                    free += 1;
                }
            }
            printk!("{}/{} free blocks", free, sb.nzones);
            let mut free = 0;
            for bit in 0..=sb.ninodes as usize {
                let buf = self.bcache.lock_buf(&sb.imap[bit >> 13]);
                if buf.data()[(bit & 8191) >> 3] & (1 << (bit & 7)) == 0 {
                    free += 1;
                }
            }
            printk!("{}/{} free inodes", free, sb.ninodes);
        }
        *self.root_dev.lock() = dev;
        Ok(())
    }

    pub(crate) fn root_dev(&self) -> u32 {
        *self.root_dev.lock()
    }
}
