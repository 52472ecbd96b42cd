//! Inode and zone bitmap allocators.
//!
//! The bitmaps live in the buffers pinned by the superblock; each covers
//! up to 8 blocks of 8192 bits.  Bit 0 of each map is a sentinel that is
//! always set, so object numbers start at 1.  A bit found already set on
//! allocation or already clear on free means the filesystem is corrupt,
//! and the kernel halts rather than make it worse.

use crate::bio::BufData;
use crate::error::{Error, Result};
use crate::fs::inode::InodePtr;
use crate::fs::{current_time, Mfs};
use crate::proc::Proc;

/// Bits per bitmap block.
const BITS_PER_BLOCK: usize = 8192;

/// Sets bit `nr`, returning its previous value.
pub(crate) fn set_bit(data: &mut BufData, nr: usize) -> bool {
    let mask = 1u8 << (nr & 7);
    let old = data[nr >> 3] & mask != 0;
    data[nr >> 3] |= mask;
    old
}

/// Clears bit `nr`, returning its previous value.
pub(crate) fn clear_bit(data: &mut BufData, nr: usize) -> bool {
    let mask = 1u8 << (nr & 7);
    let old = data[nr >> 3] & mask != 0;
    data[nr >> 3] &= !mask;
    old
}

pub(crate) fn test_bit(data: &BufData, nr: usize) -> bool {
    data[nr >> 3] & (1 << (nr & 7)) != 0
}

/// Index of the first zero bit in a bitmap block, or `BITS_PER_BLOCK` if
/// every bit is set.
pub(crate) fn find_first_zero(data: &BufData) -> usize {
    for (i, &byte) in data.iter().enumerate() {
        if byte != 0xff {
            return i * 8 + (!byte).trailing_zeros() as usize;
        }
    }
    BITS_PER_BLOCK
}

impl Mfs {
    /// Allocates a zeroed data block on `dev` and returns its absolute
    /// block number, or 0 if the device is full.
    pub(crate) fn new_block(&self, dev: u32) -> u32 {
        let mut sguard = self
            .get_super(dev)
            .unwrap_or_else(|| panic!("trying to get new block from nonexistant device"));
        let sb = sguard.sb.as_mut().unwrap();

        let mut bit = BITS_PER_BLOCK;
        let mut map = 0;
        for (i, handle) in sb.zmap.iter().enumerate() {
            let buf = self.bcache.lock_buf(handle);
            bit = find_first_zero(buf.data());
            map = i;
            if bit < BITS_PER_BLOCK {
                break;
            }
        }
        if bit >= BITS_PER_BLOCK {
            return 0;
        }
        {
            let mut buf = self.bcache.lock_buf(&sb.zmap[map]);
            if set_bit(buf.data_mut(), bit) {
                panic!("new_block: bit already set");
            }
            buf.mark_dirty();
        }
        let block = (bit + map * BITS_PER_BLOCK) as u32 + sb.firstdatazone as u32 - 1;
        if block >= sb.nzones as u32 {
            return 0;
        }

        // Fresh acquisition: nobody else may be holding the dead block.
        let mut buf = self.bcache.getblk(dev, block);
        if buf.ref_count() != 1 {
            panic!("new block: count is != 1");
        }
        buf.data_mut().fill(0);
        buf.mark_uptodate();
        buf.mark_dirty();
        drop(buf);
        block
    }

    /// Returns data block `block` of `dev` to the zone bitmap.
    pub(crate) fn free_block(&self, dev: u32, block: u32) {
        let mut sguard = self
            .get_super(dev)
            .unwrap_or_else(|| panic!("trying to free block on nonexistent device"));
        let sb = sguard.sb.as_mut().unwrap();
        if block < sb.firstdatazone as u32 || block >= sb.nzones as u32 {
            panic!("trying to free block not in datazone");
        }
        if let Some(handle) = self.bcache.get_cached(dev, block) {
            if self.bcache.ref_count(&handle) != 1 {
                printk!(
                    "trying to free block ({:#06x}:{}), count={}",
                    dev,
                    block,
                    self.bcache.ref_count(&handle)
                );
                self.bcache.release(handle);
                return;
            }
            self.bcache.forget_contents(&handle);
            self.bcache.release(handle);
        }

        let bit = (block - (sb.firstdatazone as u32 - 1)) as usize;
        let mut buf = self.bcache.lock_buf(&sb.zmap[bit / BITS_PER_BLOCK]);
        if !clear_bit(buf.data_mut(), bit & (BITS_PER_BLOCK - 1)) {
            printk!("block ({:#06x}:{}) ", dev, block);
            panic!("free_block: bit already cleared");
        }
        buf.mark_dirty();
    }

    /// Allocates an inode on `dev`: claims a bit in the inode bitmap and
    /// an in-memory slot, stamped with the caller's credentials.
    pub(crate) fn new_inode(&self, proc: &Proc, dev: u32) -> Result<InodePtr> {
        let ip = self.get_empty_inode();
        let inum;
        {
            let mut sguard = self
                .get_super(dev)
                .unwrap_or_else(|| panic!("new_inode with unknown device"));
            let sb = sguard.sb.as_mut().unwrap();

            let mut bit = BITS_PER_BLOCK;
            let mut map = 0;
            for (i, handle) in sb.imap.iter().enumerate() {
                let buf = self.bcache.lock_buf(handle);
                bit = find_first_zero(buf.data());
                map = i;
                if bit < BITS_PER_BLOCK {
                    break;
                }
            }
            if bit >= BITS_PER_BLOCK || bit + map * BITS_PER_BLOCK > sb.ninodes as usize {
                drop(sguard);
                self.iput(ip);
                return Err(Error::NoSpc);
            }
            let mut buf = self.bcache.lock_buf(&sb.imap[map]);
            if set_bit(buf.data_mut(), bit) {
                panic!("new_inode: bit already set");
            }
            buf.mark_dirty();
            inum = (bit + map * BITS_PER_BLOCK) as u16;
        }

        let now = current_time();
        self.adopt_inode(&ip, dev, inum);
        let mut guard = self.ilock(&ip);
        guard.nlinks = 1;
        guard.uid = proc.euid;
        guard.gid = proc.egid;
        guard.mtime = now;
        guard.atime = now;
        guard.ctime = now;
        guard.mark_dirty();
        drop(guard);
        Ok(ip)
    }

    /// Drops inode slot `idx` back to the inode bitmap.  Called from
    /// `iput` when the last reference to an unlinked inode goes away.
    pub(crate) fn free_inode_slot(&self, idx: usize) {
        let (dev, inum, count, nlinks) = self.inode_slot_state(idx);
        if dev == 0 {
            self.clear_inode_slot(idx);
            return;
        }
        if count > 1 {
            printk!("trying to free inode with count={}", count);
            panic!("free_inode");
        }
        if nlinks != 0 {
            panic!("trying to free inode with links");
        }
        {
            let mut sguard = self
                .get_super(dev)
                .unwrap_or_else(|| panic!("trying to free inode on nonexistent device"));
            let sb = sguard.sb.as_mut().unwrap();
            if inum < 1 || inum > sb.ninodes {
                panic!("trying to free inode 0 or nonexistant inode");
            }
            let map = (inum as usize) >> 13;
            if map >= sb.imap.len() {
                panic!("nonexistent imap in superblock");
            }
            let mut buf = self.bcache.lock_buf(&sb.imap[map]);
            if !clear_bit(buf.data_mut(), inum as usize & (BITS_PER_BLOCK - 1)) {
                panic!("free_inode: bit already cleared");
            }
            buf.mark_dirty();
        }
        self.clear_inode_slot(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::BLOCK_SIZE;

    fn block_of(bytes: &[u8]) -> BufData {
        let mut data = BufData::zeroed_for_test();
        data[..bytes.len()].copy_from_slice(bytes);
        data
    }

    #[test]
    fn first_zero_scans_past_full_bytes() {
        let data = block_of(&[0xff, 0xff, 0b0000_0111]);
        assert_eq!(find_first_zero(&data), 19);
    }

    #[test]
    fn first_zero_of_empty_map_is_zero() {
        let data = block_of(&[]);
        assert_eq!(find_first_zero(&data), 0);
    }

    #[test]
    fn full_map_has_no_zero() {
        let data = block_of(&[0xff; BLOCK_SIZE]);
        assert_eq!(find_first_zero(&data), super::BITS_PER_BLOCK);
    }

    #[test]
    fn set_and_clear_report_previous_value() {
        let mut data = block_of(&[]);
        assert!(!set_bit(&mut data, 100));
        assert!(set_bit(&mut data, 100));
        assert!(test_bit(&data, 100));
        assert!(clear_bit(&mut data, 100));
        assert!(!clear_bit(&mut data, 100));
    }
}
