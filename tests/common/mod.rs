//! Shared test fixtures: a tiny Minix-v1 image builder and raw-image
//! inspectors, so tests can assert on what actually reaches the disk.

#![allow(dead_code)]

use std::sync::Arc;

use mfs_kernel::dev::RamDisk;
use mfs_kernel::param::BLOCK_SIZE;
use mfs_kernel::{Mfs, Proc};

pub const ROOT_DEV: u32 = 1;

const SUPER_MAGIC: u16 = 0x137F;
const INODE_SIZE: usize = 32;

/// Fixed layout used by every test image: one inode-map block, one
/// zone-map block.
pub struct Layout {
    pub nblocks: usize,
    pub ninodes: usize,
}

impl Layout {
    pub fn itable_blocks(&self) -> usize {
        (self.ninodes + 31) / 32
    }

    pub fn firstdatazone(&self) -> usize {
        2 + 1 + 1 + self.itable_blocks()
    }

    pub fn imap_start(&self) -> usize {
        2
    }

    pub fn zmap_start(&self) -> usize {
        3
    }

    pub fn itable_start(&self) -> usize {
        4
    }
}

fn put_u16(image: &mut [u8], off: usize, val: u16) {
    image[off..off + 2].copy_from_slice(&val.to_le_bytes());
}

fn put_u32(image: &mut [u8], off: usize, val: u32) {
    image[off..off + 4].copy_from_slice(&val.to_le_bytes());
}

pub fn get_u16(image: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([image[off], image[off + 1]])
}

pub fn get_u32(image: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([image[off], image[off + 1], image[off + 2], image[off + 3]])
}

/// Builds a fresh filesystem image holding only a root directory.
pub fn mkfs(layout: &Layout) -> Vec<u8> {
    let mut image = vec![0u8; layout.nblocks * BLOCK_SIZE];
    let sb = BLOCK_SIZE;
    put_u16(&mut image, sb, layout.ninodes as u16);
    put_u16(&mut image, sb + 2, layout.nblocks as u16);
    put_u16(&mut image, sb + 4, 1); // imap blocks
    put_u16(&mut image, sb + 6, 1); // zmap blocks
    put_u16(&mut image, sb + 8, layout.firstdatazone() as u16);
    put_u16(&mut image, sb + 10, 0); // log zone size
    put_u32(&mut image, sb + 12, (7 + 512 + 512 * 512) * 1024);
    put_u16(&mut image, sb + 16, SUPER_MAGIC);

    // Bitmaps: bit 0 of each is the sentinel.  Inode 1 (the root) and the
    // root directory's data zone are in use; all trailing bits past the
    // device end are set so the allocator never wanders off the disk.
    let imap = layout.imap_start() * BLOCK_SIZE;
    image[imap] = 0b0000_0011; // sentinel + inode 1
    for bit in layout.ninodes + 1..8 * BLOCK_SIZE {
        image[imap + bit / 8] |= 1 << (bit % 8);
    }
    let zmap = layout.zmap_start() * BLOCK_SIZE;
    image[zmap] = 0b0000_0011; // sentinel + root dir data
    let nzones = layout.nblocks - layout.firstdatazone() + 1;
    for bit in nzones..8 * BLOCK_SIZE {
        image[zmap + bit / 8] |= 1 << (bit % 8);
    }

    // Root inode.
    let root_block = layout.firstdatazone();
    let ino = layout.itable_start() * BLOCK_SIZE; // inode 1 is the first record
    put_u16(&mut image, ino, 0o40777); // mode: drwxrwxrwx
    put_u16(&mut image, ino + 2, 0); // uid
    put_u32(&mut image, ino + 4, 32); // size: "." and ".."
    put_u32(&mut image, ino + 8, 0); // mtime
    image[ino + 12] = 0; // gid
    image[ino + 13] = 2; // nlinks
    put_u16(&mut image, ino + 14, root_block as u16); // zone[0]

    // Root directory data: "." and "..".
    let data = root_block * BLOCK_SIZE;
    put_u16(&mut image, data, 1);
    image[data + 2] = b'.';
    put_u16(&mut image, data + 16, 1);
    image[data + 18..data + 20].copy_from_slice(b"..");
    image
}

pub fn small_layout() -> Layout {
    Layout {
        nblocks: 256,
        ninodes: 64,
    }
}

/// A mounted filesystem plus a superuser process working in its root.
pub fn setup(nbuf: usize) -> (Arc<Mfs>, Proc, Arc<RamDisk>) {
    let layout = small_layout();
    let disk = Arc::new(RamDisk::from_image(mkfs(&layout)));
    let fs = Arc::new(Mfs::new(nbuf));
    fs.register_device(ROOT_DEV, disk.clone());
    fs.mount_root(ROOT_DEV).expect("mount_root");
    let proc = fs.init_proc();
    (fs, proc, disk)
}

/// Number of set bits in the zone bitmap (sentinel and end padding
/// included, so compare deltas, not absolutes).
pub fn zmap_ones(image: &[u8], layout: &Layout) -> usize {
    let zmap = layout.zmap_start() * BLOCK_SIZE;
    let nzones = layout.nblocks - layout.firstdatazone() + 1;
    (0..nzones)
        .filter(|bit| image[zmap + bit / 8] & (1 << (bit % 8)) != 0)
        .count()
}

pub fn imap_ones(image: &[u8], layout: &Layout) -> usize {
    let imap = layout.imap_start() * BLOCK_SIZE;
    (0..=layout.ninodes)
        .filter(|bit| image[imap + bit / 8] & (1 << (bit % 8)) != 0)
        .count()
}

/// The raw 32-byte on-disk record of inode `inum`.
pub fn dinode<'a>(image: &'a [u8], layout: &Layout, inum: usize) -> &'a [u8] {
    let off = layout.itable_start() * BLOCK_SIZE + (inum - 1) * INODE_SIZE;
    &image[off..off + INODE_SIZE]
}

pub fn dinode_zone(image: &[u8], layout: &Layout, inum: usize, idx: usize) -> u16 {
    let d = dinode(image, layout, inum);
    get_u16(d, 14 + idx * 2)
}

pub fn dinode_size(image: &[u8], layout: &Layout, inum: usize) -> u32 {
    get_u32(dinode(image, layout, inum), 4)
}

pub fn dinode_nlinks(image: &[u8], layout: &Layout, inum: usize) -> u8 {
    dinode(image, layout, inum)[13]
}
