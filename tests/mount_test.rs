//! Mounting a second device: lookup crossing, `..` at a mounted root,
//! busy checks, cross-device links, and unmount round-trips.

mod common;

use std::sync::Arc;

use common::*;
use mfs_kernel::dev::RamDisk;
use mfs_kernel::fs::stat::S_IFBLK;
use mfs_kernel::{Error, Mfs, OpenFlags, Proc};

const HD1: u32 = 2;

/// Root filesystem plus a formatted second disk and its device node at
/// /dev/hd1, not yet mounted.
fn setup_two_disks() -> (Arc<Mfs>, Proc, Arc<RamDisk>, Arc<RamDisk>) {
    let (fs, mut proc, disk) = setup(24);
    let disk2 = Arc::new(RamDisk::from_image(mkfs(&small_layout())));
    fs.register_device(HD1, disk2.clone());
    fs.mkdir(&proc, b"/dev", 0o755).unwrap();
    fs.mknod(&mut proc, b"/dev/hd1", S_IFBLK | 0o600, HD1 as u16)
        .unwrap();
    fs.mkdir(&proc, b"/mnt", 0o755).unwrap();
    (fs, proc, disk, disk2)
}

#[test]
fn mount_crosses_into_the_new_filesystem() {
    let (fs, mut proc, _d1, _d2) = setup_two_disks();
    fs.mount(&proc, b"/dev/hd1", b"/mnt", false).unwrap();

    let st = fs.stat(&proc, b"/mnt").unwrap();
    assert_eq!(st.dev, HD1);
    assert_eq!(st.ino, 1);

    let fd = fs.creat(&mut proc, b"/mnt/x", 0o644).unwrap();
    fs.write(&mut proc, fd, &b"on hd1"[..], 6).unwrap();
    fs.close(&mut proc, fd).unwrap();
    assert_eq!(fs.stat(&proc, b"/mnt/x").unwrap().dev, HD1);

    fs.umount(&proc, b"/dev/hd1").unwrap();
    // The name vanished with the mount...
    assert_eq!(fs.stat(&proc, b"/mnt/x"), Err(Error::NoEnt));
    assert_eq!(fs.stat(&proc, b"/mnt").unwrap().dev, ROOT_DEV);
}

#[test]
fn unmounted_image_carries_the_written_file() {
    let layout = small_layout();
    let (fs, mut proc, _d1, disk2) = setup_two_disks();
    let base_zones = zmap_ones(&disk2.snapshot(), &layout);

    fs.mount(&proc, b"/dev/hd1", b"/mnt", false).unwrap();
    let fd = fs.creat(&mut proc, b"/mnt/x", 0o644).unwrap();
    fs.write(&mut proc, fd, &b"persisted"[..], 9).unwrap();
    fs.close(&mut proc, fd).unwrap();
    fs.umount(&proc, b"/dev/hd1").unwrap();

    let image = disk2.snapshot();
    assert_eq!(zmap_ones(&image, &layout), base_zones + 1);
    assert_eq!(dinode_size(&image, &layout, 2), 9);

    // Remount and read it back through a fresh core.
    let fs2 = Mfs::new(8);
    fs2.register_device(ROOT_DEV, Arc::new(RamDisk::from_image(image)));
    fs2.mount_root(ROOT_DEV).unwrap();
    let mut proc2 = fs2.init_proc();
    let fd = fs2.open(&mut proc2, b"/x", OpenFlags::O_RDONLY, 0).unwrap();
    let mut buf = [0u8; 9];
    fs2.read(&mut proc2, fd, &mut buf[..], 9).unwrap();
    assert_eq!(&buf, b"persisted");
    fs2.close(&mut proc2, fd).unwrap();
}

#[test]
fn mount_then_umount_leaves_the_image_unchanged() {
    let (fs, proc, _d1, disk2) = setup_two_disks();
    let before = disk2.snapshot();
    fs.mount(&proc, b"/dev/hd1", b"/mnt", false).unwrap();
    fs.umount(&proc, b"/dev/hd1").unwrap();
    assert_eq!(disk2.snapshot(), before);
}

#[test]
fn dotdot_at_a_mounted_root_reaches_the_parent_filesystem() {
    let (fs, mut proc, _d1, _d2) = setup_two_disks();
    fs.mount(&proc, b"/dev/hd1", b"/mnt", false).unwrap();

    let st = fs.stat(&proc, b"/mnt/..").unwrap();
    assert_eq!(st.dev, ROOT_DEV);
    assert_eq!(st.ino, 1);

    // The same walk from inside the mounted filesystem.
    fs.chdir(&mut proc, b"/mnt").unwrap();
    let st = fs.stat(&proc, b"..").unwrap();
    assert_eq!(st.dev, ROOT_DEV);
    fs.chdir(&mut proc, b"/").unwrap();
    fs.umount(&proc, b"/dev/hd1").unwrap();
}

#[test]
fn umount_refuses_busy_filesystems() {
    let (fs, mut proc, _d1, _d2) = setup_two_disks();
    fs.mount(&proc, b"/dev/hd1", b"/mnt", false).unwrap();
    let fd = fs.creat(&mut proc, b"/mnt/busy", 0o644).unwrap();
    assert_eq!(fs.umount(&proc, b"/dev/hd1"), Err(Error::Busy));
    fs.close(&mut proc, fd).unwrap();
    fs.umount(&proc, b"/dev/hd1").unwrap();
}

#[test]
fn umount_of_the_root_device_is_refused() {
    let (fs, mut proc, _d1, _d2) = setup_two_disks();
    fs.mknod(&mut proc, b"/dev/root", S_IFBLK | 0o600, ROOT_DEV as u16)
        .unwrap();
    assert_eq!(fs.umount(&proc, b"/dev/root"), Err(Error::Busy));
}

#[test]
fn mount_over_a_busy_or_taken_directory_fails() {
    let (fs, mut proc, _d1, _d2) = setup_two_disks();
    // A directory someone holds open cannot become a mount point.
    let fd = fs.open(&mut proc, b"/mnt", OpenFlags::O_RDONLY, 0).unwrap();
    assert_eq!(
        fs.mount(&proc, b"/dev/hd1", b"/mnt", false),
        Err(Error::Busy)
    );
    fs.close(&mut proc, fd).unwrap();

    fs.mount(&proc, b"/dev/hd1", b"/mnt", false).unwrap();
    // Mounting the same device elsewhere reports it busy.
    fs.mkdir(&proc, b"/mnt2", 0o755).unwrap();
    assert_eq!(
        fs.mount(&proc, b"/dev/hd1", b"/mnt2", false),
        Err(Error::Busy)
    );
    fs.umount(&proc, b"/dev/hd1").unwrap();
}

#[test]
fn mount_requires_a_block_device() {
    let (fs, mut proc, _d1, _d2) = setup_two_disks();
    let fd = fs.creat(&mut proc, b"/notadev", 0o644).unwrap();
    fs.close(&mut proc, fd).unwrap();
    assert_eq!(
        fs.mount(&proc, b"/notadev", b"/mnt", false),
        Err(Error::Perm)
    );
    assert_eq!(fs.umount(&proc, b"/notadev"), Err(Error::NotBlk));
}

#[test]
fn cross_device_link_is_refused_without_side_effects() {
    let (fs, mut proc, _d1, _d2) = setup_two_disks();
    fs.mount(&proc, b"/dev/hd1", b"/mnt", false).unwrap();
    let fd = fs.creat(&mut proc, b"/x", 0o644).unwrap();
    fs.close(&mut proc, fd).unwrap();

    assert_eq!(fs.link(&proc, b"/x", b"/mnt/y"), Err(Error::XDev));
    assert_eq!(fs.stat(&proc, b"/mnt/y"), Err(Error::NoEnt));
    assert_eq!(fs.stat(&proc, b"/x").unwrap().nlink, 1);
    fs.umount(&proc, b"/dev/hd1").unwrap();
}

#[test]
fn raw_block_device_io_goes_through_the_cache() {
    let (fs, mut proc, _d1, disk2) = setup_two_disks();
    let fd = fs
        .open(&mut proc, b"/dev/hd1", OpenFlags::O_RDWR, 0)
        .unwrap();
    // Block 1 of the image is the superblock; its magic is readable.
    fs.lseek(&mut proc, fd, 1024 + 16, mfs_kernel::SEEK_SET).unwrap();
    let mut magic = [0u8; 2];
    fs.read(&mut proc, fd, &mut magic[..], 2).unwrap();
    assert_eq!(u16::from_le_bytes(magic), 0x137F);

    // A partial-block write leaves its neighbours alone.
    fs.lseek(&mut proc, fd, 0, mfs_kernel::SEEK_SET).unwrap();
    fs.write(&mut proc, fd, &b"BOOT"[..], 4).unwrap();
    fs.close(&mut proc, fd).unwrap();
    fs.sync();
    let image = disk2.snapshot();
    assert_eq!(&image[..4], b"BOOT");
    assert_eq!(get_u16(&image, 1024 + 16), 0x137F);
}
