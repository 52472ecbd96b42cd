//! Pipe semantics through the descriptor layer.

mod common;

use common::*;
use mfs_kernel::{Error, SIGPIPE};

#[test]
fn pipe_moves_bytes_in_order() {
    let (fs, mut proc, _disk) = setup(8);
    let (r, w) = fs.pipe(&mut proc).unwrap();
    fs.write(&mut proc, w, &b"abc"[..], 3).unwrap();
    fs.write(&mut proc, w, &b"def"[..], 3).unwrap();
    let mut buf = [0u8; 6];
    assert_eq!(fs.read(&mut proc, r, &mut buf[..], 6).unwrap(), 6);
    assert_eq!(&buf, b"abcdef");
    fs.close(&mut proc, r).unwrap();
    fs.close(&mut proc, w).unwrap();
}

#[test]
fn wrong_direction_is_refused() {
    let (fs, mut proc, _disk) = setup(8);
    let (r, w) = fs.pipe(&mut proc).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(fs.read(&mut proc, w, &mut buf[..], 1), Err(Error::Io));
    assert_eq!(fs.write(&mut proc, r, &b"x"[..], 1), Err(Error::Io));
    assert_eq!(fs.lseek(&mut proc, r, 0, mfs_kernel::SEEK_SET), Err(Error::SPipe));
    fs.close(&mut proc, r).unwrap();
    fs.close(&mut proc, w).unwrap();
}

#[test]
fn closed_write_end_drains_then_reports_eof() {
    let (fs, mut proc, _disk) = setup(8);
    let (r, w) = fs.pipe(&mut proc).unwrap();
    fs.write(&mut proc, w, &b"tail"[..], 4).unwrap();
    fs.close(&mut proc, w).unwrap();

    let mut buf = [0u8; 16];
    assert_eq!(fs.read(&mut proc, r, &mut buf[..], 16).unwrap(), 4);
    assert_eq!(&buf[..4], b"tail");
    // Drained and writerless: end of file.
    assert_eq!(fs.read(&mut proc, r, &mut buf[..], 16).unwrap(), 0);
    fs.close(&mut proc, r).unwrap();
}

#[test]
fn write_without_reader_raises_sigpipe() {
    let (fs, mut proc, _disk) = setup(8);
    let (r, w) = fs.pipe(&mut proc).unwrap();
    fs.close(&mut proc, r).unwrap();
    assert!(!proc.signal_pending(SIGPIPE));
    assert_eq!(fs.write(&mut proc, w, &b"x"[..], 1), Err(Error::Pipe));
    assert!(proc.signal_pending(SIGPIPE));
    fs.close(&mut proc, w).unwrap();
}

#[test]
fn pipe_capacity_is_one_page_minus_one() {
    let (fs, mut proc, _disk) = setup(8);
    let (r, w) = fs.pipe(&mut proc).unwrap();
    // 4095 bytes fit without a sleeping reader.
    let data = vec![0x55u8; 4095];
    assert_eq!(fs.write(&mut proc, w, &data[..], 4095).unwrap(), 4095);
    let mut buf = vec![0u8; 4095];
    assert_eq!(fs.read(&mut proc, r, &mut buf[..], 4095).unwrap(), 4095);
    assert_eq!(buf, data);
    // The ring wrapped; a second lap still works.
    fs.write(&mut proc, w, &b"wrap"[..], 4).unwrap();
    let mut buf = [0u8; 4];
    fs.read(&mut proc, r, &mut buf[..], 4).unwrap();
    assert_eq!(&buf, b"wrap");
    fs.close(&mut proc, r).unwrap();
    fs.close(&mut proc, w).unwrap();
}
