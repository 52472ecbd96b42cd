//! Pipes.
//!
//! A pipe is an inode whose content is a one-page ring buffer.  The head
//! cursor belongs to writers, the tail to readers, both masked modulo the
//! page size; keeping one byte of slack distinguishes full from empty.
//! The inode's reference count doubles as the open-end count: it stays 2
//! while both ends are open, so `count != 2` tells a sleeping reader
//! there is no writer left (EOF) and a writer there is no reader
//! (SIGPIPE).  Both ends sleep on the inode's wait channel.

use crate::error::{Error, Result};
use crate::fs::inode::{Content, InodePtr};
use crate::fs::Mfs;
use crate::param::PAGE_SIZE;
use crate::proc::{Proc, SIGPIPE};
use crate::user::{UserBuf, UserBufMut};

/// The ring: one page plus the two cursors.
pub struct PipeRing {
    page: Box<[u8; PAGE_SIZE]>,
    /// Write cursor.
    head: usize,
    /// Read cursor.
    tail: usize,
}

impl PipeRing {
    pub(crate) fn new() -> Self {
        Self {
            page: Box::new([0; PAGE_SIZE]),
            head: 0,
            tail: 0,
        }
    }

    /// Bytes buffered and not yet read.
    fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail) & (PAGE_SIZE - 1)
    }
}

impl Mfs {
    /// Reads up to `count` bytes from a pipe, sleeping until they all
    /// arrive or the last writer goes away.  Returns the bytes read; 0
    /// means end of file.
    pub(crate) fn read_pipe<B: UserBufMut + ?Sized>(
        &self,
        ip: &InodePtr,
        buf: &mut B,
        count: usize,
    ) -> Result<usize> {
        let mut read = 0;
        let mut guard = self.ilock(ip);
        while read < count {
            loop {
                let size = match &guard.content {
                    Content::Pipe(ring) => ring.len(),
                    _ => panic!("read_pipe on non-pipe inode"),
                };
                if size != 0 {
                    break;
                }
                guard.wakeup();
                if guard.ref_count() != 2 {
                    /* are there any writers? */
                    return Ok(read);
                }
                guard.sleep();
            }
            let ring = match &mut guard.content {
                Content::Pipe(ring) => ring,
                _ => unreachable!(),
            };
            let size = ring.len();
            let mut chars = PAGE_SIZE - ring.tail;
            if chars > count - read {
                chars = count - read;
            }
            if chars > size {
                chars = size;
            }
            let tail = ring.tail;
            ring.tail = (tail + chars) & (PAGE_SIZE - 1);
            let res = buf.write_bytes(read, &ring.page[tail..tail + chars]);
            read += chars;
            res?;
        }
        guard.wakeup();
        Ok(read)
    }

    /// Writes `count` bytes into a pipe, sleeping while it is full.  A
    /// write with no reader left raises SIGPIPE and reports the bytes
    /// written so far, or fails outright if there were none.
    pub(crate) fn write_pipe<B: UserBuf + ?Sized>(
        &self,
        proc: &mut Proc,
        ip: &InodePtr,
        buf: &B,
        count: usize,
    ) -> Result<usize> {
        let mut written = 0;
        let mut guard = self.ilock(ip);
        while written < count {
            if guard.ref_count() != 2 {
                /* no readers */
                guard.wakeup();
                drop(guard);
                proc.raise(SIGPIPE);
                if written > 0 {
                    return Ok(written);
                }
                return Err(Error::Pipe);
            }
            let space = match &guard.content {
                Content::Pipe(ring) => (PAGE_SIZE - 1) - ring.len(),
                _ => panic!("write_pipe on non-pipe inode"),
            };
            if space == 0 {
                guard.wakeup();
                guard.sleep();
                continue;
            }
            let ring = match &mut guard.content {
                Content::Pipe(ring) => ring,
                _ => unreachable!(),
            };
            let mut chars = PAGE_SIZE - ring.head;
            if chars > count - written {
                chars = count - written;
            }
            if chars > space {
                chars = space;
            }
            let head = ring.head;
            ring.head = (head + chars) & (PAGE_SIZE - 1);
            let res = buf.read_bytes(written, &mut ring.page[head..head + chars]);
            written += chars;
            res?;
        }
        guard.wakeup();
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use crate::fs::Mfs;
    use crate::param::NR_OPEN;
    use crate::proc::Proc;

    fn bare_proc() -> Proc {
        Proc {
            uid: 0,
            euid: 0,
            gid: 0,
            egid: 0,
            umask: 0o022,
            root: None,
            pwd: None,
            files: [None; NR_OPEN],
            signal: 0,
        }
    }

    #[test]
    fn ring_len_wraps() {
        let mut ring = super::PipeRing::new();
        ring.head = 10;
        ring.tail = 4090;
        assert_eq!(ring.len(), 16);
    }

    /// A writer thread pushes far more than one page through the ring
    /// while the reader drains it; both block and hand off repeatedly.
    #[test]
    fn blocking_handoff_between_threads() {
        const TOTAL: usize = 50_000;
        let fs = Arc::new(Mfs::new(4));
        let read_end = fs.get_pipe_inode();
        let write_end = fs.pipe_second_ref(&read_end);

        let writer_fs = Arc::clone(&fs);
        let writer = thread::spawn(move || {
            let mut proc = bare_proc();
            let data: Vec<u8> = (0..TOTAL).map(|i| (i % 251) as u8).collect();
            let n = writer_fs
                .write_pipe(&mut proc, &write_end, &data[..], TOTAL)
                .unwrap();
            assert_eq!(n, TOTAL);
            writer_fs.iput(write_end);
        });

        let mut got = Vec::with_capacity(TOTAL);
        let mut buf = [0u8; 1000];
        loop {
            let buf_len = buf.len();
            let n = fs.read_pipe(&read_end, &mut buf[..], buf_len).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        writer.join().unwrap();
        fs.iput(read_end);

        assert_eq!(got.len(), TOTAL);
        assert!(got.iter().enumerate().all(|(i, &b)| b == (i % 251) as u8));
    }
}
