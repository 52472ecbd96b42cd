/// Block size in bytes, the atom of the cache and the allocators.
pub const BLOCK_SIZE: usize = 1024;

/// log2(BLOCK_SIZE), for turning byte offsets into block numbers.
pub const BLOCK_SIZE_BITS: u32 = 10;

/// Buffer-cache hash buckets.
pub const NR_HASH: usize = 307;

/// Default number of buffers in the cache.
pub const NR_BUFFERS: usize = 64;

/// Maximum number of in-memory inodes.
pub const NR_INODE: usize = 32;

/// Open files per system.
pub const NR_FILE: usize = 64;

/// Open files per process.
pub const NR_OPEN: usize = 20;

/// Maximum number of mounted filesystems.
pub const NR_SUPER: usize = 8;

/// Directory entry name length.
pub const NAME_LEN: usize = 14;

/// Inode number of a filesystem's root directory.
pub const ROOT_INO: u16 = 1;

/// Magic number identifying a valid superblock.
pub const SUPER_MAGIC: u16 = 0x137F;

/// Buffers pinned for the inode bitmap of one mounted filesystem.
pub const I_MAP_SLOTS: usize = 8;

/// Buffers pinned for the zone bitmap of one mounted filesystem.
pub const Z_MAP_SLOTS: usize = 8;

/// On-disk inodes per block (1024 / 32).
pub const INODES_PER_BLOCK: usize = 32;

/// Directory entries per block (1024 / 16).
pub const DIR_ENTRIES_PER_BLOCK: usize = 64;

/// Size of a pipe's ring buffer, one page.
pub const PAGE_SIZE: usize = 4096;

/// Direct zone pointers per inode.
pub const NR_DIRECT: usize = 7;

/// Zone pointers held by one indirect block (1024 / 2).
pub const NR_INDIRECT: usize = 512;

/// Largest addressable file block index, exclusive.
pub const MAX_BLOCKS: usize = NR_DIRECT + NR_INDIRECT + NR_INDIRECT * NR_INDIRECT;
