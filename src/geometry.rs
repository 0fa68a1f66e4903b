//! On-disk geometry constants. Every value here is part of the wire
//! format; changing one changes what images this crate can read.

/// Bytes per block.
pub const BLOCK_SIZE: usize = 512;
/// Total blocks in an image: 2^16.
pub const NUM_BLOCKS: usize = 1 << 16;
/// Blocks addressable through [`crate::block_store::BlockStore`]; the
/// trailing 16 blocks hold the free bitmap itself and are never handed
/// out.
pub const AVAIL_BLOCKS: usize = 65_520;
/// Total image size in bytes: `NUM_BLOCKS * BLOCK_SIZE`.
pub const IMAGE_BYTES: u64 = (NUM_BLOCKS * BLOCK_SIZE) as u64;

/// Block holding the inode-allocation bitmap (first 32 bytes) and
/// reserved padding.
pub const SUPERBLOCK_BLOCK: u16 = 0;
/// Byte offset of the inode bitmap within the image (inside block 0).
pub const INODE_BITMAP_OFFSET: usize = 0;
/// Bytes needed for 256 inode-occupancy bits.
pub const INODE_BITMAP_BYTES: usize = 32;

/// First block of the inode table.
pub const INODE_TABLE_START_BLOCK: u16 = 1;
/// Blocks spanned by the inode table.
pub const INODE_TABLE_BLOCKS: usize = 32;
/// Byte offset of the first inode-table block.
pub const INODE_TABLE_OFFSET: usize = INODE_TABLE_START_BLOCK as usize * BLOCK_SIZE;
/// Size in bytes of one on-disk inode record.
pub const INODE_SIZE: usize = 64;
/// Inodes per inode-table block (`BLOCK_SIZE / INODE_SIZE`).
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// Total inode slots.
pub const NUM_INODES: usize = INODE_TABLE_BLOCKS * INODES_PER_BLOCK;

/// Inode number of the root directory; allocated by `format`, never
/// released.
pub const ROOT_INODE: u16 = 0;
/// Data block holding the root directory's (only) directory block.
pub const ROOT_DIR_BLOCK: u16 = 33;

/// First block of the general data region.
pub const DATA_REGION_START: u16 = 34;

/// Blocks consumed by the free-block bitmap.
pub const FREE_BITMAP_BLOCKS: usize = 16;
/// First block of the free-block bitmap (`NUM_BLOCKS - FREE_BITMAP_BLOCKS`).
pub const FREE_BITMAP_START_BLOCK: usize = NUM_BLOCKS - FREE_BITMAP_BLOCKS;
/// Byte offset of the free-block bitmap.
pub const FREE_BITMAP_OFFSET: usize = FREE_BITMAP_START_BLOCK * BLOCK_SIZE;
/// Bytes needed for `NUM_BLOCKS` free-block bits (`NUM_BLOCKS / 8`).
pub const FREE_BITMAP_BYTES: usize = NUM_BLOCKS / 8;

/// Entries per directory data block.
pub const DIR_ENTRIES_PER_BLOCK: usize = 7;
/// Bytes of a directory entry's null-padded name field.
pub const DIR_NAME_MAX: usize = 64;
/// Bytes of one directory entry (`DIR_NAME_MAX` name + 1 inode-id byte).
pub const DIR_ENTRY_SIZE: usize = DIR_NAME_MAX + 1;

/// Direct block pointers per inode.
pub const DIRECT_PTRS: usize = 6;
/// Entries in one indirect/double-indirect index block (`BLOCK_SIZE / 2`).
pub const PTRS_PER_INDEX_BLOCK: usize = BLOCK_SIZE / 2;
/// Data blocks reachable through the indirect pointer.
pub const INDIRECT_CAPACITY: usize = PTRS_PER_INDEX_BLOCK;
/// Data blocks reachable through the double-indirect pointer.
pub const DOUBLE_INDIRECT_CAPACITY: usize = PTRS_PER_INDEX_BLOCK * PTRS_PER_INDEX_BLOCK;
/// Maximum addressable bytes per file: `(6 + 256 + 256*256) * 512`.
pub const MAX_FILE_SIZE: u64 =
    ((DIRECT_PTRS + INDIRECT_CAPACITY + DOUBLE_INDIRECT_CAPACITY) * BLOCK_SIZE) as u64;

/// Maximum descriptors live at once.
pub const DESCRIPTOR_CAPACITY: usize = 256;
