//! The 64-byte on-disk inode record.
//!
//! Layout, all fields host byte order, no padding beyond what's listed:
//!
//! | offset | size | field             |
//! |-------:|-----:|-------------------|
//! |      0 |    1 | `vacant`          |
//! |      1 |   18 | `owner` (zeroed)  |
//! |     19 |    1 | `file_type`       |
//! |     20 |    4 | `inode_number`    |
//! |     24 |    4 | `file_size`       |
//! |     28 |    4 | `link_count`      |
//! |     32 |   12 | `direct[0..6]`    |
//! |     44 |    2 | `indirect`        |
//! |     46 |    2 | `double_indirect` |
//! |     48 |   16 | reserved (zeroed) |
//!
//! `file_size` and `link_count` need more than 16 bits to address the
//! ~33 MiB a file can hold, so both are 4-byte words; the 16 trailing
//! reserved bytes complete the record to the fixed 64 bytes (see
//! DESIGN.md).

use crate::geometry::{DIRECT_PTRS, INODE_SIZE};

/// `'d'` or `'r'` on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
}

impl FileType {
    fn to_byte(self) -> u8 {
        match self {
            FileType::Regular => b'r',
            FileType::Directory => b'd',
        }
    }

    fn from_byte(b: u8) -> Self {
        if b == b'd' {
            FileType::Directory
        } else {
            FileType::Regular
        }
    }
}

/// In-memory mirror of one 64-byte inode record.
#[derive(Debug, Clone, Copy)]
pub struct Inode {
    /// Occupancy bitmap of this inode's directory data block; bits 0..6
    /// meaningful, bit 7 reserved and always 0. Ignored for regular files.
    pub vacant: u8,
    pub file_type: FileType,
    pub inode_number: u16,
    pub file_size: u32,
    pub link_count: u32,
    pub direct: [u16; DIRECT_PTRS],
    pub indirect: u16,
    pub double_indirect: u16,
}

impl Inode {
    /// A freshly sub-allocated, otherwise empty inode.
    pub fn new(inode_number: u16, file_type: FileType) -> Self {
        Self {
            vacant: 0,
            file_type,
            inode_number,
            file_size: 0,
            link_count: 1,
            direct: [0; DIRECT_PTRS],
            indirect: 0,
            double_indirect: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn encode(&self) -> [u8; INODE_SIZE] {
        let mut out = [0u8; INODE_SIZE];
        out[0] = self.vacant & 0x7f;
        // out[1..19] (owner) stays zeroed.
        out[19] = self.file_type.to_byte();
        out[20..24].copy_from_slice(&(self.inode_number as u32).to_ne_bytes());
        out[24..28].copy_from_slice(&self.file_size.to_ne_bytes());
        out[28..32].copy_from_slice(&self.link_count.to_ne_bytes());
        for (i, &b) in self.direct.iter().enumerate() {
            out[32 + i * 2..34 + i * 2].copy_from_slice(&b.to_ne_bytes());
        }
        out[44..46].copy_from_slice(&self.indirect.to_ne_bytes());
        out[46..48].copy_from_slice(&self.double_indirect.to_ne_bytes());
        // out[48..64] (reserved) stays zeroed.
        out
    }

    pub fn decode(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= INODE_SIZE);
        let vacant = bytes[0] & 0x7f;
        let file_type = FileType::from_byte(bytes[19]);
        let inode_number = u32::from_ne_bytes(bytes[20..24].try_into().unwrap()) as u16;
        let file_size = u32::from_ne_bytes(bytes[24..28].try_into().unwrap());
        let link_count = u32::from_ne_bytes(bytes[28..32].try_into().unwrap());
        let mut direct = [0u16; DIRECT_PTRS];
        for (i, slot) in direct.iter_mut().enumerate() {
            *slot = u16::from_ne_bytes(bytes[32 + i * 2..34 + i * 2].try_into().unwrap());
        }
        let indirect = u16::from_ne_bytes(bytes[44..46].try_into().unwrap());
        let double_indirect = u16::from_ne_bytes(bytes[46..48].try_into().unwrap());
        Self {
            vacant,
            file_type,
            inode_number,
            file_size,
            link_count,
            direct,
            indirect,
            double_indirect,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let mut inode = Inode::new(7, FileType::Directory);
        inode.vacant = 0b0101010;
        inode.file_size = 512;
        inode.direct[0] = 33;
        inode.indirect = 99;
        inode.double_indirect = 1000;

        let bytes = inode.encode();
        assert_eq!(bytes.len(), INODE_SIZE);
        let back = Inode::decode(&bytes);

        assert_eq!(back.vacant, inode.vacant);
        assert_eq!(back.file_type, FileType::Directory);
        assert_eq!(back.inode_number, 7);
        assert_eq!(back.file_size, 512);
        assert_eq!(back.direct, inode.direct);
        assert_eq!(back.indirect, 99);
        assert_eq!(back.double_indirect, 1000);
    }

    #[test]
    fn vacant_bit_7_is_always_masked_off() {
        let mut inode = Inode::new(0, FileType::Directory);
        inode.vacant = 0xff;
        let bytes = inode.encode();
        assert_eq!(bytes[0] & 0x80, 0);
        assert_eq!(Inode::decode(&bytes).vacant, 0x7f);
    }
}
