//! Directory data block format: 7 fixed 65-byte entries (64-byte
//! null-padded name + 1-byte inode id), 57 bytes of trailing padding.
//! Occupancy of each slot is tracked by the owning inode's `vacant`
//! bitmap, not by anything in the block itself.

use crate::geometry::{BLOCK_SIZE, DIR_ENTRIES_PER_BLOCK, DIR_ENTRY_SIZE, DIR_NAME_MAX};

/// One directory slot's raw contents. Meaningless when the owning
/// inode's `vacant` bit for this slot is clear.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub name: [u8; DIR_NAME_MAX],
    pub inode_id: u8,
}

impl DirEntry {
    fn empty() -> Self {
        Self {
            name: [0; DIR_NAME_MAX],
            inode_id: 0,
        }
    }

    /// Stored name trimmed at the first null byte.
    pub fn name_str(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(DIR_NAME_MAX);
        std::str::from_utf8(&self.name[..len]).unwrap_or("")
    }

    /// Name matches `component` exactly. The scan is a bounded string
    /// compare up to the stored name's own null-terminated length, so two
    /// distinct names can never alias each other under the
    /// filename-uniqueness invariant.
    pub fn name_matches(&self, component: &str) -> bool {
        self.name_str() == component
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0; DIR_NAME_MAX];
        let bytes = name.as_bytes();
        self.name[..bytes.len()].copy_from_slice(bytes);
    }
}

/// The 512-byte decoded contents of a directory's data block.
#[derive(Debug, Clone, Copy)]
pub struct DirBlock {
    pub entries: [DirEntry; DIR_ENTRIES_PER_BLOCK],
}

impl DirBlock {
    pub fn empty() -> Self {
        Self {
            entries: [DirEntry::empty(); DIR_ENTRIES_PER_BLOCK],
        }
    }

    pub fn decode(bytes: &[u8; BLOCK_SIZE]) -> Self {
        let mut block = Self::empty();
        for (i, entry) in block.entries.iter_mut().enumerate() {
            let off = i * DIR_ENTRY_SIZE;
            entry.name.copy_from_slice(&bytes[off..off + DIR_NAME_MAX]);
            entry.inode_id = bytes[off + DIR_NAME_MAX];
        }
        block
    }

    pub fn encode(&self) -> [u8; BLOCK_SIZE] {
        let mut out = [0u8; BLOCK_SIZE];
        for (i, entry) in self.entries.iter().enumerate() {
            let off = i * DIR_ENTRY_SIZE;
            out[off..off + DIR_NAME_MAX].copy_from_slice(&entry.name);
            out[off + DIR_NAME_MAX] = entry.inode_id;
        }
        out
    }

    pub fn set(&mut self, slot: usize, name: &str, inode_id: u8) {
        self.entries[slot].set_name(name);
        self.entries[slot].inode_id = inode_id;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let mut block = DirBlock::empty();
        block.set(0, "hello.txt", 7);
        block.set(3, "subdir", 42);

        let bytes = block.encode();
        assert_eq!(bytes.len(), BLOCK_SIZE);
        let back = DirBlock::decode(&bytes);

        assert_eq!(back.entries[0].name_str(), "hello.txt");
        assert_eq!(back.entries[0].inode_id, 7);
        assert_eq!(back.entries[3].name_str(), "subdir");
        assert_eq!(back.entries[3].inode_id, 42);
    }

    #[test]
    fn name_matches_is_exact() {
        let mut entry = DirEntry::empty();
        entry.set_name("ab");
        assert!(entry.name_matches("ab"));
        assert!(!entry.name_matches("a"));
        assert!(!entry.name_matches("abc"));
    }

    #[test]
    fn encoded_layout_matches_spec_byte_offsets() {
        let mut block = DirBlock::empty();
        block.set(0, "a", 5);
        let bytes = block.encode();
        assert_eq!(bytes[0], b'a');
        assert_eq!(bytes[DIR_NAME_MAX], 5);
        assert_eq!(
            BLOCK_SIZE - DIR_ENTRIES_PER_BLOCK * DIR_ENTRY_SIZE,
            57
        );
    }
}
