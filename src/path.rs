//! Path validation and directory-tree resolution.
//!
//! Splits on `/`, descends one directory block at a time, and rejects
//! anything that isn't an absolute path, validating untrusted input up
//! front with a dedicated `Result`-returning function rather than
//! threading checks through the caller.

use crate::block_store::BlockStore;
use crate::directory::DirBlock;
use crate::error::{Error, Result};
use crate::geometry::{DIR_ENTRIES_PER_BLOCK, DIR_NAME_MAX, ROOT_INODE};
use crate::inode::{FileType, Inode};
use crate::inode_store::InodeStore;

/// Splits an absolute path into its `/`-separated components.
///
/// Rejects: empty input, anything not starting with `/`, a trailing `/`
/// on a path with more than one component (i.e. anything but the bare
/// root `"/"`), and any component of 64 bytes or more (no room for the
/// trailing null in a 64-byte name field).
pub fn split_components(path: &str) -> Result<Vec<&str>> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(Error::InvalidArgument(format!(
            "path must be absolute: {path}"
        )));
    }
    if path == "/" {
        return Ok(Vec::new());
    }
    if path.ends_with('/') {
        return Err(Error::InvalidArgument(format!(
            "path must not end in '/': {path}"
        )));
    }
    let parts: Vec<&str> = path.split('/').skip(1).collect();
    for part in &parts {
        if part.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "path has an empty component: {path}"
            )));
        }
        if part.len() >= DIR_NAME_MAX {
            return Err(Error::InvalidArgument(format!(
                "path component too long: {part}"
            )));
        }
    }
    Ok(parts)
}

/// Splits `path` into its parent directory's component list and the final
/// component's name, for operations (`create`, `remove`, `move`) that
/// resolve the parent separately from the leaf.
pub fn split_parent(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts = split_components(path)?;
    let name = parts.pop().ok_or_else(|| Error::RootOperation)?;
    Ok((parts, name))
}

/// Result of walking a directory block looking for one name.
pub struct DirLookup {
    pub slot: usize,
    pub inode_id: u8,
}

/// Scans `dir_inode`'s (single) directory block for `component`,
/// consulting the `vacant` occupancy bitmap rather than the raw slot
/// contents: a slot with its vacant bit set is live.
fn lookup_in_dir(
    block_store: &BlockStore,
    dir_inode: &Inode,
    component: &str,
) -> Option<DirLookup> {
    let block_id = dir_inode.direct[0];
    if block_id == 0 {
        return None;
    }
    let mut raw = [0u8; crate::geometry::BLOCK_SIZE];
    if block_store.read(block_id, &mut raw) == 0 {
        return None;
    }
    let block = DirBlock::decode(&raw);
    for slot in 0..DIR_ENTRIES_PER_BLOCK {
        let occupied = dir_inode.vacant & (1 << slot) != 0;
        if occupied && block.entries[slot].name_matches(component) {
            return Some(DirLookup {
                slot,
                inode_id: block.entries[slot].inode_id,
            });
        }
    }
    None
}

/// Walks `components` from the root, returning the inode id and decoded
/// inode of the final component. Every component but the last must
/// resolve to a directory; the last may be either type. A match whose
/// resolved type disagrees with an intermediate position (i.e. a regular
/// file where a directory was required to continue the walk) surfaces as
/// [`Error::NotFound`]: a walk that cannot continue is reported as not
/// found.
pub fn resolve(
    block_store: &BlockStore,
    inode_store: &InodeStore,
    components: &[&str],
) -> Result<(u16, Inode)> {
    let mut current_id = ROOT_INODE;
    let mut current = inode_store.read(block_store.image(), current_id);

    if components.is_empty() {
        return Ok((current_id, current));
    }

    for (i, component) in components.iter().enumerate() {
        if !current.is_directory() {
            return Err(Error::NotFound((*component).to_string()));
        }
        let found = lookup_in_dir(block_store, &current, component)
            .ok_or_else(|| Error::NotFound((*component).to_string()))?;
        current_id = found.inode_id as u16;
        current = inode_store.read(block_store.image(), current_id);
        let _ = i;
    }
    Ok((current_id, current))
}

/// Resolves `components` down to the parent directory only, leaving the
/// final name for the caller to interpret (create: must be absent; remove
/// /open: looked up by the caller against the parent's block directly).
pub fn resolve_parent(
    block_store: &BlockStore,
    inode_store: &InodeStore,
    components: &[&str],
) -> Result<(u16, Inode)> {
    resolve(block_store, inode_store, components)
}

/// Looks up `name` inside the already-resolved directory `dir_inode`.
pub fn lookup_child(
    block_store: &BlockStore,
    dir_inode: &Inode,
    name: &str,
) -> Option<DirLookup> {
    lookup_in_dir(block_store, dir_inode, name)
}

/// Whether `ancestor_id` is `descendant_id` itself, or appears somewhere
/// above it on the path back to the root. Used by `move` to reject making
/// a directory its own descendant.
pub fn is_ancestor_or_self(
    block_store: &BlockStore,
    inode_store: &InodeStore,
    ancestor_id: u16,
    descendant_id: u16,
) -> bool {
    if ancestor_id == descendant_id {
        return true;
    }
    // Without parent pointers in the inode, the only way to check is to
    // walk down from the root looking for descendant_id under ancestor_id.
    fn contains(
        block_store: &BlockStore,
        inode_store: &InodeStore,
        root: u16,
        target: u16,
    ) -> bool {
        if root == target {
            return true;
        }
        let inode = inode_store.read(block_store.image(), root);
        if !inode.is_directory() {
            return false;
        }
        let block_id = inode.direct[0];
        if block_id == 0 {
            return false;
        }
        let mut raw = [0u8; crate::geometry::BLOCK_SIZE];
        if block_store.read(block_id, &mut raw) == 0 {
            return false;
        }
        let block = DirBlock::decode(&raw);
        for slot in 0..DIR_ENTRIES_PER_BLOCK {
            let occupied = inode.vacant & (1 << slot) != 0;
            if occupied && contains(block_store, inode_store, block.entries[slot].inode_id as u16, target) {
                return true;
            }
        }
        false
    }
    contains(block_store, inode_store, ancestor_id, descendant_id)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn root_path_has_no_components() {
        assert_eq!(split_components("/").unwrap(), Vec::<&str>::new());
    }

    #[test]
    fn nested_path_splits_on_slash() {
        assert_eq!(split_components("/a/b/c").unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn rejects_relative_path() {
        assert!(split_components("a/b").is_err());
        assert!(split_components("").is_err());
    }

    #[test]
    fn rejects_trailing_slash() {
        assert!(split_components("/a/b/").is_err());
    }

    #[test]
    fn rejects_empty_component() {
        assert!(split_components("/a//b").is_err());
    }

    #[test]
    fn rejects_oversize_component() {
        let long = "x".repeat(64);
        let path = format!("/{long}");
        assert!(split_components(&path).is_err());
    }

    #[test]
    fn split_parent_separates_leaf() {
        let (parent, leaf) = split_parent("/a/b/c").unwrap();
        assert_eq!(parent, vec!["a", "b"]);
        assert_eq!(leaf, "c");
    }

    #[test]
    fn split_parent_of_top_level_path_has_empty_parent() {
        let (parent, leaf) = split_parent("/a").unwrap();
        assert!(parent.is_empty());
        assert_eq!(leaf, "a");
    }

    #[test]
    fn split_parent_rejects_bare_root() {
        assert!(split_parent("/").is_err());
    }
}
