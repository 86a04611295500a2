//! Inode numbering for the FUSE bridge.
//!
//! The kernel addresses entries by inode number while the dispatcher works
//! on paths. Numbers are assigned per canonical path on first sight and
//! stay stable for the life of the mount, so a node replaced by a listing
//! refresh keeps its inode.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Inode number of the mount root (FUSE convention).
pub const ROOT_INODE: u64 = 1;

#[derive(Debug)]
struct Entries {
    paths: HashMap<u64, String>,
    inodes: HashMap<String, u64>,
    next: u64,
}

/// Bidirectional inode/path table.
#[derive(Debug)]
pub struct InodeTable {
    entries: RwLock<Entries>,
}

impl InodeTable {
    /// Creates a table holding only the root.
    pub fn new() -> Self {
        let mut paths = HashMap::new();
        let mut inodes = HashMap::new();
        paths.insert(ROOT_INODE, "/".to_string());
        inodes.insert("/".to_string(), ROOT_INODE);
        Self {
            entries: RwLock::new(Entries {
                paths,
                inodes,
                next: ROOT_INODE + 1,
            }),
        }
    }

    /// Returns the path behind an inode.
    pub fn path(&self, ino: u64) -> Option<String> {
        self.entries.read().paths.get(&ino).cloned()
    }

    /// Returns the path of `name` inside directory `parent`.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        let parent = self.path(parent)?;
        Some(join(&parent, name))
    }

    /// Returns the inode for `path`, assigning one if needed.
    pub fn assign(&self, path: &str) -> u64 {
        if let Some(ino) = self.entries.read().inodes.get(path) {
            return *ino;
        }
        let mut entries = self.entries.write();
        if let Some(ino) = entries.inodes.get(path) {
            return *ino;
        }
        let ino = entries.next;
        entries.next += 1;
        entries.paths.insert(ino, path.to_string());
        entries.inodes.insert(path.to_string(), ino);
        ino
    }

    /// Drops the mapping for `path` and everything below it.
    pub fn forget(&self, path: &str) {
        if path == "/" {
            return;
        }
        let prefix = format!("{}/", path);
        let mut entries = self.entries.write();
        let doomed: Vec<(String, u64)> = entries
            .inodes
            .iter()
            .filter(|(p, _)| p.as_str() == path || p.starts_with(&prefix))
            .map(|(p, ino)| (p.clone(), *ino))
            .collect();
        for (p, ino) in doomed {
            entries.inodes.remove(&p);
            entries.paths.remove(&ino);
        }
    }

    /// Returns the number of mapped inodes.
    pub fn len(&self) -> usize {
        self.entries.read().paths.len()
    }

    /// Returns true if only the root is mapped.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Joins a directory path and an entry name.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Returns the directory containing `path`.
pub fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_mapped() {
        let table = InodeTable::new();
        assert_eq!(table.path(ROOT_INODE).as_deref(), Some("/"));
        assert_eq!(table.assign("/"), ROOT_INODE);
    }

    #[test]
    fn test_assign_is_stable() {
        let table = InodeTable::new();
        let a = table.assign("/timeline");
        let b = table.assign("/timeline/1");
        assert_ne!(a, b);
        assert_eq!(table.assign("/timeline"), a);
        assert_eq!(table.child_path(a, "1").as_deref(), Some("/timeline/1"));
        assert_eq!(table.child_path(ROOT_INODE, "mentions").as_deref(), Some("/mentions"));
    }

    #[test]
    fn test_forget_subtree() {
        let table = InodeTable::new();
        let dir = table.assign("/users/bob");
        let file = table.assign("/users/bob/profile");
        let other = table.assign("/users/bobby");

        table.forget("/users/bob");
        assert!(table.path(dir).is_none());
        assert!(table.path(file).is_none());
        assert!(table.path(other).is_some());
    }

    #[test]
    fn test_paths() {
        assert_eq!(join("/", "timeline"), "/timeline");
        assert_eq!(join("/timeline", "1"), "/timeline/1");
        assert_eq!(parent_path("/timeline/1"), "/timeline");
        assert_eq!(parent_path("/timeline"), "/");
        assert_eq!(parent_path("/"), "/");
    }
}
