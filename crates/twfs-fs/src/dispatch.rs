//! Operation dispatcher.
//!
//! The path-based filesystem callback contract. Every call resolves its
//! path, checks permissions against the locator before touching the tree
//! or the network, then works through the node tree.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::mount::MountConfig;
use crate::node::{Node, NodeKind, NodeState};
use crate::path::{resolve, Access, Locator};
use crate::translate::Translator;
use crate::tree::NodeTree;
use crate::FsError;

/// Attributes returned by stat-like calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Node type
    pub kind: NodeKind,
    /// Size in bytes; child count for directories
    pub size: u64,
    /// Permission bits
    pub perm: u16,
    /// Link count
    pub nlink: u32,
    /// Creation time on the service
    pub created: SystemTime,
    /// Last population or flush
    pub modified: SystemTime,
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Entry name
    pub name: String,
    /// Entry type
    pub kind: NodeKind,
}

/// Requested access of an open call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenMode {
    /// Open for reading
    pub read: bool,
    /// Open for writing
    pub write: bool,
    /// Discard buffered content
    pub truncate: bool,
}

impl OpenMode {
    /// Read-only access.
    pub const READ: OpenMode = OpenMode {
        read: true,
        write: false,
        truncate: false,
    };

    /// Write access, truncating.
    pub const WRITE: OpenMode = OpenMode {
        read: false,
        write: true,
        truncate: true,
    };

    /// Decodes `open(2)` flags.
    pub fn from_flags(flags: i32) -> Self {
        let access = flags & libc::O_ACCMODE;
        Self {
            read: access != libc::O_WRONLY,
            write: access != libc::O_RDONLY,
            truncate: flags & libc::O_TRUNC != 0,
        }
    }
}

/// Dispatches filesystem calls.
///
/// Owns the call context: the node tree, the translator acting for the
/// session's account, and the mount flags. Shared across callback threads.
pub struct Dispatcher {
    tree: NodeTree,
    translator: Translator,
    read_only: bool,
}

impl Dispatcher {
    /// Creates a dispatcher with an empty tree.
    pub fn new(translator: Translator, config: &MountConfig) -> Self {
        Self {
            tree: NodeTree::new(config.cache_ttl()),
            translator,
            read_only: config.read_only,
        }
    }

    /// Replaces the tree with an empty one expiring after `ttl`.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.tree = NodeTree::new(ttl);
        self
    }

    /// Returns the node tree.
    pub fn tree(&self) -> &NodeTree {
        &self.tree
    }

    /// Returns the translator.
    pub fn translator(&self) -> &Translator {
        &self.translator
    }

    /// Returns attributes. Directories are populated so their size is the
    /// child count.
    pub fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let locator = resolve(path)?;
        debug!(path = %locator, "stat");
        let node = self.locate(&locator)?;
        if node.is_dir() {
            self.populate(&node)?;
        }
        Ok(self.stat_node(&node))
    }

    /// Lists a directory in listing order.
    pub fn list(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let locator = resolve(path)?;
        debug!(path = %locator, "list");
        if locator.kind() != NodeKind::Directory {
            return Err(FsError::NotDirectory(locator.canonical_path()));
        }
        let node = self.tree.lookup_or_create(&locator)?;
        self.populate(&node)?;
        Ok(self
            .tree
            .children(&node)
            .iter()
            .map(|child| DirEntry {
                name: child.name.clone(),
                kind: child.kind,
            })
            .collect())
    }

    /// Opens a file. Reading populates; writing checks permission and
    /// starts a write buffer.
    pub fn open(&self, path: &str, mode: OpenMode) -> Result<FileStat, FsError> {
        let locator = resolve(path)?;
        debug!(path = %locator, read = mode.read, write = mode.write, "open");
        if locator.kind() != NodeKind::File {
            return Err(FsError::IsDirectory(locator.canonical_path()));
        }
        if mode.write {
            self.check_write(&locator)?;
        }

        let node = self.locate(&locator)?;
        if mode.write {
            self.tree.begin_write(&node, mode.truncate)?;
        } else if mode.read {
            self.populate(&node)?;
        }
        Ok(self.stat_node(&node))
    }

    /// Reads a byte range. Reads past the end return fewer bytes.
    pub fn read(&self, path: &str, offset: u64, size: usize) -> Result<Bytes, FsError> {
        let locator = resolve(path)?;
        if locator.kind() != NodeKind::File {
            return Err(FsError::IsDirectory(locator.canonical_path()));
        }
        let node = self.locate(&locator)?;

        let pending = node
            .lock()
            .pending_write
            .as_ref()
            .map(|buffer| Bytes::copy_from_slice(buffer));
        let content = match pending {
            Some(buffer) => buffer,
            None => {
                self.populate(&node)?;
                let inner = node.lock();
                if inner.state == NodeState::Removed {
                    return Err(FsError::NotFound(locator.canonical_path()));
                }
                inner.content.clone().unwrap_or_default()
            }
        };

        let len = content.len() as u64;
        if offset >= len {
            return Ok(Bytes::new());
        }
        let end = offset.saturating_add(size as u64).min(len);
        Ok(content.slice(offset as usize..end as usize))
    }

    /// Buffers a write. Never touches the network.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        let locator = resolve(path)?;
        self.check_write(&locator)?;
        let node = self.locate(&locator)?;
        self.tree.buffer_write(&node, offset, data)
    }

    /// Creates a local file with an empty write buffer. No remote call.
    ///
    /// The name must be one the file can later be committed under, so
    /// server-assigned names such as message ids are refused.
    pub fn create(&self, path: &str) -> Result<FileStat, FsError> {
        let locator = resolve(path)?;
        debug!(path = %locator, "create");
        let me = self.translator.me();
        let permitted = !self.read_only
            && locator.permits_write(me)
            && locator.parent().map_or(false, |p| p.permits_create(me));
        if !permitted {
            return Err(FsError::PermissionDenied(locator.canonical_path()));
        }

        let parent_locator = locator
            .parent()
            .ok_or_else(|| FsError::PermissionDenied(locator.canonical_path()))?;
        let parent = self.tree.lookup_or_create(&parent_locator)?;
        let node = self.tree.create_file(&parent, locator)?;
        Ok(self.stat_node(&node))
    }

    /// Flushes buffered writes. Errors are reported to the closing caller
    /// and the buffer is kept for a retry.
    pub fn release(&self, path: &str) -> Result<(), FsError> {
        let locator = resolve(path)?;
        if locator.kind() != NodeKind::File {
            return Ok(());
        }
        let node = match self.locate(&locator) {
            Ok(node) => node,
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err),
        };

        let flushed = self
            .tree
            .flush(&node, |payload| self.translator.create(&node.locator, payload))
            .map_err(|err| {
                warn!(path = %locator, error = %err, "flush failed");
                err
            })?;
        if flushed {
            for affected in self.translator.affected_by_create(&locator) {
                self.tree.invalidate(&affected);
            }
        }
        Ok(())
    }

    /// Drops whatever a closed writer left unflushed. A draft that never
    /// committed leaves the tree with it. Never touches the network.
    pub fn discard(&self, path: &str) -> Result<(), FsError> {
        let locator = resolve(path)?;
        if locator.kind() != NodeKind::File {
            return Ok(());
        }
        let Some(node) = self.tree.find(&locator) else {
            return Ok(());
        };
        self.tree.discard(&node);
        let draft = node.lock().draft;
        if draft {
            self.tree.mark_removed(&node);
        }
        Ok(())
    }

    /// Deletes a file remotely, then drops it from the tree. On failure the
    /// node is untouched. A draft that was never committed only leaves the
    /// tree.
    pub fn remove(&self, path: &str) -> Result<(), FsError> {
        let locator = resolve(path)?;
        debug!(path = %locator, "remove");
        if locator.kind() != NodeKind::File {
            return Err(FsError::IsDirectory(locator.canonical_path()));
        }
        if self.read_only || !locator.permits_remove(self.translator.me()) {
            return Err(FsError::PermissionDenied(locator.canonical_path()));
        }

        let node = self.locate(&locator)?;
        let draft = node.lock().draft;
        if draft {
            debug!(path = %locator, "dropping uncommitted draft");
            self.tree.mark_removed(&node);
            return Ok(());
        }
        self.translator.delete(&locator)?;
        self.tree.mark_removed(&node);

        let parent = locator.parent();
        for affected in self.translator.affected_by_delete(&locator) {
            if Some(&affected) != parent.as_ref() {
                self.tree.invalidate(&affected);
            }
        }
        Ok(())
    }

    /// Resizes a writable file's buffer.
    pub fn truncate(&self, path: &str, size: u64) -> Result<FileStat, FsError> {
        let locator = resolve(path)?;
        debug!(path = %locator, size = size, "truncate");
        self.check_write(&locator)?;
        let node = self.locate(&locator)?;
        self.tree.truncate(&node, size)?;
        Ok(self.stat_node(&node))
    }

    /// Finds the node for `locator`. Directories are materialized; files
    /// come from the parent's listing, which is fetched when absent and
    /// refreshed once when stale and missing the name.
    fn locate(&self, locator: &Locator) -> Result<Arc<Node>, FsError> {
        if locator.kind() == NodeKind::Directory {
            return self.tree.lookup_or_create(locator);
        }

        let parent_locator = locator
            .parent()
            .ok_or_else(|| FsError::NotFound(locator.canonical_path()))?;
        let parent = self.tree.lookup_or_create(&parent_locator)?;
        if let Some(child) = self.tree.child(&parent, locator.name()) {
            return Ok(child);
        }

        if parent.state(self.tree.ttl()) != NodeState::Populated {
            self.populate(&parent)?;
            if let Some(child) = self.tree.child(&parent, locator.name()) {
                return Ok(child);
            }
        }
        Err(FsError::NotFound(locator.canonical_path()))
    }

    /// Populates a node; a node the service no longer has is removed.
    fn populate(&self, node: &Arc<Node>) -> Result<(), FsError> {
        match self.tree.ensure_populated(node, &self.translator) {
            Err(err) if err.is_not_found() && !node.locator.is_root() => {
                if node.state(self.tree.ttl()) != NodeState::Removed {
                    self.tree.mark_removed(node);
                }
                Err(FsError::NotFound(node.locator.canonical_path()))
            }
            other => other,
        }
    }

    fn check_write(&self, locator: &Locator) -> Result<(), FsError> {
        if locator.kind() != NodeKind::File {
            return Err(FsError::IsDirectory(locator.canonical_path()));
        }
        if self.read_only || !locator.permits_write(self.translator.me()) {
            return Err(FsError::PermissionDenied(locator.canonical_path()));
        }
        Ok(())
    }

    fn stat_node(&self, node: &Node) -> FileStat {
        let me = self.translator.me();
        let locator = &node.locator;
        let inner = node.lock();
        let (perm, nlink, size) = match node.kind {
            NodeKind::Directory => {
                let writable = locator.permits_create(me) || locator.access(me) == Access::ReadWrite;
                let perm = if writable && !self.read_only { 0o755 } else { 0o555 };
                (perm, 2, inner.children.len() as u64)
            }
            NodeKind::File => {
                let perm = if locator.permits_write(me) && !self.read_only {
                    0o644
                } else {
                    0o444
                };
                (perm, 1, inner.size())
            }
        };
        FileStat {
            kind: node.kind,
            size,
            perm,
            nlink,
            created: inner.attributes.created,
            modified: inner.attributes.modified,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("translator", &self.translator)
            .field("nodes", &self.tree.len())
            .field("read_only", &self.read_only)
            .finish()
    }
}
