//! Virtual nodes.
//!
//! Each node carries its own lock and condition variable. The lock guards
//! lifecycle state, children, content and the write buffer; the condition
//! variable wakes callers waiting on an in-flight population.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::path::Locator;
use crate::FsError;

/// Node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Root node ID.
    pub const ROOT: NodeId = NodeId(1);

    /// Generates a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(2);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// Node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Directory
    Directory,
    /// Regular file
    File,
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// Never fetched
    Unpopulated,
    /// A fetch is in flight
    Populating,
    /// Content or listing is current
    Populated,
    /// Content or listing has outlived the cache TTL
    Stale,
    /// Deleted; terminal
    Removed,
}

/// Attributes reported by stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attributes {
    /// Size in bytes
    pub size: u64,
    /// Creation time on the service
    pub created: SystemTime,
    /// Last population or flush
    pub modified: SystemTime,
}

impl Attributes {
    fn now() -> Self {
        let now = SystemTime::now();
        Self {
            size: 0,
            created: now,
            modified: now,
        }
    }
}

/// Mutable node state, guarded by the node lock.
#[derive(Debug)]
pub struct NodeInner {
    /// Lifecycle state
    pub state: NodeState,
    /// Children by name, in listing order (directories only)
    pub children: IndexMap<String, NodeId>,
    /// Directories reached by path but absent from the listing
    pub unlisted: HashMap<String, NodeId>,
    /// Cached content (files only)
    pub content: Option<Bytes>,
    /// Stat attributes
    pub attributes: Attributes,
    /// Buffered, unflushed writes (files only)
    pub pending_write: Option<Vec<u8>>,
    /// Server identifier confirmed by the last flush
    pub remote_id: Option<String>,
    /// Created locally and not yet committed
    pub draft: bool,
    /// When the last population succeeded
    pub populated_at: Option<Instant>,
    /// Number of completed population attempts
    pub(crate) generation: u64,
    /// Result of the last completed population
    pub(crate) outcome: Option<Result<(), FsError>>,
}

/// A node in the virtual tree.
#[derive(Debug)]
pub struct Node {
    /// Node ID
    pub id: NodeId,
    /// Parent node ID; the root is its own parent
    pub parent: NodeId,
    /// Entry name
    pub name: String,
    /// Node type
    pub kind: NodeKind,
    /// Resolved location
    pub locator: Locator,
    inner: Mutex<NodeInner>,
    ready: Condvar,
}

impl Node {
    /// Creates a node in the `Unpopulated` state.
    pub fn new(id: NodeId, parent: NodeId, locator: Locator) -> Self {
        let name = locator.name().to_string();
        let kind = locator.kind();
        Self {
            id,
            parent,
            name,
            kind,
            locator,
            inner: Mutex::new(NodeInner {
                state: NodeState::Unpopulated,
                children: IndexMap::new(),
                unlisted: HashMap::new(),
                content: None,
                attributes: Attributes::now(),
                pending_write: None,
                remote_id: None,
                draft: false,
                populated_at: None,
                generation: 0,
                outcome: None,
            }),
            ready: Condvar::new(),
        }
    }

    /// Creates the root node.
    pub fn root() -> Self {
        Self::new(NodeId::ROOT, NodeId::ROOT, Locator::root())
    }

    /// Returns true if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Returns true if this is a file.
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Enters the node's critical section.
    pub fn lock(&self) -> MutexGuard<'_, NodeInner> {
        self.inner.lock()
    }

    /// Blocks until the guarded state changes.
    pub(crate) fn wait(&self, guard: &mut MutexGuard<'_, NodeInner>) {
        self.ready.wait(guard);
    }

    /// Wakes every caller blocked in `wait`.
    pub(crate) fn notify(&self) {
        self.ready.notify_all();
    }

    /// Returns the lifecycle state, applying TTL expiry.
    pub fn state(&self, ttl: Duration) -> NodeState {
        let mut inner = self.inner.lock();
        self.expire(&mut inner, ttl);
        inner.state
    }

    /// Applies TTL expiry under an already-held lock. Local drafts never
    /// expire.
    pub fn expire(&self, inner: &mut NodeInner, ttl: Duration) {
        if !self.locator.is_local() {
            inner.expire(ttl);
        }
    }
}

impl NodeInner {
    /// Moves `Populated` to `Stale` once the TTL has elapsed.
    pub fn expire(&mut self, ttl: Duration) {
        if self.state != NodeState::Populated {
            return;
        }
        if let Some(at) = self.populated_at {
            if at.elapsed() >= ttl {
                self.state = NodeState::Stale;
            }
        }
    }

    /// Marks the node populated now.
    pub fn mark_populated(&mut self) {
        self.state = NodeState::Populated;
        self.populated_at = Some(Instant::now());
        self.attributes.modified = SystemTime::now();
    }

    /// Returns true if the node holds usable data (possibly stale).
    pub fn has_data(&self) -> bool {
        matches!(self.state, NodeState::Populated | NodeState::Stale)
    }

    /// Size reported by stat: buffered writes first, then content, then
    /// the listing summary.
    pub fn size(&self) -> u64 {
        if let Some(pending) = &self.pending_write {
            return pending.len() as u64;
        }
        match &self.content {
            Some(content) => content.len() as u64,
            None => self.attributes.size,
        }
    }
}
