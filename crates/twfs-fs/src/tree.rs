//! Node arena and cache.
//!
//! Nodes live in an id-indexed arena; parents are referenced by id only.
//! Directory children double as the listing cache and file content as the
//! content cache, both expiring after the configured TTL. Directories that
//! are addressed by path but absent from their parent's listing are held
//! apart from it, so listings only ever show what the service returned.
//!
//! Locking: the arena index lock is taken only for id lookups and inserts
//! and is never held while acquiring a node lock. Node locks are taken
//! parent before child. Population calls run outside the node lock.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::{debug, trace, warn};
use twfs_core::Timestamp;

use crate::node::{Node, NodeId, NodeInner, NodeKind, NodeState};
use crate::path::Locator;
use crate::FsError;

/// Largest write buffer a single file accepts.
pub const MAX_PENDING_BYTES: usize = 1 << 20;

/// One entry of a directory listing, in remote order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Child name
    pub name: String,
    /// Child kind
    pub kind: NodeKind,
    /// Size of the child's content, when known from the listing
    pub size: u64,
    /// Creation time on the service
    pub created: Option<Timestamp>,
}

impl ListEntry {
    /// Creates a directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Directory,
            size: 0,
            created: None,
        }
    }

    /// Creates a file entry.
    pub fn file(name: impl Into<String>, size: u64, created: Option<Timestamp>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::File,
            size,
            created,
        }
    }
}

/// Fetched or server-confirmed file content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Content {
    /// Content bytes
    pub bytes: Bytes,
    /// Creation time on the service
    pub created: Option<Timestamp>,
    /// Server identifier
    pub remote_id: Option<String>,
}

/// Where populations come from.
pub trait ContentSource: Send + Sync {
    /// Lists a directory.
    fn list(&self, locator: &Locator) -> Result<Vec<ListEntry>, FsError>;

    /// Fetches a file's content.
    fn fetch(&self, locator: &Locator) -> Result<Content, FsError>;
}

enum Fetched {
    Listing(Vec<ListEntry>),
    Content(Content),
}

/// The virtual node tree.
pub struct NodeTree {
    root: Arc<Node>,
    nodes: RwLock<HashMap<NodeId, Arc<Node>>>,
    ttl: Duration,
}

impl NodeTree {
    /// Creates a tree holding only the root.
    pub fn new(ttl: Duration) -> Self {
        let root = Arc::new(Node::root());
        let mut nodes = HashMap::new();
        nodes.insert(root.id, Arc::clone(&root));
        Self {
            root,
            nodes: RwLock::new(nodes),
            ttl,
        }
    }

    /// Returns the cache TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the root node.
    pub fn root(&self) -> Arc<Node> {
        Arc::clone(&self.root)
    }

    /// Gets a node by ID.
    pub fn get(&self, id: NodeId) -> Option<Arc<Node>> {
        self.nodes.read().get(&id).cloned()
    }

    /// Returns the number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Returns true if only the root exists.
    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Looks up a cached child by name.
    pub fn child(&self, parent: &Node, name: &str) -> Option<Arc<Node>> {
        let id = parent.lock().children.get(name).copied()?;
        self.get(id)
    }

    /// Returns the cached children of a directory, in listing order.
    pub fn children(&self, parent: &Node) -> Vec<Arc<Node>> {
        let ids: Vec<NodeId> = parent.lock().children.values().copied().collect();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Finds an existing node without creating anything.
    pub fn find(&self, locator: &Locator) -> Option<Arc<Node>> {
        let mut current = self.root();
        for name in &locator.segments {
            let id = {
                let inner = current.lock();
                inner.children.get(name).or_else(|| inner.unlisted.get(name)).copied()?
            };
            current = self.get(id)?;
        }
        Some(current)
    }

    /// Walks from the root to `locator`, materializing directories on the
    /// way. File nodes only come from listings or `create_file`; a file the
    /// parent does not hold is `NotFound`.
    pub fn lookup_or_create(&self, locator: &Locator) -> Result<Arc<Node>, FsError> {
        let mut current = self.root();
        for name in &locator.segments {
            let next = {
                let mut inner = current.lock();
                if inner.state == NodeState::Removed {
                    return Err(not_found(locator));
                }
                let existing = inner.children.get(name).or_else(|| inner.unlisted.get(name));
                match existing.and_then(|id| self.get(*id)) {
                    Some(child) => child,
                    None => {
                        let child_locator = current.locator.child(name)?;
                        if child_locator.kind() != NodeKind::Directory {
                            return Err(not_found(locator));
                        }
                        let child = Arc::new(Node::new(NodeId::new(), current.id, child_locator));
                        trace!(path = %child.locator, id = child.id.0, "materialized directory");
                        self.nodes.write().insert(child.id, Arc::clone(&child));
                        inner.unlisted.insert(name.clone(), child.id);
                        child
                    }
                }
            };
            current = next;
        }
        Ok(current)
    }

    /// Makes sure the node holds current data.
    ///
    /// Fresh nodes return immediately. Unpopulated and stale nodes are
    /// fetched from `source` with the node lock released; concurrent callers
    /// wait for that single fetch and share its outcome. On failure the node
    /// reverts to its prior state.
    pub fn ensure_populated(
        &self,
        node: &Arc<Node>,
        source: &dyn ContentSource,
    ) -> Result<(), FsError> {
        let mut inner = node.lock();
        node.expire(&mut inner, self.ttl);

        let prior = match inner.state {
            NodeState::Populated => return Ok(()),
            NodeState::Removed => return Err(not_found(&node.locator)),
            NodeState::Populating => {
                let generation = inner.generation;
                while inner.generation == generation && inner.state == NodeState::Populating {
                    node.wait(&mut inner);
                }
                if inner.generation != generation {
                    return inner.outcome.clone().unwrap_or(Ok(()));
                }
                return Err(not_found(&node.locator));
            }
            state @ (NodeState::Unpopulated | NodeState::Stale) => state,
        };
        inner.state = NodeState::Populating;
        drop(inner);

        debug!(path = %node.locator, refresh = prior == NodeState::Stale, "populating");
        let result = match node.kind {
            NodeKind::Directory => source.list(&node.locator).map(Fetched::Listing),
            NodeKind::File => source.fetch(&node.locator).map(Fetched::Content),
        };

        let mut inner = node.lock();
        inner.generation += 1;
        let outcome = match result {
            Ok(_) if inner.state == NodeState::Removed => Err(not_found(&node.locator)),
            Ok(Fetched::Listing(entries)) => {
                self.apply_listing(node, &mut inner, entries);
                inner.attributes.size = inner.children.len() as u64;
                inner.mark_populated();
                Ok(())
            }
            Ok(Fetched::Content(content)) => {
                apply_content(&mut inner, content);
                inner.mark_populated();
                Ok(())
            }
            Err(err) => {
                if inner.state == NodeState::Populating {
                    inner.state = prior;
                }
                warn!(path = %node.locator, error = %err, "population failed");
                Err(err)
            }
        };
        inner.outcome = Some(outcome.clone());
        drop(inner);
        node.notify();
        outcome
    }

    /// Rebuilds a directory's children from a listing.
    ///
    /// Existing children are reused by name, including directories that
    /// were reached by path before the listing named them. Children missing
    /// from the listing are detached unless they hold unflushed writes.
    fn apply_listing(&self, dir: &Node, inner: &mut NodeInner, entries: Vec<ListEntry>) {
        let mut previous = std::mem::take(&mut inner.children);
        let mut children = IndexMap::with_capacity(entries.len());

        for entry in entries {
            if children.contains_key(&entry.name) {
                continue;
            }
            let known = previous
                .shift_remove(&entry.name)
                .or_else(|| inner.unlisted.remove(&entry.name));
            let child = match known.and_then(|id| self.get(id)) {
                Some(child) => child,
                None => {
                    let locator = match dir.locator.child(&entry.name) {
                        Ok(locator) if locator.kind() == entry.kind => locator,
                        _ => {
                            warn!(dir = %dir.locator, name = %entry.name, "skipping unaddressable entry");
                            continue;
                        }
                    };
                    let child = Arc::new(Node::new(NodeId::new(), dir.id, locator));
                    self.nodes.write().insert(child.id, Arc::clone(&child));
                    child
                }
            };

            {
                let mut child_inner = child.lock();
                child_inner.attributes.size = entry.size;
                if let Some(created) = entry.created {
                    child_inner.attributes.created = created.to_system_time();
                }
            }
            children.insert(entry.name, child.id);
        }

        for (name, id) in previous {
            match self.get(id) {
                Some(child) if self.holds_pending(&child) => {
                    children.insert(name, id);
                }
                Some(child) => self.detach(&child),
                None => {}
            }
        }

        inner.children = children;
    }

    /// Returns true if the node or any descendant has unflushed writes.
    fn holds_pending(&self, node: &Node) -> bool {
        let children: Vec<NodeId> = {
            let inner = node.lock();
            if inner.pending_write.is_some() {
                return true;
            }
            inner.children.values().chain(inner.unlisted.values()).copied().collect()
        };
        children
            .into_iter()
            .filter_map(|id| self.get(id))
            .any(|child| self.holds_pending(&child))
    }

    /// Drops a subtree from the arena, marking every node `Removed`.
    fn detach(&self, node: &Arc<Node>) {
        self.nodes.write().remove(&node.id);
        let children: Vec<NodeId> = {
            let mut inner = node.lock();
            inner.state = NodeState::Removed;
            inner.pending_write = None;
            let mut ids: Vec<NodeId> = inner.children.drain(..).map(|(_, id)| id).collect();
            ids.extend(inner.unlisted.drain().map(|(_, id)| id));
            ids
        };
        node.notify();
        trace!(path = %node.locator, id = node.id.0, "detached");
        for child in children.into_iter().filter_map(|id| self.get(id)) {
            self.detach(&child);
        }
    }

    /// Detaches a node from its parent and marks it `Removed`.
    pub fn mark_removed(&self, node: &Arc<Node>) {
        let parent = self.get(node.parent).filter(|p| p.id != node.id);
        match parent {
            Some(parent) => {
                let mut parent_inner = parent.lock();
                if parent_inner.children.get(&node.name) == Some(&node.id) {
                    parent_inner.children.shift_remove(&node.name);
                    parent_inner.attributes.size = parent_inner.children.len() as u64;
                } else if parent_inner.unlisted.get(&node.name) == Some(&node.id) {
                    parent_inner.unlisted.remove(&node.name);
                }
                self.detach(node);
            }
            None => self.detach(node),
        }
        debug!(path = %node.locator, "removed");
    }

    /// Adds a locally created file to `parent` with empty content and an
    /// empty write buffer. An existing file of that name is reopened with
    /// its buffer reset.
    pub fn create_file(&self, parent: &Arc<Node>, locator: Locator) -> Result<Arc<Node>, FsError> {
        if locator.kind() != NodeKind::File {
            return Err(FsError::IsDirectory(locator.canonical_path()));
        }
        let mut inner = parent.lock();
        if inner.state == NodeState::Removed {
            return Err(not_found(&parent.locator));
        }

        if let Some(existing) = inner.children.get(locator.name()).and_then(|id| self.get(*id)) {
            existing.lock().pending_write = Some(Vec::new());
            return Ok(existing);
        }

        let node = Arc::new(Node::new(NodeId::new(), parent.id, locator));
        {
            let mut node_inner = node.lock();
            node_inner.content = Some(Bytes::new());
            node_inner.pending_write = Some(Vec::new());
            node_inner.draft = true;
            node_inner.mark_populated();
        }
        self.nodes.write().insert(node.id, Arc::clone(&node));
        inner.children.insert(node.name.clone(), node.id);
        inner.attributes.size = inner.children.len() as u64;
        debug!(path = %node.locator, id = node.id.0, "created file");
        Ok(node)
    }

    /// Starts a write session. Truncating (or the first writer) gets an
    /// empty buffer; other writers share the existing one.
    pub fn begin_write(&self, node: &Node, truncate: bool) -> Result<(), FsError> {
        if !node.is_file() {
            return Err(FsError::IsDirectory(node.locator.canonical_path()));
        }
        let mut inner = node.lock();
        if inner.state == NodeState::Removed {
            return Err(not_found(&node.locator));
        }
        if truncate || inner.pending_write.is_none() {
            inner.pending_write = Some(Vec::new());
        }
        Ok(())
    }

    /// Copies `data` into the write buffer at `offset`, zero-filling any
    /// gap. Never touches the network.
    pub fn buffer_write(&self, node: &Node, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        if !node.is_file() {
            return Err(FsError::IsDirectory(node.locator.canonical_path()));
        }
        let start = usize::try_from(offset)
            .map_err(|_| FsError::InvalidArgument(format!("offset {} out of range", offset)))?;
        let end = start
            .checked_add(data.len())
            .filter(|end| *end <= MAX_PENDING_BYTES)
            .ok_or_else(|| FsError::InvalidArgument("write exceeds buffer limit".to_string()))?;

        let mut inner = node.lock();
        if inner.state == NodeState::Removed {
            return Err(not_found(&node.locator));
        }
        let buffer = inner.pending_write.get_or_insert_with(Vec::new);
        if buffer.len() < end {
            buffer.resize(end, 0);
        }
        buffer[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    /// Resizes the write buffer.
    pub fn truncate(&self, node: &Node, size: u64) -> Result<(), FsError> {
        if !node.is_file() {
            return Err(FsError::IsDirectory(node.locator.canonical_path()));
        }
        let size = usize::try_from(size)
            .ok()
            .filter(|size| *size <= MAX_PENDING_BYTES)
            .ok_or_else(|| FsError::InvalidArgument("size exceeds buffer limit".to_string()))?;

        let mut inner = node.lock();
        if inner.state == NodeState::Removed {
            return Err(not_found(&node.locator));
        }
        inner.pending_write.get_or_insert_with(Vec::new).resize(size, 0);
        Ok(())
    }

    /// Commits the write buffer through `commit` while holding the node's
    /// critical section.
    ///
    /// Returns `Ok(false)` when nothing was buffered. On success the buffer
    /// is cleared and the confirmed content, if any, replaces the cached
    /// content. On failure the buffer is left untouched.
    pub fn flush<F>(&self, node: &Node, commit: F) -> Result<bool, FsError>
    where
        F: FnOnce(&[u8]) -> Result<Option<Content>, FsError>,
    {
        let mut inner = node.lock();
        if inner.state == NodeState::Removed {
            return Err(not_found(&node.locator));
        }
        let Some(pending) = inner.pending_write.as_deref() else {
            return Ok(false);
        };

        let confirmed = commit(pending)?;
        inner.pending_write = None;
        inner.draft = false;
        if let Some(content) = confirmed {
            apply_content(&mut inner, content);
            inner.mark_populated();
        }
        Ok(true)
    }

    /// Drops unflushed writes. Returns true if a buffer was discarded.
    pub fn discard(&self, node: &Node) -> bool {
        let mut inner = node.lock();
        let discarded = inner.pending_write.take();
        if let Some(buffer) = &discarded {
            warn!(path = %node.locator, bytes = buffer.len(), "discarding unflushed writes");
        }
        discarded.is_some()
    }

    /// Marks a cached node stale so the next access refreshes it.
    pub fn invalidate(&self, locator: &Locator) {
        if let Some(node) = self.find(locator) {
            let mut inner = node.lock();
            if inner.state == NodeState::Populated {
                inner.state = NodeState::Stale;
                debug!(path = %locator, "invalidated");
            }
        }
    }
}

fn apply_content(inner: &mut NodeInner, content: Content) {
    inner.attributes.size = content.bytes.len() as u64;
    if let Some(created) = content.created {
        inner.attributes.created = created.to_system_time();
    }
    if content.remote_id.is_some() {
        inner.remote_id = content.remote_id;
    }
    inner.content = Some(content.bytes);
}

fn not_found(locator: &Locator) -> FsError {
    FsError::NotFound(locator.canonical_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::resolve;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use twfs_proto::FetchError;

    #[derive(Default)]
    struct StaticSource {
        listings: Mutex<HashMap<String, Vec<ListEntry>>>,
        fail: Mutex<Option<FetchError>>,
        delay: Option<Duration>,
        lists: AtomicUsize,
        fetches: AtomicUsize,
    }

    impl StaticSource {
        fn with_listing(self, path: &str, entries: Vec<ListEntry>) -> Self {
            self.listings.lock().insert(path.to_string(), entries);
            self
        }
    }

    impl ContentSource for StaticSource {
        fn list(&self, locator: &Locator) -> Result<Vec<ListEntry>, FsError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            if let Some(err) = self.fail.lock().clone() {
                return Err(err.into());
            }
            Ok(self
                .listings
                .lock()
                .get(&locator.canonical_path())
                .cloned()
                .unwrap_or_default())
        }

        fn fetch(&self, locator: &Locator) -> Result<Content, FsError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                thread::sleep(delay);
            }
            if let Some(err) = self.fail.lock().clone() {
                return Err(err.into());
            }
            Ok(Content {
                bytes: Bytes::from(format!("content of {}", locator)),
                created: None,
                remote_id: Some(locator.name().to_string()),
            })
        }
    }

    fn timeline_source() -> StaticSource {
        StaticSource::default().with_listing(
            "/timeline",
            vec![
                ListEntry::file("1002", 5, None),
                ListEntry::file("1001", 3, None),
            ],
        )
    }

    #[test]
    fn test_lookup_or_create_materializes_directories() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let node = tree
            .lookup_or_create(&resolve("/users/bob/timeline").unwrap())
            .unwrap();
        assert!(node.is_dir());
        assert_eq!(node.locator.canonical_path(), "/users/bob/timeline");
        assert_eq!(tree.len(), 4);

        let again = tree
            .lookup_or_create(&resolve("/users/bob/timeline").unwrap())
            .unwrap();
        assert_eq!(node.id, again.id);
    }

    #[test]
    fn test_materialized_directories_stay_out_of_listings() {
        let tree = NodeTree::new(Duration::ZERO);
        let source = StaticSource::default()
            .with_listing("/users", vec![ListEntry::directory("bob")]);
        let users = tree.lookup_or_create(&resolve("/users").unwrap()).unwrap();
        tree.ensure_populated(&users, &source).unwrap();

        let carol = tree.lookup_or_create(&resolve("/users/carol").unwrap()).unwrap();
        let names: Vec<String> = tree.children(&users).iter().map(|n| n.name.clone()).collect();
        assert_eq!(names, vec!["bob"]);
        assert!(tree.child(&users, "carol").is_none());
        assert_eq!(tree.find(&resolve("/users/carol").unwrap()).unwrap().id, carol.id);

        // A listing that names the directory adopts the existing node.
        source.listings.lock().insert(
            "/users".to_string(),
            vec![ListEntry::directory("bob"), ListEntry::directory("carol")],
        );
        tree.ensure_populated(&users, &source).unwrap();
        assert_eq!(tree.child(&users, "carol").unwrap().id, carol.id);
        assert!(users.lock().unlisted.is_empty());
    }

    #[test]
    fn test_lookup_never_fabricates_files() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let result = tree.lookup_or_create(&resolve("/timeline/1").unwrap());
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }

    #[test]
    fn test_listing_preserves_order() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let source = timeline_source();
        let timeline = tree.lookup_or_create(&resolve("/timeline").unwrap()).unwrap();

        tree.ensure_populated(&timeline, &source).unwrap();
        let names: Vec<String> = tree
            .children(&timeline)
            .iter()
            .map(|n| n.name.clone())
            .collect();
        assert_eq!(names, vec!["1002", "1001"]);
        assert_eq!(timeline.state(tree.ttl()), NodeState::Populated);

        let post = tree.child(&timeline, "1002").unwrap();
        assert_eq!(post.lock().size(), 5);
    }

    #[test]
    fn test_fresh_node_not_refetched() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let source = timeline_source();
        let timeline = tree.lookup_or_create(&resolve("/timeline").unwrap()).unwrap();

        tree.ensure_populated(&timeline, &source).unwrap();
        tree.ensure_populated(&timeline, &source).unwrap();
        assert_eq!(source.lists.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stale_node_refreshed_once() {
        let tree = NodeTree::new(Duration::from_millis(200));
        let source = timeline_source();
        let timeline = tree.lookup_or_create(&resolve("/timeline").unwrap()).unwrap();
        tree.ensure_populated(&timeline, &source).unwrap();
        let first = tree.child(&timeline, "1001").unwrap();

        thread::sleep(Duration::from_millis(300));
        assert_eq!(timeline.state(tree.ttl()), NodeState::Stale);
        tree.ensure_populated(&timeline, &source).unwrap();
        tree.ensure_populated(&timeline, &source).unwrap();
        assert_eq!(source.lists.load(Ordering::SeqCst), 2);

        // Children survive a refresh by name.
        assert_eq!(tree.child(&timeline, "1001").unwrap().id, first.id);
    }

    #[test]
    fn test_failed_population_reverts() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let source = timeline_source();
        *source.fail.lock() = Some(FetchError::Timeout);
        let timeline = tree.lookup_or_create(&resolve("/timeline").unwrap()).unwrap();

        let result = tree.ensure_populated(&timeline, &source);
        assert!(matches!(result, Err(FsError::Fetch(FetchError::Timeout))));
        assert_eq!(timeline.state(tree.ttl()), NodeState::Unpopulated);

        *source.fail.lock() = None;
        tree.ensure_populated(&timeline, &source).unwrap();
        assert_eq!(tree.children(&timeline).len(), 2);
    }

    #[test]
    fn test_concurrent_population_deduplicated() {
        let tree = Arc::new(NodeTree::new(Duration::from_secs(60)));
        let source = Arc::new(StaticSource {
            delay: Some(Duration::from_millis(100)),
            ..timeline_source()
        });
        let timeline = tree.lookup_or_create(&resolve("/timeline").unwrap()).unwrap();
        let post = {
            let source = StaticSource::default().with_listing(
                "/timeline",
                vec![ListEntry::file("1002", 5, None)],
            );
            tree.ensure_populated(&timeline, &source).unwrap();
            tree.child(&timeline, "1002").unwrap()
        };

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tree = Arc::clone(&tree);
                let source = Arc::clone(&source);
                let post = Arc::clone(&post);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    tree.ensure_populated(&post, source.as_ref()).unwrap();
                    post.lock().content.clone().unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Bytes::from("content of /timeline/1002"));
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_waiters_share_failure() {
        let tree = Arc::new(NodeTree::new(Duration::from_secs(60)));
        let source = Arc::new(StaticSource {
            delay: Some(Duration::from_millis(100)),
            ..StaticSource::default()
        });
        *source.fail.lock() = Some(FetchError::RateLimited { reset_at: None });
        let dir = tree.lookup_or_create(&resolve("/mentions").unwrap()).unwrap();

        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tree = Arc::clone(&tree);
                let source = Arc::clone(&source);
                let dir = Arc::clone(&dir);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    tree.ensure_populated(&dir, source.as_ref())
                })
            })
            .collect();

        for handle in handles {
            assert!(matches!(
                handle.join().unwrap(),
                Err(FsError::Fetch(FetchError::RateLimited { .. }))
            ));
        }
        assert_eq!(source.lists.load(Ordering::SeqCst), 1);
        assert_eq!(dir.state(tree.ttl()), NodeState::Unpopulated);
    }

    #[test]
    fn test_refresh_drops_missing_children_but_keeps_drafts() {
        let tree = NodeTree::new(Duration::ZERO);
        let source = timeline_source();
        let timeline = tree.lookup_or_create(&resolve("/timeline").unwrap()).unwrap();
        tree.ensure_populated(&timeline, &source).unwrap();
        let gone = tree.child(&timeline, "1001").unwrap();

        source.listings.lock().insert(
            "/timeline".to_string(),
            vec![ListEntry::file("1003", 1, None), ListEntry::file("1002", 5, None)],
        );
        tree.ensure_populated(&timeline, &source).unwrap();
        let names: Vec<String> = tree
            .children(&timeline)
            .iter()
            .map(|n| n.name.clone())
            .collect();
        assert_eq!(names, vec!["1003", "1002"]);
        assert_eq!(gone.state(tree.ttl()), NodeState::Removed);
        assert!(tree.get(gone.id).is_none());

        let compose = tree.lookup_or_create(&resolve("/compose").unwrap()).unwrap();
        let draft = tree
            .create_file(&compose, resolve("/compose/draft").unwrap())
            .unwrap();
        tree.ensure_populated(&compose, &source).unwrap();
        assert_eq!(tree.child(&compose, "draft").unwrap().id, draft.id);
    }

    #[test]
    fn test_buffer_write_zero_fills() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let compose = tree.lookup_or_create(&resolve("/compose").unwrap()).unwrap();
        let draft = tree
            .create_file(&compose, resolve("/compose/new").unwrap())
            .unwrap();

        assert_eq!(tree.buffer_write(&draft, 0, b"hi").unwrap(), 2);
        assert_eq!(tree.buffer_write(&draft, 4, b"yo").unwrap(), 2);
        assert_eq!(draft.lock().pending_write.as_deref(), Some(&b"hi\0\0yo"[..]));

        tree.truncate(&draft, 2).unwrap();
        assert_eq!(draft.lock().pending_write.as_deref(), Some(&b"hi"[..]));

        assert!(matches!(
            tree.buffer_write(&draft, MAX_PENDING_BYTES as u64, b"x"),
            Err(FsError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_flush_success_and_failure() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let compose = tree.lookup_or_create(&resolve("/compose").unwrap()).unwrap();
        let draft = tree
            .create_file(&compose, resolve("/compose/new").unwrap())
            .unwrap();
        tree.buffer_write(&draft, 0, b"hello").unwrap();

        let result = tree.flush(&draft, |_| Err(FetchError::Timeout.into()));
        assert!(result.is_err());
        assert_eq!(draft.lock().pending_write.as_deref(), Some(&b"hello"[..]));

        let flushed = tree
            .flush(&draft, |payload| {
                Ok(Some(Content {
                    bytes: Bytes::copy_from_slice(payload),
                    created: None,
                    remote_id: Some("1003".to_string()),
                }))
            })
            .unwrap();
        assert!(flushed);
        let inner = draft.lock();
        assert!(inner.pending_write.is_none());
        assert_eq!(inner.content.as_deref(), Some(&b"hello"[..]));
        assert_eq!(inner.remote_id.as_deref(), Some("1003"));
        drop(inner);

        assert!(!tree.flush(&draft, |_| unreachable!()).unwrap());
        assert!(!draft.lock().draft);
    }

    #[test]
    fn test_discard_drops_buffer() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let compose = tree.lookup_or_create(&resolve("/compose").unwrap()).unwrap();
        let draft = tree
            .create_file(&compose, resolve("/compose/new").unwrap())
            .unwrap();
        assert!(draft.lock().draft);
        tree.buffer_write(&draft, 0, b"never sent").unwrap();

        assert!(tree.discard(&draft));
        assert!(draft.lock().pending_write.is_none());
        assert!(!tree.discard(&draft));
    }

    #[test]
    fn test_mark_removed() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let source = timeline_source();
        let timeline = tree.lookup_or_create(&resolve("/timeline").unwrap()).unwrap();
        tree.ensure_populated(&timeline, &source).unwrap();
        let post = tree.child(&timeline, "1002").unwrap();

        tree.mark_removed(&post);
        assert!(tree.child(&timeline, "1002").is_none());
        assert_eq!(post.state(tree.ttl()), NodeState::Removed);
        assert!(matches!(
            tree.ensure_populated(&post, &source),
            Err(FsError::NotFound(_))
        ));
        assert!(matches!(
            tree.buffer_write(&post, 0, b"x"),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn test_invalidate() {
        let tree = NodeTree::new(Duration::from_secs(60));
        let source = timeline_source();
        let timeline = tree.lookup_or_create(&resolve("/timeline").unwrap()).unwrap();
        tree.ensure_populated(&timeline, &source).unwrap();

        tree.invalidate(&resolve("/timeline").unwrap());
        assert_eq!(timeline.state(tree.ttl()), NodeState::Stale);
        tree.ensure_populated(&timeline, &source).unwrap();
        assert_eq!(source.lists.load(Ordering::SeqCst), 2);

        // Unknown locations are ignored.
        tree.invalidate(&resolve("/users/nobody/timeline").unwrap());
    }
}
