//! FUSE bindings.
//!
//! Adapts inode-numbered `fuser` callbacks onto the path-based dispatcher.
//! `fuser` delivers callbacks one at a time from its session loop, so every
//! callback that may wait on the service runs on a worker pool with its
//! reply moved along. Writes only touch the local buffer and stay inline.
//!
//! Buffered writes commit at `flush`, once per `close(2)`. `release` drops
//! anything still buffered, so a failed commit is never sent a second time.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    consts::FOPEN_DIRECT_IO, FileAttr, FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request,
    TimeOrNow,
};
use parking_lot::RwLock;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};

use crate::dispatch::{Dispatcher, FileStat, OpenMode};
use crate::inode::{join, parent_path, InodeTable};
use crate::node::NodeKind;
use crate::FsError;

/// TTL for cached attributes.
const TTL: Duration = Duration::from_secs(1);

/// Block size reported to the kernel.
const BLOCK_SIZE: u32 = 512;

/// Longest entry name.
const NAME_MAX: u32 = 255;

/// twfs FUSE filesystem implementation.
pub struct TwitterFilesystem {
    shared: Arc<Shared>,
    workers: ThreadPool,
}

/// State reachable from worker threads.
struct Shared {
    dispatcher: Arc<Dispatcher>,
    inodes: InodeTable,
    handles: RwLock<HashMap<u64, OpenHandle>>,
    next_handle: AtomicU64,
}

/// An open file handle.
#[derive(Debug, Clone)]
struct OpenHandle {
    path: String,
    write: bool,
}

/// Caller identity stamped on returned attributes.
#[derive(Debug, Clone, Copy)]
struct Owner {
    uid: u32,
    gid: u32,
}

impl Owner {
    fn of(req: &Request<'_>) -> Self {
        Self {
            uid: req.uid(),
            gid: req.gid(),
        }
    }
}

impl TwitterFilesystem {
    /// Creates a filesystem over a dispatcher, serving blocking callbacks
    /// from `worker_threads` threads.
    pub fn new(dispatcher: Arc<Dispatcher>, worker_threads: usize) -> Result<Self, FsError> {
        let workers = ThreadPoolBuilder::new()
            .num_threads(worker_threads.max(1))
            .thread_name(|i| format!("twfs-worker-{}", i))
            .build()
            .map_err(|e| FsError::Mount(format!("Failed to start worker threads: {}", e)))?;
        Ok(Self {
            shared: Arc::new(Shared {
                dispatcher,
                inodes: InodeTable::new(),
                handles: RwLock::new(HashMap::new()),
                next_handle: AtomicU64::new(1),
            }),
            workers,
        })
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.shared.dispatcher
    }

    /// Returns the inode table.
    pub fn inodes(&self) -> &InodeTable {
        &self.shared.inodes
    }

    /// Returns the number of worker threads.
    pub fn worker_threads(&self) -> usize {
        self.workers.current_num_threads()
    }

    /// Runs a callback body on the worker pool.
    fn offload<F>(&self, work: F)
    where
        F: FnOnce(&Shared) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        self.workers.spawn(move || work(&shared));
    }
}

impl Shared {
    fn allocate_handle(&self, path: String, write: bool) -> u64 {
        let fh = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.handles.write().insert(fh, OpenHandle { path, write });
        fh
    }

    fn release_handle(&self, fh: u64) -> Option<OpenHandle> {
        self.handles.write().remove(&fh)
    }

    fn handle(&self, fh: u64) -> Option<OpenHandle> {
        self.handles.read().get(&fh).cloned()
    }

    /// Returns true if another open handle still writes to `path`.
    fn has_writer(&self, path: &str) -> bool {
        self.handles
            .read()
            .values()
            .any(|handle| handle.write && handle.path == path)
    }

    fn path(&self, ino: u64) -> Result<String, FsError> {
        self.inodes
            .path(ino)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", ino)))
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, FsError> {
        let name = name
            .to_str()
            .ok_or_else(|| FsError::InvalidArgument("name is not valid UTF-8".to_string()))?;
        self.inodes
            .child_path(parent, name)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", parent)))
    }
}

/// Converts dispatcher attributes to FUSE attributes.
fn to_file_attr(ino: u64, stat: &FileStat, owner: Owner) -> FileAttr {
    let kind = match stat.kind {
        NodeKind::File => FileType::RegularFile,
        NodeKind::Directory => FileType::Directory,
    };
    FileAttr {
        ino,
        size: stat.size,
        blocks: (stat.size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64,
        atime: stat.modified,
        mtime: stat.modified,
        ctime: stat.modified,
        crtime: stat.created,
        kind,
        perm: stat.perm,
        nlink: stat.nlink,
        uid: owner.uid,
        gid: owner.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn log_failure(op: &str, path: &str, err: &FsError) {
    if err.is_not_found() {
        debug!(op = op, path = path, "not found");
    } else {
        warn!(op = op, path = path, error = %err, "operation failed");
    }
}

impl Filesystem for TwitterFilesystem {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!(parent = parent, name = ?name, "lookup");
        let owner = Owner::of(req);
        let path = match self.shared.child_path(parent, name) {
            Ok(path) => path,
            Err(err) => return reply.error(err.errno()),
        };
        self.offload(move |fs| match fs.dispatcher.stat(&path) {
            Ok(stat) => {
                let ino = fs.inodes.assign(&path);
                reply.entry(&TTL, &to_file_attr(ino, &stat, owner), 0);
            }
            Err(err) => {
                log_failure("lookup", &path, &err);
                reply.error(err.errno());
            }
        });
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        debug!(ino = ino, "getattr");
        let owner = Owner::of(req);
        self.offload(move |fs| {
            match fs.path(ino).and_then(|path| fs.dispatcher.stat(&path)) {
                Ok(stat) => reply.attr(&TTL, &to_file_attr(ino, &stat, owner)),
                Err(err) => reply.error(err.errno()),
            }
        });
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(ino = ino, size = ?size, "setattr");
        let owner = Owner::of(req);
        self.offload(move |fs| {
            let result = fs.path(ino).and_then(|path| match size {
                Some(size) => fs.dispatcher.truncate(&path, size),
                None => fs.dispatcher.stat(&path),
            });
            match result {
                Ok(stat) => reply.attr(&TTL, &to_file_attr(ino, &stat, owner)),
                Err(err) => reply.error(err.errno()),
            }
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!(ino = ino, offset = offset, "readdir");
        self.offload(move |fs| {
            let path = match fs.path(ino) {
                Ok(path) => path,
                Err(err) => return reply.error(err.errno()),
            };
            let listing = match fs.dispatcher.list(&path) {
                Ok(listing) => listing,
                Err(err) => {
                    log_failure("readdir", &path, &err);
                    return reply.error(err.errno());
                }
            };

            let parent_ino = fs.inodes.assign(parent_path(&path));
            let mut entries: Vec<(u64, FileType, String)> = vec![
                (ino, FileType::Directory, ".".to_string()),
                (parent_ino, FileType::Directory, "..".to_string()),
            ];
            for entry in listing {
                let kind = match entry.kind {
                    NodeKind::File => FileType::RegularFile,
                    NodeKind::Directory => FileType::Directory,
                };
                let child_ino = fs.inodes.assign(&join(&path, &entry.name));
                entries.push((child_ino, kind, entry.name));
            }

            for (i, (ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
                if reply.add(ino, (i + 1) as i64, kind, &name) {
                    break;
                }
            }
            reply.ok();
        });
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!(ino = ino, flags = flags, "open");
        let mode = OpenMode::from_flags(flags);
        self.offload(move |fs| {
            let path = match fs.path(ino) {
                Ok(path) => path,
                Err(err) => return reply.error(err.errno()),
            };
            match fs.dispatcher.open(&path, mode) {
                Ok(_) => {
                    let fh = fs.allocate_handle(path, mode.write);
                    reply.opened(fh, FOPEN_DIRECT_IO);
                }
                Err(err) => {
                    log_failure("open", &path, &err);
                    reply.error(err.errno());
                }
            }
        });
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        debug!(ino = ino, fh = fh, offset = offset, size = size, "read");
        let Some(handle) = self.shared.handle(fh) else {
            return reply.error(libc::EBADF);
        };
        self.offload(move |fs| {
            match fs
                .dispatcher
                .read(&handle.path, offset.max(0) as u64, size as usize)
            {
                Ok(data) => reply.data(&data),
                Err(err) => {
                    log_failure("read", &handle.path, &err);
                    reply.error(err.errno());
                }
            }
        });
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!(
            ino = ino,
            fh = fh,
            offset = offset,
            size = data.len(),
            "write"
        );
        let Some(handle) = self.shared.handle(fh).filter(|h| h.write) else {
            return reply.error(libc::EBADF);
        };
        match self
            .shared
            .dispatcher
            .write(&handle.path, offset.max(0) as u64, data)
        {
            Ok(written) => reply.written(written as u32),
            Err(err) => {
                log_failure("write", &handle.path, &err);
                reply.error(err.errno());
            }
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        debug!(ino = ino, fh = fh, "flush");
        match self.shared.handle(fh) {
            Some(handle) if handle.write => {
                self.offload(move |fs| match fs.dispatcher.release(&handle.path) {
                    Ok(()) => reply.ok(),
                    Err(err) => reply.error(err.errno()),
                });
            }
            Some(_) => reply.ok(),
            None => reply.error(libc::EBADF),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!(ino = ino, fh = fh, "release");
        match self.shared.release_handle(fh) {
            Some(handle) if handle.write => {
                if !self.shared.has_writer(&handle.path) {
                    if let Err(err) = self.shared.dispatcher.discard(&handle.path) {
                        log_failure("release", &handle.path, &err);
                    }
                }
                reply.ok();
            }
            Some(_) => reply.ok(),
            None => reply.error(libc::EBADF),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        debug!(parent = parent, name = ?name, mode = mode, "create");
        let path = match self.shared.child_path(parent, name) {
            Ok(path) => path,
            Err(err) => return reply.error(err.errno()),
        };
        match self.shared.dispatcher.create(&path) {
            Ok(stat) => {
                let ino = self.shared.inodes.assign(&path);
                let fh = self.shared.allocate_handle(path, true);
                reply.created(
                    &TTL,
                    &to_file_attr(ino, &stat, Owner::of(req)),
                    0,
                    fh,
                    FOPEN_DIRECT_IO,
                );
            }
            Err(err) => {
                log_failure("create", &path, &err);
                reply.error(err.errno());
            }
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        debug!(parent = parent, name = ?name, "unlink");
        let path = match self.shared.child_path(parent, name) {
            Ok(path) => path,
            Err(err) => return reply.error(err.errno()),
        };
        self.offload(move |fs| match fs.dispatcher.remove(&path) {
            Ok(()) => {
                fs.inodes.forget(&path);
                reply.ok();
            }
            Err(err) => {
                log_failure("unlink", &path, &err);
                reply.error(err.errno());
            }
        });
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let files = self.shared.dispatcher.tree().len() as u64;
        reply.statfs(0, 0, 0, files, 0, BLOCK_SIZE, NAME_MAX, BLOCK_SIZE);
    }
}
