//! twfs Filesystem - the remote service as a mountable tree.
//!
//! Implements:
//! - Path resolution into typed locators
//! - A node arena acting as listing and content cache, with per-node
//!   population and staleness tracking
//! - The path-based operation dispatcher
//! - The translator from filesystem intents to remote operations
//! - FUSE bindings on top of the dispatcher

#![warn(missing_docs, rust_2018_idioms)]

pub mod dispatch;
pub mod inode;
pub mod mount;
pub mod node;
pub mod ops;
pub mod path;
pub mod translate;
pub mod tree;
pub mod vfs;

pub use dispatch::{DirEntry, Dispatcher, FileStat, OpenMode};
pub use mount::MountConfig;
pub use node::{Node, NodeId, NodeKind, NodeState};
pub use path::{resolve, Access, Category, Locator, PathError, ResourceId};
pub use translate::{render_profile, Limits, Translator};
pub use tree::{Content, ContentSource, ListEntry, NodeTree};
pub use vfs::TwitterFilesystem;

use thiserror::Error;
use twfs_proto::FetchError;

/// Filesystem errors.
#[derive(Debug, Clone, Error)]
pub enum FsError {
    /// Path did not resolve
    #[error(transparent)]
    Path(#[from] PathError),

    /// Category does not permit the operation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Remote operation failed
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Payload failed local validation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No such node, or the node was removed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Directory operation on a file
    #[error("Not a directory: {0}")]
    NotDirectory(String),

    /// File operation on a directory
    #[error("Is a directory: {0}")]
    IsDirectory(String),

    /// Mount failed
    #[error("Mount failed: {0}")]
    Mount(String),

    /// Unmount failed
    #[error("Unmount failed: {0}")]
    Unmount(String),
}

impl FsError {
    /// Returns the errno reported to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::Path(_) | FsError::NotFound(_) => libc::ENOENT,
            FsError::PermissionDenied(_) => libc::EACCES,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::NotDirectory(_) => libc::ENOTDIR,
            FsError::IsDirectory(_) => libc::EISDIR,
            FsError::Mount(_) | FsError::Unmount(_) => libc::EIO,
            FsError::Fetch(err) => match err {
                FetchError::RemoteRejected { status: 404, .. } => libc::ENOENT,
                FetchError::RemoteRejected { status: 403, .. } => libc::EACCES,
                FetchError::RateLimited { .. } => libc::EAGAIN,
                FetchError::Timeout => libc::ETIMEDOUT,
                FetchError::AuthFailure(_) => libc::EPERM,
                _ => libc::EIO,
            },
        }
    }

    /// Returns true if the error means the resource is gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) => true,
            FsError::Fetch(err) => err.is_not_found(),
            _ => false,
        }
    }
}
