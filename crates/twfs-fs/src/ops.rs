//! High-level filesystem operations.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tracing::info;
use twfs_net::Session;

use crate::dispatch::Dispatcher;
use crate::mount::MountConfig;
use crate::translate::Translator;
use crate::vfs::TwitterFilesystem;
use crate::FsError;

/// Builds the dispatcher for a session.
pub fn dispatcher(session: &Session, config: &MountConfig) -> Dispatcher {
    Dispatcher::new(Translator::new(session, config), config)
}

/// Mounts the session's account at `config.mount_point`. Blocks until the
/// filesystem is unmounted.
pub fn mount(session: &Session, config: MountConfig) -> Result<(), FsError> {
    let mount_point = config.mount_point.clone();
    if !mount_point.exists() {
        std::fs::create_dir_all(&mount_point)
            .map_err(|e| FsError::Mount(format!("Failed to create mount point: {}", e)))?;
    }

    let dispatcher = Arc::new(dispatcher(session, &config));
    let fs = TwitterFilesystem::new(dispatcher, config.worker_threads)?;
    info!(
        account = %session.handle(),
        mount_point = %mount_point.display(),
        read_only = config.read_only,
        ttl_secs = config.cache_timeout_secs,
        workers = config.worker_threads,
        "Mounting"
    );

    fuser::mount2(fs, &mount_point, &config.mount_options())
        .map_err(|e| FsError::Mount(format!("FUSE mount failed: {}", e)))?;

    info!(mount_point = %mount_point.display(), "Unmounted");
    Ok(())
}

/// Unmounts a filesystem.
pub fn unmount(mount_point: &Path) -> Result<(), FsError> {
    let output = Command::new("fusermount")
        .arg("-u")
        .arg(mount_point)
        .output()
        .map_err(|e| FsError::Unmount(format!("Failed to run fusermount: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FsError::Unmount(format!("fusermount failed: {}", stderr.trim())));
    }

    Ok(())
}
