//! Mount configuration.

use std::path::PathBuf;
use std::time::Duration;

use fuser::MountOption;

/// Mount configuration.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Mount point path
    pub mount_point: PathBuf,
    /// Allow other users to access
    pub allow_other: bool,
    /// Read-only mount
    pub read_only: bool,
    /// Cache timeout in seconds
    pub cache_timeout_secs: u64,
    /// Entries requested per timeline or message page
    pub page_size: u32,
    /// Cursor pages fetched per follower/friend listing
    pub max_pages: usize,
    /// Status length limit in characters
    pub max_status_chars: usize,
    /// Direct message length limit in characters
    pub max_message_chars: usize,
    /// Threads serving blocking filesystem callbacks
    pub worker_threads: usize,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::new(),
            allow_other: false,
            read_only: false,
            cache_timeout_secs: 60,
            page_size: twfs_core::DEFAULT_PAGE_SIZE,
            max_pages: 5,
            max_status_chars: twfs_core::MAX_STATUS_CHARS,
            max_message_chars: twfs_core::MAX_MESSAGE_CHARS,
            worker_threads: 8,
        }
    }
}

impl MountConfig {
    /// Returns the cache TTL.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }

    /// Returns the FUSE mount options.
    pub fn mount_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName("twfs".to_string()),
            MountOption::Subtype("twfs".to_string()),
            MountOption::DefaultPermissions,
            MountOption::NoExec,
        ];
        options.push(if self.read_only {
            MountOption::RO
        } else {
            MountOption::RW
        });
        if self.allow_other {
            options.push(MountOption::AllowOther);
            options.push(MountOption::AutoUnmount);
        }
        options
    }
}
