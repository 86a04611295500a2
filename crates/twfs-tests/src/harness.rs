//! Mount harness.
//!
//! `TestMount` builds a session and dispatcher over a shared `MockApi` and
//! offers the file-level helpers a shell user would reach for: `cat`,
//! `echo >`, `ls`, `rm`.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use twfs_fs::{ops, Dispatcher, FsError, MountConfig, OpenMode};
use twfs_net::{Session, SessionError};

use crate::mock::MockApi;

/// A mounted account backed by a mock service.
pub struct TestMount {
    /// The remote service
    pub api: Arc<MockApi>,
    session: Session,
    dispatcher: Arc<Dispatcher>,
}

impl TestMount {
    /// Mounts with the default configuration.
    pub fn new(api: Arc<MockApi>) -> Result<Self, SessionError> {
        Self::with_config(api, MountConfig::default())
    }

    /// Mounts with a sub-second cache TTL.
    pub fn with_ttl(api: Arc<MockApi>, ttl: Duration) -> Result<Self, SessionError> {
        Self::build(api, MountConfig::default(), Some(ttl))
    }

    /// Mounts with an explicit configuration.
    pub fn with_config(api: Arc<MockApi>, config: MountConfig) -> Result<Self, SessionError> {
        Self::build(api, config, None)
    }

    /// Call counters are reset after the session is established so tests
    /// only see the traffic their own operations cause.
    fn build(
        api: Arc<MockApi>,
        config: MountConfig,
        ttl: Option<Duration>,
    ) -> Result<Self, SessionError> {
        let session = Session::establish(api.clone())?;
        let mut dispatcher = ops::dispatcher(&session, &config);
        if let Some(ttl) = ttl {
            dispatcher = dispatcher.with_cache_ttl(ttl);
        }
        let dispatcher = Arc::new(dispatcher);
        api.reset_calls();
        info!(account = %session.handle(), read_only = config.read_only, "Test mount ready");
        Ok(Self {
            api,
            session,
            dispatcher,
        })
    }

    /// Returns the session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Returns the dispatcher.
    pub fn fs(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Returns a shared handle to the dispatcher for use across threads.
    pub fn shared(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    /// Lists entry names in order.
    pub fn ls(&self, path: &str) -> Result<Vec<String>, FsError> {
        Ok(self
            .dispatcher
            .list(path)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    /// Opens for reading and returns the whole content.
    pub fn cat(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.dispatcher.open(path, OpenMode::READ)?;
        let mut content = Vec::new();
        loop {
            let chunk = self.dispatcher.read(path, content.len() as u64, 4096)?;
            if chunk.is_empty() {
                break;
            }
            content.extend_from_slice(&chunk);
        }
        Ok(content)
    }

    /// Returns the content as text.
    pub fn cat_string(&self, path: &str) -> Result<String, FsError> {
        Ok(String::from_utf8_lossy(&self.cat(path)?).into_owned())
    }

    /// Creates a file, writes `data`, and closes it. Returns the result of
    /// the close, which is where remote errors surface.
    pub fn echo(&self, path: &str, data: &str) -> Result<(), FsError> {
        self.dispatcher.create(path)?;
        self.dispatcher.write(path, 0, data.as_bytes())?;
        self.dispatcher.release(path)
    }

    /// Creates an empty file and closes it.
    pub fn touch(&self, path: &str) -> Result<(), FsError> {
        self.dispatcher.create(path)?;
        self.dispatcher.release(path)
    }

    /// Removes a file.
    pub fn rm(&self, path: &str) -> Result<(), FsError> {
        self.dispatcher.remove(path)
    }
}
