//! Mount-time session.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use twfs_core::{Handle, IdError};
use twfs_proto::{FetchError, TwitterApi, User};

/// Errors establishing a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Credentials were rejected
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The service could not be reached or answered unexpectedly
    #[error("Could not verify credentials: {0}")]
    Fetch(#[from] FetchError),

    /// The service reported an unusable screen name
    #[error("Invalid account handle: {0}")]
    Handle(#[from] IdError),
}

/// Process-wide session state: the signed client and the account it acts
/// as. Built once at mount time and read-only afterwards.
#[derive(Clone)]
pub struct Session {
    api: Arc<dyn TwitterApi>,
    account: User,
    handle: Handle,
}

impl Session {
    /// Verifies the credentials behind `api` and captures the account.
    ///
    /// Authentication failure here is fatal to the mount.
    pub fn establish(api: Arc<dyn TwitterApi>) -> Result<Self, SessionError> {
        let account = api.verify_credentials().map_err(|e| match e {
            FetchError::AuthFailure(reason) => SessionError::Auth(reason),
            other => SessionError::Fetch(other),
        })?;
        let handle = Handle::parse(&account.screen_name)?;

        info!(account = %handle, id = %account.id, "Session established");
        Ok(Self {
            api,
            account,
            handle,
        })
    }

    /// Returns the client.
    pub fn api(&self) -> &Arc<dyn TwitterApi> {
        &self.api
    }

    /// Returns the authenticated account's profile.
    pub fn account(&self) -> &User {
        &self.account
    }

    /// Returns the authenticated account's handle.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("account", &self.handle)
            .finish_non_exhaustive()
    }
}
