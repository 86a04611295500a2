//! Semantic remote operations.

use twfs_core::{Handle, MessageId, PostId};

use crate::model::{DirectMessage, Status, User, UserPage};
use crate::FetchError;

/// Semantic operations against the remote service.
///
/// Every call blocks the calling thread until the service answers or the
/// transport gives up. Implementations must be shareable across the
/// filesystem's callback threads.
pub trait TwitterApi: Send + Sync {
    /// Returns the authenticated account.
    fn verify_credentials(&self) -> Result<User, FetchError>;

    /// Most recent posts from followed accounts, newest first.
    fn home_timeline(&self, count: u32) -> Result<Vec<Status>, FetchError>;

    /// Most recent posts mentioning the authenticated account, newest first.
    fn mentions(&self, count: u32) -> Result<Vec<Status>, FetchError>;

    /// Most recent posts by `handle`, newest first.
    fn user_timeline(&self, handle: &Handle, count: u32) -> Result<Vec<Status>, FetchError>;

    /// A single post.
    fn show_status(&self, id: PostId) -> Result<Status, FetchError>;

    /// Publishes a post and returns it as stored.
    fn update_status(&self, text: &str) -> Result<Status, FetchError>;

    /// Deletes a post owned by the authenticated account.
    fn destroy_status(&self, id: PostId) -> Result<Status, FetchError>;

    /// One page of followers; `None` means the authenticated account.
    fn followers(&self, handle: Option<&Handle>, cursor: i64) -> Result<UserPage, FetchError>;

    /// One page of followed accounts; `None` means the authenticated account.
    fn friends(&self, handle: Option<&Handle>, cursor: i64) -> Result<UserPage, FetchError>;

    /// A single profile.
    fn show_user(&self, handle: &Handle) -> Result<User, FetchError>;

    /// Follows `handle`.
    fn follow(&self, handle: &Handle) -> Result<User, FetchError>;

    /// Unfollows `handle`.
    fn unfollow(&self, handle: &Handle) -> Result<User, FetchError>;

    /// Received direct messages, newest first.
    fn direct_messages(&self, count: u32) -> Result<Vec<DirectMessage>, FetchError>;

    /// Sent direct messages, newest first.
    fn sent_direct_messages(&self, count: u32) -> Result<Vec<DirectMessage>, FetchError>;

    /// A single direct message.
    fn show_direct_message(&self, id: MessageId) -> Result<DirectMessage, FetchError>;

    /// Sends a direct message.
    fn send_direct_message(&self, to: &Handle, text: &str) -> Result<DirectMessage, FetchError>;

    /// Deletes a direct message.
    fn destroy_direct_message(&self, id: MessageId) -> Result<DirectMessage, FetchError>;
}
