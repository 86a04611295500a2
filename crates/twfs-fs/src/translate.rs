//! Translation of filesystem intents into remote operations.
//!
//! The translator is stateless apart from the shared client, the account
//! handle and its limits. Listings come back in the order the service
//! returned them.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use twfs_core::{Handle, MessageId, PostId};
use twfs_net::Session;
use twfs_proto::{DirectMessage, FetchError, Status, TwitterApi, User, UserPage};

use crate::mount::MountConfig;
use crate::node::NodeKind;
use crate::path::{resolve, sections, Category, Locator, ResourceId, USER_ENTRIES};
use crate::tree::{Content, ContentSource, ListEntry};
use crate::FsError;

/// Limits and paging applied by the translator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Entries requested per page
    pub page_size: u32,
    /// Cursor pages fetched per follower/friend listing
    pub max_pages: usize,
    /// Status length limit in characters
    pub max_status_chars: usize,
    /// Direct message length limit in characters
    pub max_message_chars: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            page_size: twfs_core::DEFAULT_PAGE_SIZE,
            max_pages: 5,
            max_status_chars: twfs_core::MAX_STATUS_CHARS,
            max_message_chars: twfs_core::MAX_MESSAGE_CHARS,
        }
    }
}

impl From<&MountConfig> for Limits {
    fn from(config: &MountConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages,
            max_status_chars: config.max_status_chars,
            max_message_chars: config.max_message_chars,
        }
    }
}

/// Maps locators onto `TwitterApi` calls.
#[derive(Clone)]
pub struct Translator {
    api: Arc<dyn TwitterApi>,
    me: Handle,
    limits: Limits,
}

impl Translator {
    /// Creates a translator acting as the session's account.
    pub fn new(session: &Session, config: &MountConfig) -> Self {
        Self::with_api(
            Arc::clone(session.api()),
            session.handle().clone(),
            Limits::from(config),
        )
    }

    /// Creates a translator over an arbitrary client.
    pub fn with_api(api: Arc<dyn TwitterApi>, me: Handle, limits: Limits) -> Self {
        Self { api, me, limits }
    }

    /// Returns the account handle.
    pub fn me(&self) -> &Handle {
        &self.me
    }

    /// Returns the configured limits.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Lists a directory.
    pub fn list(&self, locator: &Locator) -> Result<Vec<ListEntry>, FsError> {
        if locator.kind() != NodeKind::Directory {
            return Err(FsError::NotDirectory(locator.canonical_path()));
        }
        debug!(path = %locator, "list");
        let count = self.limits.page_size;

        let entries = match locator.category {
            Category::Root => sections().iter().map(|s| ListEntry::directory(*s)).collect(),
            Category::Timeline => {
                let statuses = match &locator.owner {
                    Some(owner) => self.api.user_timeline(owner, count)?,
                    None => self.api.home_timeline(count)?,
                };
                status_entries(&statuses)
            }
            Category::Mentions => status_entries(&self.api.mentions(count)?),
            Category::ComposeTarget => Vec::new(),
            Category::Followers => {
                let users = self.users(|cursor| self.api.followers(locator.owner.as_ref(), cursor))?;
                profile_entries(&users)
            }
            Category::Friends => {
                let users = self.users(|cursor| self.api.friends(locator.owner.as_ref(), cursor))?;
                profile_entries(&users)
            }
            Category::User => match locator.target_handle() {
                Some(handle) => {
                    let user = self.api.show_user(&handle)?;
                    let profile = render_profile(&user);
                    USER_ENTRIES
                        .iter()
                        .map(|name| match *name {
                            "profile" => {
                                ListEntry::file(*name, profile.len() as u64, user.created())
                            }
                            _ => ListEntry::directory(*name),
                        })
                        .collect()
                }
                None => self
                    .users(|cursor| self.api.friends(None, cursor))?
                    .iter()
                    .map(|user| ListEntry::directory(user.screen_name.as_str()))
                    .collect(),
            },
            Category::DirectMessages => match &locator.owner {
                Some(owner) => self
                    .conversation(owner)?
                    .iter()
                    .map(|dm| ListEntry::file(dm.id.to_string(), dm.text.len() as u64, dm.created()))
                    .collect(),
                None => self.correspondents()?,
            },
            Category::SinglePost => {
                return Err(FsError::NotDirectory(locator.canonical_path()));
            }
        };
        Ok(entries)
    }

    /// Fetches a file's content.
    pub fn fetch(&self, locator: &Locator) -> Result<Content, FsError> {
        if locator.kind() != NodeKind::File {
            return Err(FsError::IsDirectory(locator.canonical_path()));
        }
        debug!(path = %locator, "fetch");

        match (&locator.category, &locator.resource_id) {
            (Category::SinglePost, Some(ResourceId::Numeric(id))) => {
                Ok(status_content(self.api.show_status(PostId(*id))?))
            }
            (Category::DirectMessages, Some(ResourceId::Numeric(id))) => {
                Ok(message_content(self.api.show_direct_message(MessageId(*id))?))
            }
            (Category::Followers | Category::Friends, Some(_)) => {
                let handle = self.target(locator)?;
                Ok(profile_content(&self.api.show_user(&handle)?))
            }
            (Category::User, _) => {
                let owner = locator.owner.as_ref().ok_or_else(|| not_found(locator))?;
                Ok(profile_content(&self.api.show_user(owner)?))
            }
            _ if locator.is_local() => Ok(Content::default()),
            _ => Err(not_found(locator)),
        }
    }

    /// Commits a flushed write buffer.
    ///
    /// Composes a status, sends a direct message to the conversation's
    /// correspondent, or follows the handle named by the file. Empty status
    /// and message payloads are a no-op and return `None`. Length limits are
    /// checked before any remote call.
    pub fn create(&self, locator: &Locator, payload: &[u8]) -> Result<Option<Content>, FsError> {
        match locator.category {
            Category::ComposeTarget if locator.resource_id.is_some() => {
                let Some(text) = payload_text(payload, self.limits.max_status_chars)? else {
                    return Ok(None);
                };
                let status = self.api.update_status(&text)?;
                info!(id = %status.id, chars = text.chars().count(), "posted status");
                Ok(Some(status_content(status)))
            }
            Category::DirectMessages if locator.is_local() => {
                let to = locator.owner.as_ref().ok_or_else(|| denied(locator))?;
                let Some(text) = payload_text(payload, self.limits.max_message_chars)? else {
                    return Ok(None);
                };
                let message = self.api.send_direct_message(to, &text)?;
                info!(id = %message.id, to = %to, "sent direct message");
                Ok(Some(message_content(message)))
            }
            Category::Friends if locator.owner.is_none() && locator.resource_id.is_some() => {
                let handle = self.target(locator)?;
                let user = self.api.follow(&handle)?;
                info!(handle = %handle, "followed");
                Ok(Some(profile_content(&user)))
            }
            _ => Err(denied(locator)),
        }
    }

    /// Deletes the remote resource behind a file. Local drafts have none.
    pub fn delete(&self, locator: &Locator) -> Result<(), FsError> {
        match (&locator.category, &locator.resource_id) {
            (Category::SinglePost, Some(ResourceId::Numeric(id))) => {
                self.api.destroy_status(PostId(*id))?;
                info!(id = *id, "deleted status");
                Ok(())
            }
            (Category::DirectMessages, Some(ResourceId::Numeric(id))) => {
                self.api.destroy_direct_message(MessageId(*id))?;
                info!(id = *id, "deleted direct message");
                Ok(())
            }
            (Category::Friends, Some(_)) if locator.owner.is_none() => {
                let handle = self.target(locator)?;
                self.api.unfollow(&handle)?;
                info!(handle = %handle, "unfollowed");
                Ok(())
            }
            _ if locator.is_local() => Ok(()),
            _ => Err(denied(locator)),
        }
    }

    /// Directories whose listings change once a create at `locator` commits.
    pub fn affected_by_create(&self, locator: &Locator) -> Vec<Locator> {
        match locator.category {
            Category::ComposeTarget => self.locators(&["/timeline".to_string(), self.own_timeline()]),
            Category::DirectMessages => match &locator.owner {
                Some(owner) => self.locators(&[
                    format!("/direct_messages/{}", owner),
                    "/direct_messages".to_string(),
                ]),
                None => Vec::new(),
            },
            Category::Friends => self.locators(&["/friends".to_string(), "/users".to_string()]),
            _ => Vec::new(),
        }
    }

    /// Directories whose listings change once a delete at `locator` commits.
    pub fn affected_by_delete(&self, locator: &Locator) -> Vec<Locator> {
        match locator.category {
            Category::SinglePost => self.locators(&["/timeline".to_string(), self.own_timeline()]),
            Category::DirectMessages => self.locators(&["/direct_messages".to_string()]),
            Category::Friends => self.locators(&["/friends".to_string(), "/users".to_string()]),
            _ => Vec::new(),
        }
    }

    fn own_timeline(&self) -> String {
        format!("/users/{}/timeline", self.me)
    }

    fn locators(&self, paths: &[String]) -> Vec<Locator> {
        paths.iter().filter_map(|p| resolve(p).ok()).collect()
    }

    fn target(&self, locator: &Locator) -> Result<Handle, FsError> {
        locator.target_handle().ok_or_else(|| not_found(locator))
    }

    /// Walks cursor pages until the service reports the end or the page
    /// budget runs out.
    fn users<F>(&self, mut page: F) -> Result<Vec<User>, FsError>
    where
        F: FnMut(i64) -> Result<UserPage, FetchError>,
    {
        let mut users = Vec::new();
        let mut cursor = -1;
        for _ in 0..self.limits.max_pages.max(1) {
            let result = page(cursor)?;
            users.extend(result.users);
            if result.next_cursor == 0 {
                break;
            }
            cursor = result.next_cursor;
        }
        Ok(users)
    }

    /// Received and sent messages, newest first.
    fn messages(&self) -> Result<Vec<DirectMessage>, FsError> {
        let count = self.limits.page_size;
        let mut messages = self.api.direct_messages(count)?;
        messages.extend(self.api.sent_direct_messages(count)?);
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.dedup_by_key(|m| m.id);
        Ok(messages)
    }

    fn conversation(&self, with: &Handle) -> Result<Vec<DirectMessage>, FsError> {
        let me = self.me.as_str();
        Ok(self
            .messages()?
            .into_iter()
            .filter(|m| with.same_account(m.correspondent(me)))
            .collect())
    }

    /// Correspondents ordered by most recent message.
    fn correspondents(&self) -> Result<Vec<ListEntry>, FsError> {
        let me = self.me.as_str();
        let mut entries: Vec<ListEntry> = Vec::new();
        for message in self.messages()? {
            let name = message.correspondent(me);
            if !entries.iter().any(|e| e.name.eq_ignore_ascii_case(name)) {
                entries.push(ListEntry::directory(name));
            }
        }
        Ok(entries)
    }
}

impl ContentSource for Translator {
    fn list(&self, locator: &Locator) -> Result<Vec<ListEntry>, FsError> {
        Translator::list(self, locator)
    }

    fn fetch(&self, locator: &Locator) -> Result<Content, FsError> {
        Translator::fetch(self, locator)
    }
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("me", &self.me)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

/// Validates a status or message payload.
///
/// Trailing line breaks are dropped so `echo text > file` posts `text`.
/// Blank payloads yield `None`.
fn payload_text(payload: &[u8], limit: usize) -> Result<Option<String>, FsError> {
    let text = std::str::from_utf8(payload)
        .map_err(|_| FsError::InvalidArgument("payload is not valid UTF-8".to_string()))?;
    let text = text.trim_end_matches(&['\n', '\r'][..]);
    if text.trim().is_empty() {
        return Ok(None);
    }
    let chars = text.chars().count();
    if chars > limit {
        return Err(FsError::InvalidArgument(format!(
            "{} characters exceeds the limit of {}",
            chars, limit
        )));
    }
    Ok(Some(text.to_string()))
}

fn status_entries(statuses: &[Status]) -> Vec<ListEntry> {
    statuses
        .iter()
        .map(|s| ListEntry::file(s.id.to_string(), s.text.len() as u64, s.created()))
        .collect()
}

fn profile_entries(users: &[User]) -> Vec<ListEntry> {
    users
        .iter()
        .map(|u| ListEntry::file(u.screen_name.as_str(), render_profile(u).len() as u64, u.created()))
        .collect()
}

fn status_content(status: Status) -> Content {
    Content {
        created: status.created(),
        remote_id: Some(status.id.to_string()),
        bytes: Bytes::from(status.text),
    }
}

fn message_content(message: DirectMessage) -> Content {
    Content {
        created: message.created(),
        remote_id: Some(message.id.to_string()),
        bytes: Bytes::from(message.text),
    }
}

fn profile_content(user: &User) -> Content {
    Content {
        created: user.created(),
        remote_id: Some(user.id.to_string()),
        bytes: Bytes::from(render_profile(user)),
    }
}

/// Renders a profile as `key: value` lines.
pub fn render_profile(user: &User) -> String {
    let mut lines = vec![
        format!("screen_name: {}", user.screen_name),
        format!("name: {}", user.name),
        format!("id: {}", user.id),
    ];
    let optional = [
        ("description", &user.description),
        ("location", &user.location),
        ("url", &user.url),
    ];
    for (key, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            lines.push(format!("{}: {}", key, value.replace('\n', " ")));
        }
    }
    lines.push(format!("followers: {}", user.followers_count));
    lines.push(format!("following: {}", user.friends_count));
    lines.push(format!("posts: {}", user.statuses_count));
    if !user.created_at.is_empty() {
        lines.push(format!("created_at: {}", user.created_at));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn not_found(locator: &Locator) -> FsError {
    FsError::NotFound(locator.canonical_path())
}

fn denied(locator: &Locator) -> FsError {
    FsError::PermissionDenied(locator.canonical_path())
}
