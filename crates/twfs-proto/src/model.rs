//! JSON models of remote resources.
//!
//! Only the fields the filesystem surfaces are decoded; unknown fields are
//! ignored.

use serde::{Deserialize, Serialize};
use twfs_core::{MessageId, PostId, Timestamp, UserId};

/// A status (post).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Status identifier
    pub id: PostId,
    /// Stored text (`full_text` in extended mode)
    #[serde(alias = "full_text")]
    pub text: String,
    /// Creation time in the remote date format
    #[serde(default)]
    pub created_at: String,
    /// Author
    #[serde(default)]
    pub user: Option<User>,
}

impl Status {
    /// Returns the parsed creation time.
    pub fn created(&self) -> Option<Timestamp> {
        Timestamp::parse_remote(&self.created_at)
    }

    /// Returns the author's screen name.
    pub fn author(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.screen_name.as_str())
    }
}

/// An account profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Account identifier
    pub id: UserId,
    /// Screen name
    pub screen_name: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Bio
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form location
    #[serde(default)]
    pub location: Option<String>,
    /// Profile URL
    #[serde(default)]
    pub url: Option<String>,
    /// Follower count
    #[serde(default)]
    pub followers_count: u64,
    /// Following count
    #[serde(default)]
    pub friends_count: u64,
    /// Status count
    #[serde(default)]
    pub statuses_count: u64,
    /// Account creation time in the remote date format
    #[serde(default)]
    pub created_at: String,
}

impl User {
    /// Returns the parsed creation time.
    pub fn created(&self) -> Option<Timestamp> {
        Timestamp::parse_remote(&self.created_at)
    }
}

/// A direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    /// Message identifier
    pub id: MessageId,
    /// Message text
    pub text: String,
    /// Creation time in the remote date format
    #[serde(default)]
    pub created_at: String,
    /// Sender screen name
    pub sender_screen_name: String,
    /// Recipient screen name
    pub recipient_screen_name: String,
}

impl DirectMessage {
    /// Returns the parsed creation time.
    pub fn created(&self) -> Option<Timestamp> {
        Timestamp::parse_remote(&self.created_at)
    }

    /// Returns the other party of the conversation as seen by `me`.
    pub fn correspondent(&self, me: &str) -> &str {
        if self.sender_screen_name.eq_ignore_ascii_case(me) {
            &self.recipient_screen_name
        } else {
            &self.sender_screen_name
        }
    }
}

/// One page of a cursored user listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPage {
    /// Users on this page
    #[serde(default)]
    pub users: Vec<User>,
    /// Cursor of the next page, zero when exhausted
    #[serde(default)]
    pub next_cursor: i64,
}

/// Error body returned with non-success responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    /// Reported errors
    #[serde(default)]
    pub errors: Vec<ApiErrorEntry>,
}

/// One reported error.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorEntry {
    /// Service error code
    #[serde(default)]
    pub code: i64,
    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

impl ApiErrorBody {
    /// Joins the reported messages, if any.
    pub fn reason(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{} (code {})", e.message, e.code))
            .collect();
        Some(parts.join("; "))
    }
}
