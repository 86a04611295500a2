//! Path resolution.
//!
//! Maps slash-separated paths onto typed locators. Resolution is pure: it
//! never consults the node tree or the network.

use std::fmt;

use thiserror::Error;
use twfs_core::Handle;

use crate::node::NodeKind;

/// Path resolution errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// Wrong arity or malformed segment
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// First segment names no known section
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
}

/// What a locator addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Mount root
    Root,
    /// A timeline (home or a user's)
    Timeline,
    /// Posts mentioning the account
    Mentions,
    /// Direct message correspondents, conversations and messages
    DirectMessages,
    /// User directories and profiles
    User,
    /// Follower lists and their profiles
    Followers,
    /// Friend lists and their profiles
    Friends,
    /// A single post
    SinglePost,
    /// The compose drop box and its drafts
    ComposeTarget,
}

/// Identifier carried by the final path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceId {
    /// Remote numeric identifier
    Numeric(u64),
    /// Handle or local name
    Name(String),
}

impl ResourceId {
    /// Returns the numeric identifier, if any.
    pub fn numeric(&self) -> Option<u64> {
        match self {
            ResourceId::Numeric(n) => Some(*n),
            ResourceId::Name(_) => None,
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceId::Numeric(n) => write!(f, "{}", n),
            ResourceId::Name(s) => f.write_str(s),
        }
    }
}

/// Permission class of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Listing and reading only
    ReadOnly,
    /// Creation, writing and removal permitted
    ReadWrite,
    /// Direct messages: creation and removal only inside a conversation
    Special,
}

/// Resolved, typed form of a path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    /// What the path addresses
    pub category: Category,
    /// Non-empty path segments, in order
    pub segments: Vec<String>,
    /// Account the location belongs to, when not the session's own
    pub owner: Option<Handle>,
    /// Identifier from the final segment
    pub resource_id: Option<ResourceId>,
}

/// Top-level sections of the namespace.
const SECTIONS: &[&str] = &[
    "timeline",
    "mentions",
    "compose",
    "followers",
    "friends",
    "users",
    "direct_messages",
];

/// Names listed under `/users/<handle>`.
pub const USER_ENTRIES: &[&str] = &["profile", "timeline", "followers", "friends"];

/// Returns the top-level section names in listing order.
pub fn sections() -> &'static [&'static str] {
    SECTIONS
}

/// Resolves a path into a locator.
pub fn resolve(path: &str) -> Result<Locator, PathError> {
    let segments: Vec<String> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    resolve_segments(segments)
}

fn resolve_segments(segments: Vec<String>) -> Result<Locator, PathError> {
    if segments.iter().any(|s| s == "." || s == "..") {
        return Err(invalid(&segments));
    }

    let Some(first) = segments.first() else {
        return Ok(Locator {
            category: Category::Root,
            segments,
            owner: None,
            resource_id: None,
        });
    };

    let rest: Vec<&str> = segments[1..].iter().map(String::as_str).collect();
    let (category, owner, resource_id) = match first.as_str() {
        "timeline" => match rest.as_slice() {
            [] => (Category::Timeline, None, None),
            [id] => (Category::SinglePost, None, Some(numeric(id, &segments)?)),
            _ => return Err(invalid(&segments)),
        },
        "mentions" => match rest.as_slice() {
            [] => (Category::Mentions, None, None),
            [id] => (Category::SinglePost, None, Some(numeric(id, &segments)?)),
            _ => return Err(invalid(&segments)),
        },
        "compose" => match rest.as_slice() {
            [] => (Category::ComposeTarget, None, None),
            [name] => (
                Category::ComposeTarget,
                None,
                Some(ResourceId::Name(name.to_string())),
            ),
            _ => return Err(invalid(&segments)),
        },
        "followers" | "friends" => {
            let category = list_category(first);
            match rest.as_slice() {
                [] => (category, None, None),
                [h] => (category, None, Some(handle_id(h, &segments)?)),
                _ => return Err(invalid(&segments)),
            }
        }
        "users" => match rest.as_slice() {
            [] => (Category::User, None, None),
            [h] => (Category::User, None, Some(handle_id(h, &segments)?)),
            [h, "profile"] => (
                Category::User,
                Some(handle(h, &segments)?),
                Some(ResourceId::Name("profile".to_string())),
            ),
            [h, "timeline"] => (Category::Timeline, Some(handle(h, &segments)?), None),
            [h, "timeline", id] => (
                Category::SinglePost,
                Some(handle(h, &segments)?),
                Some(numeric(id, &segments)?),
            ),
            [h, section @ ("followers" | "friends")] => {
                (list_category(section), Some(handle(h, &segments)?), None)
            }
            [h, section @ ("followers" | "friends"), other] => (
                list_category(section),
                Some(handle(h, &segments)?),
                Some(handle_id(other, &segments)?),
            ),
            _ => return Err(invalid(&segments)),
        },
        "direct_messages" => match rest.as_slice() {
            [] => (Category::DirectMessages, None, None),
            [h] => (Category::DirectMessages, Some(handle(h, &segments)?), None),
            [h, id] => {
                let resource = match id.parse::<u64>() {
                    Ok(n) if id.bytes().all(|b| b.is_ascii_digit()) => ResourceId::Numeric(n),
                    _ => ResourceId::Name(id.to_string()),
                };
                (
                    Category::DirectMessages,
                    Some(handle(h, &segments)?),
                    Some(resource),
                )
            }
            _ => return Err(invalid(&segments)),
        },
        other => return Err(PathError::UnknownCategory(other.to_string())),
    };

    Ok(Locator {
        category,
        segments,
        owner,
        resource_id,
    })
}

fn list_category(section: &str) -> Category {
    if section == "followers" {
        Category::Followers
    } else {
        Category::Friends
    }
}

fn invalid(segments: &[String]) -> PathError {
    PathError::InvalidPath(format!("/{}", segments.join("/")))
}

fn numeric(s: &str, segments: &[String]) -> Result<ResourceId, PathError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(segments));
    }
    s.parse()
        .map(ResourceId::Numeric)
        .map_err(|_| invalid(segments))
}

fn handle(s: &str, segments: &[String]) -> Result<Handle, PathError> {
    match Handle::parse(s) {
        Ok(h) if h.as_str() == s => Ok(h),
        _ => Err(invalid(segments)),
    }
}

fn handle_id(s: &str, segments: &[String]) -> Result<ResourceId, PathError> {
    handle(s, segments).map(|h| ResourceId::Name(h.as_str().to_string()))
}

impl Locator {
    /// Returns the root locator.
    pub fn root() -> Self {
        Self {
            category: Category::Root,
            segments: Vec::new(),
            owner: None,
            resource_id: None,
        }
    }

    /// Renders the locator back into a path.
    pub fn canonical_path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }

    /// Returns the final segment, or an empty string for the root.
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Returns the top-level section, or `None` for the root.
    pub fn section(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Returns true if this is the root.
    pub fn is_root(&self) -> bool {
        self.category == Category::Root
    }

    /// Returns whether the location is a directory or a file.
    pub fn kind(&self) -> NodeKind {
        let file = match self.category {
            Category::Root | Category::Timeline | Category::Mentions => false,
            Category::SinglePost => true,
            Category::User => self.owner.is_some(),
            Category::ComposeTarget
            | Category::Followers
            | Category::Friends
            | Category::DirectMessages => self.resource_id.is_some(),
        };
        if file {
            NodeKind::File
        } else {
            NodeKind::Directory
        }
    }

    /// Returns the enclosing locator, or `None` for the root.
    pub fn parent(&self) -> Option<Locator> {
        if self.is_root() {
            return None;
        }
        let segments = self.segments[..self.segments.len() - 1].to_vec();
        resolve_segments(segments).ok()
    }

    /// Resolves a direct child of this locator.
    pub fn child(&self, name: &str) -> Result<Locator, PathError> {
        if name.is_empty() || name.contains('/') {
            return Err(PathError::InvalidPath(format!(
                "{}/{}",
                self.canonical_path().trim_end_matches('/'),
                name
            )));
        }
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        resolve_segments(segments)
    }

    /// Account whose data this location shows: the owner, or the session's.
    pub fn account<'a>(&'a self, me: &'a Handle) -> &'a Handle {
        self.owner.as_ref().unwrap_or(me)
    }

    /// Returns true if the location belongs to the session's account.
    pub fn is_own(&self, me: &Handle) -> bool {
        self.owner
            .as_ref()
            .map_or(true, |owner| me.same_account(owner.as_str()))
    }

    /// Returns true if the node exists only locally until flushed.
    pub fn is_local(&self) -> bool {
        match self.category {
            Category::ComposeTarget => self.resource_id.is_some(),
            Category::DirectMessages => {
                matches!(self.resource_id, Some(ResourceId::Name(_)))
            }
            _ => false,
        }
    }

    /// Returns the permission class of the location.
    pub fn access(&self, me: &Handle) -> Access {
        match self.category {
            Category::ComposeTarget => Access::ReadWrite,
            Category::DirectMessages => Access::Special,
            Category::Timeline | Category::Friends if self.is_own(me) => Access::ReadWrite,
            Category::SinglePost if self.section() != Some("mentions") && self.is_own(me) => {
                Access::ReadWrite
            }
            _ => Access::ReadOnly,
        }
    }

    /// Returns true if a file may be created inside this directory.
    pub fn permits_create(&self, me: &Handle) -> bool {
        if self.kind() != NodeKind::Directory {
            return false;
        }
        match self.category {
            Category::ComposeTarget => true,
            Category::Friends => self.owner.is_none() && self.access(me) == Access::ReadWrite,
            Category::DirectMessages => self.owner.is_some(),
            _ => false,
        }
    }

    /// Returns true if this file accepts writes.
    pub fn permits_write(&self, me: &Handle) -> bool {
        if self.kind() != NodeKind::File {
            return false;
        }
        match self.category {
            Category::ComposeTarget => true,
            Category::DirectMessages => self.is_local(),
            Category::Friends => self.owner.is_none() && self.access(me) == Access::ReadWrite,
            _ => false,
        }
    }

    /// Returns true if this file may be removed.
    pub fn permits_remove(&self, me: &Handle) -> bool {
        if self.kind() != NodeKind::File {
            return false;
        }
        match self.category {
            Category::ComposeTarget => true,
            Category::SinglePost => self.access(me) == Access::ReadWrite,
            Category::Friends => self.owner.is_none() && self.access(me) == Access::ReadWrite,
            Category::DirectMessages => self.owner.is_some(),
            _ => false,
        }
    }

    /// Returns the handle named by the final segment, if any.
    pub fn target_handle(&self) -> Option<Handle> {
        match &self.resource_id {
            Some(ResourceId::Name(name)) => Handle::parse(name).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> Handle {
        Handle::parse("alice").unwrap()
    }

    #[test]
    fn test_root() {
        for path in ["/", "", "//"] {
            let loc = resolve(path).unwrap();
            assert_eq!(loc.category, Category::Root);
            assert_eq!(loc.kind(), NodeKind::Directory);
            assert_eq!(loc.canonical_path(), "/");
        }
    }

    #[test]
    fn test_timeline_post() {
        let loc = resolve("/timeline/12345").unwrap();
        assert_eq!(loc.category, Category::SinglePost);
        assert_eq!(loc.resource_id, Some(ResourceId::Numeric(12345)));
        assert_eq!(loc.kind(), NodeKind::File);
        assert_eq!(loc.parent().unwrap().category, Category::Timeline);
    }

    #[test]
    fn test_empty_segments_stripped() {
        let loc = resolve("//timeline///12345/").unwrap();
        assert_eq!(loc.segments, vec!["timeline", "12345"]);
        assert_eq!(loc.canonical_path(), "/timeline/12345");
    }

    #[test]
    fn test_non_numeric_post_rejected() {
        assert!(matches!(
            resolve("/timeline/abc"),
            Err(PathError::InvalidPath(_))
        ));
        assert!(matches!(
            resolve("/mentions/-5"),
            Err(PathError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_wrong_arity_rejected() {
        assert!(matches!(
            resolve("/timeline/1/2"),
            Err(PathError::InvalidPath(_))
        ));
        assert!(matches!(
            resolve("/users/bob/timeline/1/extra"),
            Err(PathError::InvalidPath(_))
        ));
        assert!(matches!(
            resolve("/users/bob/photos"),
            Err(PathError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_unknown_category() {
        assert_eq!(
            resolve("/nonexistent"),
            Err(PathError::UnknownCategory("nonexistent".to_string()))
        );
    }

    #[test]
    fn test_dot_segments_rejected() {
        assert!(resolve("/timeline/..").is_err());
        assert!(resolve("/compose/.").is_err());
    }

    #[test]
    fn test_user_tree() {
        let dir = resolve("/users/bob").unwrap();
        assert_eq!(dir.category, Category::User);
        assert_eq!(dir.kind(), NodeKind::Directory);
        assert_eq!(dir.resource_id, Some(ResourceId::Name("bob".into())));

        let profile = resolve("/users/bob/profile").unwrap();
        assert_eq!(profile.category, Category::User);
        assert_eq!(profile.kind(), NodeKind::File);
        assert_eq!(profile.owner.as_ref().unwrap().as_str(), "bob");

        let timeline = resolve("/users/bob/timeline").unwrap();
        assert_eq!(timeline.category, Category::Timeline);
        assert_eq!(timeline.kind(), NodeKind::Directory);

        let post = resolve("/users/bob/timeline/9").unwrap();
        assert_eq!(post.category, Category::SinglePost);
        assert_eq!(post.kind(), NodeKind::File);

        let followers = resolve("/users/bob/followers").unwrap();
        assert_eq!(followers.category, Category::Followers);
        assert_eq!(followers.kind(), NodeKind::Directory);

        let friend = resolve("/users/bob/friends/carol").unwrap();
        assert_eq!(friend.category, Category::Friends);
        assert_eq!(friend.kind(), NodeKind::File);
    }

    #[test]
    fn test_invalid_handle_rejected() {
        assert!(resolve("/users/not-a-handle").is_err());
        assert!(resolve("/friends/@bob").is_err());
        assert!(resolve("/direct_messages/waytoolonghandlename").is_err());
    }

    #[test]
    fn test_direct_messages() {
        let conv = resolve("/direct_messages/bob").unwrap();
        assert_eq!(conv.kind(), NodeKind::Directory);
        assert_eq!(conv.owner.as_ref().unwrap().as_str(), "bob");

        let stored = resolve("/direct_messages/bob/42").unwrap();
        assert_eq!(stored.resource_id, Some(ResourceId::Numeric(42)));
        assert!(!stored.is_local());

        let draft = resolve("/direct_messages/bob/hello").unwrap();
        assert_eq!(draft.resource_id, Some(ResourceId::Name("hello".into())));
        assert_eq!(draft.kind(), NodeKind::File);
        assert!(draft.is_local());
    }

    #[test]
    fn test_canonical_round_trip() {
        for path in [
            "/",
            "/timeline",
            "/timeline/1001",
            "/mentions/7",
            "/compose",
            "/compose/draft.txt",
            "/followers/bob",
            "/friends",
            "/users",
            "/users/bob",
            "/users/bob/profile",
            "/users/bob/timeline/3",
            "/users/bob/followers/carol",
            "/direct_messages",
            "/direct_messages/bob/55",
        ] {
            let loc = resolve(path).unwrap();
            assert_eq!(resolve(&loc.canonical_path()).unwrap(), loc, "{}", path);
        }
    }

    #[test]
    fn test_resolution_is_pure() {
        assert_eq!(resolve("/timeline/5"), resolve("/timeline/5"));
    }

    #[test]
    fn test_parent_and_child() {
        let timeline = resolve("/users/bob/timeline").unwrap();
        let post = timeline.child("12").unwrap();
        assert_eq!(post.canonical_path(), "/users/bob/timeline/12");
        assert_eq!(post.parent().unwrap(), timeline);
        assert!(timeline.child("x/y").is_err());
        assert!(Locator::root().parent().is_none());
    }

    #[test]
    fn test_access_classes() {
        let me = me();
        assert_eq!(resolve("/").unwrap().access(&me), Access::ReadOnly);
        assert_eq!(resolve("/mentions").unwrap().access(&me), Access::ReadOnly);
        assert_eq!(resolve("/timeline").unwrap().access(&me), Access::ReadWrite);
        assert_eq!(resolve("/compose").unwrap().access(&me), Access::ReadWrite);
        assert_eq!(
            resolve("/direct_messages").unwrap().access(&me),
            Access::Special
        );
        assert_eq!(
            resolve("/users/bob/timeline").unwrap().access(&me),
            Access::ReadOnly
        );
        assert_eq!(
            resolve("/users/alice/timeline/1").unwrap().access(&me),
            Access::ReadWrite
        );
        assert_eq!(resolve("/mentions/1").unwrap().access(&me), Access::ReadOnly);
    }

    #[test]
    fn test_permissions() {
        let me = me();
        assert!(resolve("/compose").unwrap().permits_create(&me));
        assert!(resolve("/friends").unwrap().permits_create(&me));
        assert!(!resolve("/followers").unwrap().permits_create(&me));
        assert!(!resolve("/timeline").unwrap().permits_create(&me));
        assert!(!resolve("/direct_messages").unwrap().permits_create(&me));
        assert!(resolve("/direct_messages/bob").unwrap().permits_create(&me));
        assert!(!resolve("/users/bob/friends").unwrap().permits_create(&me));

        assert!(resolve("/timeline/1").unwrap().permits_remove(&me));
        assert!(!resolve("/mentions/1").unwrap().permits_remove(&me));
        assert!(!resolve("/users/bob/timeline/1").unwrap().permits_remove(&me));
        assert!(resolve("/friends/bob").unwrap().permits_remove(&me));
        assert!(!resolve("/followers/bob").unwrap().permits_remove(&me));
        assert!(resolve("/direct_messages/bob/5").unwrap().permits_remove(&me));

        assert!(resolve("/compose/x").unwrap().permits_write(&me));
        assert!(resolve("/direct_messages/bob/draft").unwrap().permits_write(&me));
        assert!(!resolve("/direct_messages/bob/5").unwrap().permits_write(&me));
        assert!(!resolve("/timeline/1").unwrap().permits_write(&me));
        assert!(!resolve("/users/bob/profile").unwrap().permits_write(&me));
    }
}
