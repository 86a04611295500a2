//! REST endpoint table.
//!
//! Paths are relative to the API base (`https://api.twitter.com/1.1`).

/// HTTP method of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read
    Get,
    /// Mutate
    Post,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// A REST endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Method
    pub method: Method,
    /// Path relative to the API base
    pub path: &'static str,
}

const fn get(path: &'static str) -> Endpoint {
    Endpoint {
        method: Method::Get,
        path,
    }
}

const fn post(path: &'static str) -> Endpoint {
    Endpoint {
        method: Method::Post,
        path,
    }
}

/// Authenticated account.
pub const VERIFY_CREDENTIALS: Endpoint = get("/account/verify_credentials.json");
/// Home timeline.
pub const HOME_TIMELINE: Endpoint = get("/statuses/home_timeline.json");
/// Mentions of the authenticated account.
pub const MENTIONS_TIMELINE: Endpoint = get("/statuses/mentions_timeline.json");
/// A user's own posts.
pub const USER_TIMELINE: Endpoint = get("/statuses/user_timeline.json");
/// Single status.
pub const SHOW_STATUS: Endpoint = get("/statuses/show.json");
/// Compose.
pub const UPDATE_STATUS: Endpoint = post("/statuses/update.json");
/// Delete a status; `{id}` is substituted.
pub const DESTROY_STATUS: Endpoint = post("/statuses/destroy/{id}.json");
/// Followers of an account.
pub const FOLLOWERS_LIST: Endpoint = get("/followers/list.json");
/// Accounts an account follows.
pub const FRIENDS_LIST: Endpoint = get("/friends/list.json");
/// Single profile.
pub const SHOW_USER: Endpoint = get("/users/show.json");
/// Follow.
pub const FRIENDSHIP_CREATE: Endpoint = post("/friendships/create.json");
/// Unfollow.
pub const FRIENDSHIP_DESTROY: Endpoint = post("/friendships/destroy.json");
/// Received direct messages.
pub const DIRECT_MESSAGES: Endpoint = get("/direct_messages.json");
/// Sent direct messages.
pub const DIRECT_MESSAGES_SENT: Endpoint = get("/direct_messages/sent.json");
/// Single direct message.
pub const DIRECT_MESSAGE_SHOW: Endpoint = get("/direct_messages/show.json");
/// Send a direct message.
pub const DIRECT_MESSAGE_NEW: Endpoint = post("/direct_messages/new.json");
/// Delete a direct message.
pub const DIRECT_MESSAGE_DESTROY: Endpoint = post("/direct_messages/destroy.json");

impl Endpoint {
    /// Returns the full URL under `base`, substituting `{id}` when given.
    pub fn url(&self, base: &str, id: Option<u64>) -> String {
        let base = base.trim_end_matches('/');
        match id {
            Some(id) => format!("{}{}", base, self.path.replace("{id}", &id.to_string())),
            None => format!("{}{}", base, self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_substitution() {
        assert_eq!(
            DESTROY_STATUS.url("https://api.example/1.1/", Some(42)),
            "https://api.example/1.1/statuses/destroy/42.json"
        );
        assert_eq!(
            HOME_TIMELINE.url("https://api.example/1.1", None),
            "https://api.example/1.1/statuses/home_timeline.json"
        );
    }
}
