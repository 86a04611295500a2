//! In-memory remote service.
//!
//! `MockApi` implements `TwitterApi` over plain collections, counts every
//! call per operation, and can inject latency or failures.

use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;
use twfs_core::{Handle, MessageId, PostId, UserId};
use twfs_proto::{DirectMessage, FetchError, Status, TwitterApi, User, UserPage};

const CREATED_AT: &str = "Wed Oct 10 20:19:24 +0000 2018";

/// Remote operations, for call accounting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// verify_credentials
    VerifyCredentials,
    /// home_timeline
    HomeTimeline,
    /// mentions
    Mentions,
    /// user_timeline
    UserTimeline,
    /// show_status
    ShowStatus,
    /// update_status
    UpdateStatus,
    /// destroy_status
    DestroyStatus,
    /// followers
    Followers,
    /// friends
    Friends,
    /// show_user
    ShowUser,
    /// follow
    Follow,
    /// unfollow
    Unfollow,
    /// direct_messages
    DirectMessages,
    /// sent_direct_messages
    SentDirectMessages,
    /// show_direct_message
    ShowDirectMessage,
    /// send_direct_message
    SendDirectMessage,
    /// destroy_direct_message
    DestroyDirectMessage,
}

impl Op {
    /// Returns true for operations that change remote state.
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            Op::UpdateStatus
                | Op::DestroyStatus
                | Op::Follow
                | Op::Unfollow
                | Op::SendDirectMessage
                | Op::DestroyDirectMessage
        )
    }
}

#[derive(Debug)]
struct State {
    me: String,
    next_id: u64,
    /// Every stored status, newest first.
    statuses: Vec<Status>,
    /// Status ids mentioning the account, newest first.
    mentions: Vec<PostId>,
    users: HashMap<String, User>,
    /// Follower and friend lists by lowercase handle.
    followers: HashMap<String, Vec<String>>,
    friends: HashMap<String, Vec<String>>,
    /// Direct messages, newest first.
    messages: Vec<DirectMessage>,
}

/// Scripted `TwitterApi`.
#[derive(Debug)]
pub struct MockApi {
    state: Mutex<State>,
    calls: Mutex<HashMap<Op, usize>>,
    failures: Mutex<HashMap<Op, FetchError>>,
    latency: Mutex<Option<Duration>>,
    user_page_size: usize,
}

fn key(handle: &str) -> String {
    handle.to_ascii_lowercase()
}

fn not_found(what: &str) -> FetchError {
    FetchError::RemoteRejected {
        status: 404,
        reason: format!("{} not found (code 34)", what),
    }
}

fn forbidden(reason: &str) -> FetchError {
    FetchError::RemoteRejected {
        status: 403,
        reason: reason.to_string(),
    }
}

impl MockApi {
    /// Creates a service whose authenticated account is `me`.
    pub fn new(me: &str) -> Self {
        let mut users = HashMap::new();
        users.insert(key(me), user(1, me));
        Self {
            state: Mutex::new(State {
                me: me.to_string(),
                next_id: 1000,
                statuses: Vec::new(),
                mentions: Vec::new(),
                users,
                followers: HashMap::new(),
                friends: HashMap::new(),
                messages: Vec::new(),
            }),
            calls: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            user_page_size: 20,
        }
    }

    /// Sets how many users each cursor page holds.
    pub fn with_user_page_size(mut self, size: usize) -> Self {
        self.user_page_size = size.max(1);
        self
    }

    /// Returns the account handle.
    pub fn me(&self) -> String {
        self.state.lock().me.clone()
    }

    /// Registers an account.
    pub fn add_user(&self, screen_name: &str) -> User {
        let mut state = self.state.lock();
        let id = state.allocate();
        let user = user(id, screen_name);
        state.users.insert(key(screen_name), user.clone());
        user
    }

    /// Posts a status as `author`, returning its id.
    pub fn add_post(&self, author: &str, text: &str) -> PostId {
        let mut state = self.state.lock();
        let id = PostId(state.allocate());
        let author = state.user_or_new(author);
        state.statuses.insert(0, status(id, text, Some(author)));
        id
    }

    /// Posts a status by `author` that mentions the account.
    pub fn add_mention(&self, author: &str, text: &str) -> PostId {
        let id = self.add_post(author, text);
        self.state.lock().mentions.insert(0, id);
        id
    }

    /// Makes `follower` follow `target`.
    pub fn add_follow(&self, follower: &str, target: &str) {
        let mut state = self.state.lock();
        state.user_or_new(follower);
        state.user_or_new(target);
        state
            .friends
            .entry(key(follower))
            .or_default()
            .push(target.to_string());
        state
            .followers
            .entry(key(target))
            .or_default()
            .push(follower.to_string());
    }

    /// Stores a direct message, returning its id.
    pub fn add_message(&self, from: &str, to: &str, text: &str) -> MessageId {
        let mut state = self.state.lock();
        let id = MessageId(state.allocate());
        state.messages.insert(
            0,
            DirectMessage {
                id,
                text: text.to_string(),
                created_at: CREATED_AT.to_string(),
                sender_screen_name: from.to_string(),
                recipient_screen_name: to.to_string(),
            },
        );
        id
    }

    /// Deletes a status behind the mount's back.
    pub fn delete_post(&self, id: PostId) {
        let mut state = self.state.lock();
        state.statuses.retain(|s| s.id != id);
        state.mentions.retain(|m| *m != id);
    }

    /// Returns the text of a stored status.
    pub fn status_text(&self, id: PostId) -> Option<String> {
        self.state
            .lock()
            .statuses
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.text.clone())
    }

    /// Returns the newest status by the account.
    pub fn latest_own_status(&self) -> Option<Status> {
        let state = self.state.lock();
        let me = state.me.clone();
        state.statuses.iter().find(|s| s.author() == Some(me.as_str())).cloned()
    }

    /// Returns true if `follower` follows `target`.
    pub fn follows(&self, follower: &str, target: &str) -> bool {
        self.state
            .lock()
            .friends
            .get(&key(follower))
            .map_or(false, |list| list.iter().any(|h| h.eq_ignore_ascii_case(target)))
    }

    /// Returns all stored direct messages, newest first.
    pub fn messages(&self) -> Vec<DirectMessage> {
        self.state.lock().messages.clone()
    }

    /// Returns how often `op` was called.
    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Returns the number of calls across all operations.
    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Returns the number of state-changing calls.
    pub fn mutation_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, n)| n)
            .sum()
    }

    /// Zeroes every call counter.
    pub fn reset_calls(&self) {
        self.calls.lock().clear();
    }

    /// Makes every call sleep first.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Makes `op` fail with `err` until cleared.
    pub fn fail(&self, op: Op, err: FetchError) {
        self.failures.lock().insert(op, err);
    }

    /// Stops injecting failures for `op`.
    pub fn clear_failure(&self, op: Op) {
        self.failures.lock().remove(&op);
    }

    fn enter(&self, op: Op) -> Result<(), FetchError> {
        *self.calls.lock().entry(op).or_default() += 1;
        trace!(op = ?op, "mock call");
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            thread::sleep(latency);
        }
        match self.failures.lock().get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn page(&self, list: Vec<String>, cursor: i64) -> UserPage {
        let state = self.state.lock();
        let start = if cursor < 0 { 0 } else { cursor as usize };
        let end = (start + self.user_page_size).min(list.len());
        let users = list
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .filter_map(|h| state.users.get(&key(h)).cloned())
            .collect();
        UserPage {
            users,
            next_cursor: if end < list.len() { end as i64 } else { 0 },
        }
    }

    fn relation(
        &self,
        lists: impl Fn(&State) -> &HashMap<String, Vec<String>>,
        handle: Option<&Handle>,
    ) -> Result<Vec<String>, FetchError> {
        let state = self.state.lock();
        let account = handle.map_or_else(|| state.me.clone(), |h| h.as_str().to_string());
        if !state.users.contains_key(&key(&account)) {
            return Err(not_found("User"));
        }
        Ok(lists(&state).get(&key(&account)).cloned().unwrap_or_default())
    }
}

impl State {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn user_or_new(&mut self, screen_name: &str) -> User {
        if let Some(user) = self.users.get(&key(screen_name)) {
            return user.clone();
        }
        let id = self.allocate();
        let user = user(id, screen_name);
        self.users.insert(key(screen_name), user.clone());
        user
    }

    fn timeline_of(&self, handle: &str) -> Vec<Status> {
        self.statuses
            .iter()
            .filter(|s| s.author().map_or(false, |a| a.eq_ignore_ascii_case(handle)))
            .cloned()
            .collect()
    }
}

fn user(id: u64, screen_name: &str) -> User {
    User {
        id: UserId(id),
        screen_name: screen_name.to_string(),
        name: format!("{} (test)", screen_name),
        description: Some(format!("I am {}", screen_name)),
        location: None,
        url: None,
        followers_count: 0,
        friends_count: 0,
        statuses_count: 0,
        created_at: CREATED_AT.to_string(),
    }
}

fn status(id: PostId, text: &str, author: Option<User>) -> Status {
    Status {
        id,
        text: text.to_string(),
        created_at: CREATED_AT.to_string(),
        user: author,
    }
}

impl TwitterApi for MockApi {
    fn verify_credentials(&self) -> Result<User, FetchError> {
        self.enter(Op::VerifyCredentials)?;
        let state = self.state.lock();
        state
            .users
            .get(&key(&state.me))
            .cloned()
            .ok_or_else(|| FetchError::AuthFailure("unknown account".to_string()))
    }

    fn home_timeline(&self, count: u32) -> Result<Vec<Status>, FetchError> {
        self.enter(Op::HomeTimeline)?;
        let state = self.state.lock();
        let me = state.me.clone();
        let friends = state.friends.get(&key(&me)).cloned().unwrap_or_default();
        Ok(state
            .statuses
            .iter()
            .filter(|s| {
                s.author().map_or(false, |a| {
                    a.eq_ignore_ascii_case(&me) || friends.iter().any(|f| f.eq_ignore_ascii_case(a))
                })
            })
            .take(count as usize)
            .cloned()
            .collect())
    }

    fn mentions(&self, count: u32) -> Result<Vec<Status>, FetchError> {
        self.enter(Op::Mentions)?;
        let state = self.state.lock();
        Ok(state
            .mentions
            .iter()
            .filter_map(|id| state.statuses.iter().find(|s| s.id == *id))
            .take(count as usize)
            .cloned()
            .collect())
    }

    fn user_timeline(&self, handle: &Handle, count: u32) -> Result<Vec<Status>, FetchError> {
        self.enter(Op::UserTimeline)?;
        let state = self.state.lock();
        if !state.users.contains_key(&key(handle.as_str())) {
            return Err(not_found("User"));
        }
        let mut timeline = state.timeline_of(handle.as_str());
        timeline.truncate(count as usize);
        Ok(timeline)
    }

    fn show_status(&self, id: PostId) -> Result<Status, FetchError> {
        self.enter(Op::ShowStatus)?;
        self.state
            .lock()
            .statuses
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| not_found("Status"))
    }

    fn update_status(&self, text: &str) -> Result<Status, FetchError> {
        self.enter(Op::UpdateStatus)?;
        let mut state = self.state.lock();
        let id = PostId(state.allocate());
        let me = state.me.clone();
        let author = state.user_or_new(&me);
        let status = status(id, text, Some(author));
        state.statuses.insert(0, status.clone());
        Ok(status)
    }

    fn destroy_status(&self, id: PostId) -> Result<Status, FetchError> {
        self.enter(Op::DestroyStatus)?;
        let mut state = self.state.lock();
        let index = state
            .statuses
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| not_found("Status"))?;
        let me = state.me.clone();
        if !state.statuses[index]
            .author()
            .map_or(false, |a| a.eq_ignore_ascii_case(&me))
        {
            return Err(forbidden("You may not delete another user's status. (code 183)"));
        }
        state.mentions.retain(|m| *m != id);
        Ok(state.statuses.remove(index))
    }

    fn followers(&self, handle: Option<&Handle>, cursor: i64) -> Result<UserPage, FetchError> {
        self.enter(Op::Followers)?;
        let list = self.relation(|s| &s.followers, handle)?;
        Ok(self.page(list, cursor))
    }

    fn friends(&self, handle: Option<&Handle>, cursor: i64) -> Result<UserPage, FetchError> {
        self.enter(Op::Friends)?;
        let list = self.relation(|s| &s.friends, handle)?;
        Ok(self.page(list, cursor))
    }

    fn show_user(&self, handle: &Handle) -> Result<User, FetchError> {
        self.enter(Op::ShowUser)?;
        self.state
            .lock()
            .users
            .get(&key(handle.as_str()))
            .cloned()
            .ok_or_else(|| not_found("User"))
    }

    fn follow(&self, handle: &Handle) -> Result<User, FetchError> {
        self.enter(Op::Follow)?;
        let target = {
            let state = self.state.lock();
            state
                .users
                .get(&key(handle.as_str()))
                .cloned()
                .ok_or_else(|| not_found("User"))?
        };
        let me = self.me();
        if !self.follows(&me, &target.screen_name) {
            self.add_follow(&me, &target.screen_name);
        }
        Ok(target)
    }

    fn unfollow(&self, handle: &Handle) -> Result<User, FetchError> {
        self.enter(Op::Unfollow)?;
        let mut state = self.state.lock();
        let target = state
            .users
            .get(&key(handle.as_str()))
            .cloned()
            .ok_or_else(|| not_found("User"))?;
        let me = key(&state.me);
        if let Some(list) = state.friends.get_mut(&me) {
            list.retain(|h| !h.eq_ignore_ascii_case(handle.as_str()));
        }
        let me_name = state.me.clone();
        if let Some(list) = state.followers.get_mut(&key(handle.as_str())) {
            list.retain(|h| !h.eq_ignore_ascii_case(&me_name));
        }
        Ok(target)
    }

    fn direct_messages(&self, count: u32) -> Result<Vec<DirectMessage>, FetchError> {
        self.enter(Op::DirectMessages)?;
        let state = self.state.lock();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.recipient_screen_name.eq_ignore_ascii_case(&state.me))
            .take(count as usize)
            .cloned()
            .collect())
    }

    fn sent_direct_messages(&self, count: u32) -> Result<Vec<DirectMessage>, FetchError> {
        self.enter(Op::SentDirectMessages)?;
        let state = self.state.lock();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.sender_screen_name.eq_ignore_ascii_case(&state.me))
            .take(count as usize)
            .cloned()
            .collect())
    }

    fn show_direct_message(&self, id: MessageId) -> Result<DirectMessage, FetchError> {
        self.enter(Op::ShowDirectMessage)?;
        self.state
            .lock()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| not_found("Message"))
    }

    fn send_direct_message(&self, to: &Handle, text: &str) -> Result<DirectMessage, FetchError> {
        self.enter(Op::SendDirectMessage)?;
        if !self.state.lock().users.contains_key(&key(to.as_str())) {
            return Err(not_found("User"));
        }
        let me = self.me();
        let id = self.add_message(&me, to.as_str(), text);
        self.show_stored_message(id)
    }

    fn destroy_direct_message(&self, id: MessageId) -> Result<DirectMessage, FetchError> {
        self.enter(Op::DestroyDirectMessage)?;
        let mut state = self.state.lock();
        let index = state
            .messages
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| not_found("Message"))?;
        Ok(state.messages.remove(index))
    }
}

impl MockApi {
    fn show_stored_message(&self, id: MessageId) -> Result<DirectMessage, FetchError> {
        self.state
            .lock()
            .messages
            .iter()
            .find(|m| m.id == id)
            .cloned()
            .ok_or_else(|| not_found("Message"))
    }
}
