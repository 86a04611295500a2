//! Timestamps and remote date handling.
//!
//! Defines the Timestamp type (milliseconds since Unix epoch) and parsing of
//! the `created_at` format the remote service emits
//! (`Wed Oct 10 20:19:24 +0000 2018`).

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::DateTime;
use serde::{Deserialize, Serialize};

/// `strftime` layout of remote `created_at` fields.
pub const REMOTE_DATE_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// Timestamp in milliseconds since Unix epoch.
///
/// Used for:
/// - Post and message creation times reported by the remote service
/// - Node population and flush times
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a new timestamp from milliseconds since Unix epoch.
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the current time as a timestamp.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now()).unwrap_or_default()
    }

    /// Returns the milliseconds since Unix epoch.
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns the seconds since Unix epoch (truncated).
    pub const fn as_secs(&self) -> i64 {
        self.0 / 1000
    }

    /// Creates from a SystemTime.
    pub fn from_system_time(time: SystemTime) -> Option<Self> {
        time.duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| Self(d.as_millis() as i64))
    }

    /// Converts to a SystemTime.
    pub fn to_system_time(&self) -> SystemTime {
        if self.0 >= 0 {
            UNIX_EPOCH + Duration::from_millis(self.0 as u64)
        } else {
            UNIX_EPOCH - Duration::from_millis(self.0.unsigned_abs())
        }
    }

    /// Parses a remote `created_at` value.
    ///
    /// Returns `None` for anything that does not match
    /// [`REMOTE_DATE_FORMAT`]; callers fall back to the local clock.
    pub fn parse_remote(s: &str) -> Option<Self> {
        DateTime::parse_from_str(s, REMOTE_DATE_FORMAT)
            .ok()
            .map(|dt| Self(dt.timestamp_millis()))
    }

    /// Adds a duration to this timestamp.
    pub fn add(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as i64))
    }

    /// Returns the duration between two timestamps.
    pub fn duration_since(&self, earlier: &Timestamp) -> Option<Duration> {
        if self.0 >= earlier.0 {
            Some(Duration::from_millis((self.0 - earlier.0) as u64))
        } else {
            None
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp_millis(self.0) {
            Some(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%SZ")),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl From<i64> for Timestamp {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}
