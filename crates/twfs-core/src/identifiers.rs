//! Identifier types.
//!
//! Defines the remote identifiers surfaced as file and directory names:
//! - `PostId` - status identifier (numeric, assigned by the service)
//! - `MessageId` - direct message identifier (numeric)
//! - `UserId` - account identifier (numeric)
//! - `Handle` - account screen name

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a screen name.
pub const MAX_HANDLE_LEN: usize = 15;

/// Error parsing an identifier from a path segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// Not a decimal number
    #[error("Not a numeric identifier: {0:?}")]
    NotNumeric(String),

    /// Not a valid screen name
    #[error("Invalid handle: {0:?}")]
    InvalidHandle(String),
}

/// Macro to define a numeric identifier type with common implementations.
macro_rules! define_id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Creates a new identifier.
            pub const fn new(id: u64) -> Self {
                Self(id)
            }

            /// Returns the inner value.
            pub const fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                // `u64::from_str` accepts a leading '+', names must stay canonical
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(IdError::NotNumeric(s.to_string()));
                }
                s.parse()
                    .map(Self)
                    .map_err(|_| IdError::NotNumeric(s.to_string()))
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }
    };
}

define_id_type!(
    /// Status identifier.
    PostId
);

define_id_type!(
    /// Direct message identifier.
    MessageId
);

define_id_type!(
    /// Account identifier.
    UserId
);

/// Account screen name, without the leading `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(String);

impl Handle {
    /// Parses and validates a screen name.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let s = s.strip_prefix('@').unwrap_or(s);
        let valid = !s.is_empty()
            && s.len() <= MAX_HANDLE_LEN
            && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(IdError::InvalidHandle(s.to_string()))
        }
    }

    /// Returns the screen name.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Screen names compare case-insensitively on the service.
    pub fn same_account(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.strip_prefix('@').unwrap_or(other))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Handle {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
