//! twfs Core - shared types and primitives for the twfs filesystem.
//!
//! This crate provides:
//! - Identifier types (PostId, MessageId, UserId, Handle)
//! - Credentials with redacted, zeroized secrets
//! - OAuth 1.0a request signing
//! - Timestamps and remote date parsing

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod identifiers;
pub mod keys;
pub mod oauth;
pub mod time;

pub use identifiers::*;
pub use keys::*;
pub use oauth::OAuthSigner;
pub use time::*;

/// Default REST endpoint root.
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com/1.1";

/// Maximum status length in characters accepted by the service.
pub const MAX_STATUS_CHARS: usize = 280;

/// Maximum direct message length in characters accepted by the service.
pub const MAX_MESSAGE_CHARS: usize = 10_000;

/// Default number of entries requested per timeline page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;
