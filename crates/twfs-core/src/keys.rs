//! Credential types.
//!
//! The consumer (application) key pair and the access token pair used to
//! sign every request. Secrets are redacted from debug output and zeroized
//! on drop.

use std::fmt;

use zeroize::Zeroize;

/// A secret string.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Exposes the secret for signing.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns true if the secret is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// OAuth 1.0a credentials for one authenticated account.
///
/// Assembled by the CLI from the config file; the filesystem never parses or
/// persists them.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Application key
    pub consumer_key: String,
    /// Application secret
    pub consumer_secret: Secret,
    /// Access token
    pub token: String,
    /// Access token secret
    pub token_secret: Secret,
}

impl Credentials {
    /// Creates a credential set.
    pub fn new(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        token: impl Into<String>,
        token_secret: impl Into<String>,
    ) -> Self {
        Self {
            consumer_key: consumer_key.into(),
            consumer_secret: Secret::new(consumer_secret),
            token: token.into(),
            token_secret: Secret::new(token_secret),
        }
    }

    /// Returns the name of the first missing field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.consumer_key.is_empty() {
            Some("consumer_key")
        } else if self.consumer_secret.is_empty() {
            Some("consumer_secret")
        } else if self.token.is_empty() {
            Some("token")
        } else if self.token_secret.is_empty() {
            Some("token_secret")
        } else {
            None
        }
    }
}
