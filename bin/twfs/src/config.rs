//! Configuration file loading.
//!
//! The file is TOML with three optional sections:
//!
//! ```toml
//! [credentials]
//! consumer_key = "..."
//! consumer_secret = "..."
//! token = "..."
//! token_secret = "..."
//!
//! [api]
//! base_url = "https://api.twitter.com/1.1"
//! timeout_secs = 30
//! page_size = 50
//!
//! [mount]
//! mount_point = "~/twitter"
//! cache_timeout_secs = 60
//! ```
//!
//! Anything missing keeps its default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use twfs_core::Credentials;
use twfs_fs::MountConfig;
use twfs_net::ApiConfig;

/// Template written by `twfs init`.
pub const CONFIG_TEMPLATE: &str = r#"# twfs configuration

[credentials]
# Application and access token from the developer portal
consumer_key = ""
consumer_secret = ""
token = ""
token_secret = ""

[api]
# base_url = "https://api.twitter.com/1.1"
# Per-request timeout
timeout_secs = 30
# Entries requested per timeline or message listing
page_size = 50
# Cursor pages fetched per follower/friend listing
max_pages = 5
# Length limits, in characters
max_status_chars = 280
max_message_chars = 10000

[mount]
# mount_point = "~/twitter"
# Seconds a cached listing or file stays fresh
cache_timeout_secs = 60
# Threads serving filesystem calls that wait on the network
worker_threads = 8
allow_other = false
read_only = false
"#;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Failed to read {path:?}: {source}")]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The file is not valid TOML
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A key has the wrong type or an unusable value
    #[error("Invalid value for {key}: {reason}")]
    Invalid {
        /// Dotted key path
        key: String,
        /// What is wrong with it
        reason: String,
    },

    /// A credential is missing or empty
    #[error("Missing credential: credentials.{0}")]
    MissingCredential(&'static str),
}

/// Raw credential strings as read from the file.
#[derive(Clone, Default)]
pub struct CredentialsConfig {
    /// Application key
    pub consumer_key: String,
    /// Application secret
    pub consumer_secret: String,
    /// Access token
    pub token: String,
    /// Access token secret
    pub token_secret: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("consumer_key", &self.consumer_key)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Complete client configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Account credentials
    pub credentials: CredentialsConfig,
    /// Remote API settings
    pub api: ApiConfig,
    /// Mount settings
    pub mount: MountConfig,
}

impl Config {
    /// Builds signing credentials, failing on the first empty field.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let c = &self.credentials;
        let fields = [
            ("consumer_key", &c.consumer_key),
            ("consumer_secret", &c.consumer_secret),
            ("token", &c.token),
            ("token_secret", &c.token_secret),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ConfigError::MissingCredential(*name));
        }
        Ok(Credentials::new(
            c.consumer_key.trim(),
            c.consumer_secret.trim(),
            c.token.trim(),
            c.token_secret.trim(),
        ))
    }
}

/// Loads configuration from `path`. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let path = expand_tilde(path);

    if !path.exists() {
        info!("No config file found at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config = parse_config(&content)?;
    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Applies a TOML document over the defaults.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let toml: toml::Value = content.parse()?;
    let mut config = Config::default();

    // Parse [credentials] section
    if let Some(section) = toml.get("credentials") {
        let creds = &mut config.credentials;
        for (key, slot) in [
            ("consumer_key", &mut creds.consumer_key),
            ("consumer_secret", &mut creds.consumer_secret),
            ("token", &mut creds.token),
            ("token_secret", &mut creds.token_secret),
        ] {
            if let Some(value) = string(section, "credentials", key)? {
                *slot = value.to_string();
            }
        }
    }

    // Parse [api] section
    if let Some(section) = toml.get("api") {
        if let Some(base_url) = string(section, "api", "base_url")? {
            if !base_url.starts_with("https://") && !base_url.starts_with("http://") {
                return Err(invalid("api.base_url", "must be an http(s) URL"));
            }
            config.api.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = positive(section, "api", "timeout_secs")? {
            config.api.transport.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = positive(section, "api", "connect_timeout_secs")? {
            config.api.transport.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = positive(section, "api", "page_size")? {
            config.mount.page_size = u32::try_from(size)
                .map_err(|_| invalid("api.page_size", "out of range"))?;
        }
        if let Some(pages) = positive(section, "api", "max_pages")? {
            config.mount.max_pages = pages as usize;
        }
        if let Some(limit) = positive(section, "api", "max_status_chars")? {
            config.mount.max_status_chars = limit as usize;
        }
        if let Some(limit) = positive(section, "api", "max_message_chars")? {
            config.mount.max_message_chars = limit as usize;
        }
    }

    // Parse [mount] section
    if let Some(section) = toml.get("mount") {
        if let Some(mount_point) = string(section, "mount", "mount_point")? {
            config.mount.mount_point = expand_tilde(Path::new(mount_point));
        }
        if let Some(secs) = integer(section, "mount", "cache_timeout_secs")? {
            config.mount.cache_timeout_secs = secs;
        }
        if let Some(threads) = positive(section, "mount", "worker_threads")? {
            config.mount.worker_threads = threads as usize;
        }
        if let Some(allow_other) = boolean(section, "mount", "allow_other")? {
            config.mount.allow_other = allow_other;
        }
        if let Some(read_only) = boolean(section, "mount", "read_only")? {
            config.mount.read_only = read_only;
        }
    }

    Ok(config)
}

/// Expands a leading `~/` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    expand_tilde(Path::new("~/.twfs/config.toml"))
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn string<'a>(
    section: &'a toml::Value,
    name: &str,
    key: &str,
) -> Result<Option<&'a str>, ConfigError> {
    match section.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(Some)
            .ok_or_else(|| invalid(&format!("{}.{}", name, key), "expected a string")),
    }
}

fn integer(section: &toml::Value, name: &str, key: &str) -> Result<Option<u64>, ConfigError> {
    match section.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .and_then(|n| u64::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| {
                invalid(&format!("{}.{}", name, key), "expected a non-negative integer")
            }),
    }
}

fn positive(section: &toml::Value, name: &str, key: &str) -> Result<Option<u64>, ConfigError> {
    match integer(section, name, key)? {
        Some(0) => Err(invalid(&format!("{}.{}", name, key), "must be greater than zero")),
        other => Ok(other),
    }
}

fn boolean(section: &toml::Value, name: &str, key: &str) -> Result<Option<bool>, ConfigError> {
    match section.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| invalid(&format!("{}.{}", name, key), "expected true or false")),
    }
}
