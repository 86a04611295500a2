//! twfs Network - signed access to the remote service.
//!
//! Implements:
//! - A blocking HTTPS transport (rustls) behind the `HttpTransport` trait
//! - `RestClient`, the `TwitterApi` implementation over that transport
//! - `Session`, the mount-time verified account
//! - Per-session request accounting

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod client;
pub mod connection;
pub mod https;
pub mod session;
pub mod transport;

pub use client::{ApiConfig, RestClient};
pub use connection::{ConnectionStats, StatsSnapshot};
pub use https::HttpsTransport;
pub use session::{Session, SessionError};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, TransportConfig, TransportError};
