//! Transport trait, request/response types and configuration.

use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use twfs_proto::endpoints::Method;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// TLS handshake or certificate validation failed
    #[error("TLS failure: {0}")]
    Tls(String),

    /// Connection or request timeout
    #[error("Timeout")]
    Timeout,

    /// Send failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Receive failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// Idle pooled connection timeout
    pub idle_timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            user_agent: concat!("twfs/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Method
    pub method: Method,
    /// Absolute URL without query string
    pub url: String,
    /// Query parameters (GET) or form fields (POST)
    pub params: Vec<(String, String)>,
    /// Extra headers
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a request with no parameters.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            params: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Adds a parameter.
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    /// Adds a header.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// Returns the value of a parameter.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A received HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Response headers, names lower-cased
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl HttpResponse {
    /// Creates a response with no headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Returns the value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Blocking request/response transport.
///
/// Implementations enforce their own timeouts and report them as
/// [`TransportError::Timeout`].
pub trait HttpTransport: Send + Sync {
    /// Executes one request.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: HttpTransport + ?Sized> HttpTransport for std::sync::Arc<T> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).execute(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::new(Method::Get, "https://example.com/x.json")
            .param("count", 20)
            .header("Authorization", "OAuth x");
        assert_eq!(req.param_value("count"), Some("20"));
        assert_eq!(req.param_value("missing"), None);
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn test_response_header_lookup() {
        let mut resp = HttpResponse::new(429, "");
        resp.headers
            .push(("x-rate-limit-reset".to_string(), "1700000000".to_string()));
        assert_eq!(resp.header("X-Rate-Limit-Reset"), Some("1700000000"));
        assert!(!resp.is_success());
    }
}
