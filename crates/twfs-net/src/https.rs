//! HTTPS transport backed by a blocking `reqwest` client over rustls.

use std::error::Error as StdError;

use tracing::{debug, trace};
use twfs_proto::endpoints::Method;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportConfig, TransportError};

/// HTTPS transport.
pub struct HttpsTransport {
    client: reqwest::blocking::Client,
}

impl HttpsTransport {
    /// Creates a transport with the given configuration.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .pool_idle_timeout(config.idle_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| TransportError::Other(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpTransport for HttpsTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(method = request.method.as_str(), url = %request.url, "HTTP request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url).query(&request.params),
            Method::Post => self.client.post(&request.url).form(&request.params),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().map_err(classify)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

        trace!(status = status, bytes = body.len(), "HTTP response");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Maps a `reqwest` error onto the transport taxonomy, keeping timeouts and
/// TLS failures distinguishable.
fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    if let Some(tls) = find_tls_cause(&err) {
        return TransportError::Tls(tls);
    }
    if err.is_connect() {
        return TransportError::ConnectionFailed(err.to_string());
    }
    if err.is_request() || err.is_body() {
        return TransportError::SendFailed(err.to_string());
    }
    TransportError::Other(err.to_string())
}

fn find_tls_cause(err: &(dyn StdError + 'static)) -> Option<String> {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(tls) = e.downcast_ref::<rustls::Error>() {
            return Some(tls.to_string());
        }
        // io::Error::source() skips the wrapped error itself
        if let Some(inner) = e
            .downcast_ref::<std::io::Error>()
            .and_then(|io| io.get_ref())
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            return Some(inner.to_string());
        }
        current = e.source();
    }
    None
}
