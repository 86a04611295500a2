//! Scripted HTTP transport.
//!
//! Answers requests from a route table keyed by method and endpoint path
//! and records every request it sees, so tests can drive `RestClient`
//! without a network.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use twfs_net::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use twfs_proto::endpoints::{Endpoint, Method};

/// Base URL the scripted client should be configured with.
pub const SCRIPTED_BASE: &str = "https://api.test/1.1";

/// A canned reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond with this status, headers and body
    Response(HttpResponse),
    /// Fail at the transport level with a timeout
    Timeout,
    /// Fail at the transport level with a refused connection
    Refused,
}

/// Route-table transport.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport with no routes; unknown routes answer 404.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `endpoint` with a 200 and `body` as JSON.
    pub fn json(&self, endpoint: Endpoint, body: Value) -> &Self {
        self.reply(endpoint, None, Reply::Response(HttpResponse::new(200, body.to_string())))
    }

    /// Answers `endpoint` with `status`, `headers`, and `body` as JSON.
    pub fn status(
        &self,
        endpoint: Endpoint,
        status: u16,
        headers: &[(&str, &str)],
        body: Value,
    ) -> &Self {
        let mut response = HttpResponse::new(status, Bytes::from(body.to_string()));
        response.headers = headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
            .collect();
        self.reply(endpoint, None, Reply::Response(response))
    }

    /// Installs a reply for `endpoint`, with `{id}` substituted when given.
    pub fn reply(&self, endpoint: Endpoint, id: Option<u64>, reply: Reply) -> &Self {
        let path = endpoint.url("", id);
        self.routes.lock().insert((endpoint.method, path), reply);
        self
    }

    /// Returns a copy of every request seen, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Returns the requests sent to `endpoint`.
    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == endpoint.method && r.url.ends_with(endpoint.path))
            .cloned()
            .collect()
    }
}

impl HttpTransport for ScriptedTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(request.clone());
        let path = request
            .url
            .strip_prefix(SCRIPTED_BASE)
            .unwrap_or(&request.url)
            .to_string();
        match self.routes.lock().get(&(request.method, path)) {
            Some(Reply::Response(response)) => Ok(response.clone()),
            Some(Reply::Timeout) => Err(TransportError::Timeout),
            Some(Reply::Refused) => Err(TransportError::ConnectionFailed(
                "connection refused".to_string(),
            )),
            None => Ok(HttpResponse::new(
                404,
                r#"{"errors":[{"code":34,"message":"Sorry, that page does not exist."}]}"#,
            )),
        }
    }
}
