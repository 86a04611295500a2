//! REST client implementing [`TwitterApi`] over a signed HTTP transport.

use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use twfs_core::{Credentials, Handle, MessageId, OAuthSigner, PostId, DEFAULT_API_BASE};
use twfs_proto::endpoints::{self, Endpoint};
use twfs_proto::{ApiErrorBody, DirectMessage, FetchError, Status, TwitterApi, User, UserPage};

use crate::connection::{ConnectionStats, StatsSnapshot};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, TransportConfig, TransportError};

/// Users requested per cursored page.
const USER_PAGE_COUNT: u32 = 200;

/// Remote API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Endpoint root
    pub base_url: String,
    /// Transport settings
    pub transport: TransportConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            transport: TransportConfig::default(),
        }
    }
}

/// Signed REST client.
pub struct RestClient<T> {
    base_url: String,
    signer: OAuthSigner,
    transport: T,
    stats: ConnectionStats,
}

impl<T: HttpTransport> RestClient<T> {
    /// Creates a client.
    pub fn new(config: &ApiConfig, credentials: Credentials, transport: T) -> Self {
        Self {
            base_url: config.base_url.clone(),
            signer: OAuthSigner::new(credentials),
            transport,
            stats: ConnectionStats::new(),
        }
    }

    /// Returns traffic counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn call<R: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        id: Option<u64>,
        params: Vec<(String, String)>,
    ) -> Result<R, FetchError> {
        let url = endpoint.url(&self.base_url, id);
        let authorization = self.signer.authorize(endpoint.method.as_str(), &url, &params);
        let request = HttpRequest {
            method: endpoint.method,
            url,
            params,
            headers: vec![("Authorization".to_string(), authorization)],
        };

        self.stats.record_sent();
        let response = self.transport.execute(&request).map_err(|e| {
            self.stats.record_failed();
            warn!(url = %request.url, error = %e, "Transport failure");
            map_transport_error(e)
        })?;

        self.stats.record_received(response.body.len() as u64);
        self.stats.record_rate_limit(
            header_i64(&response, "x-rate-limit-remaining"),
            header_i64(&response, "x-rate-limit-reset"),
        );

        if !response.is_success() {
            self.stats.record_failed();
            let err = map_status(&response);
            debug!(url = %request.url, status = response.status, error = %err, "Request rejected");
            return Err(err);
        }

        Ok(serde_json::from_slice(&response.body)?)
    }
}

fn params(pairs: &[(&str, String)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn header_i64(response: &HttpResponse, name: &str) -> Option<i64> {
    response.header(name).and_then(|v| v.trim().parse().ok())
}

fn map_transport_error(err: TransportError) -> FetchError {
    match err {
        TransportError::Timeout => FetchError::Timeout,
        TransportError::Tls(reason) => FetchError::TlsFailure(reason),
        other => FetchError::TransportFailure(other.to_string()),
    }
}

fn map_status(response: &HttpResponse) -> FetchError {
    let reason = serde_json::from_slice::<ApiErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.reason())
        .unwrap_or_else(|| format!("HTTP {}", response.status));

    match response.status {
        401 => FetchError::AuthFailure(reason),
        // 420 is the legacy "enhance your calm" rate limit status
        420 | 429 => FetchError::RateLimited {
            reset_at: header_i64(response, "x-rate-limit-reset"),
        },
        status => FetchError::RemoteRejected { status, reason },
    }
}

impl<T: HttpTransport> TwitterApi for RestClient<T> {
    fn verify_credentials(&self) -> Result<User, FetchError> {
        self.call(
            endpoints::VERIFY_CREDENTIALS,
            None,
            params(&[("skip_status", "true".into())]),
        )
    }

    fn home_timeline(&self, count: u32) -> Result<Vec<Status>, FetchError> {
        self.call(
            endpoints::HOME_TIMELINE,
            None,
            params(&[("count", count.to_string()), ("tweet_mode", "extended".into())]),
        )
    }

    fn mentions(&self, count: u32) -> Result<Vec<Status>, FetchError> {
        self.call(
            endpoints::MENTIONS_TIMELINE,
            None,
            params(&[("count", count.to_string()), ("tweet_mode", "extended".into())]),
        )
    }

    fn user_timeline(&self, handle: &Handle, count: u32) -> Result<Vec<Status>, FetchError> {
        self.call(
            endpoints::USER_TIMELINE,
            None,
            params(&[
                ("screen_name", handle.to_string()),
                ("count", count.to_string()),
                ("tweet_mode", "extended".into()),
            ]),
        )
    }

    fn show_status(&self, id: PostId) -> Result<Status, FetchError> {
        self.call(
            endpoints::SHOW_STATUS,
            None,
            params(&[("id", id.to_string()), ("tweet_mode", "extended".into())]),
        )
    }

    fn update_status(&self, text: &str) -> Result<Status, FetchError> {
        self.call(
            endpoints::UPDATE_STATUS,
            None,
            params(&[("status", text.to_string())]),
        )
    }

    fn destroy_status(&self, id: PostId) -> Result<Status, FetchError> {
        self.call(endpoints::DESTROY_STATUS, Some(id.value()), Vec::new())
    }

    fn followers(&self, handle: Option<&Handle>, cursor: i64) -> Result<UserPage, FetchError> {
        self.call(endpoints::FOLLOWERS_LIST, None, user_page_params(handle, cursor))
    }

    fn friends(&self, handle: Option<&Handle>, cursor: i64) -> Result<UserPage, FetchError> {
        self.call(endpoints::FRIENDS_LIST, None, user_page_params(handle, cursor))
    }

    fn show_user(&self, handle: &Handle) -> Result<User, FetchError> {
        self.call(
            endpoints::SHOW_USER,
            None,
            params(&[("screen_name", handle.to_string())]),
        )
    }

    fn follow(&self, handle: &Handle) -> Result<User, FetchError> {
        self.call(
            endpoints::FRIENDSHIP_CREATE,
            None,
            params(&[("screen_name", handle.to_string())]),
        )
    }

    fn unfollow(&self, handle: &Handle) -> Result<User, FetchError> {
        self.call(
            endpoints::FRIENDSHIP_DESTROY,
            None,
            params(&[("screen_name", handle.to_string())]),
        )
    }

    fn direct_messages(&self, count: u32) -> Result<Vec<DirectMessage>, FetchError> {
        self.call(
            endpoints::DIRECT_MESSAGES,
            None,
            params(&[("count", count.to_string()), ("full_text", "true".into())]),
        )
    }

    fn sent_direct_messages(&self, count: u32) -> Result<Vec<DirectMessage>, FetchError> {
        self.call(
            endpoints::DIRECT_MESSAGES_SENT,
            None,
            params(&[("count", count.to_string()), ("full_text", "true".into())]),
        )
    }

    fn show_direct_message(&self, id: MessageId) -> Result<DirectMessage, FetchError> {
        self.call(
            endpoints::DIRECT_MESSAGE_SHOW,
            None,
            params(&[("id", id.to_string()), ("full_text", "true".into())]),
        )
    }

    fn send_direct_message(&self, to: &Handle, text: &str) -> Result<DirectMessage, FetchError> {
        self.call(
            endpoints::DIRECT_MESSAGE_NEW,
            None,
            params(&[("screen_name", to.to_string()), ("text", text.to_string())]),
        )
    }

    fn destroy_direct_message(&self, id: MessageId) -> Result<DirectMessage, FetchError> {
        self.call(
            endpoints::DIRECT_MESSAGE_DESTROY,
            None,
            params(&[("id", id.to_string())]),
        )
    }
}

fn user_page_params(handle: Option<&Handle>, cursor: i64) -> Vec<(String, String)> {
    let mut pairs = vec![
        ("cursor", cursor.to_string()),
        ("count", USER_PAGE_COUNT.to_string()),
        ("skip_status", "true".to_string()),
    ];
    if let Some(handle) = handle {
        pairs.push(("screen_name", handle.to_string()));
    }
    params(&pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use twfs_proto::endpoints::Method;

    /// Replays canned responses and records requests.
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().push(request.clone());
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("no scripted response".into())))
        }
    }

    fn client(responses: Vec<Result<HttpResponse, TransportError>>) -> RestClient<ScriptedTransport> {
        let config = ApiConfig {
            base_url: "https://api.test/1.1".into(),
            ..Default::default()
        };
        RestClient::new(
            &config,
            Credentials::new("ck", "cs", "tok", "ts"),
            ScriptedTransport::new(responses),
        )
    }

    #[test]
    fn test_home_timeline_request_shape() {
        let body = r#"[{"id": 1001, "full_text": "one"}, {"id": 1002, "full_text": "two"}]"#;
        let client = client(vec![Ok(HttpResponse::new(200, body))]);

        let statuses = client.home_timeline(20).unwrap();
        assert_eq!(statuses.len(), 2);
        assert_eq!(statuses[1].text, "two");

        let requests = client.transport().requests.lock();
        let req = &requests[0];
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.url, "https://api.test/1.1/statuses/home_timeline.json");
        assert_eq!(req.param_value("count"), Some("20"));
        assert!(req.headers[0].1.starts_with("OAuth "));
    }

    #[test]
    fn test_update_status_posts_form() {
        let body = r#"{"id": 1003, "text": "hello"}"#;
        let client = client(vec![Ok(HttpResponse::new(200, body))]);

        let status = client.update_status("hello").unwrap();
        assert_eq!(status.id, PostId(1003));

        let requests = client.transport().requests.lock();
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].param_value("status"), Some("hello"));
    }

    #[test]
    fn test_destroy_substitutes_id() {
        let client = client(vec![Ok(HttpResponse::new(200, r#"{"id": 7, "text": "x"}"#))]);
        client.destroy_status(PostId(7)).unwrap();
        let requests = client.transport().requests.lock();
        assert_eq!(requests[0].url, "https://api.test/1.1/statuses/destroy/7.json");
    }

    #[test]
    fn test_status_mapping() {
        let unauthorized = HttpResponse::new(
            401,
            r#"{"errors":[{"code":89,"message":"Invalid or expired token."}]}"#,
        );
        let mut limited = HttpResponse::new(429, "");
        limited
            .headers
            .push(("x-rate-limit-reset".into(), "1700000000".into()));
        let missing = HttpResponse::new(404, r#"{"errors":[{"code":144,"message":"No status found with that ID."}]}"#);

        let client = client(vec![Ok(unauthorized), Ok(limited), Ok(missing)]);

        assert!(matches!(
            client.mentions(5),
            Err(FetchError::AuthFailure(reason)) if reason.contains("Invalid or expired token")
        ));
        assert_eq!(
            client.mentions(5),
            Err(FetchError::RateLimited {
                reset_at: Some(1_700_000_000)
            })
        );
        let err = client.show_status(PostId(1)).unwrap_err();
        assert!(err.is_not_found());

        let stats = client.stats();
        assert_eq!(stats.requests_sent, 3);
        assert_eq!(stats.requests_failed, 3);
    }

    #[test]
    fn test_transport_errors_keep_their_kind() {
        let client = client(vec![
            Err(TransportError::Timeout),
            Err(TransportError::Tls("unknown issuer".into())),
            Err(TransportError::ConnectionFailed("refused".into())),
        ]);

        assert_eq!(client.home_timeline(1), Err(FetchError::Timeout));
        assert!(matches!(client.home_timeline(1), Err(FetchError::TlsFailure(_))));
        assert!(matches!(
            client.home_timeline(1),
            Err(FetchError::TransportFailure(_))
        ));
    }

    #[test]
    fn test_malformed_body() {
        let client = client(vec![Ok(HttpResponse::new(200, "<html>"))]);
        assert!(matches!(
            client.show_user(&Handle::parse("bob").unwrap()),
            Err(FetchError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_rate_limit_headers_recorded() {
        let mut resp = HttpResponse::new(200, "[]");
        resp.headers
            .push(("x-rate-limit-remaining".into(), "14".into()));
        let client = client(vec![Ok(resp)]);
        client.direct_messages(10).unwrap();
        assert_eq!(client.stats().rate_limit_remaining, Some(14));
    }
}
