//! OAuth 1.0a request signing (HMAC-SHA1, RFC 5849).
//!
//! [`OAuthSigner::sign`] is deterministic for identical inputs: the nonce and
//! timestamp are parameters. [`OAuthSigner::authorize`] supplies fresh ones.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

use crate::keys::Credentials;
use crate::time::Timestamp;

type HmacSha1 = Hmac<Sha1>;

/// RFC 3986 unreserved characters pass through, everything else is escaped.
const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Length of generated nonces.
const NONCE_LEN: usize = 32;

/// Percent-encodes a string the way OAuth 1.0a requires.
pub fn percent_encode(s: &str) -> String {
    utf8_percent_encode(s, OAUTH_ENCODE_SET).to_string()
}

/// Computes HMAC-SHA1 of a message using the given key.
pub fn hmac_sha1(key: &[u8], message: &[u8]) -> [u8; 20] {
    let mut mac = HmacSha1::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(message);
    let mut output = [0u8; 20];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Signs requests on behalf of one set of credentials.
#[derive(Debug, Clone)]
pub struct OAuthSigner {
    credentials: Credentials,
}

impl OAuthSigner {
    /// Creates a signer.
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Returns the credentials this signer uses.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Builds the `Authorization` header value with a random nonce and the
    /// current time.
    pub fn authorize(&self, method: &str, url: &str, params: &[(String, String)]) -> String {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let timestamp = Timestamp::now().as_secs();
        self.sign(method, url, params, &nonce, timestamp)
    }

    /// Builds the `Authorization` header value.
    ///
    /// `url` must not carry a query string; query and form parameters go in
    /// `params`.
    pub fn sign(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let mut oauth_params = vec![
            ("oauth_consumer_key", self.credentials.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.credentials.token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let signature = self.signature(method, url, params, &oauth_params);
        oauth_params.push(("oauth_signature", signature.as_str()));
        oauth_params.sort_by(|a, b| a.0.cmp(b.0));

        let fields: Vec<String> = oauth_params
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, percent_encode(v)))
            .collect();
        format!("OAuth {}", fields.join(", "))
    }

    fn signature(
        &self,
        method: &str,
        url: &str,
        params: &[(String, String)],
        oauth_params: &[(&str, &str)],
    ) -> String {
        let base = signature_base_string(method, url, params, oauth_params);
        let key = format!(
            "{}&{}",
            percent_encode(self.credentials.consumer_secret.expose()),
            percent_encode(self.credentials.token_secret.expose())
        );
        STANDARD.encode(hmac_sha1(key.as_bytes(), base.as_bytes()))
    }
}

/// Builds the signature base string: method, URL and the sorted, encoded
/// parameter string, each percent-encoded and joined with `&`.
pub fn signature_base_string(
    method: &str,
    url: &str,
    params: &[(String, String)],
    oauth_params: &[(&str, &str)],
) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .chain(
            oauth_params
                .iter()
                .map(|(k, v)| (percent_encode(k), percent_encode(v))),
        )
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_ascii_uppercase(),
        percent_encode(url),
        percent_encode(&param_string)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_signer() -> OAuthSigner {
        OAuthSigner::new(Credentials::new(
            "xvz1evFS4wEEPTGEFPHBog",
            "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw",
            "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb",
            "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE",
        ))
    }

    fn reference_params() -> Vec<(String, String)> {
        vec![
            ("include_entities".to_string(), "true".to_string()),
            (
                "status".to_string(),
                "Hello Ladies + Gentlemen, a signed OAuth request!".to_string(),
            ),
        ]
    }

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode("Ladies + Gentlemen"), "Ladies%20%2B%20Gentlemen");
        assert_eq!(percent_encode("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(percent_encode("☃"), "%E2%98%83");
    }

    #[test]
    fn test_reference_signature() {
        let header = reference_signer().sign(
            "POST",
            "https://api.twitter.com/1.1/statuses/update.json",
            &reference_params(),
            "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg",
            1318622958,
        );

        assert!(header.starts_with("OAuth "));
        assert!(header.contains("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(header.contains("oauth_timestamp=\"1318622958\""));
    }

    #[test]
    fn test_sign_is_deterministic() {
        let signer = reference_signer();
        let url = "https://api.twitter.com/1.1/statuses/update.json";
        let a = signer.sign("POST", url, &reference_params(), "nonce", 1);
        let b = signer.sign("POST", url, &reference_params(), "nonce", 1);
        assert_eq!(a, b);

        let c = signer.sign("POST", url, &reference_params(), "other", 1);
        assert_ne!(a, c);
    }

    #[test]
    fn test_base_string_layout() {
        let base = signature_base_string(
            "get",
            "https://example.com/a b",
            &[("z".to_string(), "1".to_string()), ("a".to_string(), "2".to_string())],
            &[],
        );
        assert_eq!(base, "GET&https%3A%2F%2Fexample.com%2Fa%20b&a%3D2%26z%3D1");
    }

    #[test]
    fn test_authorize_uses_fresh_nonce() {
        let signer = reference_signer();
        let a = signer.authorize("GET", "https://example.com/", &[]);
        let b = signer.authorize("GET", "https://example.com/", &[]);
        assert_ne!(a, b);
    }
}
