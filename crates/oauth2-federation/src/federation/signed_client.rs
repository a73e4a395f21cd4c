//! Signed calls against the identity provider's resource API.
//!
//! Every request carries the caller's access token and an app secret proof:
//! the lowercase hex HMAC-SHA256 of the access token keyed by the shared
//! application secret.
//!
//! # Example
//!
//! ```ignore
//! use oauth2_federation::config::ApiClientConfig;
//! use oauth2_federation::federation::SignedApiClient;
//! use reqwest::Method;
//!
//! let client = SignedApiClient::new(&ApiClientConfig::new("https://www.googleapis.com", secret))?;
//! let response = client.query("/oauth2/v3/userinfo", Method::GET, access_token).await?;
//! ```

use hmac::{Hmac, Mac};
use reqwest::{Method, RequestBuilder, Response};
use sha2::Sha256;
use url::Url;

use crate::FederationResult;
use crate::config::ApiClientConfig;
use crate::error::FederationError;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the access token.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Query parameter carrying the app secret proof.
pub const APPSECRET_PROOF_PARAM: &str = "appsecret_proof";

/// Computes the app secret proof for an access token.
#[must_use]
pub fn appsecret_proof(access_token: &str, app_secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(app_secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(access_token.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Client for signed calls against the identity provider's resource API.
///
/// The access token is a per-call argument, so one client can be shared by
/// concurrent authentication attempts.
#[derive(Clone)]
pub struct SignedApiClient {
    endpoint: String,
    app_secret: String,
    http_client: reqwest::Client,
}

impl SignedApiClient {
    /// Creates a client and applies the TLS hardening once.
    ///
    /// Certificate verification is always enforced. When a CA bundle is
    /// configured its trust anchors replace the built-in roots.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Configuration` if the endpoint is not a
    /// valid (https) URL or the CA bundle cannot be loaded.
    pub fn new(config: &ApiClientConfig) -> FederationResult<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            FederationError::configuration(format!(
                "Invalid API endpoint '{}': {}",
                config.endpoint, e
            ))
        })?;
        if endpoint.scheme() != "https" && !config.allow_http {
            return Err(FederationError::configuration(format!(
                "API endpoint must use https: {}",
                config.endpoint
            )));
        }

        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .https_only(!config.allow_http)
            .danger_accept_invalid_certs(false);

        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| {
                FederationError::configuration(format!(
                    "Failed to read CA bundle {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let certificates = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
                FederationError::configuration(format!(
                    "Failed to parse CA bundle {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if certificates.is_empty() {
                return Err(FederationError::configuration(format!(
                    "CA bundle {} contains no certificates",
                    path.display()
                )));
            }

            tracing::debug!(
                bundle = %path.display(),
                certificates = certificates.len(),
                "Pinning provider API trust anchors"
            );
            builder = builder.tls_built_in_root_certs(false);
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }

        let http_client = builder.build().map_err(|e| {
            FederationError::configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            app_secret: config.app_secret.clone(),
            http_client,
        })
    }

    /// Base endpoint resource paths are appended to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds the signed URL for a resource.
    ///
    /// Existing query parameters on `resource` are kept; any `access_token`
    /// or `appsecret_proof` already present is replaced.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Internal` if the result is not a valid URL.
    pub fn signed_url(&self, resource: &str, access_token: &str) -> FederationResult<Url> {
        let mut url = Url::parse(&format!("{}{}", self.endpoint, resource)).map_err(|e| {
            FederationError::internal(format!("Invalid resource path '{}': {}", resource, e))
        })?;

        let preserved: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != ACCESS_TOKEN_PARAM && key != APPSECRET_PROOF_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();

        {
            let mut params = url.query_pairs_mut();
            params.clear();
            for (key, value) in &preserved {
                params.append_pair(key, value);
            }
            params.append_pair(ACCESS_TOKEN_PARAM, access_token);
            params.append_pair(
                APPSECRET_PROOF_PARAM,
                &appsecret_proof(access_token, &self.app_secret),
            );
        }

        Ok(url)
    }

    /// Prepares a signed request without sending it.
    ///
    /// # Errors
    ///
    /// Returns an error if the signed URL cannot be built.
    pub fn request(
        &self,
        resource: &str,
        method: Method,
        access_token: &str,
    ) -> FederationResult<RequestBuilder> {
        let url = self.signed_url(resource, access_token)?;
        Ok(self.http_client.request(method, url))
    }

    /// Sends a signed request and returns the raw response.
    ///
    /// No retry and no status interpretation: callers decide what the
    /// response means.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the request could not be completed.
    pub async fn query(
        &self,
        resource: &str,
        method: Method,
        access_token: &str,
    ) -> Result<Response, QueryError> {
        let request = self.request(resource, method.clone(), access_token)?;

        tracing::debug!(%method, resource, "Sending signed provider API request");

        Ok(request.send().await?)
    }
}

impl std::fmt::Debug for SignedApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedApiClient")
            .field("endpoint", &self.endpoint)
            .field("app_secret", &"[redacted]")
            .finish_non_exhaustive()
    }
}

/// Failure of a signed query before a response was received.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The request could not be built.
    #[error(transparent)]
    Request(#[from] FederationError),

    /// Connect, TLS or timeout failure.
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl QueryError {
    /// Returns `true` if the request timed out.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const TOK123_PROOF: &str = "41d81d170f00ea1489ddb43195b730c3c4dc6efe0538f174749bede5f5be8346";

    fn client(endpoint: &str) -> SignedApiClient {
        let config = ApiClientConfig::new(endpoint, "s3cr3t").with_allow_http(true);
        SignedApiClient::new(&config).unwrap()
    }

    fn query_map(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_appsecret_proof_is_lowercase_hex_hmac() {
        let proof = appsecret_proof("tok123", "s3cr3t");
        assert_eq!(proof, TOK123_PROOF);
        assert_eq!(proof.len(), 64);
        assert_eq!(proof, proof.to_lowercase());
    }

    #[test]
    fn test_signed_url_appends_token_and_proof() {
        let client = client("https://graph.example.com");
        let url = client.signed_url("/v1/me", "tok123").unwrap();

        assert_eq!(url.path(), "/v1/me");
        assert!(url.as_str().contains("access_token=tok123"));
        assert!(url.as_str().contains(&format!("appsecret_proof={}", TOK123_PROOF)));
    }

    #[test]
    fn test_signed_url_preserves_existing_query() {
        let client = client("https://graph.example.com/");
        let url = client
            .signed_url("/v1/me?fields=id,email&locale=de", "tok123")
            .unwrap();

        let params = query_map(&url);
        assert_eq!(params.get("fields").map(String::as_str), Some("id,email"));
        assert_eq!(params.get("locale").map(String::as_str), Some("de"));
        assert_eq!(params.get("access_token").map(String::as_str), Some("tok123"));
        assert_eq!(
            params.get("appsecret_proof").map(String::as_str),
            Some(TOK123_PROOF)
        );
    }

    #[test]
    fn test_signed_url_replaces_stale_signature() {
        let client = client("https://graph.example.com");
        let url = client
            .signed_url("/v1/me?access_token=old&appsecret_proof=forged", "tok123")
            .unwrap();

        let tokens: Vec<_> = url
            .query_pairs()
            .filter(|(k, _)| k == "access_token")
            .collect();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].1, "tok123");
        assert!(!url.as_str().contains("forged"));
    }

    #[test]
    fn test_http_endpoint_rejected_without_allow_http() {
        let config = ApiClientConfig::new("http://graph.example.com", "s3cr3t");
        let err = SignedApiClient::new(&config).unwrap_err();
        assert!(err.is_fatal_misconfiguration());
    }

    #[test]
    fn test_missing_ca_bundle_is_configuration_error() {
        let config = ApiClientConfig::new("https://graph.example.com", "s3cr3t")
            .with_ca_bundle("/nonexistent/cacert.pem");
        let err = SignedApiClient::new(&config).unwrap_err();
        assert!(matches!(err, FederationError::Configuration { .. }));
        assert!(err.to_string().contains("cacert.pem"));
    }

    #[test]
    fn test_empty_ca_bundle_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("cacert.pem");
        std::fs::write(&bundle, "").unwrap();

        let config =
            ApiClientConfig::new("https://graph.example.com", "s3cr3t").with_ca_bundle(&bundle);
        assert!(SignedApiClient::new(&config).is_err());
    }

    #[tokio::test]
    async fn test_query_sends_signed_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/me"))
            .and(query_param("access_token", "tok123"))
            .and(query_param("appsecret_proof", TOK123_PROOF))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"id":"42"}"#))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = client(&mock_server.uri());
        let response = client.query("/v1/me", Method::GET, "tok123").await.unwrap();

        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), r#"{"id":"42"}"#);
    }

    #[tokio::test]
    async fn test_query_returns_error_responses_unparsed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/me/feed"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad"))
            .mount(&mock_server)
            .await;

        let client = client(&mock_server.uri());
        let response = client
            .query("/v1/me/feed", Method::POST, "tok123")
            .await
            .unwrap();

        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_query_transport_failure() {
        // Nothing listens on port 9 (discard) in the test environment.
        let client = client("http://127.0.0.1:9");
        let err = client.query("/v1/me", Method::GET, "tok123").await.unwrap_err();
        assert!(matches!(err, QueryError::Transport(_)));
    }
}
