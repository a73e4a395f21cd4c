//! HTTP token endpoint of the identity provider.
//!
//! [`HttpTokenEndpoint`] implements [`TokenValidator`] on top of
//! [`SignedApiClient`]: access tokens are validated through the provider's
//! token-info resource and exchanged for long-lived tokens through its token
//! resource.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Deserializer};

use super::signed_client::{QueryError, SignedApiClient};
use super::validator::{Claims, LongLivedToken, TokenValidator, ValidationOutcome};
use crate::FederationResult;
use crate::config::ProviderConfig;
use crate::error::FederationError;
use crate::token::Credentials;

/// Token type sent as `subject_token_type` in the exchange.
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Validates and exchanges tokens over the provider's HTTP API.
#[derive(Clone)]
pub struct HttpTokenEndpoint {
    client: Arc<SignedApiClient>,
    provider_name: String,
    client_id: String,
    client_secret: String,
    token_info_path: String,
    token_exchange_path: String,
    exchange_grant_type: String,
}

impl HttpTokenEndpoint {
    /// Creates an endpoint for the configured provider.
    ///
    /// `client_secret` is the OAuth client secret sent with the exchange; for
    /// providers that use the app secret for both it is the same value.
    #[must_use]
    pub fn new(
        client: Arc<SignedApiClient>,
        provider: &ProviderConfig,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            provider_name: provider.name.clone(),
            client_id: provider.client_id.clone(),
            client_secret: client_secret.into(),
            token_info_path: provider.token_info_path.clone(),
            token_exchange_path: provider.token_exchange_path.clone(),
            exchange_grant_type: provider.exchange_grant_type.clone(),
        }
    }

    /// Checks a token-info document against this client and the requested scope.
    fn verify(&self, info: TokenInfo, scope: &str) -> ValidationOutcome {
        let Some(subject_id) = info.sub.filter(|s| !s.is_empty()) else {
            return ValidationOutcome::invalid("token info has no subject");
        };

        let audience = info.aud.unwrap_or_default();
        if audience != self.client_id {
            return ValidationOutcome::invalid(format!(
                "token was issued for audience '{}'",
                audience
            ));
        }

        if info.expires_in == Some(0) {
            return ValidationOutcome::invalid("token has expired");
        }

        let claims = Claims {
            subject_id,
            audience,
            email: info.email,
            email_verified: info.email_verified,
            scopes: info
                .scope
                .as_deref()
                .unwrap_or_default()
                .split_whitespace()
                .map(String::from)
                .collect(),
            expires_in: info.expires_in,
            extra: info.extra,
        };

        if !claims.grants(scope) {
            return ValidationOutcome::invalid(format!(
                "requested scope '{}' not granted (granted: '{}')",
                scope,
                claims.scopes.join(" ")
            ));
        }

        ValidationOutcome::Valid(claims)
    }
}

impl std::fmt::Debug for HttpTokenEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenEndpoint")
            .field("provider_name", &self.provider_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[redacted]")
            .field("token_info_path", &self.token_info_path)
            .field("token_exchange_path", &self.token_exchange_path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenValidator for HttpTokenEndpoint {
    async fn request_validated_token_information(
        &self,
        credentials: &Credentials,
        scope: &str,
    ) -> FederationResult<ValidationOutcome> {
        if credentials.access_token().is_empty() {
            return Ok(ValidationOutcome::invalid("no access token presented"));
        }

        let response = self
            .client
            .query(&self.token_info_path, Method::GET, credentials.access_token())
            .await
            .map_err(|e| match e {
                QueryError::Request(err) => err,
                e if e.is_timeout() => FederationError::identity_provider(
                    &self.provider_name,
                    format!("token validation timed out: {}", e),
                ),
                e => FederationError::identity_provider(
                    &self.provider_name,
                    format!("token validation request failed: {}", e),
                ),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Ok(ValidationOutcome::invalid(format!(
                "token info returned HTTP {}",
                status
            )));
        }

        let info: TokenInfo = match response.json().await {
            Ok(info) => info,
            Err(e) => {
                return Ok(ValidationOutcome::invalid(format!(
                    "unreadable token info: {}",
                    e
                )));
            }
        };

        let outcome = self.verify(info, scope);
        if let ValidationOutcome::Valid(claims) = &outcome {
            tracing::debug!(
                provider = %self.provider_name,
                subject = %claims.subject_id,
                "Validated access token"
            );
        }
        Ok(outcome)
    }

    async fn request_long_lived_token(
        &self,
        short_lived_access_token: &str,
    ) -> FederationResult<LongLivedToken> {
        let params = [
            ("grant_type", self.exchange_grant_type.as_str()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("subject_token", short_lived_access_token),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
        ];

        let exchange_failed =
            |message: String| FederationError::upstream_exchange(&self.provider_name, message);

        let response = self
            .client
            .request(&self.token_exchange_path, Method::POST, short_lived_access_token)?
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    exchange_failed(format!("request timed out: {}", e))
                } else {
                    exchange_failed(format!("request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(exchange_failed(format!(
                    "{} - {}",
                    oauth_error.error,
                    oauth_error.error_description.unwrap_or_default()
                )));
            }

            return Err(exchange_failed(format!("HTTP {} - {}", status, body)));
        }

        let token: LongLivedToken = response
            .json()
            .await
            .map_err(|e| exchange_failed(format!("Failed to parse token response: {}", e)))?;

        if token.access_token.is_empty() {
            return Err(exchange_failed(
                "token response has an empty access_token".to_string(),
            ));
        }

        tracing::debug!(
            provider = %self.provider_name,
            expires_in = ?token.expires_in,
            "Obtained long-lived token"
        );

        Ok(token)
    }
}

/// Token-info document returned by the provider.
#[derive(Debug, Deserialize)]
struct TokenInfo {
    #[serde(default, alias = "audience")]
    aud: Option<String>,

    #[serde(default, alias = "user_id")]
    sub: Option<String>,

    #[serde(default)]
    scope: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_seconds")]
    expires_in: Option<u64>,

    #[serde(default)]
    email: Option<String>,

    #[serde(default, deserialize_with = "deserialize_optional_flag")]
    email_verified: Option<bool>,

    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

/// OAuth error response from the provider.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Custom deserializer for durations sent either as number or numeric string.
pub(crate) fn deserialize_optional_seconds<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid number of seconds: '{}'", s))),
    }
}

/// Custom deserializer for flags sent either as bool or "true"/"false".
fn deserialize_optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        String(String),
    }

    match Option::<BoolOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(BoolOrString::Bool(b)) => Ok(Some(b)),
        Some(BoolOrString::String(s)) => match s.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(serde::de::Error::custom(format!("invalid flag: '{}'", other))),
        },
    }
}
