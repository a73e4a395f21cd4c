//! The token validation contract the authentication provider depends on.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::FederationResult;
use crate::token::Credentials;

/// Validated attributes about an external identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Stable external identifier; never empty.
    pub subject_id: String,

    /// Client id the token was issued for.
    pub audience: String,

    /// Email address, if the scope grants it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Whether the provider verified the email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,

    /// Scopes granted to the token.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Remaining token lifetime in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,

    /// Provider-specific attributes.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// Creates claims for a subject issued to an audience.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            audience: audience.into(),
            email: None,
            email_verified: None,
            scopes: Vec::new(),
            expires_in: None,
            extra: HashMap::new(),
        }
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Returns `true` if every scope in the space separated `scope` string was granted.
    #[must_use]
    pub fn grants(&self, scope: &str) -> bool {
        scope
            .split_whitespace()
            .all(|requested| self.scopes.iter().any(|granted| granted == requested))
    }
}

/// Outcome of credential validation.
///
/// Rejected credentials are a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The provider vouched for the credentials.
    Valid(Claims),
    /// The credentials were rejected.
    Invalid {
        /// Why the credentials were rejected (for logs only).
        reason: String,
    },
}

impl ValidationOutcome {
    /// Creates an `Invalid` outcome.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// A token obtained in exchange for a short-lived access token.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct LongLivedToken {
    /// The long-lived access token.
    pub access_token: String,

    /// Token type (usually "Bearer").
    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime in seconds.
    #[serde(default, deserialize_with = "super::endpoint::deserialize_optional_seconds")]
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for LongLivedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongLivedToken")
            .field("access_token", &"[redacted]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Validates credentials against the identity provider.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validates credentials for the requested scope.
    ///
    /// Implementations must reject tokens issued for another client id and
    /// tokens lacking any requested scope.
    ///
    /// # Errors
    ///
    /// Only for failures that are not a verdict on the credentials, such as
    /// the provider being unreachable.
    async fn request_validated_token_information(
        &self,
        credentials: &Credentials,
        scope: &str,
    ) -> FederationResult<ValidationOutcome>;

    /// Exchanges a short-lived access token for a long-lived one.
    ///
    /// # Errors
    ///
    /// Any failure is `FederationError::UpstreamExchange`.
    async fn request_long_lived_token(
        &self,
        short_lived_access_token: &str,
    ) -> FederationResult<LongLivedToken>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claims_grants() {
        let mut claims = Claims::new("108234", "client-123");
        claims.scopes = vec!["openid".to_string(), "email".to_string()];

        assert!(claims.grants("openid email"));
        assert!(claims.grants("email"));
        assert!(claims.grants(""));
        assert!(!claims.grants("openid profile"));
    }

    #[test]
    fn test_long_lived_token_deserialize() {
        let token: LongLivedToken = serde_json::from_str(
            r#"{"access_token":"EAAG.long","token_type":"bearer","expires_in":"5183944"}"#,
        )
        .unwrap();
        assert_eq!(token.access_token, "EAAG.long");
        assert_eq!(token.expires_in, Some(5_183_944));
        assert!(!format!("{:?}", token).contains("EAAG.long"));
    }
}
