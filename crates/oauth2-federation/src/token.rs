//! Authentication tokens and credentials.
//!
//! An authentication token is what the surrounding authentication manager
//! hands to a provider. Providers route on capability: a token is
//! authenticated by [`crate::federation::OAuth2Provider`] only if it exposes a
//! [`ClientToken`] through [`AuthenticationToken::as_client_token_mut`].

use std::collections::HashMap;
use std::fmt;

use crate::storage::Account;

/// Kind identifier of [`ClientToken`].
pub const CLIENT_TOKEN_KIND: &str = "oauth2_client";

/// Authentication state carried by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthenticationStatus {
    /// Not yet authenticated.
    #[default]
    AuthenticationNeeded,
    /// No credentials were supplied.
    NoCredentialsGiven,
    /// The identity provider rejected the credentials.
    WrongCredentials,
    /// The identity provider verified the credentials.
    Successful,
}

impl AuthenticationStatus {
    /// Returns `true` for [`AuthenticationStatus::Successful`].
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Successful)
    }
}

impl fmt::Display for AuthenticationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationNeeded => write!(f, "authentication_needed"),
            Self::NoCredentialsGiven => write!(f, "no_credentials_given"),
            Self::WrongCredentials => write!(f, "wrong_credentials"),
            Self::Successful => write!(f, "authentication_successful"),
        }
    }
}

/// Result of [`crate::federation::OAuth2Provider::authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationOutcome {
    /// The credentials were verified and the token is bound to this account.
    Success(Account),
    /// The identity provider rejected the credentials.
    WrongCredentials,
}

impl AuthenticationOutcome {
    /// Returns the bound account on success.
    #[must_use]
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Success(account) => Some(account),
            Self::WrongCredentials => None,
        }
    }
}

/// Credentials presented by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_token: String,
    extra: HashMap<String, String>,
}

impl Credentials {
    /// Creates credentials holding a short-lived access token.
    #[must_use]
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            extra: HashMap::new(),
        }
    }

    /// Adds a provider-specific field (e.g. an authorization code).
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The short-lived access token.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// A provider-specific field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[redacted]")
            .field("fields", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A token handed to authentication providers.
pub trait AuthenticationToken: Send {
    /// Kind identifier used by the authentication manager for routing.
    fn kind(&self) -> &str;

    /// Current authentication status.
    fn authentication_status(&self) -> AuthenticationStatus;

    /// Sets the authentication status.
    fn set_authentication_status(&mut self, status: AuthenticationStatus);

    /// The account bound to this token, if any.
    fn account(&self) -> Option<&Account>;

    /// Capability accessor for OAuth2 client tokens.
    fn as_client_token_mut(&mut self) -> Option<&mut ClientToken> {
        None
    }
}

/// OAuth2 client token carrying credentials obtained from the identity provider.
#[derive(Debug, Clone)]
pub struct ClientToken {
    credentials: Credentials,
    status: AuthenticationStatus,
    account: Option<Account>,
}

impl ClientToken {
    /// Creates an unauthenticated token from presented credentials.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        let status = if credentials.access_token().is_empty() {
            AuthenticationStatus::NoCredentialsGiven
        } else {
            AuthenticationStatus::AuthenticationNeeded
        };
        Self {
            credentials,
            status,
            account: None,
        }
    }

    /// The presented credentials.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Binds or unbinds the account.
    pub fn set_account(&mut self, account: Option<Account>) {
        self.account = account;
    }
}

impl AuthenticationToken for ClientToken {
    fn kind(&self) -> &str {
        CLIENT_TOKEN_KIND
    }

    fn authentication_status(&self) -> AuthenticationStatus {
        self.status
    }

    fn set_authentication_status(&mut self, status: AuthenticationStatus) {
        self.status = status;
    }

    fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    fn as_client_token_mut(&mut self) -> Option<&mut ClientToken> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_token_initial_status() {
        let token = ClientToken::new(Credentials::new("ya29.short"));
        assert_eq!(
            token.authentication_status(),
            AuthenticationStatus::AuthenticationNeeded
        );
        assert!(token.account().is_none());
        assert_eq!(token.kind(), CLIENT_TOKEN_KIND);

        let empty = ClientToken::new(Credentials::new(""));
        assert_eq!(
            empty.authentication_status(),
            AuthenticationStatus::NoCredentialsGiven
        );
    }

    #[test]
    fn test_client_token_capability() {
        let mut token = ClientToken::new(Credentials::new("ya29.short"));
        let dyn_token: &mut dyn AuthenticationToken = &mut token;
        assert!(dyn_token.as_client_token_mut().is_some());
    }

    #[test]
    fn test_credentials_fields() {
        let credentials = Credentials::new("ya29.short").with_field("code", "4/0Ab");
        assert_eq!(credentials.access_token(), "ya29.short");
        assert_eq!(credentials.field("code"), Some("4/0Ab"));
        assert_eq!(credentials.field("missing"), None);
    }

    #[test]
    fn test_credentials_debug_redacts_token() {
        let credentials = Credentials::new("ya29.very-secret");
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("very-secret"));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(
            AuthenticationStatus::Successful.to_string(),
            "authentication_successful"
        );
        assert_eq!(
            AuthenticationStatus::WrongCredentials.to_string(),
            "wrong_credentials"
        );
        assert!(AuthenticationStatus::Successful.is_authenticated());
        assert!(!AuthenticationStatus::WrongCredentials.is_authenticated());
    }
}
