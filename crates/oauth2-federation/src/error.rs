//! Federation error types.
//!
//! This module defines the errors that can terminate an authentication attempt.
//! Rejected credentials are not errors: they are an expected outcome
//! and travel as [`crate::token::AuthenticationStatus::WrongCredentials`].

use std::fmt;

/// Errors that can occur while authenticating against an external identity provider.
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// The token handed to the provider is of a kind it cannot authenticate.
    #[error("Unsupported token kind: {kind}")]
    UnsupportedTokenKind {
        /// The kind identifier reported by the token.
        kind: String,
    },

    /// The deployment configuration is invalid (e.g. an unknown role identifier).
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// Exchanging the short-lived token for a long-lived one failed.
    #[error("Long-lived token exchange failed: {provider} - {message}")]
    UpstreamExchange {
        /// The identity provider name.
        provider: String,
        /// Description of the failure.
        message: String,
    },

    /// The identity provider could not be reached or answered unexpectedly
    /// outside of the exchange step.
    #[error("Identity provider error: {provider} - {message}")]
    IdentityProvider {
        /// The identity provider name.
        provider: String,
        /// Description of the error.
        message: String,
    },

    /// An error occurred while storing or retrieving accounts.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// Downstream profile creation failed.
    #[error("Profile provisioning failed: {message}")]
    Provisioning {
        /// Description of the failure.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl FederationError {
    /// Creates a new `UnsupportedTokenKind` error.
    #[must_use]
    pub fn unsupported_token_kind(kind: impl Into<String>) -> Self {
        Self::UnsupportedTokenKind { kind: kind.into() }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `UpstreamExchange` error.
    #[must_use]
    pub fn upstream_exchange(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamExchange {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `IdentityProvider` error.
    #[must_use]
    pub fn identity_provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::IdentityProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Provisioning` error.
    #[must_use]
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the caller is at fault (wrong token kind).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::UnsupportedTokenKind { .. })
    }

    /// Returns `true` if this is a server-side failure.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Returns `true` if retrying the attempt cannot help until the
    /// deployment is fixed.
    #[must_use]
    pub fn is_fatal_misconfiguration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedTokenKind { .. } => ErrorCategory::Authentication,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::UpstreamExchange { .. } => ErrorCategory::Federation,
            Self::IdentityProvider { .. } => ErrorCategory::Federation,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Provisioning { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Message safe to show to the end user.
    ///
    /// Full detail stays in the logs; the user only learns whether the
    /// attempt was refused or failed on our side.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::UnsupportedTokenKind { .. } => "Authentication denied",
            _ => "Authentication is temporarily unavailable",
        }
    }
}

/// Categories of federation errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The presented token could not be handled.
    Authentication,
    /// Configuration errors.
    Configuration,
    /// Identity provider errors.
    Federation,
    /// Infrastructure/storage errors.
    Infrastructure,
    /// Internal errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Configuration => write!(f, "configuration"),
            Self::Federation => write!(f, "federation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FederationError::unsupported_token_kind("username_password");
        assert_eq!(err.to_string(), "Unsupported token kind: username_password");

        let err = FederationError::configuration("unknown role 'Acme:Ghost'");
        assert_eq!(
            err.to_string(),
            "Configuration error: unknown role 'Acme:Ghost'"
        );

        let err = FederationError::upstream_exchange("google", "HTTP 500");
        assert_eq!(
            err.to_string(),
            "Long-lived token exchange failed: google - HTTP 500"
        );
    }

    #[test]
    fn test_error_predicates() {
        let err = FederationError::unsupported_token_kind("x");
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = FederationError::configuration("x");
        assert!(err.is_server_error());
        assert!(err.is_fatal_misconfiguration());

        let err = FederationError::upstream_exchange("google", "timeout");
        assert!(err.is_server_error());
        assert!(!err.is_fatal_misconfiguration());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            FederationError::unsupported_token_kind("x").category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            FederationError::configuration("x").category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            FederationError::upstream_exchange("google", "x").category(),
            ErrorCategory::Federation
        );
        assert_eq!(
            FederationError::storage("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(ErrorCategory::Federation.to_string(), "federation");
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = FederationError::upstream_exchange("google", "secret detail 10.0.0.3");
        assert!(!err.public_message().contains("10.0.0.3"));
        assert_eq!(
            FederationError::unsupported_token_kind("x").public_message(),
            "Authentication denied"
        );
    }
}
