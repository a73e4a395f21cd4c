//! # oauth2-federation
//!
//! Identity federation with an external OAuth2 provider.
//!
//! This crate provides:
//! - An authentication provider that validates presented access tokens and
//!   reconciles the external identity with a local account
//! - A client for signed calls against the provider's resource API
//! - The token validation contract and an HTTP implementation of it
//! - Storage traits for accounts and profiles
//!
//! ## Modules
//!
//! - [`config`] - Provider, API and role configuration
//! - [`error`] - Error types
//! - [`federation`] - Signed client, token validation, authentication provider
//! - [`storage`] - Account, role and profile model and storage traits
//! - [`token`] - Authentication tokens and credentials

pub mod config;
pub mod error;
pub mod federation;
pub mod storage;
pub mod token;

pub use crate::config::{ApiClientConfig, ConfigError, FederationConfig, ProviderConfig};
pub use error::{ErrorCategory, FederationError};
pub use federation::{
    Claims, HttpTokenEndpoint, LongLivedToken, OAuth2Provider, OAuth2ProviderBuilder,
    ProfileProvisioner, SignedApiClient, TokenValidator, UserInfoProvisioner, ValidationOutcome,
    appsecret_proof,
};
pub use storage::{
    AccessScope, Account, AccountKey, AccountStorage, Profile, ProfileStorage, Role, RoleRegistry,
    StorageError, StorageResult,
};
pub use token::{
    AuthenticationOutcome, AuthenticationStatus, AuthenticationToken, CLIENT_TOKEN_KIND,
    ClientToken, Credentials,
};

/// Type alias for federation results.
pub type FederationResult<T> = Result<T, FederationError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use oauth2_federation::prelude::*;
/// ```
pub mod prelude {
    pub use crate::FederationResult;
    pub use crate::config::{ApiClientConfig, FederationConfig, ProviderConfig};
    pub use crate::error::{ErrorCategory, FederationError};
    pub use crate::federation::{
        OAuth2Provider, SignedApiClient, TokenValidator, ValidationOutcome,
    };
    pub use crate::storage::{AccessScope, Account, AccountKey, AccountStorage, ProfileStorage};
    pub use crate::token::{
        AuthenticationOutcome, AuthenticationStatus, AuthenticationToken, ClientToken,
        Credentials,
    };
}
