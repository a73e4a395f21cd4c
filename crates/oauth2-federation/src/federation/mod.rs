//! Federation with an external OAuth2 identity provider.
//!
//! This module provides:
//!
//! - Signed calls against the provider's resource API
//! - The token validation contract and its HTTP implementation
//! - The authentication provider reconciling identities with local accounts
//! - Downstream profile provisioning for new accounts

pub mod endpoint;
pub mod provider;
pub mod provisioning;
pub mod signed_client;
pub mod validator;

pub use endpoint::{ACCESS_TOKEN_TYPE, HttpTokenEndpoint};
pub use provider::{OAuth2Provider, OAuth2ProviderBuilder};
pub use provisioning::{ProfileProvisioner, UserInfoProvisioner};
pub use signed_client::{
    ACCESS_TOKEN_PARAM, APPSECRET_PROOF_PARAM, QueryError, SignedApiClient, appsecret_proof,
};
pub use validator::{Claims, LongLivedToken, TokenValidator, ValidationOutcome};
