//! Account model and storage trait.
//!
//! Defines the local identity record that external identities are reconciled
//! into, and the interface backends implement to persist it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::Role;
use crate::token::AuthenticationStatus;

// =============================================================================
// Account Type
// =============================================================================

/// The uniqueness key of an account: one account per external subject and provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountKey {
    /// Subject identifier issued by the identity provider.
    pub subject_id: String,

    /// Name of the authentication provider that owns the account.
    pub provider_name: String,
}

impl AccountKey {
    /// Creates a new account key.
    #[must_use]
    pub fn new(subject_id: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            provider_name: provider_name.into(),
        }
    }
}

/// A local account bound to an external identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Local identifier.
    pub id: String,

    /// External subject identifier.
    pub account_identifier: String,

    /// Authentication provider name.
    pub provider_name: String,

    /// Roles granted at creation, in configured order.
    #[serde(default)]
    pub roles: Vec<Role>,

    /// Long-lived provider token used for later calls on the user's behalf.
    ///
    /// `None` until the first successful authentication completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_source: Option<String>,

    /// Downstream profile attached on first login, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<String>,

    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the account last authenticated successfully.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_successful_authentication: Option<OffsetDateTime>,

    /// Failed attempts since the last success.
    #[serde(default)]
    pub failed_authentication_count: u32,
}

impl Account {
    /// Creates a new account for an external identity.
    #[must_use]
    pub fn new(key: &AccountKey, roles: Vec<Role>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_identifier: key.subject_id.clone(),
            provider_name: key.provider_name.clone(),
            roles,
            credentials_source: None,
            profile_id: None,
            created_at: OffsetDateTime::now_utc(),
            last_successful_authentication: None,
            failed_authentication_count: 0,
        }
    }

    /// Returns the uniqueness key of this account.
    #[must_use]
    pub fn key(&self) -> AccountKey {
        AccountKey::new(&self.account_identifier, &self.provider_name)
    }

    /// Returns `true` if the account holds the given role.
    #[must_use]
    pub fn has_role(&self, identifier: &str) -> bool {
        self.roles.iter().any(|r| r.identifier == identifier)
    }

    /// Records the result of an authentication attempt.
    pub fn authentication_attempted(&mut self, status: AuthenticationStatus) {
        match status {
            AuthenticationStatus::Successful => {
                self.last_successful_authentication = Some(OffsetDateTime::now_utc());
                self.failed_authentication_count = 0;
            }
            AuthenticationStatus::WrongCredentials => {
                self.failed_authentication_count =
                    self.failed_authentication_count.saturating_add(1);
            }
            AuthenticationStatus::AuthenticationNeeded
            | AuthenticationStatus::NoCredentialsGiven => {}
        }
    }
}

// =============================================================================
// Storage Trait
// =============================================================================

/// How a storage read relates to the caller's authorization context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessScope {
    /// The read is subject to the caller's own authorization.
    Caller,

    /// System read performed before any caller context exists.
    Internal,
}

/// Errors reported by account and profile backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A record with the same unique key already exists.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The record to update or delete does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The backend failed.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Returns `true` if this is a unique key violation.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<StorageError> for crate::FederationError {
    fn from(err: StorageError) -> Self {
        Self::storage(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage operations for accounts.
///
/// # Example
///
/// ```ignore
/// use oauth2_federation::storage::{AccessScope, AccountKey, AccountStorage};
///
/// async fn example(storage: &impl AccountStorage) {
///     let key = AccountKey::new("108234", "GoogleOAuth2Provider");
///     if let Some(account) = storage.find_by_key(&key, AccessScope::Internal).await? {
///         println!("Found account: {}", account.id);
///     }
/// }
/// ```
#[async_trait]
pub trait AccountStorage: Send + Sync {
    /// Find the account for an external identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_key(&self, key: &AccountKey, scope: AccessScope)
    -> StorageResult<Option<Account>>;

    /// Insert a new account if no account with the same key exists.
    ///
    /// The check and the insert must be atomic.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the key is already taken.
    async fn insert(&self, account: &Account) -> StorageResult<()>;

    /// Update an existing account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account doesn't exist.
    async fn update(&self, account: &Account) -> StorageResult<()>;

    /// Delete an account.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the account doesn't exist.
    async fn delete(&self, account: &Account) -> StorageResult<()>;

    /// Delete the account only if the stored record still equals `account`.
    ///
    /// The comparison and the removal must be atomic. Returns `false` and
    /// leaves the record in place if it was changed or removed since.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete_if_unchanged(&self, account: &Account) -> StorageResult<bool>;

    /// Make every pending write durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    async fn persist_all(&self) -> StorageResult<()>;
}

// =============================================================================
// Tests
// =============================================================================
