//! Profile storage trait.
//!
//! A profile is the richer person record created once per account, on the
//! first successful login.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::StorageResult;

/// A person profile attached to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique identifier for the profile.
    pub id: String,

    /// Account the profile belongs to.
    pub account_id: String,

    /// Full name of the person.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Given name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,

    /// Family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,

    /// Primary email address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Picture URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// When the profile was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Profile {
    /// Creates an empty profile for an account.
    #[must_use]
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id: account_id.into(),
            name: None,
            given_name: None,
            family_name: None,
            email: None,
            picture: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Returns the best display name available.
    ///
    /// Priority: name > "given family" > email.
    #[must_use]
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = &self.name {
            return Some(name.clone());
        }
        match (&self.given_name, &self.family_name) {
            (Some(given), Some(family)) => Some(format!("{} {}", given, family)),
            (Some(only), None) | (None, Some(only)) => Some(only.clone()),
            (None, None) => self.email.clone(),
        }
    }
}

/// Storage operations for profiles.
#[async_trait]
pub trait ProfileStorage: Send + Sync {
    /// Store a new profile.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the account already has a profile.
    async fn create(&self, profile: &Profile) -> StorageResult<()>;

    /// Find the profile of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_account(&self, account_id: &str) -> StorageResult<Option<Profile>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_priority() {
        let mut profile = Profile::new("account-1");
        assert_eq!(profile.display_name(), None);

        profile.email = Some("jane@example.com".to_string());
        assert_eq!(profile.display_name().as_deref(), Some("jane@example.com"));

        profile.given_name = Some("Jane".to_string());
        assert_eq!(profile.display_name().as_deref(), Some("Jane"));

        profile.family_name = Some("Doe".to_string());
        assert_eq!(profile.display_name().as_deref(), Some("Jane Doe"));

        profile.name = Some("Dr. Jane Doe".to_string());
        assert_eq!(profile.display_name().as_deref(), Some("Dr. Jane Doe"));
    }
}
