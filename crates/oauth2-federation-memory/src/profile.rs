use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use oauth2_federation::storage::{Profile, ProfileStorage, StorageError, StorageResult};

/// In-memory profile store, one profile per account.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProfileStorage {
    // account id -> profile
    profiles: Arc<DashMap<String, Profile>>,
}

impl InMemoryProfileStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns `true` if no profile is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl ProfileStorage for InMemoryProfileStorage {
    async fn create(&self, profile: &Profile) -> StorageResult<()> {
        match self.profiles.entry(profile.account_id.clone()) {
            Entry::Occupied(_) => Err(StorageError::conflict(format!(
                "account {} already has a profile",
                profile.account_id
            ))),
            Entry::Vacant(entry) => {
                entry.insert(profile.clone());
                Ok(())
            }
        }
    }

    async fn find_by_account(&self, account_id: &str) -> StorageResult<Option<Profile>> {
        Ok(self.profiles.get(account_id).map(|entry| entry.value().clone()))
    }
}
