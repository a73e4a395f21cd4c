use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use oauth2_federation::storage::{
    AccessScope, Account, AccountKey, AccountStorage, StorageError, StorageResult,
};

/// Operation counters of an [`InMemoryAccountStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageStats {
    /// Accounts inserted.
    pub inserts: u64,
    /// Inserts rejected because the key was taken.
    pub conflicts: u64,
    /// Successful updates.
    pub updates: u64,
    /// Accounts removed, including rollback removals.
    pub deletes: u64,
    /// Calls to `persist_all`.
    pub flushes: u64,
    /// Lookups made with [`AccessScope::Internal`].
    pub internal_lookups: u64,
}

#[derive(Debug, Default)]
struct Counters {
    inserts: AtomicU64,
    conflicts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    flushes: AtomicU64,
    internal_lookups: AtomicU64,
}

/// In-memory account store.
///
/// Accounts are keyed by [`AccountKey`]; [`AccountStorage::insert`] uses the
/// map entry API so the existence check and the insert happen under one shard
/// lock. Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountStorage {
    accounts: Arc<DashMap<AccountKey, Account>>,
    counters: Arc<Counters>,
}

impl InMemoryAccountStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if no account is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// All stored accounts, in no particular order.
    #[must_use]
    pub fn accounts(&self) -> Vec<Account> {
        self.accounts.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Snapshot of the operation counters.
    #[must_use]
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            inserts: self.counters.inserts.load(Ordering::Relaxed),
            conflicts: self.counters.conflicts.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            deletes: self.counters.deletes.load(Ordering::Relaxed),
            flushes: self.counters.flushes.load(Ordering::Relaxed),
            internal_lookups: self.counters.internal_lookups.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl AccountStorage for InMemoryAccountStorage {
    async fn find_by_key(
        &self,
        key: &AccountKey,
        scope: AccessScope,
    ) -> StorageResult<Option<Account>> {
        if scope == AccessScope::Internal {
            self.counters.internal_lookups.fetch_add(1, Ordering::Relaxed);
        }
        Ok(self.accounts.get(key).map(|entry| entry.value().clone()))
    }

    async fn insert(&self, account: &Account) -> StorageResult<()> {
        match self.accounts.entry(account.key()) {
            Entry::Occupied(_) => {
                self.counters.conflicts.fetch_add(1, Ordering::Relaxed);
                Err(StorageError::conflict(format!(
                    "account for subject '{}' at provider '{}' already exists",
                    account.account_identifier, account.provider_name
                )))
            }
            Entry::Vacant(entry) => {
                entry.insert(account.clone());
                self.counters.inserts.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(account_id = %account.id, "Inserted account");
                Ok(())
            }
        }
    }

    async fn update(&self, account: &Account) -> StorageResult<()> {
        match self.accounts.get_mut(&account.key()) {
            Some(mut stored) if stored.id == account.id => {
                *stored = account.clone();
                self.counters.updates.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            _ => Err(StorageError::not_found(format!("account {}", account.id))),
        }
    }

    async fn delete(&self, account: &Account) -> StorageResult<()> {
        match self
            .accounts
            .remove_if(&account.key(), |_, stored| stored.id == account.id)
        {
            Some(_) => {
                self.counters.deletes.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            None => Err(StorageError::not_found(format!("account {}", account.id))),
        }
    }

    async fn delete_if_unchanged(&self, account: &Account) -> StorageResult<bool> {
        let removed = self
            .accounts
            .remove_if(&account.key(), |_, stored| stored == account)
            .is_some();
        if removed {
            self.counters.deletes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(removed)
    }

    async fn persist_all(&self) -> StorageResult<()> {
        // Writes are visible immediately; only count the flush point.
        self.counters.flushes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use oauth2_federation::storage::Role;

    use super::*;

    fn account(subject: &str) -> Account {
        let role = Role::parse("Acme.Site:Customer").unwrap();
        Account::new(&AccountKey::new(subject, "GoogleOAuth2Provider"), vec![role])
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let storage = InMemoryAccountStorage::new();
        let account = account("108234");

        storage.insert(&account).await.unwrap();

        let found = storage
            .find_by_key(&account.key(), AccessScope::Internal)
            .await
            .unwrap();
        assert_eq!(found, Some(account));
        assert_eq!(storage.stats().internal_lookups, 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_conflicts() {
        let storage = InMemoryAccountStorage::new();
        storage.insert(&account("108234")).await.unwrap();

        let err = storage.insert(&account("108234")).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.stats().conflicts, 1);
    }

    #[tokio::test]
    async fn test_same_subject_different_provider() {
        let storage = InMemoryAccountStorage::new();
        storage.insert(&account("108234")).await.unwrap();

        let other = Account::new(&AccountKey::new("108234", "FacebookOAuth2Provider"), vec![]);
        storage.insert(&other).await.unwrap();

        assert_eq!(storage.len(), 2);
    }

    #[tokio::test]
    async fn test_update() {
        let storage = InMemoryAccountStorage::new();
        let mut account = account("108234");
        storage.insert(&account).await.unwrap();

        account.credentials_source = Some("long-lived".to_string());
        storage.update(&account).await.unwrap();

        let found = storage
            .find_by_key(&account.key(), AccessScope::Caller)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.credentials_source.as_deref(), Some("long-lived"));
        assert_eq!(storage.stats().internal_lookups, 0);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let storage = InMemoryAccountStorage::new();
        let err = storage.update(&account("108234")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_only_removes_same_account() {
        let storage = InMemoryAccountStorage::new();
        let stored = account("108234");
        storage.insert(&stored).await.unwrap();

        // Same key, different account id
        let impostor = account("108234");
        assert!(storage.delete(&impostor).await.is_err());
        assert_eq!(storage.len(), 1);

        storage.delete(&stored).await.unwrap();
        assert!(storage.is_empty());
        assert_eq!(storage.stats().deletes, 1);
    }

    #[tokio::test]
    async fn test_delete_if_unchanged_keeps_newer_record() {
        let storage = InMemoryAccountStorage::new();
        let created = account("108234");
        storage.insert(&created).await.unwrap();

        let mut completed = created.clone();
        completed.credentials_source = Some("long-lived".to_string());
        storage.update(&completed).await.unwrap();

        assert!(!storage.delete_if_unchanged(&created).await.unwrap());
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.stats().deletes, 0);

        assert!(storage.delete_if_unchanged(&completed).await.unwrap());
        assert!(storage.is_empty());
        assert!(!storage.delete_if_unchanged(&completed).await.unwrap());
        assert_eq!(storage.stats().deletes, 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let storage = InMemoryAccountStorage::new();
        let clone = storage.clone();
        clone.insert(&account("108234")).await.unwrap();
        clone.persist_all().await.unwrap();

        assert_eq!(storage.len(), 1);
        assert_eq!(storage.stats().flushes, 1);
    }
}
