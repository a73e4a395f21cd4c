//! Downstream profile provisioning.
//!
//! When enabled, the first successful login of a new account creates a
//! [`Profile`] for it. The [`UserInfoProvisioner`] builds the profile from the
//! identity provider's userinfo document.
//!
//! # Example
//!
//! ```ignore
//! use oauth2_federation::federation::UserInfoProvisioner;
//!
//! let provisioner = UserInfoProvisioner::new(client, "/oauth2/v3/userinfo", profiles, accounts);
//! let profile = provisioner.create_profile_for(&token).await?;
//! println!("Profile {} created", profile.id);
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;

use super::signed_client::SignedApiClient;
use crate::FederationResult;
use crate::error::FederationError;
use crate::storage::{AccessScope, AccountStorage, Profile, ProfileStorage};
use crate::token::{AuthenticationToken, ClientToken};

/// Creates the downstream profile of a newly created account.
#[async_trait]
pub trait ProfileProvisioner: Send + Sync {
    /// Creates a profile for the account bound to `token`.
    ///
    /// Called at most once per account, after the account is durable.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Provisioning` if the profile cannot be created.
    async fn create_profile_for(&self, token: &ClientToken) -> FederationResult<Profile>;
}

/// Provisions profiles from the provider's userinfo document.
pub struct UserInfoProvisioner {
    client: Arc<SignedApiClient>,
    userinfo_path: String,
    profiles: Arc<dyn ProfileStorage>,
    accounts: Arc<dyn AccountStorage>,
}

impl UserInfoProvisioner {
    /// Creates a new provisioner.
    #[must_use]
    pub fn new(
        client: Arc<SignedApiClient>,
        userinfo_path: impl Into<String>,
        profiles: Arc<dyn ProfileStorage>,
        accounts: Arc<dyn AccountStorage>,
    ) -> Self {
        Self {
            client,
            userinfo_path: userinfo_path.into(),
            profiles,
            accounts,
        }
    }

    async fn fetch_userinfo(&self, access_token: &str) -> FederationResult<UserInfo> {
        let response = self
            .client
            .query(&self.userinfo_path, Method::GET, access_token)
            .await
            .map_err(|e| FederationError::provisioning(format!("userinfo request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FederationError::provisioning(format!(
                "userinfo returned HTTP {}: {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FederationError::provisioning(format!("Failed to parse userinfo: {}", e)))
    }
}

impl std::fmt::Debug for UserInfoProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserInfoProvisioner")
            .field("endpoint", &self.client.endpoint())
            .field("userinfo_path", &self.userinfo_path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProfileProvisioner for UserInfoProvisioner {
    async fn create_profile_for(&self, token: &ClientToken) -> FederationResult<Profile> {
        let Some(account) = token.account() else {
            return Err(FederationError::provisioning(
                "token has no bound account",
            ));
        };

        // The long-lived token outlives the presented one.
        let access_token = account
            .credentials_source
            .as_deref()
            .unwrap_or_else(|| token.credentials().access_token());

        let info = self.fetch_userinfo(access_token).await?;
        if let Some(sub) = &info.sub
            && sub != &account.account_identifier
        {
            return Err(FederationError::provisioning(format!(
                "userinfo subject '{}' does not match account '{}'",
                sub, account.account_identifier
            )));
        }

        let mut profile = Profile::new(&account.id);
        profile.name = info.name;
        profile.given_name = info.given_name;
        profile.family_name = info.family_name;
        profile.email = info.email;
        profile.picture = info.picture;

        self.profiles
            .create(&profile)
            .await
            .map_err(|e| FederationError::provisioning(format!("Failed to store profile: {}", e)))?;

        // Attach onto the latest record; the bound snapshot may be stale.
        let attach_failed =
            |e: String| FederationError::provisioning(format!("Failed to attach profile: {}", e));
        let mut current = self
            .accounts
            .find_by_key(&account.key(), AccessScope::Internal)
            .await
            .map_err(|e| attach_failed(e.to_string()))?
            .filter(|current| current.id == account.id)
            .ok_or_else(|| attach_failed(format!("account {} no longer exists", account.id)))?;

        current.profile_id = Some(profile.id.clone());
        self.accounts
            .update(&current)
            .await
            .map_err(|e| attach_failed(e.to_string()))?;
        self.accounts
            .persist_all()
            .await
            .map_err(|e| attach_failed(e.to_string()))?;

        tracing::info!(
            account_id = %account.id,
            profile_id = %profile.id,
            "Provisioned profile for new account"
        );

        Ok(profile)
    }
}

/// Userinfo document returned by the provider.
#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    given_name: Option<String>,
    #[serde(default)]
    family_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}
