//! OAuth2 authentication provider.
//!
//! Reconciles an externally validated identity with a local account:
//!
//! 1. **Validate** the presented credentials with the identity provider
//! 2. **Resolve** the account by subject and provider name
//! 3. **Create** the account if absent, with the configured roles
//! 4. **Bind** the account to the authentication token
//! 5. **Exchange** the access token for a long-lived one and persist it
//! 6. **Provision** a downstream profile for new accounts, if enabled
//!
//! Steps 3 to 5 are all-or-nothing. On failure the token is unbound and the
//! error propagates. An account created in this attempt is deleted unless a
//! concurrent login has written to it since.

use std::sync::Arc;

use super::endpoint::HttpTokenEndpoint;
use super::provisioning::{ProfileProvisioner, UserInfoProvisioner};
use super::signed_client::SignedApiClient;
use super::validator::{TokenValidator, ValidationOutcome};
use crate::FederationResult;
use crate::config::{FederationConfig, ProviderConfig};
use crate::error::FederationError;
use crate::storage::{
    AccessScope, Account, AccountKey, AccountStorage, ProfileStorage, Role, RoleRegistry,
    StorageError,
};
use crate::token::{
    AuthenticationOutcome, AuthenticationStatus, AuthenticationToken, CLIENT_TOKEN_KIND,
    ClientToken,
};

/// Token kinds accepted by [`OAuth2Provider`].
const SUPPORTED_TOKEN_KINDS: &[&str] = &[CLIENT_TOKEN_KIND];

/// Authentication provider backed by an external OAuth2 identity provider.
pub struct OAuth2Provider {
    name: String,
    scopes: Vec<String>,
    party_creation: bool,
    authenticate_roles: Vec<Role>,
    validator: Arc<dyn TokenValidator>,
    accounts: Arc<dyn AccountStorage>,
    provisioner: Option<Arc<dyn ProfileProvisioner>>,
}

impl OAuth2Provider {
    /// Creates a builder for the given provider configuration.
    #[must_use]
    pub fn builder(config: ProviderConfig) -> OAuth2ProviderBuilder {
        OAuth2ProviderBuilder::new(config)
    }

    /// Wires a provider against the HTTP API described by `config`.
    ///
    /// Builds the role registry, the signed API client, the token endpoint
    /// and, when party creation is enabled, the userinfo provisioner.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Configuration` if any part cannot be built.
    pub fn from_config(
        config: &FederationConfig,
        accounts: Arc<dyn AccountStorage>,
        profiles: Arc<dyn ProfileStorage>,
    ) -> FederationResult<Self> {
        let roles = RoleRegistry::from_definitions(&config.roles)?;
        let client = Arc::new(SignedApiClient::new(&config.api)?);
        let endpoint = HttpTokenEndpoint::new(
            client.clone(),
            &config.provider,
            config.api.app_secret.clone(),
        );

        let mut builder = Self::builder(config.provider.clone())
            .roles(roles)
            .validator(Arc::new(endpoint))
            .accounts(accounts.clone());

        if config.provider.party_creation {
            builder = builder.provisioner(Arc::new(UserInfoProvisioner::new(
                client,
                config.provider.userinfo_path.clone(),
                profiles,
                accounts,
            )));
        }

        builder.build()
    }

    /// Provider name; part of every account key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Roles granted to newly created accounts.
    #[must_use]
    pub fn authenticate_roles(&self) -> &[Role] {
        &self.authenticate_roles
    }

    /// Token kinds this provider accepts.
    #[must_use]
    pub fn supported_token_kinds(&self) -> &'static [&'static str] {
        SUPPORTED_TOKEN_KINDS
    }

    /// The scope parameter sent for validation: configured scopes joined by a space.
    #[must_use]
    pub fn build_scope_parameter(&self) -> String {
        self.scopes.join(" ")
    }

    /// Authenticates a token against the identity provider.
    ///
    /// Rejected credentials are returned as
    /// [`AuthenticationOutcome::WrongCredentials`] without touching storage.
    ///
    /// # Errors
    ///
    /// - `UnsupportedTokenKind` if the token is not an OAuth2 client token
    /// - `UpstreamExchange` if the long-lived exchange fails (after rollback)
    /// - `Storage` if the account store fails (after rollback)
    /// - `Provisioning` if profile creation fails; the account stays persisted
    pub async fn authenticate(
        &self,
        token: &mut dyn AuthenticationToken,
    ) -> FederationResult<AuthenticationOutcome> {
        let kind = token.kind().to_string();
        let Some(token) = token.as_client_token_mut() else {
            tracing::debug!(provider = %self.name, kind = %kind, "Token kind not supported");
            return Err(FederationError::unsupported_token_kind(kind));
        };

        let scope = self.build_scope_parameter();
        let claims = match self
            .validator
            .request_validated_token_information(token.credentials(), &scope)
            .await?
        {
            ValidationOutcome::Valid(claims) => claims,
            ValidationOutcome::Invalid { reason } => {
                tracing::warn!(provider = %self.name, reason = %reason, "Credentials rejected");
                token.set_authentication_status(AuthenticationStatus::WrongCredentials);
                return Ok(AuthenticationOutcome::WrongCredentials);
            }
        };

        // Verified by the identity provider, independent of local state.
        token.set_authentication_status(AuthenticationStatus::Successful);

        let key = AccountKey::new(&claims.subject_id, &self.name);
        let (account, is_new) = match self.resolve_account(&key).await {
            Ok(resolved) => resolved,
            Err(e) => {
                Self::unbind(token);
                return Err(e);
            }
        };

        token.set_account(Some(account.clone()));

        // Last version of the record this attempt wrote.
        let mut written = account.clone();
        let account = match self.complete_login(token, account, &mut written).await {
            Ok(account) => account,
            Err(e) => {
                tracing::error!(
                    provider = %self.name,
                    subject = %key.subject_id,
                    error = %e,
                    "Login failed, rolling back"
                );
                if is_new {
                    self.delete_created(&written).await;
                }
                Self::unbind(token);
                return Err(e);
            }
        };
        token.set_account(Some(account.clone()));

        tracing::info!(
            provider = %self.name,
            subject = %key.subject_id,
            account_id = %account.id,
            is_new,
            "Authentication successful"
        );

        if self.party_creation
            && is_new
            && let Some(provisioner) = &self.provisioner
        {
            let profile = provisioner.create_profile_for(token).await?;
            let mut account = account;
            account.profile_id = Some(profile.id);
            token.set_account(Some(account.clone()));
            return Ok(AuthenticationOutcome::Success(account));
        }

        Ok(AuthenticationOutcome::Success(account))
    }

    /// Finds the account for `key`, creating it if absent.
    ///
    /// Returns the account and whether this attempt created it.
    async fn resolve_account(&self, key: &AccountKey) -> FederationResult<(Account, bool)> {
        if let Some(account) = self.accounts.find_by_key(key, AccessScope::Internal).await? {
            return Ok((account, false));
        }

        let account = Account::new(key, self.authenticate_roles.clone());
        match self.accounts.insert(&account).await {
            Ok(()) => {
                tracing::info!(
                    provider = %self.name,
                    subject = %key.subject_id,
                    account_id = %account.id,
                    "Created account"
                );
                Ok((account, true))
            }
            Err(StorageError::Conflict(_)) => {
                // A concurrent first login won the insert.
                tracing::debug!(
                    provider = %self.name,
                    subject = %key.subject_id,
                    "Account created concurrently, using existing"
                );
                let winner = self
                    .accounts
                    .find_by_key(key, AccessScope::Internal)
                    .await?
                    .ok_or_else(|| {
                        FederationError::storage(format!(
                            "account for '{}' conflicted on insert but cannot be found",
                            key.subject_id
                        ))
                    })?;
                Ok((winner, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Exchanges the token for a long-lived one and makes the account durable.
    async fn complete_login(
        &self,
        token: &ClientToken,
        account: Account,
        written: &mut Account,
    ) -> FederationResult<Account> {
        let long_lived = self
            .validator
            .request_long_lived_token(token.credentials().access_token())
            .await?;

        // Apply onto the latest record so concurrent logins keep each other's writes.
        let mut account = self
            .accounts
            .find_by_key(&account.key(), AccessScope::Internal)
            .await?
            .filter(|current| current.id == account.id)
            .ok_or_else(|| {
                FederationError::from(StorageError::not_found(format!("account {}", account.id)))
            })?;

        account.credentials_source = Some(long_lived.access_token);
        account.authentication_attempted(AuthenticationStatus::Successful);

        self.accounts.update(&account).await?;
        *written = account.clone();
        self.accounts.persist_all().await?;

        Ok(account)
    }

    /// Removes an account this attempt created, unless another login has
    /// written to it since.
    async fn delete_created(&self, written: &Account) {
        let result = match self.accounts.delete_if_unchanged(written).await {
            Ok(true) => self.accounts.persist_all().await,
            Ok(false) => {
                tracing::info!(
                    account_id = %written.id,
                    "Account changed by a concurrent login, keeping it"
                );
                Ok(())
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::error!(
                account_id = %written.id,
                error = %e,
                "Failed to delete account during rollback"
            );
        }
    }

    fn unbind(token: &mut ClientToken) {
        token.set_account(None);
        token.set_authentication_status(AuthenticationStatus::AuthenticationNeeded);
    }
}

impl std::fmt::Debug for OAuth2Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Provider")
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .field("party_creation", &self.party_creation)
            .field("authenticate_roles", &self.authenticate_roles)
            .finish_non_exhaustive()
    }
}

/// Builder for [`OAuth2Provider`].
pub struct OAuth2ProviderBuilder {
    config: ProviderConfig,
    roles: RoleRegistry,
    validator: Option<Arc<dyn TokenValidator>>,
    accounts: Option<Arc<dyn AccountStorage>>,
    provisioner: Option<Arc<dyn ProfileProvisioner>>,
}

impl OAuth2ProviderBuilder {
    /// Creates a builder with an empty role registry.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            roles: RoleRegistry::new(),
            validator: None,
            accounts: None,
            provisioner: None,
        }
    }

    /// Sets the registry configured roles are resolved against.
    #[must_use]
    pub fn roles(mut self, roles: RoleRegistry) -> Self {
        self.roles = roles;
        self
    }

    /// Sets the token validator.
    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Sets the account store.
    #[must_use]
    pub fn accounts(mut self, accounts: Arc<dyn AccountStorage>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Sets the profile provisioner used when party creation is enabled.
    #[must_use]
    pub fn provisioner(mut self, provisioner: Arc<dyn ProfileProvisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    /// Builds the provider.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Configuration` if a collaborator is missing,
    /// a configured role is unknown, or party creation is enabled without a
    /// provisioner.
    pub fn build(self) -> FederationResult<OAuth2Provider> {
        let validator = self
            .validator
            .ok_or_else(|| FederationError::configuration("token validator is required"))?;
        let accounts = self
            .accounts
            .ok_or_else(|| FederationError::configuration("account storage is required"))?;

        if self.config.scopes.is_empty() {
            return Err(FederationError::configuration(
                "at least one scope is required",
            ));
        }

        if self.config.party_creation && self.provisioner.is_none() {
            return Err(FederationError::configuration(
                "party_creation is enabled but no profile provisioner is configured",
            ));
        }

        let authenticate_roles = self.roles.resolve_all(&self.config.authenticate_roles)?;

        Ok(OAuth2Provider {
            name: self.config.name,
            scopes: self.config.scopes,
            party_creation: self.config.party_creation,
            authenticate_roles,
            validator,
            accounts,
            provisioner: self.provisioner,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio_test::block_on;

    use super::*;
    use crate::federation::validator::LongLivedToken;
    use crate::storage::StorageResult;
    use crate::token::Credentials;

    struct NeverCalled;

    #[async_trait]
    impl TokenValidator for NeverCalled {
        async fn request_validated_token_information(
            &self,
            _credentials: &Credentials,
            _scope: &str,
        ) -> FederationResult<ValidationOutcome> {
            panic!("validator must not be called");
        }

        async fn request_long_lived_token(&self, _token: &str) -> FederationResult<LongLivedToken> {
            panic!("validator must not be called");
        }
    }

    struct NoAccounts;

    #[async_trait]
    impl AccountStorage for NoAccounts {
        async fn find_by_key(
            &self,
            _key: &AccountKey,
            _scope: AccessScope,
        ) -> StorageResult<Option<Account>> {
            Ok(None)
        }

        async fn insert(&self, _account: &Account) -> StorageResult<()> {
            Ok(())
        }

        async fn update(&self, _account: &Account) -> StorageResult<()> {
            Ok(())
        }

        async fn delete(&self, _account: &Account) -> StorageResult<()> {
            Ok(())
        }

        async fn delete_if_unchanged(&self, _account: &Account) -> StorageResult<bool> {
            Ok(false)
        }

        async fn persist_all(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    struct OtherToken;

    impl AuthenticationToken for OtherToken {
        fn kind(&self) -> &str {
            "username_password"
        }

        fn authentication_status(&self) -> AuthenticationStatus {
            AuthenticationStatus::AuthenticationNeeded
        }

        fn set_authentication_status(&mut self, _status: AuthenticationStatus) {}

        fn account(&self) -> Option<&Account> {
            None
        }
    }

    fn registry() -> RoleRegistry {
        let mut registry = RoleRegistry::new();
        registry.register(Role::parse("Acme.Site:Customer").unwrap());
        registry
    }

    fn builder(config: ProviderConfig) -> OAuth2ProviderBuilder {
        OAuth2Provider::builder(config)
            .roles(registry())
            .validator(Arc::new(NeverCalled))
            .accounts(Arc::new(NoAccounts))
    }

    #[test]
    fn test_build_resolves_roles() {
        let provider = builder(
            ProviderConfig::new("GoogleOAuth2Provider", "client-123")
                .with_authenticate_role("Acme.Site:Customer"),
        )
        .build()
        .unwrap();

        assert_eq!(provider.name(), "GoogleOAuth2Provider");
        assert_eq!(provider.authenticate_roles().len(), 1);
        assert_eq!(
            provider.authenticate_roles()[0].identifier,
            "Acme.Site:Customer"
        );
    }

    #[test]
    fn test_build_unknown_role_fails() {
        let err = builder(
            ProviderConfig::new("GoogleOAuth2Provider", "client-123")
                .with_authenticate_role("Acme.Site:Administrator"),
        )
        .build()
        .unwrap_err();

        assert!(err.is_fatal_misconfiguration());
        assert!(err.to_string().contains("Acme.Site:Administrator"));
    }

    #[test]
    fn test_build_party_creation_requires_provisioner() {
        let err = builder(
            ProviderConfig::new("GoogleOAuth2Provider", "client-123").with_party_creation(true),
        )
        .build()
        .unwrap_err();

        assert!(matches!(err, FederationError::Configuration { .. }));
    }

    #[test]
    fn test_build_requires_storage() {
        let result = OAuth2Provider::builder(ProviderConfig::new("p", "c"))
            .validator(Arc::new(NeverCalled))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_scope_parameter_and_token_kinds() {
        let provider = builder(
            ProviderConfig::new("GoogleOAuth2Provider", "client-123")
                .with_scopes(["openid", "email", "profile"]),
        )
        .build()
        .unwrap();

        assert_eq!(provider.build_scope_parameter(), "openid email profile");
        assert_eq!(provider.supported_token_kinds(), &[CLIENT_TOKEN_KIND]);
    }

    #[test]
    fn test_unsupported_token_kind() {
        let provider = builder(ProviderConfig::new("GoogleOAuth2Provider", "client-123"))
            .build()
            .unwrap();

        let mut token = OtherToken;
        let err = block_on(provider.authenticate(&mut token)).unwrap_err();

        assert!(matches!(
            err,
            FederationError::UnsupportedTokenKind { ref kind } if kind == "username_password"
        ));
    }
}
