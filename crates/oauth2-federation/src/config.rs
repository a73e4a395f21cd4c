//! Federation configuration.
//!
//! Configuration is read once at startup. The [`loader`] module merges an
//! optional TOML file with `OAUTH2_FEDERATION__*` environment overrides.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::storage::Role;

/// Default resource path for token validation.
pub const DEFAULT_TOKEN_INFO_PATH: &str = "/oauth2/v3/tokeninfo";

/// Default resource path for the long-lived token exchange.
pub const DEFAULT_TOKEN_EXCHANGE_PATH: &str = "/oauth2/v4/token";

/// Default resource path for the userinfo document.
pub const DEFAULT_USERINFO_PATH: &str = "/oauth2/v3/userinfo";

/// RFC 8693 token exchange grant.
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Root federation configuration.
///
/// # Example (TOML)
///
/// ```toml
/// [provider]
/// name = "GoogleOAuth2Provider"
/// client_id = "1234.apps.googleusercontent.com"
/// scopes = ["openid", "email"]
/// party_creation = true
/// authenticate_roles = ["Acme.Site:Customer"]
///
/// [api]
/// endpoint = "https://www.googleapis.com"
/// app_secret = "..."
/// request_timeout = "10s"
///
/// [[roles]]
/// identifier = "Acme.Site:Customer"
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct FederationConfig {
    /// Authentication provider settings.
    pub provider: ProviderConfig,

    /// Identity provider API settings.
    pub api: ApiClientConfig,

    /// Roles known to this deployment.
    pub roles: Vec<RoleDefinition>,
}

/// Settings for one OAuth2 authentication provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider name; part of the account uniqueness key.
    pub name: String,

    /// OAuth client id; validated tokens must be issued for it.
    pub client_id: String,

    /// Scopes requested and required at validation time.
    pub scopes: Vec<String>,

    /// Create a downstream profile the first time an account is created.
    pub party_creation: bool,

    /// Role identifiers granted to newly created accounts.
    pub authenticate_roles: Vec<String>,

    /// Resource path used to validate access tokens.
    pub token_info_path: String,

    /// Resource path used to obtain long-lived tokens.
    pub token_exchange_path: String,

    /// Grant type sent with the long-lived exchange.
    pub exchange_grant_type: String,

    /// Resource path of the userinfo document used for profile creation.
    pub userinfo_path: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "OAuth2Provider".to_string(),
            client_id: String::new(),
            scopes: vec!["openid".to_string(), "email".to_string()],
            party_creation: false,
            authenticate_roles: Vec::new(),
            token_info_path: DEFAULT_TOKEN_INFO_PATH.to_string(),
            token_exchange_path: DEFAULT_TOKEN_EXCHANGE_PATH.to_string(),
            exchange_grant_type: TOKEN_EXCHANGE_GRANT_TYPE.to_string(),
            userinfo_path: DEFAULT_USERINFO_PATH.to_string(),
        }
    }
}

impl ProviderConfig {
    /// Creates a provider configuration with the given name and client id.
    #[must_use]
    pub fn new(name: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Enables downstream profile creation for new accounts.
    #[must_use]
    pub fn with_party_creation(mut self, enabled: bool) -> Self {
        self.party_creation = enabled;
        self
    }

    /// Adds a role granted to newly created accounts.
    #[must_use]
    pub fn with_authenticate_role(mut self, identifier: impl Into<String>) -> Self {
        self.authenticate_roles.push(identifier.into());
        self
    }
}

/// Connection settings for the identity provider's resource API.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiClientConfig {
    /// Base endpoint; resource paths are appended verbatim.
    pub endpoint: String,

    /// Shared application secret used for the app secret proof.
    pub app_secret: String,

    /// HTTP request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// PEM bundle of trust anchors replacing the built-in roots.
    pub ca_bundle: Option<PathBuf>,

    /// Whether to allow HTTP endpoints (for testing only).
    pub allow_http: bool,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://www.googleapis.com".to_string(),
            app_secret: String::new(),
            request_timeout: Duration::from_secs(30),
            ca_bundle: None,
            allow_http: false,
        }
    }
}

impl ApiClientConfig {
    /// Creates an API configuration for the given endpoint and secret.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            app_secret: app_secret.into(),
            ..Self::default()
        }
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the trust anchor bundle.
    #[must_use]
    pub fn with_ca_bundle(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_bundle = Some(path.into());
        self
    }

    /// Allows HTTP endpoints (for testing only).
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }
}

impl fmt::Debug for ApiClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClientConfig")
            .field("endpoint", &self.endpoint)
            .field("app_secret", &"[redacted]")
            .field("request_timeout", &self.request_timeout)
            .field("ca_bundle", &self.ca_bundle)
            .field("allow_http", &self.allow_http)
            .finish()
    }
}

/// A role declared by the deployment.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RoleDefinition {
    /// Fully qualified identifier, e.g. `Acme.Site:Customer`.
    pub identifier: String,

    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RoleDefinition {
    /// Creates a role definition without description.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            description: None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// The configuration sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl FederationConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` for absent required values and
    /// `ConfigError::InvalidValue` for malformed ones. Whether configured roles
    /// exist is checked later, when the role registry is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.name.trim().is_empty() {
            return Err(ConfigError::Missing("provider.name".to_string()));
        }

        if self.provider.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("provider.client_id".to_string()));
        }

        if self.provider.scopes.is_empty() {
            return Err(ConfigError::Missing("provider.scopes".to_string()));
        }

        if let Some(scope) = self
            .provider
            .scopes
            .iter()
            .find(|s| s.is_empty() || s.contains(char::is_whitespace))
        {
            return Err(ConfigError::InvalidValue(format!(
                "Invalid scope: '{}'. Scopes must be non-empty and contain no whitespace",
                scope
            )));
        }

        for identifier in &self.provider.authenticate_roles {
            Role::parse(identifier).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        }

        for path in [
            &self.provider.token_info_path,
            &self.provider.token_exchange_path,
            &self.provider.userinfo_path,
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidValue(format!(
                    "Resource path '{}' must start with '/'",
                    path
                )));
            }
        }

        if self.api.app_secret.is_empty() {
            return Err(ConfigError::Missing("api.app_secret".to_string()));
        }

        let endpoint = Url::parse(&self.api.endpoint).map_err(|e| {
            ConfigError::InvalidValue(format!("Invalid endpoint '{}': {}", self.api.endpoint, e))
        })?;

        match endpoint.scheme() {
            "https" => {}
            "http" if self.api.allow_http => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "Endpoint scheme '{}' is not allowed. Use https",
                    other
                )));
            }
        }

        if self.api.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "request_timeout must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Loading configuration from file and environment.
pub mod loader {
    use std::path::Path;

    use config::{Config, Environment, File, FileFormat};

    use super::{ConfigError, FederationConfig};

    /// Environment variable prefix, e.g. `OAUTH2_FEDERATION__API__APP_SECRET`.
    pub const ENV_PREFIX: &str = "OAUTH2_FEDERATION";

    /// Loads and validates configuration.
    ///
    /// The file is optional; environment variables override file values.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or validation fails.
    pub fn load_config(path: Option<&Path>) -> Result<FederationConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path
            && path.exists()
        {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("provider.scopes")
                .with_list_parse_key("provider.authenticate_roles"),
        );

        let config: FederationConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(
            provider = %config.provider.name,
            endpoint = %config.api.endpoint,
            roles = config.roles.len(),
            "Loaded federation configuration"
        );

        Ok(config)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn from_toml_str(content: &str) -> Result<FederationConfig, ConfigError> {
        let config: FederationConfig = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> FederationConfig {
        FederationConfig {
            provider: ProviderConfig::new("GoogleOAuth2Provider", "client-123")
                .with_authenticate_role("Acme.Site:Customer"),
            api: ApiClientConfig::new("https://www.googleapis.com", "s3cr3t"),
            roles: vec![RoleDefinition::new("Acme.Site:Customer")],
        }
    }

    #[test]
    fn test_default_provider_config() {
        let provider = ProviderConfig::default();
        assert_eq!(provider.scopes, vec!["openid", "email"]);
        assert!(!provider.party_creation);
        assert_eq!(provider.token_info_path, DEFAULT_TOKEN_INFO_PATH);
        assert_eq!(provider.exchange_grant_type, TOKEN_EXCHANGE_GRANT_TYPE);
    }

    #[test]
    fn test_valid_config_validates() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_client_id_fails_validation() {
        let mut config = valid_config();
        config.provider.client_id = String::new();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(err.to_string().contains("client_id"));
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let mut config = valid_config();
        config.api.app_secret = String::new();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("app_secret"));
    }

    #[test]
    fn test_scope_with_whitespace_fails_validation() {
        let mut config = valid_config();
        config.provider.scopes = vec!["openid email".to_string()];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_malformed_role_identifier_fails_validation() {
        let mut config = valid_config();
        config.provider.authenticate_roles = vec!["Customer".to_string()];
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }

    #[test]
    fn test_http_endpoint_requires_allow_http() {
        let mut config = valid_config();
        config.api.endpoint = "http://localhost:9000".to_string();
        assert!(config.validate().is_err());

        config.api.allow_http = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let api = ApiClientConfig::new("https://www.googleapis.com", "very-secret-value");
        let debug = format!("{:?}", api);
        assert!(!debug.contains("very-secret-value"));
        assert!(debug.contains("[redacted]"));
    }

    #[test]
    fn test_from_toml_str() {
        let toml = r#"
[provider]
name = "GoogleOAuth2Provider"
client_id = "client-123"
scopes = ["openid", "email", "profile"]
party_creation = true
authenticate_roles = ["Acme.Site:Customer"]

[api]
endpoint = "https://www.googleapis.com"
app_secret = "s3cr3t"
request_timeout = "5s"

[[roles]]
identifier = "Acme.Site:Customer"
description = "Storefront customer"
"#;

        let config = loader::from_toml_str(toml).unwrap();
        assert_eq!(config.provider.name, "GoogleOAuth2Provider");
        assert_eq!(config.provider.scopes.len(), 3);
        assert!(config.provider.party_creation);
        assert_eq!(config.api.request_timeout, Duration::from_secs(5));
        assert_eq!(config.roles.len(), 1);
        assert_eq!(
            config.roles[0].description.as_deref(),
            Some("Storefront customer")
        );
        // Unset fields keep their defaults
        assert_eq!(config.provider.userinfo_path, DEFAULT_USERINFO_PATH);
    }
}
