use std::sync::Arc;

use anyhow::Result;
use oauth2_federation::config::FederationConfig;
use oauth2_federation::federation::OAuth2Provider;
use oauth2_federation_memory::{InMemoryAccountStorage, InMemoryProfileStorage};

use crate::output::{print_field, print_success};

pub fn run(config: &FederationConfig) -> Result<()> {
    // Wiring resolves roles and loads the CA bundle, so misconfiguration surfaces here.
    let provider = OAuth2Provider::from_config(
        config,
        Arc::new(InMemoryAccountStorage::new()),
        Arc::new(InMemoryProfileStorage::new()),
    )?;

    print_field("Provider", provider.name());
    print_field("Client ID", &config.provider.client_id);
    print_field("Scope", provider.build_scope_parameter());
    print_field("Endpoint", &config.api.endpoint);
    print_field(
        "CA bundle",
        config
            .api
            .ca_bundle
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in roots)".to_string()),
    );
    print_field("Party creation", config.provider.party_creation);

    let roles: Vec<&str> = provider
        .authenticate_roles()
        .iter()
        .map(|r| r.identifier.as_str())
        .collect();
    print_field(
        "Roles",
        if roles.is_empty() {
            "(none)".to_string()
        } else {
            roles.join(", ")
        },
    );
    print_field("Token kinds", provider.supported_token_kinds().join(", "));

    print_success("Configuration is valid");
    Ok(())
}
