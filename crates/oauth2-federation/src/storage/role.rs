//! Roles and the startup role registry.
//!
//! Role identifiers are fully qualified as `Package.Key:RoleName`. The
//! [`RoleRegistry`] is built once from configuration and is the only place
//! identifiers are turned into [`Role`] values.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RoleDefinition;
use crate::error::FederationError;

// =============================================================================
// Role Type
// =============================================================================

/// A role that can be granted to accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Role {
    /// Fully qualified identifier, e.g. `Acme.Site:Customer`.
    pub identifier: String,

    /// Package part of the identifier (`Acme.Site`).
    pub package_key: String,

    /// Name part of the identifier (`Customer`).
    pub name: String,

    /// Human-readable description of the role.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Role {
    /// Parses a fully qualified role identifier.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Configuration` if the identifier has no `:`
    /// separator or either half is empty.
    pub fn parse(identifier: &str) -> Result<Self, FederationError> {
        let (package_key, name) = identifier
            .split_once(':')
            .filter(|(package, name)| !package.is_empty() && !name.is_empty())
            .ok_or_else(|| {
                FederationError::configuration(format!(
                    "Malformed role identifier '{}'. Expected 'Package.Key:RoleName'",
                    identifier
                ))
            })?;

        if name.contains(':') {
            return Err(FederationError::configuration(format!(
                "Malformed role identifier '{}'. Only one ':' separator is allowed",
                identifier
            )));
        }

        Ok(Self {
            identifier: identifier.to_string(),
            package_key: package_key.to_string(),
            name: name.to_string(),
            description: None,
        })
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.identifier)
    }
}

// =============================================================================
// Role Registry
// =============================================================================

/// Roles known to the deployment, keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    roles: HashMap<String, Role>,
}

impl RoleRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from configured role definitions.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Configuration` for malformed or duplicate
    /// identifiers.
    pub fn from_definitions(definitions: &[RoleDefinition]) -> Result<Self, FederationError> {
        let mut registry = Self::new();
        for definition in definitions {
            let mut role = Role::parse(&definition.identifier)?;
            role.description = definition.description.clone();
            if registry.roles.contains_key(&role.identifier) {
                return Err(FederationError::configuration(format!(
                    "Role '{}' is declared more than once",
                    role.identifier
                )));
            }
            registry.roles.insert(role.identifier.clone(), role);
        }
        Ok(registry)
    }

    /// Registers a role, replacing any role with the same identifier.
    pub fn register(&mut self, role: Role) {
        self.roles.insert(role.identifier.clone(), role);
    }

    /// Returns the number of known roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns `true` if no roles are known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Resolves one role identifier.
    ///
    /// # Errors
    ///
    /// Returns `FederationError::Configuration` if the role is unknown.
    pub fn resolve(&self, identifier: &str) -> Result<Role, FederationError> {
        self.roles.get(identifier).cloned().ok_or_else(|| {
            FederationError::configuration(format!("Unknown role '{}'", identifier))
        })
    }

    /// Resolves identifiers in order, dropping repeated entries.
    ///
    /// # Errors
    ///
    /// Fails on the first unknown identifier.
    pub fn resolve_all<S: AsRef<str>>(
        &self,
        identifiers: &[S],
    ) -> Result<Vec<Role>, FederationError> {
        let mut resolved: Vec<Role> = Vec::with_capacity(identifiers.len());
        for identifier in identifiers {
            let role = self.resolve(identifier.as_ref())?;
            if !resolved.contains(&role) {
                resolved.push(role);
            }
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse() {
        let role = Role::parse("Acme.Site:Customer").unwrap();
        assert_eq!(role.identifier, "Acme.Site:Customer");
        assert_eq!(role.package_key, "Acme.Site");
        assert_eq!(role.name, "Customer");
        assert_eq!(role.to_string(), "Acme.Site:Customer");
    }

    #[test]
    fn test_role_parse_rejects_malformed() {
        assert!(Role::parse("Customer").is_err());
        assert!(Role::parse(":Customer").is_err());
        assert!(Role::parse("Acme.Site:").is_err());
        assert!(Role::parse("Acme:Site:Customer").is_err());
    }

    #[test]
    fn test_registry_from_definitions() {
        let registry = RoleRegistry::from_definitions(&[
            RoleDefinition::new("Acme.Site:Customer"),
            RoleDefinition {
                identifier: "Acme.Site:Editor".to_string(),
                description: Some("Edits content".to_string()),
            },
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        let editor = registry.resolve("Acme.Site:Editor").unwrap();
        assert_eq!(editor.description.as_deref(), Some("Edits content"));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let err = RoleRegistry::from_definitions(&[
            RoleDefinition::new("Acme.Site:Customer"),
            RoleDefinition::new("Acme.Site:Customer"),
        ])
        .unwrap_err();
        assert!(err.is_fatal_misconfiguration());
    }

    #[test]
    fn test_resolve_unknown_role_is_configuration_error() {
        let registry = RoleRegistry::new();
        let err = registry.resolve("Acme.Site:Ghost").unwrap_err();
        assert!(matches!(err, FederationError::Configuration { .. }));
        assert!(err.to_string().contains("Acme.Site:Ghost"));
    }

    #[test]
    fn test_resolve_all_keeps_order_and_drops_repeats() {
        let mut registry = RoleRegistry::new();
        registry.register(Role::parse("Acme.Site:Editor").unwrap());
        registry.register(Role::parse("Acme.Site:Customer").unwrap());

        let roles = registry
            .resolve_all(&["Acme.Site:Editor", "Acme.Site:Customer", "Acme.Site:Editor"])
            .unwrap();
        let ids: Vec<_> = roles.iter().map(|r| r.identifier.as_str()).collect();
        assert_eq!(ids, vec!["Acme.Site:Editor", "Acme.Site:Customer"]);
    }
}
