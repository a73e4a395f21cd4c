//! Storage traits for federated accounts and profiles.
//!
//! This module defines storage interfaces for:
//!
//! - Accounts keyed by (subject id, provider name)
//! - Profiles created on first login
//! - The startup role registry
//!
//! # Implementations
//!
//! Storage implementations are provided in separate crates:
//!
//! - `oauth2-federation-memory` - in-memory backend

pub mod account;
pub mod profile;
pub mod role;

pub use account::{
    AccessScope, Account, AccountKey, AccountStorage, StorageError, StorageResult,
};
pub use profile::{Profile, ProfileStorage};
pub use role::{Role, RoleRegistry};
