//! In-memory storage backends for oauth2-federation.
//!
//! Provides [`InMemoryAccountStorage`] and [`InMemoryProfileStorage`]. Both are
//! safe to share between concurrent authentication attempts; account inserts
//! enforce the (subject id, provider name) uniqueness atomically.

mod account;
mod profile;

pub use account::{InMemoryAccountStorage, StorageStats};
pub use profile::InMemoryProfileStorage;
