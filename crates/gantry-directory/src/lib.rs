//! Tenant credential directory for Gantry

#![deny(missing_docs)]

pub mod credentials;
pub mod directory;
pub mod store;

pub use directory::{Artifact, TenantDirectory};
pub use store::{KeyValueStore, MemoryStore, SecretStore};
