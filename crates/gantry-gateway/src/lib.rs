//! Gateway identities and route sets for Gantry tenants
//!
//! Every tenant gets a Kong consumer with a key-auth credential, and each of
//! its workloads is published as a group of services, routes and key-auth
//! plugins tagged with the tenant name. The tag is what unregistration uses
//! to find and remove the whole set.

#![deny(missing_docs)]

pub mod admin;
pub mod manager;
pub mod types;

pub use admin::{GatewayAdmin, KongClient};
pub use manager::{
    GatewayConfig, GatewayIdentity, GatewayIdentityManager, WorkloadEndpoint, WorkloadRole,
};
pub use types::EntityKind;
