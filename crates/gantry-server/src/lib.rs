//! Gantry API server
//!
//! Wires the provisioning orchestrator to its real collaborators and serves
//! it over HTTP.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod server;
pub mod service;

pub use config::{DirectoryBackend, ServerConfig};
pub use server::{router, serve, AppState};
pub use service::TenantService;
