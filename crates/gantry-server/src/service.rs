//! The tenant operations the HTTP API exposes

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use gantry_common::model::{RegisterInfo, RegisterRequest};
use gantry_common::Result;
use gantry_directory::Artifact;
use gantry_provision::ProvisioningOrchestrator;

/// Tenant lifecycle as seen by the router
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TenantService: Send + Sync {
    /// Provision a tenant and return its token
    async fn register(&self, request: RegisterRequest) -> Result<String>;

    /// Token of a tenant whose secret matches
    async fn login(&self, name: &str, secret: &str) -> Result<String>;

    /// Remove a tenant whose secret matches
    async fn unregister(&self, name: &str, secret: &str) -> Result<()>;

    /// Registration info of the tenant owning a token
    async fn register_info(&self, token: &str) -> Result<RegisterInfo>;

    /// The tenant's client code archive
    async fn client_artifact(&self, name: &str) -> Result<Artifact>;
}

#[async_trait]
impl TenantService for ProvisioningOrchestrator {
    async fn register(&self, request: RegisterRequest) -> Result<String> {
        ProvisioningOrchestrator::register(self, request).await
    }

    async fn login(&self, name: &str, secret: &str) -> Result<String> {
        ProvisioningOrchestrator::login(self, name, secret).await
    }

    async fn unregister(&self, name: &str, secret: &str) -> Result<()> {
        ProvisioningOrchestrator::unregister(self, name, secret).await
    }

    async fn register_info(&self, token: &str) -> Result<RegisterInfo> {
        ProvisioningOrchestrator::register_info(self, token).await
    }

    async fn client_artifact(&self, name: &str) -> Result<Artifact> {
        ProvisioningOrchestrator::client_artifact(self, name).await
    }
}
