//! Gantry - tenant provisioning for the IoT platform

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use gantry_cluster::{KubeClusterApi, ResourceLifecycleController};
use gantry_common::kube_utils::create_client;
use gantry_common::retry::{retry_transient, RetryConfig};
use gantry_common::telemetry::init_telemetry;
use gantry_directory::{KeyValueStore, MemoryStore, SecretStore, TenantDirectory};
use gantry_gateway::{GatewayIdentityManager, KongClient};
use gantry_provision::ProvisioningOrchestrator;
use gantry_server::{serve, AppState, DirectoryBackend, ServerConfig};
use gantry_storage::{InfluxClient, StorageNamespaceManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_telemetry(config.telemetry_config())?;

    let client = create_client(config.kubeconfig.as_deref()).await?;
    info!(namespace = %config.namespace, "connected to cluster");

    let gateway = GatewayIdentityManager::new(
        Arc::new(KongClient::new(
            &config.kong_admin_url,
            config.kong_admin_token.as_deref(),
        )?),
        config.gateway_config(),
    );
    let ping = retry_transient(&RetryConfig::default(), "gateway_ping", || gateway.ping()).await;
    if let Err(e) = ping {
        warn!(url = %config.kong_admin_url, error = %e, "gateway admin API not reachable yet");
    }

    let store: Arc<dyn KeyValueStore> = match config.directory {
        DirectoryBackend::Secret => Arc::new(SecretStore::new(client.clone(), &config.namespace)),
        DirectoryBackend::Memory => {
            warn!("using in-memory tenant directory; records are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let storage = StorageNamespaceManager::new(
        Arc::new(InfluxClient::new(
            &config.influx_url,
            &config.influx_token,
            &config.influx_org,
        )?),
        config.storage_config(),
    );

    let cluster = ResourceLifecycleController::new(Arc::new(KubeClusterApi::new(
        client,
        config.namespace.clone(),
    )));

    let orchestrator = ProvisioningOrchestrator::new(
        gateway,
        TenantDirectory::new(store),
        storage,
        cluster,
        config.provision_config(),
    );

    serve(
        config.listen,
        AppState {
            tenants: Arc::new(orchestrator),
        },
    )
    .await?;
    Ok(())
}
