//! Command line and environment configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use gantry_common::telemetry::{LogFormat, TelemetryConfig};
use gantry_gateway::GatewayConfig;
use gantry_provision::ProvisionConfig;
use gantry_storage::StorageConfig;

const DAY_SECS: u64 = 24 * 60 * 60;

/// Where tenant credentials are kept
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DirectoryBackend {
    /// One Kubernetes Secret per tenant
    Secret,
    /// Process memory; lost on restart
    Memory,
}

/// Gantry - tenant provisioning for the IoT platform
#[derive(Parser, Debug, Clone)]
#[command(name = "gantry", version, about, long_about = None)]
pub struct ServerConfig {
    /// Address the HTTP API listens on
    #[arg(long, env = "GANTRY_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Namespace tenant workloads and directory records live in
    #[arg(long, env = "GANTRY_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Kubeconfig path; in-cluster config when omitted
    #[arg(long, env = "GANTRY_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Public domain routes are published under
    #[arg(long, env = "GANTRY_APP_DOMAIN", default_value = "localhost")]
    pub app_domain: String,

    /// Kong admin API
    #[arg(long, env = "GANTRY_KONG_ADMIN_URL", default_value = "http://kong-admin:8001")]
    pub kong_admin_url: String,

    /// Kong admin token, sent as `Kong-Admin-Token`
    #[arg(long, env = "GANTRY_KONG_ADMIN_TOKEN", hide_env_values = true)]
    pub kong_admin_token: Option<String>,

    /// InfluxDB v2 API
    #[arg(long, env = "GANTRY_INFLUX_URL", default_value = "http://influxdb:8086")]
    pub influx_url: String,

    /// InfluxDB API token
    #[arg(long, env = "GANTRY_INFLUX_TOKEN", hide_env_values = true)]
    pub influx_token: String,

    /// InfluxDB organization owning tenant buckets
    #[arg(long, env = "GANTRY_INFLUX_ORG", default_value = "gantry")]
    pub influx_org: String,

    /// Secret with `url`, `org` and `token` keys exposed to tenant workloads
    #[arg(long, env = "GANTRY_INFLUX_SECRET")]
    pub influx_secret: Option<String>,

    /// Tenant directory backend
    #[arg(long, env = "GANTRY_DIRECTORY", value_enum, default_value = "secret")]
    pub directory: DirectoryBackend,

    /// Image of the data-collection workload
    #[arg(
        long,
        env = "GANTRY_COLLECTION_IMAGE",
        default_value = "gantry/data-collection:latest"
    )]
    pub collection_image: String,

    /// Image of the data-processing workload
    #[arg(
        long,
        env = "GANTRY_PROCESSING_IMAGE",
        default_value = "gantry/data-processing:latest"
    )]
    pub processing_image: String,

    /// Replicas of the data-collection workload
    #[arg(long, env = "GANTRY_COLLECTION_REPLICAS", default_value_t = 2)]
    pub collection_replicas: i32,

    /// Replicas of the data-processing workload
    #[arg(long, env = "GANTRY_PROCESSING_REPLICAS", default_value_t = 1)]
    pub processing_replicas: i32,

    /// Seconds a workload may take to become ready
    #[arg(long, env = "GANTRY_READINESS_TIMEOUT_SECS", default_value_t = 300)]
    pub readiness_timeout_secs: u64,

    /// Days device state and warnings are kept
    #[arg(long, env = "GANTRY_LONG_RETENTION_DAYS", default_value_t = 30)]
    pub long_retention_days: u64,

    /// Days derived warning-detection data is kept
    #[arg(long, env = "GANTRY_SHORT_RETENTION_DAYS", default_value_t = 1)]
    pub short_retention_days: u64,

    /// Log output: json or text
    #[arg(long, env = "GANTRY_LOG_FORMAT", default_value = "json")]
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Settings for the registration saga
    pub fn provision_config(&self) -> ProvisionConfig {
        ProvisionConfig {
            collection_image: self.collection_image.clone(),
            processing_image: self.processing_image.clone(),
            collection_replicas: self.collection_replicas,
            processing_replicas: self.processing_replicas,
            readiness_timeout: Duration::from_secs(self.readiness_timeout_secs),
            app_domain: self.app_domain.clone(),
            storage_secret: self.influx_secret.clone(),
        }
    }

    /// Settings for gateway route publishing
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            app_domain: self.app_domain.clone(),
            ..Default::default()
        }
    }

    /// Bucket retention policy
    pub fn storage_config(&self) -> StorageConfig {
        let long = Duration::from_secs(self.long_retention_days * DAY_SECS);
        StorageConfig {
            state_retention: long,
            derived_retention: Duration::from_secs(self.short_retention_days * DAY_SECS),
            warning_retention: long,
        }
    }

    /// Log setup
    pub fn telemetry_config(&self) -> TelemetryConfig {
        TelemetryConfig {
            service_name: "gantry".to_string(),
            format: self.log_format,
        }
    }
}
