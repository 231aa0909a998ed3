//! Names and workload specs derived from a tenant
//!
//! Everything a registration creates in the cluster is named after the
//! tenant's DNS form, so two tenants never share an object.

use std::collections::BTreeMap;
use std::time::Duration;

use gantry_cluster::{ConfigMount, DeploymentSpec, EndpointSpec, EnvBinding, PortSpec};
use gantry_common::kube_utils::tenant_labels;
use gantry_common::DEFAULT_READINESS_TIMEOUT;
use gantry_gateway::{WorkloadEndpoint, WorkloadRole};

/// gRPC port of the collection workload
pub const GRPC_PORT: i32 = 9000;

/// HTTP port of both workloads
pub const HTTP_PORT: i32 = 8000;

/// Key of the registration info inside its config object
pub const REGISTER_INFO_FILE: &str = "register_info.json";

/// Where the config object is mounted in tenant workloads
pub const REGISTER_INFO_MOUNT: &str = "/etc/gantry/register-info";

/// Settings for the workloads a registration deploys
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionConfig {
    /// Image of the data-collection workload
    pub collection_image: String,
    /// Image of the data-processing workload
    pub processing_image: String,
    /// Replicas of the data-collection workload
    pub collection_replicas: i32,
    /// Replicas of the data-processing workload
    pub processing_replicas: i32,
    /// How long each workload may take to become ready
    pub readiness_timeout: Duration,
    /// Public domain of the platform, handed to workloads
    pub app_domain: String,
    /// Existing Secret with `url`, `org` and `token` keys for the
    /// time-series store, exposed to workloads as environment
    pub storage_secret: Option<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            collection_image: "gantry/data-collection:latest".to_string(),
            processing_image: "gantry/data-processing:latest".to_string(),
            collection_replicas: 2,
            processing_replicas: 1,
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            app_domain: "localhost".to_string(),
            storage_secret: None,
        }
    }
}

/// Config object holding the tenant's registration info
pub fn config_object_name(tenant: &str) -> String {
    format!("{tenant}-register-info")
}

/// Stateful data-collection workload and its endpoint
pub fn collection_name(tenant: &str) -> String {
    format!("{tenant}-dc")
}

/// Stateless data-processing workload and its endpoint
pub fn processing_name(tenant: &str) -> String {
    format!("{tenant}-dp")
}

/// One workload to deploy: its name, labels, pod spec and endpoint
#[derive(Clone, Debug)]
pub struct WorkloadPlan {
    /// Object name shared by the workload and its endpoint
    pub name: String,
    /// Labels stamped on both
    pub labels: BTreeMap<String, String>,
    /// Pod spec
    pub spec: DeploymentSpec,
    /// Endpoint in front of the pods
    pub endpoint: EndpointSpec,
    /// What the gateway routes to once the workload is up
    pub gateway: WorkloadEndpoint,
}

impl ProvisionConfig {
    /// Plan for the stateful data-collection workload
    pub fn collection_plan(&self, tenant: &str) -> WorkloadPlan {
        let name = collection_name(tenant);
        let ports = vec![
            PortSpec::new("grpc", GRPC_PORT),
            PortSpec::new("http", HTTP_PORT),
        ];
        let mut env = self.env(tenant);
        env.push(EnvBinding::FieldPath {
            name: "POD_NAME".to_string(),
            path: "metadata.name".to_string(),
        });
        self.plan(
            tenant,
            name,
            WorkloadRole::Collection,
            DeploymentSpec {
                replicas: self.collection_replicas,
                image: self.collection_image.clone(),
                mounts: self.mounts(tenant),
                env,
                ports,
                health_check_port: Some(GRPC_PORT),
            },
        )
    }

    /// Plan for the stateless data-processing workload
    pub fn processing_plan(&self, tenant: &str) -> WorkloadPlan {
        let name = processing_name(tenant);
        self.plan(
            tenant,
            name,
            WorkloadRole::Processing,
            DeploymentSpec {
                replicas: self.processing_replicas,
                image: self.processing_image.clone(),
                mounts: self.mounts(tenant),
                env: self.env(tenant),
                ports: vec![PortSpec::new("http", HTTP_PORT)],
                health_check_port: Some(HTTP_PORT),
            },
        )
    }

    fn plan(
        &self,
        tenant: &str,
        name: String,
        role: WorkloadRole,
        spec: DeploymentSpec,
    ) -> WorkloadPlan {
        let labels = tenant_labels(tenant, &name);
        let endpoint = EndpointSpec {
            selector: labels.clone(),
            ports: spec.ports.clone(),
        };
        let gateway = WorkloadEndpoint::new(role, name.clone());
        WorkloadPlan {
            name,
            labels,
            spec,
            endpoint,
            gateway,
        }
    }

    fn mounts(&self, tenant: &str) -> Vec<ConfigMount> {
        vec![ConfigMount::ConfigMap {
            name: config_object_name(tenant),
            mount_path: REGISTER_INFO_MOUNT.to_string(),
        }]
    }

    fn env(&self, tenant: &str) -> Vec<EnvBinding> {
        let mut env = vec![
            EnvBinding::literal("GANTRY_TENANT", tenant),
            EnvBinding::literal("APP_DOMAIN_NAME", &self.app_domain),
            EnvBinding::literal(
                "REGISTER_INFO_PATH",
                format!("{REGISTER_INFO_MOUNT}/{REGISTER_INFO_FILE}"),
            ),
        ];
        if let Some(secret) = &self.storage_secret {
            for (name, key) in [
                ("INFLUXDB_URL", "url"),
                ("INFLUXDB_ORG", "org"),
                ("INFLUXDB_TOKEN", "token"),
            ] {
                env.push(EnvBinding::SecretKey {
                    name: name.to_string(),
                    secret: secret.clone(),
                    key: key.to_string(),
                });
            }
        }
        env
    }
}
