//! Resource lifecycle controller
//!
//! Creates tenant objects and, for workloads, blocks until they serve
//! traffic. A workload that misses its deadline is deleted before the
//! timeout is reported, so a failed create leaves nothing behind for it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use gantry_common::kube_utils::format_label_selector;
use gantry_common::{Error, Result, LABEL_TENANT};

use crate::client::{ClusterApi, WorkloadStatus};
use crate::readiness::{wait_until, ReadinessOutcome};
use crate::resource::{ClusterObject, ResourceHandle, ResourceKind};
use crate::workload::{
    render_config_map, render_deployment, render_service, render_stateful_set, DeploymentSpec,
    EndpointSpec,
};

/// Creates and deletes tenant-owned cluster objects
#[derive(Clone)]
pub struct ResourceLifecycleController {
    api: Arc<dyn ClusterApi>,
}

impl ResourceLifecycleController {
    /// Create a controller over the given cluster API
    pub fn new(api: Arc<dyn ClusterApi>) -> Self {
        Self { api }
    }

    /// Apply a ConfigMap
    pub async fn create_config_object(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        data: BTreeMap<String, String>,
    ) -> Result<ResourceHandle> {
        let object = render_config_map(name, &labels, data);
        self.api.apply(object).await?;
        info!(kind = "ConfigMap", name = %name, "config object created");
        Ok(handle(name, ResourceKind::ConfigObject, &labels))
    }

    /// Apply a Deployment and wait until every replica is ready
    pub async fn create_stateless_workload(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        timeout: Duration,
        spec: DeploymentSpec,
    ) -> Result<ResourceHandle> {
        let object = render_deployment(name, &labels, spec)?;
        self.apply_and_wait(object, labels, timeout).await
    }

    /// Apply a StatefulSet and wait until every replica is ready
    pub async fn create_stateful_workload(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        timeout: Duration,
        spec: DeploymentSpec,
    ) -> Result<ResourceHandle> {
        let object = render_stateful_set(name, &labels, spec)?;
        self.apply_and_wait(object, labels, timeout).await
    }

    /// Apply a Service
    pub async fn create_network_endpoint(
        &self,
        name: &str,
        labels: BTreeMap<String, String>,
        spec: EndpointSpec,
    ) -> Result<ResourceHandle> {
        let object = render_service(name, &labels, &spec);
        self.api.apply(object).await?;
        info!(kind = "Service", name = %name, "network endpoint created");
        Ok(handle(name, ResourceKind::NetworkEndpoint, &labels))
    }

    /// Delete one object. A missing object is not an error.
    pub async fn delete(&self, handle: &ResourceHandle) -> Result<()> {
        self.api.delete(handle.kind, &handle.name).await
    }

    /// Delete every object of `kind` matching `label_selector`
    pub async fn delete_by_selector(&self, kind: ResourceKind, label_selector: &str) -> Result<()> {
        self.api.delete_by_selector(kind, label_selector).await
    }

    async fn apply_and_wait(
        &self,
        object: ClusterObject,
        labels: BTreeMap<String, String>,
        timeout: Duration,
    ) -> Result<ResourceHandle> {
        let kind = object.kind();
        let name = object.name().to_string();

        self.api.apply(object).await?;

        let events = self
            .api
            .watch(kind, &format_label_selector(&labels))
            .await?;
        match wait_until(events, timeout, WorkloadStatus::is_fully_ready).await {
            ReadinessOutcome::Ready(status) => {
                info!(
                    kind = %kind,
                    name = %name,
                    replicas = status.ready_replicas,
                    "workload ready"
                );
                Ok(handle(&name, kind, &labels))
            }
            ReadinessOutcome::Failed(reason) => {
                warn!(kind = %kind, name = %name, reason = %reason, "workload failed before ready");
                Err(Error::cluster(format!("{kind} {name} failed: {reason}")))
            }
            ReadinessOutcome::TimedOut => {
                warn!(kind = %kind, name = %name, timeout_secs = timeout.as_secs(), "workload not ready in time, deleting");
                if let Err(e) = self.api.delete(kind, &name).await {
                    warn!(kind = %kind, name = %name, error = %e, "failed to delete timed out workload");
                }
                Err(Error::provision_timeout(kind.as_str(), name, timeout))
            }
        }
    }
}

fn handle(name: &str, kind: ResourceKind, labels: &BTreeMap<String, String>) -> ResourceHandle {
    ResourceHandle {
        name: name.to_string(),
        kind,
        tenant: labels.get(LABEL_TENANT).cloned().unwrap_or_default(),
    }
}
