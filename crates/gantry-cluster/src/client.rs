//! Cluster API seam
//!
//! [`ClusterApi`] is the narrow surface the lifecycle controller needs from
//! Kubernetes: apply, watch a workload's readiness, delete. Production code
//! uses [`KubeClusterApi`]; tests mock the trait.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::api::Api;
use kube::runtime::watcher::{self, Event};
use kube::{Client, ResourceExt};
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use gantry_common::{Error, Result};

use crate::resource::{ClusterObject, ResourceKind};

/// Replica counts observed on a workload
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadStatus {
    /// Workload name
    pub name: String,
    /// `spec.replicas`
    pub desired_replicas: i32,
    /// `status.readyReplicas`
    pub ready_replicas: i32,
}

impl WorkloadStatus {
    /// Ready replica count equals the desired count
    pub fn is_fully_ready(&self) -> bool {
        self.ready_replicas == self.desired_replicas
    }
}

/// Change event for a watched workload
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkloadEvent {
    /// The workload was created or modified
    Observed(WorkloadStatus),
    /// The workload was deleted
    Deleted {
        /// Workload name
        name: String,
    },
    /// The watch itself failed
    Error(String),
}

/// Trait abstracting the Kubernetes calls used by the lifecycle controller
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Server-side apply an object
    async fn apply(&self, object: ClusterObject) -> Result<()>;

    /// Subscribe to change events of workloads of `kind` matching `label_selector`.
    ///
    /// The stream starts with the current state of every match. Dropping it
    /// ends the subscription.
    async fn watch(
        &self,
        kind: ResourceKind,
        label_selector: &str,
    ) -> Result<BoxStream<'static, WorkloadEvent>>;

    /// Delete one object. Succeeds if the object does not exist.
    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()>;

    /// Delete every object of `kind` matching `label_selector`. Succeeds on
    /// zero matches.
    async fn delete_by_selector(&self, kind: ResourceKind, label_selector: &str) -> Result<()>;
}

/// [`ClusterApi`] backed by a kube-rs client scoped to one namespace
pub struct KubeClusterApi {
    client: Client,
    namespace: String,
}

impl KubeClusterApi {
    /// Create a client for `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn watch_typed<K>(&self, label_selector: &str) -> BoxStream<'static, WorkloadEvent>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope, DynamicType = ()>
            + ReplicaCounts
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug
            + Send
            + 'static,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), &self.namespace);
        let config = watcher::Config::default().labels(label_selector);
        watcher::watcher(api, config)
            .filter_map(|event| async move {
                match event {
                    Ok(Event::Apply(obj)) | Ok(Event::InitApply(obj)) => {
                        Some(WorkloadEvent::Observed(obj.workload_status()))
                    }
                    Ok(Event::Delete(obj)) => Some(WorkloadEvent::Deleted {
                        name: obj.name_any(),
                    }),
                    Ok(Event::Init) | Ok(Event::InitDone) => {
                        trace!("watch resync");
                        None
                    }
                    Err(e) => Some(WorkloadEvent::Error(e.to_string())),
                }
            })
            .boxed()
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn apply(&self, object: ClusterObject) -> Result<()> {
        object.apply(&self.client, &self.namespace).await
    }

    async fn watch(
        &self,
        kind: ResourceKind,
        label_selector: &str,
    ) -> Result<BoxStream<'static, WorkloadEvent>> {
        match kind {
            ResourceKind::StatelessWorkload => Ok(self.watch_typed::<Deployment>(label_selector)),
            ResourceKind::StatefulWorkload => Ok(self.watch_typed::<StatefulSet>(label_selector)),
            other => Err(Error::cluster(format!("{other} has no readiness to watch"))),
        }
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        kind.delete_named(&self.client, &self.namespace, name).await
    }

    async fn delete_by_selector(&self, kind: ResourceKind, label_selector: &str) -> Result<()> {
        kind.delete_by_selector(&self.client, &self.namespace, label_selector)
            .await
    }
}

/// Replica counts of a workload object
pub trait ReplicaCounts {
    /// Snapshot of desired vs ready replicas
    fn workload_status(&self) -> WorkloadStatus;
}

impl ReplicaCounts for Deployment {
    fn workload_status(&self) -> WorkloadStatus {
        WorkloadStatus {
            name: self.name_any(),
            desired_replicas: self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            ready_replicas: self
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0),
        }
    }
}

impl ReplicaCounts for StatefulSet {
    fn workload_status(&self) -> WorkloadStatus {
        WorkloadStatus {
            name: self.name_any(),
            desired_replicas: self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1),
            ready_replicas: self
                .status
                .as_ref()
                .and_then(|s| s.ready_replicas)
                .unwrap_or(0),
        }
    }
}
