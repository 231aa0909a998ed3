//! Resource kinds and handles
//!
//! Every object Gantry creates in the cluster is one of four kinds. Each kind
//! knows how to delete itself by name and by label selector against its
//! typed kube API, so callers never dispatch on strings.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use gantry_common::kube_utils::is_not_found;
use gantry_common::{Result, FIELD_MANAGER};

/// Kind of a tenant-owned cluster object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// ConfigMap holding tenant data mounted into workloads
    ConfigObject,
    /// Deployment
    StatelessWorkload,
    /// StatefulSet
    StatefulWorkload,
    /// Service
    NetworkEndpoint,
}

impl ResourceKind {
    /// Every kind, in the order bulk deletion visits them
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::NetworkEndpoint,
        ResourceKind::StatelessWorkload,
        ResourceKind::StatefulWorkload,
        ResourceKind::ConfigObject,
    ];

    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ConfigObject => "ConfigMap",
            ResourceKind::StatelessWorkload => "Deployment",
            ResourceKind::StatefulWorkload => "StatefulSet",
            ResourceKind::NetworkEndpoint => "Service",
        }
    }

    /// Delete one object of this kind. A missing object is not an error.
    pub async fn delete_named(&self, client: &Client, namespace: &str, name: &str) -> Result<()> {
        match self {
            ResourceKind::ConfigObject => delete_one::<ConfigMap>(client, namespace, name).await,
            ResourceKind::StatelessWorkload => {
                delete_one::<Deployment>(client, namespace, name).await
            }
            ResourceKind::StatefulWorkload => {
                delete_one::<StatefulSet>(client, namespace, name).await
            }
            ResourceKind::NetworkEndpoint => delete_one::<Service>(client, namespace, name).await,
        }
    }

    /// Delete every object of this kind matching `selector`. Zero matches is
    /// not an error.
    pub async fn delete_by_selector(
        &self,
        client: &Client,
        namespace: &str,
        selector: &str,
    ) -> Result<()> {
        match self {
            ResourceKind::ConfigObject => {
                delete_matching::<ConfigMap>(client, namespace, selector).await
            }
            ResourceKind::StatelessWorkload => {
                delete_matching::<Deployment>(client, namespace, selector).await
            }
            ResourceKind::StatefulWorkload => {
                delete_matching::<StatefulSet>(client, namespace, selector).await
            }
            ResourceKind::NetworkEndpoint => {
                delete_matching::<Service>(client, namespace, selector).await
            }
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to an object created by the lifecycle controller
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceHandle {
    /// Object name
    pub name: String,
    /// Object kind
    pub kind: ResourceKind,
    /// Owning tenant
    pub tenant: String,
}

/// A fully rendered object ready for server-side apply
#[derive(Clone, Debug)]
pub enum ClusterObject {
    /// ConfigMap
    ConfigMap(ConfigMap),
    /// Deployment
    Deployment(Deployment),
    /// StatefulSet
    StatefulSet(StatefulSet),
    /// Service
    Service(Service),
}

impl ClusterObject {
    /// Kind of the wrapped object
    pub fn kind(&self) -> ResourceKind {
        match self {
            ClusterObject::ConfigMap(_) => ResourceKind::ConfigObject,
            ClusterObject::Deployment(_) => ResourceKind::StatelessWorkload,
            ClusterObject::StatefulSet(_) => ResourceKind::StatefulWorkload,
            ClusterObject::Service(_) => ResourceKind::NetworkEndpoint,
        }
    }

    fn metadata(&self) -> &ObjectMeta {
        match self {
            ClusterObject::ConfigMap(o) => &o.metadata,
            ClusterObject::Deployment(o) => &o.metadata,
            ClusterObject::StatefulSet(o) => &o.metadata,
            ClusterObject::Service(o) => &o.metadata,
        }
    }

    /// Name of the wrapped object
    pub fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    /// Labels of the wrapped object
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata().labels.clone().unwrap_or_default()
    }

    /// Server-side apply the object with the Gantry field manager
    pub async fn apply(&self, client: &Client, namespace: &str) -> Result<()> {
        match self {
            ClusterObject::ConfigMap(o) => apply_one(client, namespace, self.name(), o).await,
            ClusterObject::Deployment(o) => apply_one(client, namespace, self.name(), o).await,
            ClusterObject::StatefulSet(o) => apply_one(client, namespace, self.name(), o).await,
            ClusterObject::Service(o) => apply_one(client, namespace, self.name(), o).await,
        }
    }
}

async fn apply_one<K>(client: &Client, namespace: &str, name: &str, object: &K) -> Result<()>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Serialize
        + fmt::Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let params = PatchParams::apply(FIELD_MANAGER).force();
    api.patch(name, &params, &Patch::Apply(object)).await?;
    debug!(kind = %K::kind(&Default::default()), name = %name, "applied");
    Ok(())
}

async fn delete_one<K>(client: &Client, namespace: &str, name: &str) -> Result<()>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + fmt::Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    match api.delete(name, &DeleteParams::background()).await {
        Ok(_) => {
            debug!(kind = %K::kind(&Default::default()), name = %name, "deleted");
            Ok(())
        }
        Err(e) if is_not_found(&e) => {
            debug!(kind = %K::kind(&Default::default()), name = %name, "already absent");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// List-then-delete so every kind behaves the same, including Services which
/// do not support collection deletes on every API server version.
async fn delete_matching<K>(client: &Client, namespace: &str, selector: &str) -> Result<()>
where
    K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + fmt::Debug,
    <K as Resource>::DynamicType: Default,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let list = api.list(&ListParams::default().labels(selector)).await?;

    let mut first_error = None;
    for item in list.items {
        let Some(name) = item.meta().name.clone() else {
            continue;
        };
        if let Err(e) = delete_one::<K>(client, namespace, &name).await {
            warn!(kind = %K::kind(&Default::default()), name = %name, error = %e, "delete failed");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
