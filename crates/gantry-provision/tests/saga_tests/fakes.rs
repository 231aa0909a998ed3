//! Stateful in-memory stand-ins for the four collaborators
//!
//! Each fake keeps the objects it was asked to create so scenarios can
//! assert on what is left behind, and counts calls so a rejected request
//! can be shown to touch nothing.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use gantry_cluster::{
    ClusterApi, ClusterObject, ResourceKind, ResourceLifecycleController, WorkloadEvent,
    WorkloadStatus,
};
use gantry_common::model::{
    DeviceConfigRegisterInfo, DeviceStateRegisterInfo, FieldSchema, RegisterRequest, User,
};
use gantry_common::{Dependency, Error, Result, LABEL_NAME};
use gantry_directory::{KeyValueStore, MemoryStore, TenantDirectory};
use gantry_gateway::types::{
    ConsumerRequest, KongConsumer, KongKey, KongObject, PluginRequest, RouteRequest,
    ServiceRequest,
};
use gantry_gateway::{EntityKind, GatewayAdmin, GatewayConfig, GatewayIdentityManager};
use gantry_provision::{ProvisionConfig, ProvisioningOrchestrator};
use gantry_storage::{BucketApi, StorageConfig, StorageNamespaceManager};

fn selector_value<'a>(selector: &'a str, key: &str) -> Option<&'a str> {
    selector.split(',').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then_some(v)
    })
}

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector.split(',').all(|pair| match pair.split_once('=') {
        Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
        None => false,
    })
}

// =============================================================================
// Cluster
// =============================================================================

#[derive(Default)]
pub struct FakeCluster {
    objects: Mutex<BTreeMap<(String, String), ClusterObject>>,
    stalled: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<(ResourceKind, String)>>,
    pub calls: AtomicUsize,
}

impl FakeCluster {
    /// Workloads with this name never report ready
    pub fn stall(&self, name: &str) {
        self.stalled.lock().unwrap().insert(name.to_string());
    }

    pub fn names(&self, kind: ResourceKind) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| k == kind.as_str())
            .map(|(_, name)| name.clone())
            .collect()
    }

    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<ClusterObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(kind.as_str().to_string(), name.to_string()))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }

    pub fn deleted(&self) -> Vec<(ResourceKind, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn apply(&self, object: ClusterObject) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (object.kind().as_str().to_string(), object.name().to_string());
        self.objects.lock().unwrap().insert(key, object);
        Ok(())
    }

    async fn watch(
        &self,
        kind: ResourceKind,
        label_selector: &str,
    ) -> Result<BoxStream<'static, WorkloadEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = selector_value(label_selector, LABEL_NAME)
            .ok_or_else(|| Error::cluster(format!("{kind} watch without name selector")))?
            .to_string();
        if self.stalled.lock().unwrap().contains(&name) {
            return Ok(stream::pending().boxed());
        }
        let status = WorkloadStatus {
            name,
            desired_replicas: 1,
            ready_replicas: 1,
        };
        Ok(stream::iter([WorkloadEvent::Observed(status)])
            .chain(stream::pending())
            .boxed())
    }

    async fn delete(&self, kind: ResourceKind, name: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.deleted
            .lock()
            .unwrap()
            .push((kind, name.to_string()));
        self.objects
            .lock()
            .unwrap()
            .remove(&(kind.as_str().to_string(), name.to_string()));
        Ok(())
    }

    async fn delete_by_selector(&self, kind: ResourceKind, label_selector: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().retain(|(k, _), object| {
            k != kind.as_str() || !matches_selector(&object.labels(), label_selector)
        });
        Ok(())
    }
}

// =============================================================================
// Gateway
// =============================================================================

#[derive(Clone, Debug)]
pub struct GatewayEntry {
    pub kind: EntityKind,
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Default)]
pub struct FakeGateway {
    entries: Mutex<Vec<GatewayEntry>>,
    keys: Mutex<BTreeMap<String, String>>,
    next_id: AtomicUsize,
    pub fail_plugins: AtomicBool,
    pub fail_listing: AtomicBool,
    pub calls: AtomicUsize,
}

impl FakeGateway {
    pub fn count(&self, kind: EntityKind) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }

    pub fn names(&self, kind: EntityKind) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    fn insert(&self, kind: EntityKind, name: &str, tags: &[String], unique: bool) -> Result<String> {
        let mut entries = self.entries.lock().unwrap();
        if unique && entries.iter().any(|e| e.kind == kind && e.name == name) {
            return Err(Error::dependency_permanent(
                Dependency::Gateway,
                format!("409 Conflict: {kind} name {name} already exists"),
            ));
        }
        let id = format!("{}-{}", kind.path(), self.next_id.fetch_add(1, Ordering::SeqCst));
        entries.push(GatewayEntry {
            kind,
            id: id.clone(),
            name: name.to_string(),
            tags: tags.to_vec(),
        });
        Ok(id)
    }

    fn object(&self, kind: EntityKind, name: &str, tags: &[String], unique: bool) -> Result<KongObject> {
        let id = self.insert(kind, name, tags, unique)?;
        Ok(KongObject {
            id,
            name: Some(name.to_string()),
            tags: Some(tags.to_vec()),
        })
    }
}

#[async_trait]
impl GatewayAdmin for FakeGateway {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn create_consumer(&self, request: &ConsumerRequest) -> Result<KongConsumer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let id = self.insert(EntityKind::Consumer, &request.username, &request.tags, true)?;
        Ok(KongConsumer {
            id,
            username: Some(request.username.clone()),
            tags: Some(request.tags.clone()),
        })
    }

    async fn create_key(&self, consumer_id: &str) -> Result<KongKey> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let key = format!("key-{n}");
        self.keys
            .lock()
            .unwrap()
            .insert(key.clone(), consumer_id.to_string());
        Ok(KongKey {
            id: format!("key-auth-{n}"),
            key,
        })
    }

    async fn create_service(&self, request: &ServiceRequest) -> Result<KongObject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.object(EntityKind::Service, &request.name, &request.tags, true)
    }

    async fn create_route(&self, request: &RouteRequest) -> Result<KongObject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.object(EntityKind::Route, &request.name, &request.tags, true)
    }

    async fn create_plugin(&self, request: &PluginRequest) -> Result<KongObject> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_plugins.load(Ordering::SeqCst) {
            return Err(Error::gateway("503 Service Unavailable"));
        }
        self.object(EntityKind::Plugin, &request.name, &request.tags, false)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .unwrap()
            .retain(|e| !(e.kind == kind && e.id == id));
        if kind == EntityKind::Consumer {
            self.keys.lock().unwrap().retain(|_, owner| owner != id);
        }
        Ok(())
    }

    async fn list_by_tag(&self, kind: EntityKind, tag: &str) -> Result<Vec<KongObject>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Error::gateway("503 Service Unavailable"));
        }
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind == kind && e.tags.iter().any(|t| t == tag))
            .map(|e| KongObject {
                id: e.id.clone(),
                name: Some(e.name.clone()),
                tags: Some(e.tags.clone()),
            })
            .collect())
    }

    async fn consumer_of_key(&self, key: &str) -> Result<Option<KongConsumer>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(owner) = self.keys.lock().unwrap().get(key).cloned() else {
            return Ok(None);
        };
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.kind == EntityKind::Consumer && e.id == owner)
            .map(|e| KongConsumer {
                id: e.id.clone(),
                username: Some(e.name.clone()),
                tags: Some(e.tags.clone()),
            }))
    }
}

// =============================================================================
// Directory
// =============================================================================

/// Memory store that counts calls
#[derive(Default)]
pub struct CountingStore {
    inner: MemoryStore,
    pub calls: AtomicUsize,
}

impl CountingStore {
    /// Add one record to a scope out of band, as the build pipeline does for
    /// client code
    pub async fn put(&self, scope: &str, key: &str, value: &str) {
        let entries = BTreeMap::from([(key.to_string(), value.to_string())]);
        assert!(self.inner.insert_if_absent(scope, entries).await.unwrap());
    }
}

#[async_trait]
impl KeyValueStore for CountingStore {
    async fn insert_if_absent(
        &self,
        scope: &str,
        entries: BTreeMap<String, String>,
    ) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.insert_if_absent(scope, entries).await
    }

    async fn get(&self, scope: &str, key: &str) -> Result<Option<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(scope, key).await
    }

    async fn delete_scope(&self, scope: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_scope(scope).await
    }
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Default)]
pub struct FakeBuckets {
    buckets: Mutex<BTreeMap<String, Duration>>,
    pub calls: AtomicUsize,
}

impl FakeBuckets {
    pub fn names(&self) -> Vec<String> {
        self.buckets.lock().unwrap().keys().cloned().collect()
    }

    pub fn retention(&self, name: &str) -> Option<Duration> {
        self.buckets.lock().unwrap().get(name).copied()
    }
}

#[async_trait]
impl BucketApi for FakeBuckets {
    async fn create_bucket(&self, name: &str, retention: Duration) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut buckets = self.buckets.lock().unwrap();
        if buckets.contains_key(name) {
            return Err(Error::dependency_permanent(
                Dependency::Storage,
                format!("422: bucket with name {name} already exists"),
            ));
        }
        buckets.insert(name.to_string(), retention);
        Ok(())
    }

    async fn delete_bucket_by_name(&self, name: &str) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.buckets.lock().unwrap().remove(name).is_some())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub cluster: Arc<FakeCluster>,
    pub gateway: Arc<FakeGateway>,
    pub store: Arc<CountingStore>,
    pub buckets: Arc<FakeBuckets>,
    pub orchestrator: ProvisioningOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ProvisionConfig::default())
    }

    pub fn with_config(config: ProvisionConfig) -> Self {
        let cluster = Arc::new(FakeCluster::default());
        let gateway = Arc::new(FakeGateway::default());
        let store = Arc::new(CountingStore::default());
        let buckets = Arc::new(FakeBuckets::default());

        let orchestrator = ProvisioningOrchestrator::new(
            GatewayIdentityManager::new(
                gateway.clone(),
                GatewayConfig {
                    app_domain: "iot.example.com".to_string(),
                    ..Default::default()
                },
            ),
            TenantDirectory::new(store.clone()),
            StorageNamespaceManager::new(buckets.clone(), StorageConfig::default()),
            ResourceLifecycleController::new(cluster.clone()),
            config,
        );

        Self {
            cluster,
            gateway,
            store,
            buckets,
            orchestrator,
        }
    }

    pub fn total_calls(&self) -> usize {
        self.cluster.calls.load(Ordering::SeqCst)
            + self.gateway.calls.load(Ordering::SeqCst)
            + self.store.calls.load(Ordering::SeqCst)
            + self.buckets.calls.load(Ordering::SeqCst)
    }

    /// Nothing of any tenant remains in any collaborator
    pub fn assert_empty(&self) {
        assert!(self.cluster.is_empty(), "cluster objects left behind");
        assert!(self.gateway.is_empty(), "gateway objects left behind");
        assert!(self.buckets.names().is_empty(), "buckets left behind");
    }
}

/// A valid registration for `tenant` with one device of each kind
pub fn register_request(tenant: &str, password: &str) -> RegisterRequest {
    RegisterRequest {
        user: Some(User {
            id: tenant.to_string(),
            password: password.to_string(),
        }),
        device_config_register_infos: vec![DeviceConfigRegisterInfo {
            fields: vec![
                FieldSchema::new("id", "string"),
                FieldSchema::new("report_interval", "int32"),
            ],
        }],
        device_state_register_infos: vec![DeviceStateRegisterInfo {
            fields: vec![
                FieldSchema::new("id", "string"),
                FieldSchema::new("time", "timestamp"),
                FieldSchema {
                    warning_rule: Some(serde_json::json!({ "gt": 80.0 })),
                    ..FieldSchema::new("temperature", "double")
                },
            ],
        }],
    }
}
