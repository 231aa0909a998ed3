//! Key-value store seam and its implementations
//!
//! Keys are grouped into scopes, one per tenant. The store only needs three
//! primitives: an atomic multi-key set-if-absent, a point read, and a
//! whole-scope delete.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, DeleteParams, ObjectMeta, PostParams};
use kube::Client;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use gantry_common::kube_utils::{is_conflict, is_not_found, tenant_labels};
use gantry_common::{Error, Result};

/// Trait abstracting the directory's persistence
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write every entry into `scope` in one transaction, only if none of the
    /// keys exists yet. Returns false, writing nothing, if any key exists.
    async fn insert_if_absent(&self, scope: &str, entries: BTreeMap<String, String>)
        -> Result<bool>;

    /// Read one key
    async fn get(&self, scope: &str, key: &str) -> Result<Option<String>>;

    /// Delete every key in `scope`. Deleting an empty scope succeeds.
    async fn delete_scope(&self, scope: &str) -> Result<()>;
}

// =============================================================================
// In-memory store
// =============================================================================

/// Process-local store for development and tests
#[derive(Default)]
pub struct MemoryStore {
    scopes: DashMap<String, BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn insert_if_absent(
        &self,
        scope: &str,
        entries: BTreeMap<String, String>,
    ) -> Result<bool> {
        // The entry guard holds the shard lock across check and write
        match self.scopes.entry(scope.to_string()) {
            Entry::Occupied(mut existing) => {
                if entries.keys().any(|k| existing.get().contains_key(k)) {
                    return Ok(false);
                }
                existing.get_mut().extend(entries);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(entries);
                Ok(true)
            }
        }
    }

    async fn get(&self, scope: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .scopes
            .get(scope)
            .and_then(|entries| entries.get(key).cloned()))
    }

    async fn delete_scope(&self, scope: &str) -> Result<()> {
        self.scopes.remove(scope);
        Ok(())
    }
}

// =============================================================================
// Kubernetes Secret store
// =============================================================================

const MAX_CAS_ATTEMPTS: u32 = 5;
const CAS_BACKOFF: Duration = Duration::from_millis(50);

/// Store keeping each scope in one Kubernetes Secret.
///
/// Set-if-absent is a create when the Secret does not exist, and otherwise
/// a replace guarded by the Secret's `resourceVersion`. Either way the API
/// server rejects a concurrent writer with a conflict, which is retried
/// against fresh state.
pub struct SecretStore {
    api: Api<Secret>,
}

impl SecretStore {
    /// Create a store writing Secrets into `namespace`
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }

    fn secret_name(scope: &str) -> String {
        format!("gantry-tenant-{scope}")
    }

    /// One compare-and-swap round. `Ok(None)` means another writer won the
    /// race and the caller should try again.
    async fn try_insert(
        &self,
        scope: &str,
        entries: &BTreeMap<String, String>,
    ) -> Result<Option<bool>> {
        let name = Self::secret_name(scope);
        let encoded = entries
            .iter()
            .map(|(k, v)| (k.clone(), ByteString(v.as_bytes().to_vec())));

        match self.api.get_opt(&name).await? {
            None => {
                let secret = Secret {
                    metadata: ObjectMeta {
                        name: Some(name.clone()),
                        labels: Some(tenant_labels(scope, &name)),
                        ..Default::default()
                    },
                    data: Some(encoded.collect()),
                    type_: Some("Opaque".to_string()),
                    ..Default::default()
                };
                match self.api.create(&PostParams::default(), &secret).await {
                    Ok(_) => Ok(Some(true)),
                    Err(e) if is_conflict(&e) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            Some(mut secret) => {
                let data = secret.data.get_or_insert_with(BTreeMap::new);
                if entries.keys().any(|k| data.contains_key(k)) {
                    return Ok(Some(false));
                }
                data.extend(encoded);
                // resourceVersion from the read guards the replace
                match self.api.replace(&name, &PostParams::default(), &secret).await {
                    Ok(_) => Ok(Some(true)),
                    Err(e) if is_conflict(&e) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for SecretStore {
    async fn insert_if_absent(
        &self,
        scope: &str,
        entries: BTreeMap<String, String>,
    ) -> Result<bool> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            if let Some(inserted) = self.try_insert(scope, &entries).await? {
                return Ok(inserted);
            }
            debug!(scope = %scope, attempt, "directory write conflict, retrying");
            tokio::time::sleep(CAS_BACKOFF * attempt).await;
        }
        warn!(scope = %scope, "directory write kept conflicting");
        Err(Error::directory(format!(
            "write to {scope} conflicted {MAX_CAS_ATTEMPTS} times"
        )))
    }

    async fn get(&self, scope: &str, key: &str) -> Result<Option<String>> {
        let Some(secret) = self.api.get_opt(&Self::secret_name(scope)).await? else {
            return Ok(None);
        };
        secret
            .data
            .and_then(|mut data| data.remove(key))
            .map(|bytes| {
                String::from_utf8(bytes.0)
                    .map_err(|e| Error::directory(format!("{scope}/{key} is not UTF-8: {e}")))
            })
            .transpose()
    }

    async fn delete_scope(&self, scope: &str) -> Result<()> {
        match self
            .api
            .delete(&Self::secret_name(scope), &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
