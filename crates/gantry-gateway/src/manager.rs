//! Gateway identity manager
//!
//! Issues each tenant a consumer and access key, publishes the tenant's
//! workloads behind tagged route sets, and tears all of it down by tag.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use gantry_common::{Error, Result};

use crate::admin::GatewayAdmin;
use crate::types::{
    ConsumerRequest, EntityKind, KeyAuthConfig, NameRef, PluginRequest, RouteRequest,
    ServiceRequest,
};

/// Header the gateway uses to pick a tenant's upstream
pub const SERVICE_TYPE_HEADER: &str = "X-Service-Type";

/// Header or query parameter carrying the tenant's access key
pub const API_KEY_NAME: &str = "X-Api-Key";

/// Gateway settings shared by every tenant
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Public host name the tenant routes match on
    pub app_domain: String,
    /// Upstream connect/read/write timeout in milliseconds
    pub service_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_domain: "localhost".to_string(),
            service_timeout_ms: 600_000,
        }
    }
}

/// Consumer and key issued to one registration attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayIdentity {
    /// Kong consumer id
    pub consumer_id: String,
    /// Access key handed to the tenant as its token
    pub api_key: String,
}

/// Which of a tenant's two workloads an endpoint belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadRole {
    /// Device data collection: gRPC ingest plus an HTTP config-update hook
    Collection,
    /// Data processing: HTTP query API plus warning push over WebSocket
    Processing,
}

/// In-cluster address of a workload's network endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadEndpoint {
    /// Workload role
    pub role: WorkloadRole,
    /// Service host name inside the cluster
    pub host: String,
    /// gRPC port
    pub grpc_port: u16,
    /// HTTP port
    pub http_port: u16,
}

impl WorkloadEndpoint {
    /// Endpoint on the default ports (gRPC 9000, HTTP 8000)
    pub fn new(role: WorkloadRole, host: impl Into<String>) -> Self {
        Self {
            role,
            host: host.into(),
            grpc_port: 9000,
            http_port: 8000,
        }
    }
}

/// Manages tenant identities and route sets in the gateway
#[derive(Clone)]
pub struct GatewayIdentityManager {
    admin: Arc<dyn GatewayAdmin>,
    config: GatewayConfig,
}

impl GatewayIdentityManager {
    /// Create a manager over the given admin API
    pub fn new(admin: Arc<dyn GatewayAdmin>, config: GatewayConfig) -> Self {
        Self { admin, config }
    }

    /// Check the gateway admin API is reachable
    pub async fn ping(&self) -> Result<()> {
        self.admin.ping().await
    }

    /// Create a consumer tagged with the tenant and issue it an access key.
    ///
    /// The consumer username carries a per-attempt suffix so concurrent
    /// attempts for the same tenant never collide in the gateway. If the key
    /// cannot be issued the consumer is removed before returning.
    pub async fn create_consumer_and_key(&self, tenant: &str) -> Result<GatewayIdentity> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let request = ConsumerRequest {
            username: format!("{}.{}", tenant, &suffix[..12]),
            tags: vec![tenant.to_string()],
        };
        let consumer = self.admin.create_consumer(&request).await?;

        match self.admin.create_key(&consumer.id).await {
            Ok(key) => {
                info!(tenant = %tenant, consumer = %consumer.id, "gateway identity created");
                Ok(GatewayIdentity {
                    consumer_id: consumer.id,
                    api_key: key.key,
                })
            }
            Err(e) => {
                if let Err(cleanup) = self.admin.delete(EntityKind::Consumer, &consumer.id).await {
                    warn!(tenant = %tenant, consumer = %consumer.id, error = %cleanup, "failed to remove consumer after key error");
                }
                Err(e)
            }
        }
    }

    /// Remove one identity by handle. Keys cascade with the consumer.
    pub async fn delete_identity(&self, identity: &GatewayIdentity) -> Result<()> {
        self.admin
            .delete(EntityKind::Consumer, &identity.consumer_id)
            .await
    }

    /// Publish one workload behind the gateway.
    ///
    /// Every object is tagged with the tenant. If any object fails, the ones
    /// this call already created are removed, newest first.
    pub async fn create_routes(&self, tenant: &str, endpoint: &WorkloadEndpoint) -> Result<()> {
        let mut created: Vec<(EntityKind, String)> = Vec::new();
        let result = self.publish(tenant, endpoint, &mut created).await;

        if result.is_err() {
            for (kind, id) in created.iter().rev() {
                if let Err(e) = self.admin.delete(*kind, id).await {
                    warn!(tenant = %tenant, kind = %kind, id = %id, error = %e, "failed to roll back gateway object");
                }
            }
        } else {
            info!(tenant = %tenant, host = %endpoint.host, objects = created.len(), "gateway routes published");
        }
        result
    }

    async fn publish(
        &self,
        tenant: &str,
        endpoint: &WorkloadEndpoint,
        created: &mut Vec<(EntityKind, String)>,
    ) -> Result<()> {
        match endpoint.role {
            WorkloadRole::Collection => {
                let grpc = endpoint.host.clone();
                let config_update = format!("{}-config-update", endpoint.host);

                let svc = self.service(tenant, &grpc, "grpc", &endpoint.host, endpoint.grpc_port, None);
                self.track(created, EntityKind::Service, self.admin.create_service(&svc).await)?;

                let svc = self.service(
                    tenant,
                    &config_update,
                    "http",
                    &endpoint.host,
                    endpoint.http_port,
                    Some("/"),
                );
                self.track(created, EntityKind::Service, self.admin.create_service(&svc).await)?;

                let route = self.header_route(tenant, &grpc, "grpc", None, format!("{tenant}-dc"));
                self.track(created, EntityKind::Route, self.admin.create_route(&route).await)?;

                let route = self.header_route(
                    tenant,
                    &config_update,
                    "http",
                    Some(vec!["POST"]),
                    format!("{tenant}-dc-config-update"),
                );
                self.track(created, EntityKind::Route, self.admin.create_route(&route).await)?;

                for service in [&grpc, &config_update] {
                    let plugin = self.key_auth(tenant, service);
                    self.track(created, EntityKind::Plugin, self.admin.create_plugin(&plugin).await)?;
                }
            }
            WorkloadRole::Processing => {
                let http = endpoint.host.clone();

                let svc = self.service(tenant, &http, "http", &endpoint.host, endpoint.http_port, Some("/"));
                self.track(created, EntityKind::Service, self.admin.create_service(&svc).await)?;

                let route = self.header_route(
                    tenant,
                    &http,
                    "http",
                    Some(vec!["GET", "PUT", "DELETE"]),
                    format!("{tenant}-dp"),
                );
                self.track(created, EntityKind::Route, self.admin.create_route(&route).await)?;

                // Browsers cannot set custom headers on WebSocket upgrades
                let ws = RouteRequest {
                    name: format!("{http}-warning-push"),
                    protocols: vec!["http".to_string()],
                    methods: Some(vec!["GET".to_string()]),
                    hosts: vec![self.config.app_domain.clone()],
                    paths: vec![warning_push_path(tenant)],
                    headers: BTreeMap::new(),
                    strip_path: false,
                    service: NameRef { name: http.clone() },
                    tags: vec![tenant.to_string()],
                };
                self.track(created, EntityKind::Route, self.admin.create_route(&ws).await)?;

                let plugin = self.key_auth(tenant, &http);
                self.track(created, EntityKind::Plugin, self.admin.create_plugin(&plugin).await)?;
            }
        }
        Ok(())
    }

    fn track(
        &self,
        created: &mut Vec<(EntityKind, String)>,
        kind: EntityKind,
        result: Result<crate::types::KongObject>,
    ) -> Result<()> {
        let object = result?;
        debug!(kind = %kind, id = %object.id, name = ?object.name, "gateway object created");
        created.push((kind, object.id));
        Ok(())
    }

    fn service(
        &self,
        tenant: &str,
        name: &str,
        protocol: &str,
        host: &str,
        port: u16,
        path: Option<&str>,
    ) -> ServiceRequest {
        ServiceRequest {
            name: name.to_string(),
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            path: path.map(str::to_string),
            enabled: true,
            connect_timeout: self.config.service_timeout_ms,
            read_timeout: self.config.service_timeout_ms,
            write_timeout: self.config.service_timeout_ms,
            tags: vec![tenant.to_string()],
        }
    }

    fn header_route(
        &self,
        tenant: &str,
        service: &str,
        protocol: &str,
        methods: Option<Vec<&str>>,
        service_type: String,
    ) -> RouteRequest {
        RouteRequest {
            name: service.to_string(),
            protocols: vec![protocol.to_string()],
            methods: methods.map(|m| m.into_iter().map(str::to_string).collect()),
            hosts: vec![self.config.app_domain.clone()],
            paths: vec!["/".to_string()],
            headers: BTreeMap::from([(SERVICE_TYPE_HEADER.to_string(), vec![service_type])]),
            strip_path: false,
            service: NameRef {
                name: service.to_string(),
            },
            tags: vec![tenant.to_string()],
        }
    }

    fn key_auth(&self, tenant: &str, service: &str) -> PluginRequest {
        PluginRequest {
            name: "key-auth".to_string(),
            service: NameRef {
                name: service.to_string(),
            },
            enabled: true,
            config: KeyAuthConfig {
                key_names: vec![API_KEY_NAME.to_string()],
                key_in_query: true,
                key_in_header: true,
                key_in_body: false,
            },
            tags: vec![tenant.to_string()],
        }
    }

    /// Remove the tenant's services, routes and plugins, leaving its
    /// consumer in place
    pub async fn delete_route_sets(&self, tenant: &str) -> Result<()> {
        self.delete_tagged(
            tenant,
            &[EntityKind::Plugin, EntityKind::Route, EntityKind::Service],
        )
        .await
    }

    /// Remove every gateway object tagged with the tenant.
    ///
    /// Plugins, consumers, routes and services are visited in that order.
    /// Every object is attempted; the first failure is returned at the end.
    pub async fn unregister(&self, tenant: &str) -> Result<()> {
        self.delete_tagged(tenant, &EntityKind::TEARDOWN_ORDER).await?;
        info!(tenant = %tenant, "gateway objects removed");
        Ok(())
    }

    async fn delete_tagged(&self, tenant: &str, kinds: &[EntityKind]) -> Result<()> {
        let mut first_error = None;
        for kind in kinds {
            let objects = match self.admin.list_by_tag(*kind, tenant).await {
                Ok(objects) => objects,
                Err(e) => {
                    warn!(tenant = %tenant, kind = %kind, error = %e, "failed to list tagged objects");
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            for object in objects {
                if let Err(e) = self.admin.delete(*kind, &object.id).await {
                    warn!(tenant = %tenant, kind = %kind, id = %object.id, error = %e, "failed to delete tagged object");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tenant owning an access key
    pub async fn tenant_of_key(&self, api_key: &str) -> Result<String> {
        let consumer = self
            .admin
            .consumer_of_key(api_key)
            .await?
            .ok_or_else(|| Error::not_found("token"))?;
        consumer
            .tags
            .and_then(|tags| tags.into_iter().next())
            .ok_or_else(|| Error::not_found("tenant for token"))
    }
}

/// Path of the tenant's warning push WebSocket
pub fn warning_push_path(tenant: &str) -> String {
    format!("/warnings/push/{tenant}")
}
