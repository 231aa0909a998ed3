//! Provisioning orchestrator
//!
//! `register` walks the saga one step at a time on a task of its own and
//! pushes an undo after each step that leaves state behind. The two
//! workloads deploy side by side; their undos are recorded before they
//! start so a half-created workload is still removed. `unregister` is the
//! blunt inverse: it removes everything carrying the tenant's name, tag or
//! label, whatever registered it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use gantry_cluster::{ResourceHandle, ResourceKind, ResourceLifecycleController};
use gantry_common::kube_utils::{tenant_labels, tenant_selector};
use gantry_common::model::{RegisterInfo, RegisterRequest};
use gantry_common::{Error, Result};
use gantry_directory::{Artifact, TenantDirectory};
use gantry_gateway::{GatewayIdentityManager, WorkloadRole};
use gantry_storage::StorageNamespaceManager;

use crate::compensation::CompensationStack;
use crate::plan::{config_object_name, ProvisionConfig, WorkloadPlan, REGISTER_INFO_FILE};
use crate::validate::validate_request;

/// Where a registration currently stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionState {
    /// Request validated, nothing created yet
    Start,
    /// Gateway consumer and key exist
    IdentityCreated,
    /// Directory record written
    DirectoryWritten,
    /// Storage buckets exist
    NamespacesReady,
    /// Registration info published to the cluster
    ConfigPublished,
    /// Workloads are being deployed
    Deploying,
    /// Routes published; the tenant is live
    RoutesPublished,
    /// A step failed and the saga is undoing its work
    Unwinding,
    /// Undo finished; the registration failed
    Failed,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::IdentityCreated => write!(f, "IdentityCreated"),
            Self::DirectoryWritten => write!(f, "DirectoryWritten"),
            Self::NamespacesReady => write!(f, "NamespacesReady"),
            Self::ConfigPublished => write!(f, "ConfigPublished"),
            Self::Deploying => write!(f, "Deploying"),
            Self::RoutesPublished => write!(f, "RoutesPublished"),
            Self::Unwinding => write!(f, "Unwinding"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// One registration in flight: its undo stack and current state
struct Saga<'a> {
    tenant: &'a str,
    state: ProvisionState,
    compensations: CompensationStack,
}

impl<'a> Saga<'a> {
    fn new(tenant: &'a str) -> Self {
        info!(tenant = %tenant, state = %ProvisionState::Start, "registration started");
        Self {
            tenant,
            state: ProvisionState::Start,
            compensations: CompensationStack::new(),
        }
    }

    fn advance(&mut self, next: ProvisionState) {
        info!(tenant = %self.tenant, from = %self.state, to = %next, "registration state");
        self.state = next;
    }

    async fn fail(mut self, error: &Error) {
        warn!(
            tenant = %self.tenant,
            state = %self.state,
            step = error.step().unwrap_or_default(),
            code = error.code(),
            pending = self.compensations.pending(),
            error = %error,
            "registration failed, unwinding"
        );
        self.advance(ProvisionState::Unwinding);
        let report = std::mem::take(&mut self.compensations).unwind().await;
        report.log(self.tenant);
        self.advance(ProvisionState::Failed);
    }
}

/// Runs tenant registration and unregistration across all collaborators
#[derive(Clone)]
pub struct ProvisioningOrchestrator {
    gateway: GatewayIdentityManager,
    directory: TenantDirectory,
    storage: StorageNamespaceManager,
    cluster: ResourceLifecycleController,
    config: Arc<ProvisionConfig>,
}

impl ProvisioningOrchestrator {
    /// Create an orchestrator over the four collaborators
    pub fn new(
        gateway: GatewayIdentityManager,
        directory: TenantDirectory,
        storage: StorageNamespaceManager,
        cluster: ResourceLifecycleController,
        config: ProvisionConfig,
    ) -> Self {
        Self {
            gateway,
            directory,
            storage,
            cluster,
            config: Arc::new(config),
        }
    }

    /// Provision a new tenant and return its access token.
    ///
    /// On failure everything created so far is undone and the error of the
    /// failing step is returned. The saga runs on its own task, so dropping
    /// the returned future does not stop it halfway: it still completes or
    /// unwinds.
    pub async fn register(&self, request: RegisterRequest) -> Result<String> {
        let this = self.clone();
        let saga = tokio::spawn(async move { this.provision(request).await });
        match saga.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(Error::cluster(format!("registration task cancelled: {e}"))),
        }
    }

    async fn provision(&self, request: RegisterRequest) -> Result<String> {
        let user = validate_request(&request)?;
        let tenant = user.id.as_str();
        let mut saga = Saga::new(tenant);

        match self.run_register(&mut saga, &user.password, &request).await {
            Ok(token) => {
                info!(tenant = %tenant, "tenant registered");
                Ok(token)
            }
            Err(e) => {
                saga.fail(&e).await;
                Err(e)
            }
        }
    }

    async fn run_register(
        &self,
        saga: &mut Saga<'_>,
        secret: &str,
        request: &RegisterRequest,
    ) -> Result<String> {
        let tenant = saga.tenant;

        let identity = self
            .gateway
            .create_consumer_and_key(tenant)
            .await
            .map_err(|e| e.in_step("create_identity"))?;
        let token = identity.api_key.clone();
        let gateway = self.gateway.clone();
        saga.compensations.push("delete_identity", move || async move {
            gateway.delete_identity(&identity).await
        });
        saga.advance(ProvisionState::IdentityCreated);

        let info = RegisterInfo::from_request(tenant, request);
        self.directory
            .register(tenant, secret, &token, &info)
            .await
            .map_err(|e| e.in_step("write_directory"))?;
        let directory = self.directory.clone();
        let owner = tenant.to_string();
        saga.compensations.push("unregister_directory", move || async move {
            directory.unregister(&owner).await
        });
        saga.advance(ProvisionState::DirectoryWritten);

        self.storage
            .create_bucket(tenant)
            .await
            .map_err(|e| e.in_step("create_namespaces"))?;
        let storage = self.storage.clone();
        let owner = tenant.to_string();
        saga.compensations.push("clear_namespaces", move || async move {
            storage.clear_bucket(&owner).await
        });
        saga.advance(ProvisionState::NamespacesReady);

        let handle = self
            .publish_register_info(tenant, &info)
            .await
            .map_err(|e| e.in_step("publish_config"))?;
        let cluster = self.cluster.clone();
        saga.compensations.push("delete_config_object", move || async move {
            cluster.delete(&handle).await
        });
        saga.advance(ProvisionState::ConfigPublished);

        saga.advance(ProvisionState::Deploying);
        let collection = self.config.collection_plan(tenant);
        let processing = self.config.processing_plan(tenant);
        self.deploy(saga, vec![collection.clone(), processing.clone()])
            .await
            .map_err(|e| e.in_step("deploy_workloads"))?;

        let gateway = self.gateway.clone();
        let owner = tenant.to_string();
        saga.compensations.push("delete_route_sets", move || async move {
            gateway.delete_route_sets(&owner).await
        });
        for plan in [&collection, &processing] {
            self.gateway
                .create_routes(tenant, &plan.gateway)
                .await
                .map_err(|e| e.in_step("create_routes"))?;
        }
        saga.advance(ProvisionState::RoutesPublished);

        Ok(token)
    }

    async fn publish_register_info(
        &self,
        tenant: &str,
        info: &RegisterInfo,
    ) -> Result<ResourceHandle> {
        let encoded = serde_json::to_string_pretty(info)
            .map_err(|e| Error::cluster(format!("failed to encode register info: {e}")))?;
        let name = config_object_name(tenant);
        self.cluster
            .create_config_object(
                &name,
                tenant_labels(tenant, &name),
                BTreeMap::from([(REGISTER_INFO_FILE.to_string(), encoded)]),
            )
            .await
    }

    /// Deploy every plan concurrently. Undos are pushed in plan order before
    /// any task starts, and every task runs to completion before the first
    /// error (in completion order) is returned.
    async fn deploy(&self, saga: &mut Saga<'_>, plans: Vec<WorkloadPlan>) -> Result<()> {
        let tenant = saga.tenant.to_string();
        let mut tasks = JoinSet::new();

        for plan in plans {
            for kind in [ResourceKind::NetworkEndpoint, plan_kind(&plan)] {
                let cluster = self.cluster.clone();
                let handle = ResourceHandle {
                    name: plan.name.clone(),
                    kind,
                    tenant: tenant.clone(),
                };
                saga.compensations.push(undo_label(kind), move || async move {
                    cluster.delete(&handle).await
                });
            }

            let cluster = self.cluster.clone();
            let timeout = self.config.readiness_timeout;
            tasks.spawn(async move {
                let WorkloadPlan {
                    name,
                    labels,
                    spec,
                    endpoint,
                    gateway,
                } = plan;
                cluster
                    .create_network_endpoint(&name, labels.clone(), endpoint)
                    .await?;
                match gateway.role {
                    WorkloadRole::Collection => {
                        cluster
                            .create_stateful_workload(&name, labels, timeout, spec)
                            .await?
                    }
                    WorkloadRole::Processing => {
                        cluster
                            .create_stateless_workload(&name, labels, timeout, spec)
                            .await?
                    }
                };
                Ok::<String, Error>(name)
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(name)) => info!(tenant = %tenant, name = %name, "workload ready"),
                Ok(Err(e)) => {
                    warn!(tenant = %tenant, error = %e, "workload deployment failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    warn!(tenant = %tenant, error = %e, "deployment task aborted");
                    first_error
                        .get_or_insert(Error::cluster(format!("deployment task aborted: {e}")));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Remove a tenant after checking its secret.
    ///
    /// Every collaborator is cleaned concurrently and all of them are
    /// attempted; the first failure (in directory, gateway, storage, cluster
    /// order) is returned once they finish.
    pub async fn unregister(&self, name: &str, secret: &str) -> Result<()> {
        self.directory.login(name, secret).await?;
        info!(tenant = %name, "unregistering tenant");

        let (directory, gateway, storage, cluster) = tokio::join!(
            self.directory.unregister(name),
            self.gateway.unregister(name),
            self.storage.clear_bucket(name),
            self.delete_cluster_objects(name),
        );

        let mut first_error = None;
        for (step, result) in [
            ("unregister_directory", directory),
            ("unregister_gateway", gateway),
            ("clear_namespaces", storage),
            ("delete_cluster_objects", cluster),
        ] {
            if let Err(e) = result {
                warn!(tenant = %name, step = %step, error = %e, "unregister step failed");
                first_error.get_or_insert(e.in_step(step));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                info!(tenant = %name, "tenant unregistered");
                Ok(())
            }
        }
    }

    async fn delete_cluster_objects(&self, tenant: &str) -> Result<()> {
        let selector = tenant_selector(tenant);
        let mut first_error = None;
        for kind in ResourceKind::ALL {
            if let Err(e) = self.cluster.delete_by_selector(kind, &selector).await {
                warn!(tenant = %tenant, kind = %kind, error = %e, "bulk delete failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// The tenant's access token, if `secret` matches
    pub async fn login(&self, name: &str, secret: &str) -> Result<String> {
        self.directory.login(name, secret).await
    }

    /// The tenant's client code archive
    pub async fn client_artifact(&self, name: &str) -> Result<Artifact> {
        self.directory.client_artifact(name).await
    }

    /// Registration info of the tenant owning `token`
    pub async fn register_info(&self, token: &str) -> Result<RegisterInfo> {
        let tenant = self.gateway.tenant_of_key(token).await?;
        self.directory.register_info(&tenant).await
    }
}

fn plan_kind(plan: &WorkloadPlan) -> ResourceKind {
    match plan.gateway.role {
        WorkloadRole::Collection => ResourceKind::StatefulWorkload,
        WorkloadRole::Processing => ResourceKind::StatelessWorkload,
    }
}

fn undo_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::NetworkEndpoint => "delete_endpoint",
        ResourceKind::StatefulWorkload | ResourceKind::StatelessWorkload => "delete_workload",
        ResourceKind::ConfigObject => "delete_config_object",
    }
}
