//! Error types for tenant provisioning
//!
//! Every failure a caller can observe falls into one of a small set of
//! categories, each with a stable machine-readable code. Errors from external
//! collaborators (cluster, gateway, directory store, time-series storage) carry
//! the dependency that failed and, once they pass through the provisioning
//! saga, the name of the step that issued the call.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// External system a dependency error originated from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Kubernetes control plane
    Cluster,
    /// API gateway admin API
    Gateway,
    /// Tenant directory key-value store
    Directory,
    /// Time-series storage
    Storage,
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dependency::Cluster => "cluster",
            Dependency::Gateway => "gateway",
            Dependency::Directory => "directory",
            Dependency::Storage => "storage",
        };
        f.write_str(s)
    }
}

/// Main error type for Gantry operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed registration payload. Raised before any side effect.
    #[error("validation error [{rule}]: {message}")]
    Validation {
        /// Identifier of the rule that failed (e.g. "missing_time_field")
        rule: String,
        /// Human-readable description
        message: String,
        /// Offending field path, if known (e.g. "device_state_register_infos[0]")
        field: Option<String>,
    },

    /// The tenant name is already registered
    #[error("tenant {tenant} already exists")]
    DuplicateTenant {
        /// Name of the tenant
        tenant: String,
    },

    /// Unknown tenant or wrong secret. Both cases look the same to callers.
    #[error("invalid tenant name or password")]
    InvalidCredentials,

    /// A read-only lookup found nothing
    #[error("{what} not found")]
    NotFound {
        /// Description of what was looked up
        what: String,
    },

    /// A workload did not become ready before its deadline
    #[error("{kind} {name} was not ready within {}s", .timeout.as_secs())]
    ProvisionTimeout {
        /// Resource kind (e.g. "Deployment")
        kind: String,
        /// Resource name
        name: String,
        /// Deadline that was exceeded
        timeout: Duration,
    },

    /// A collaborator call failed
    #[error("{dependency} error{}: {message}", step_suffix(.step))]
    ExternalDependency {
        /// Which collaborator failed
        dependency: Dependency,
        /// Saga step that issued the call, attached by the orchestrator
        step: Option<String>,
        /// Description of what failed
        message: String,
        /// Whether retrying the call may succeed
        retryable: bool,
    },
}

fn step_suffix(step: &Option<String>) -> String {
    step.as_deref()
        .map(|s| format!(" in step {s}"))
        .unwrap_or_default()
}

impl From<kube::Error> for Error {
    fn from(source: kube::Error) -> Self {
        // 4xx responses other than conflicts/throttling will not change on retry
        let retryable = !matches!(
            &source,
            kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409 && ae.code != 429
        );
        Self::ExternalDependency {
            dependency: Dependency::Cluster,
            step: None,
            message: source.to_string(),
            retryable,
        }
    }
}

impl Error {
    /// Create a validation error for the given rule
    pub fn validation(rule: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            rule: rule.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with a field path
    pub fn validation_for_field(
        rule: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            rule: rule.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a duplicate tenant error
    pub fn duplicate_tenant(tenant: impl Into<String>) -> Self {
        Self::DuplicateTenant {
            tenant: tenant.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a provision timeout error
    pub fn provision_timeout(
        kind: impl Into<String>,
        name: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self::ProvisionTimeout {
            kind: kind.into(),
            name: name.into(),
            timeout,
        }
    }

    /// Create a retryable dependency error
    pub fn dependency(dependency: Dependency, msg: impl Into<String>) -> Self {
        Self::ExternalDependency {
            dependency,
            step: None,
            message: msg.into(),
            retryable: true,
        }
    }

    /// Create a dependency error that will not succeed on retry
    pub fn dependency_permanent(dependency: Dependency, msg: impl Into<String>) -> Self {
        Self::ExternalDependency {
            dependency,
            step: None,
            message: msg.into(),
            retryable: false,
        }
    }

    /// Cluster control plane error
    pub fn cluster(msg: impl Into<String>) -> Self {
        Self::dependency(Dependency::Cluster, msg)
    }

    /// Gateway admin API error
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::dependency(Dependency::Gateway, msg)
    }

    /// Directory store error
    pub fn directory(msg: impl Into<String>) -> Self {
        Self::dependency(Dependency::Directory, msg)
    }

    /// Time-series storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::dependency(Dependency::Storage, msg)
    }

    /// Attach the originating saga step to a dependency error.
    ///
    /// Other variants already describe themselves and pass through untouched,
    /// as does a dependency error that was tagged by an earlier step.
    pub fn in_step(mut self, name: impl Into<String>) -> Self {
        if let Error::ExternalDependency { step, .. } = &mut self {
            if step.is_none() {
                *step = Some(name.into());
            }
        }
        self
    }

    /// Stable error code surfaced to API callers
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "VALIDATION_ERROR",
            Error::DuplicateTenant { .. } => "DUPLICATE_TENANT",
            Error::InvalidCredentials => "INVALID_CREDENTIALS",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::ProvisionTimeout { .. } => "PROVISION_TIMEOUT",
            Error::ExternalDependency { .. } => "EXTERNAL_DEPENDENCY_ERROR",
        }
    }

    /// Check if this error is retryable
    ///
    /// Only transient collaborator failures are. Everything else needs the
    /// caller to change its input or the system to change state.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ExternalDependency { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Saga step the error was raised in, if tagged
    pub fn step(&self) -> Option<&str> {
        match self {
            Error::ExternalDependency { step, .. } => step.as_deref(),
            _ => None,
        }
    }

    /// Dependency that failed, for dependency errors
    pub fn dependency_kind(&self) -> Option<Dependency> {
        match self {
            Error::ExternalDependency { dependency, .. } => Some(*dependency),
            _ => None,
        }
    }
}
