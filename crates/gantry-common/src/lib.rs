//! Common types for Gantry: errors, the registration model, labels, retry
//! and Kubernetes helpers

#![deny(missing_docs)]

pub mod error;
pub mod kube_utils;
pub mod model;
pub mod retry;
pub mod telemetry;

use std::time::Duration;

pub use error::{Dependency, Error};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label key carrying the owning tenant of a cluster resource
pub const LABEL_TENANT: &str = "gantry.io/tenant";

/// Standard Kubernetes name label
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard Kubernetes managed-by label
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label for resources created by Gantry
pub const LABEL_MANAGED_BY_GANTRY: &str = "gantry";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "gantry-provisioner";

/// Default time a workload has to reach its desired ready replica count
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(300);
