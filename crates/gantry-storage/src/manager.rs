//! Storage namespace manager
//!
//! Each tenant owns three buckets that differ only in how long they keep
//! data: raw device state, derived data feeding warning detection, and the
//! warning history itself.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use gantry_common::Result;

use crate::influx::BucketApi;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Suffix of the derived-data bucket
pub const DERIVED_SUFFIX: &str = "-warning_detect";

/// Suffix of the warning history bucket
pub const WARNING_SUFFIX: &str = "-warnings";

/// Endings a tenant name may not have, or its state bucket would be
/// another tenant's derived or warning bucket
pub const RESERVED_SUFFIXES: [&str; 2] = [DERIVED_SUFFIX, WARNING_SUFFIX];

/// Retention of each bucket class
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    /// Raw device state (`<tenant>`)
    pub state_retention: Duration,
    /// Derived data for warning detection (`<tenant>-warning_detect`)
    pub derived_retention: Duration,
    /// Warning history (`<tenant>-warnings`)
    pub warning_retention: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_retention: 30 * DAY,
            derived_retention: DAY,
            warning_retention: 30 * DAY,
        }
    }
}

/// Creates and removes a tenant's buckets
#[derive(Clone)]
pub struct StorageNamespaceManager {
    api: Arc<dyn BucketApi>,
    config: StorageConfig,
}

impl StorageNamespaceManager {
    /// Create a manager over the given buckets API
    pub fn new(api: Arc<dyn BucketApi>, config: StorageConfig) -> Self {
        Self { api, config }
    }

    /// Bucket names and retentions for a tenant, in creation order
    pub fn buckets(&self, tenant: &str) -> [(String, Duration); 3] {
        [
            (tenant.to_string(), self.config.state_retention),
            (
                format!("{tenant}{DERIVED_SUFFIX}"),
                self.config.derived_retention,
            ),
            (format!("{tenant}{WARNING_SUFFIX}"), self.config.warning_retention),
        ]
    }

    /// Create all three buckets. If any fails, every bucket of the tenant is
    /// removed before the error is returned.
    pub async fn create_bucket(&self, tenant: &str) -> Result<()> {
        for (name, retention) in self.buckets(tenant) {
            if let Err(e) = self.api.create_bucket(&name, retention).await {
                warn!(tenant = %tenant, bucket = %name, error = %e, "bucket creation failed, clearing");
                if let Err(cleanup) = self.clear_bucket(tenant).await {
                    warn!(tenant = %tenant, error = %cleanup, "failed to clear partial buckets");
                }
                return Err(e);
            }
        }
        info!(tenant = %tenant, "storage namespaces created");
        Ok(())
    }

    /// Delete the tenant's buckets. Missing buckets are skipped; every
    /// bucket is attempted and the first failure returned.
    pub async fn clear_bucket(&self, tenant: &str) -> Result<()> {
        let mut first_error = None;
        for (name, _) in self.buckets(tenant) {
            match self.api.delete_bucket_by_name(&name).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(tenant = %tenant, bucket = %name, "bucket already absent");
                }
                Err(e) => {
                    warn!(tenant = %tenant, bucket = %name, error = %e, "bucket delete failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
