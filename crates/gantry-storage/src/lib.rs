//! Per-tenant time-series storage namespaces for Gantry

#![deny(missing_docs)]

pub mod influx;
pub mod manager;

pub use influx::{BucketApi, InfluxClient};
pub use manager::{StorageConfig, StorageNamespaceManager, RESERVED_SUFFIXES};
