//! Resource lifecycle for tenant workloads in Kubernetes
//!
//! Creates tenant objects by server-side apply, blocks on workload readiness
//! under a deadline, and deletes objects by name or tenant label.
//!
//! - [`resource`]: the closed set of resource kinds and handles to created objects
//! - [`workload`]: declarative workload/endpoint specs and their Kubernetes rendering
//! - [`readiness`]: the deadline-bounded readiness wait primitive
//! - [`client`]: the [`ClusterApi`] seam and its kube-rs implementation
//! - [`controller`]: the [`ResourceLifecycleController`] tying them together

#![deny(missing_docs)]

pub mod client;
pub mod controller;
pub mod readiness;
pub mod resource;
pub mod workload;

pub use client::{ClusterApi, KubeClusterApi, WorkloadEvent, WorkloadStatus};
pub use controller::ResourceLifecycleController;
pub use readiness::{wait_until, ReadinessOutcome};
pub use resource::{ClusterObject, ResourceHandle, ResourceKind};
pub use workload::{ConfigMount, DeploymentSpec, EndpointSpec, EnvBinding, PortSpec};
