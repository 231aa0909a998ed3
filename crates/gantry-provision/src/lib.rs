//! Tenant provisioning for Gantry
//!
//! Registration is a saga over four collaborators: gateway identity, tenant
//! directory, storage namespaces and cluster workloads. Each completed step
//! pushes its undo onto a [`CompensationStack`]; a failure unwinds the stack
//! in reverse and surfaces the original error.
//!
//! - [`validate`]: request checks that run before any side effect
//! - [`compensation`]: the undo stack and its unwind report
//! - [`plan`]: names and workload specs derived from a tenant
//! - [`orchestrator`]: the [`ProvisioningOrchestrator`] running register and unregister

#![deny(missing_docs)]

pub mod compensation;
pub mod orchestrator;
pub mod plan;
pub mod validate;

pub use compensation::{CompensationStack, UnwindReport};
pub use orchestrator::{ProvisionState, ProvisioningOrchestrator};
pub use plan::ProvisionConfig;
pub use validate::validate_request;
