//! Compensation stack
//!
//! Each saga step that leaves something behind pushes a labelled async undo.
//! Unwinding pops them last-in first-out and runs every one, even after
//! failures, collecting the outcome into an [`UnwindReport`].

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{info, warn};

use gantry_common::{Error, Result};

type Undo = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

struct Compensation {
    step: &'static str,
    undo: Undo,
}

/// Ordered undo actions for one saga run
#[derive(Default)]
pub struct CompensationStack {
    entries: Vec<Compensation>,
}

/// What happened while unwinding
#[derive(Debug, Default)]
pub struct UnwindReport {
    /// Steps undone, in the order they ran
    pub attempted: Vec<&'static str>,
    /// Steps whose undo failed
    pub failures: Vec<(&'static str, Error)>,
}

impl UnwindReport {
    /// Whether every undo succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Log the report against a tenant
    pub fn log(&self, tenant: &str) {
        if self.is_clean() {
            info!(tenant = %tenant, undone = self.attempted.len(), "unwind complete");
            return;
        }
        for (step, error) in &self.failures {
            warn!(tenant = %tenant, step = %step, error = %error, "compensation failed");
        }
        warn!(
            tenant = %tenant,
            undone = self.attempted.len(),
            failed = self.failures.len(),
            "unwind finished with failures"
        );
    }
}

impl CompensationStack {
    /// Empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an undo for `step`
    pub fn push<F, Fut>(&mut self, step: &'static str, undo: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.entries.push(Compensation {
            step,
            undo: Box::new(move || undo().boxed()),
        });
    }

    /// Number of undos waiting to run
    pub fn pending(&self) -> usize {
        self.entries.len()
    }

    /// Run every undo, most recent first
    pub async fn unwind(self) -> UnwindReport {
        let mut report = UnwindReport::default();
        for Compensation { step, undo } in self.entries.into_iter().rev() {
            report.attempted.push(step);
            if let Err(e) = undo().await {
                report.failures.push((step, e));
            }
        }
        report
    }
}
