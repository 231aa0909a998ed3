//! Readiness wait
//!
//! A single primitive merges three ways a wait can end: the workload reports
//! ready, the workload is deleted or its watch fails, or the deadline passes.
//! Whichever comes first wins; the event stream is dropped on return, which
//! releases the underlying watch.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tracing::trace;

use crate::client::{WorkloadEvent, WorkloadStatus};

/// How a readiness wait ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReadinessOutcome {
    /// The predicate accepted an observed status
    Ready(WorkloadStatus),
    /// The workload was deleted or the watch failed
    Failed(String),
    /// The deadline passed first
    TimedOut,
}

/// Consume `events` until `is_ready` accepts a status, a terminal event
/// arrives, or `timeout` elapses.
pub async fn wait_until<S, P>(events: S, timeout: Duration, is_ready: P) -> ReadinessOutcome
where
    S: Stream<Item = WorkloadEvent>,
    P: Fn(&WorkloadStatus) -> bool,
{
    tokio::pin!(events);
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return ReadinessOutcome::TimedOut,
            event = events.next() => match event {
                Some(WorkloadEvent::Observed(status)) => {
                    trace!(
                        name = %status.name,
                        ready = status.ready_replicas,
                        desired = status.desired_replicas,
                        "workload status"
                    );
                    if is_ready(&status) {
                        return ReadinessOutcome::Ready(status);
                    }
                }
                Some(WorkloadEvent::Deleted { name }) => {
                    return ReadinessOutcome::Failed(format!("{name} was deleted"));
                }
                Some(WorkloadEvent::Error(message)) => {
                    return ReadinessOutcome::Failed(format!("watch failed: {message}"));
                }
                None => return ReadinessOutcome::Failed("watch ended".to_string()),
            },
        }
    }
}
