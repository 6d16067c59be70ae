//! # Pipelines
//!
//! The two sequential passes over the volume inventory. Both are
//! single-threaded and fully process one volume (decision, mutation, and in
//! cleanup the blocking snapshot wait) before fetching the next. That keeps
//! the fingerprint-guarded mutations single-writer and makes the
//! snapshot-before-delete ordering trivial to uphold.
//!
//! Error tiers: per-item faults are published through the outcome stream and
//! iteration continues; an inventory fault is the run's terminal error.

pub mod cleanup;
pub mod mark;

pub use cleanup::CleanupPipeline;
pub use mark::MarkPipeline;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::compute::ServiceError;
use crate::error::ItemError;
use crate::outcome::{OutcomeDetail, OutcomePublisher, VolumeIdentity};

/// Pipeline-fatal error tier: only inventory-level faults live here.
/// Per-item faults never surface as a run error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("listing volumes: {0}")]
    List(#[source] ServiceError),

    #[error("iterating volume inventory: {0}")]
    Inventory(#[source] ServiceError),
}

/// Aggregate counters for one pipeline run. Individual outcomes are streamed
/// through the [`OutcomePublisher`] as they happen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Volumes fetched from the inventory
    pub examined: usize,
    pub marked: usize,
    pub unmarked: usize,
    /// Decisions that required no mutation
    pub skipped: usize,
    /// Mutations suppressed by dry run
    pub suppressed: usize,
    /// Safety snapshots completed
    pub snapshots: usize,
    pub deleted: usize,
    /// Cleanup candidates that failed local invariant re-validation
    pub violations: usize,
    /// Items abandoned after a per-item error
    pub failed: usize,
    /// The run stopped early on the caller's shutdown signal
    pub cancelled: bool,
}

/// Report a per-item fault: bump the right counter, log it with the volume's
/// identity, publish the outcome, and let the caller move on to the next
/// item.
pub(crate) fn report_item_fault(
    publisher: &OutcomePublisher,
    volume: VolumeIdentity,
    fault: ItemError,
    summary: &mut RunSummary,
) {
    match fault {
        ItemError::Invariant(violation) => {
            summary.violations += 1;
            warn!(volume = %volume.name, %violation, "cleanup candidate failed label re-validation");
            publisher.publish(
                volume,
                OutcomeDetail::InvariantViolation {
                    reason: violation.to_string(),
                },
            );
        }
        ItemError::Decision(err) => {
            summary.failed += 1;
            error!(volume = %volume.name, error = %err, "unable to decide volume");
            publisher.publish(
                volume,
                OutcomeDetail::Failed {
                    stage: crate::outcome::FailureStage::Decision,
                    error: err.to_string(),
                },
            );
        }
        ItemError::Service { stage, source } => {
            summary.failed += 1;
            error!(volume = %volume.name, %stage, error = %source, "service call failed, abandoning item");
            publisher.publish(
                volume,
                OutcomeDetail::Failed {
                    stage,
                    error: source.to_string(),
                },
            );
        }
    }
}
