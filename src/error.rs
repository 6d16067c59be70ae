//! Error vocabulary, layered in three tiers:
//!
//! - diagnostics ([`crate::decision::Diagnostic`]) are non-error outcomes,
//!   always reported, never stop iteration;
//! - [`ItemError`] covers faults that abandon a single volume while the run
//!   continues;
//! - [`crate::pipeline::PipelineError`] covers inventory faults that
//!   terminate the whole run.

use crate::compute::ServiceError;
use crate::decision::DecisionError;
use crate::labels::InvariantViolation;
use crate::outcome::FailureStage;
use crate::pipeline::PipelineError;

/// Top-level error surfaced to the CLI
#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

pub type Result<T> = std::result::Result<T, SweeperError>;

/// Fault that abandons a single volume. Reported with the offending volume's
/// identity through the outcome stream; iteration continues with the next
/// item.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),

    #[error("{stage} failed: {source}")]
    Service {
        stage: FailureStage,
        #[source]
        source: ServiceError,
    },
}

impl ItemError {
    pub fn service(stage: FailureStage, source: ServiceError) -> Self {
        Self::Service { stage, source }
    }
}
