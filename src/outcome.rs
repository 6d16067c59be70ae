//! # Outcome Events
//!
//! Structured per-volume outcomes streamed from the pipelines to the caller.
//! The core performs no formatting; subscribers (the CLI renderer, tests)
//! own all presentation. Publishing tolerates having no subscribers at all.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

use crate::compute::VolumeRecord;
use crate::decision::{Action, Diagnostic};

/// Identity of the volume an outcome refers to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeIdentity {
    pub id: String,
    pub name: String,
    pub size_gb: i64,
}

impl From<&VolumeRecord> for VolumeIdentity {
    fn from(record: &VolumeRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            size_gb: record.size_gb,
        }
    }
}

/// Which step of item processing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Decision,
    SetLabels,
    Snapshot,
    SnapshotWait,
    Delete,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::SetLabels => write!(f, "set_labels"),
            Self::Snapshot => write!(f, "snapshot"),
            Self::SnapshotWait => write!(f, "snapshot_wait"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// What happened to a single volume
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutcomeDetail {
    /// Mark pass decision; `applied` is false for skips and dry runs
    Decided {
        action: Action,
        diagnostic: Option<Diagnostic>,
        applied: bool,
    },
    /// Safety snapshot reached a terminal success state
    SnapshotCompleted { snapshot: String },
    /// Volume was deleted
    Deleted { snapshotted: bool },
    /// Dry run suppressed the described mutation
    DryRunSuppressed { intended: String },
    /// Cleanup candidate failed local re-validation of the label invariant
    InvariantViolation { reason: String },
    /// Item abandoned after a per-item error; the run continued
    Failed { stage: FailureStage, error: String },
}

impl OutcomeDetail {
    /// Check if this outcome represents a per-item error
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::InvariantViolation { .. })
    }
}

/// A published per-volume outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub volume: VolumeIdentity,
    pub detail: OutcomeDetail,
    pub recorded_at: DateTime<Utc>,
}

/// Broadcast publisher for outcome events
#[derive(Debug, Clone)]
pub struct OutcomePublisher {
    sender: broadcast::Sender<OutcomeEvent>,
}

impl OutcomePublisher {
    /// Create a new publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an outcome for a volume. A send error only means there are no
    /// subscribers, which is acceptable.
    pub fn publish(&self, volume: VolumeIdentity, detail: OutcomeDetail) {
        let event = OutcomeEvent {
            volume,
            detail,
            recorded_at: Utc::now(),
        };
        let _ = self.sender.send(event);
    }

    /// Subscribe to outcome events
    pub fn subscribe(&self) -> broadcast::Receiver<OutcomeEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for OutcomePublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
