//! # Label Vocabulary
//!
//! The deletion mark label and the invariant both pipelines agree on: a
//! volume is a cleanup candidate iff its label map carries
//! `marked-for-deletion` with the value exactly `"true"`. Any other value is
//! an explicit opt-out; an absent key means no opinion yet.

use std::collections::HashMap;

/// Label key that drives the mark/cleanup state machine
pub const MARKED_FOR_DELETION: &str = "marked-for-deletion";

/// Label value meaning "eligible for deletion"
pub const MARKED_VALUE: &str = "true";

/// Label value written when a marked volume is reclaimed
pub const UNMARKED_VALUE: &str = "false";

/// Default server-side filter for the mark pass: volumes provisioned for
/// cluster persistent volumes
pub const DEFAULT_MARK_FILTER: &str = "labels.goog-gke-volume:*";

/// Server-side filter selecting cleanup candidates
pub fn cleanup_filter() -> String {
    format!("labels.{MARKED_FOR_DELETION}:{MARKED_VALUE}")
}

/// Current value of the deletion mark, if the key is present at all
pub fn marked_value(labels: &HashMap<String, String>) -> Option<&str> {
    labels.get(MARKED_FOR_DELETION).map(String::as_str)
}

/// Copy of the label map with the deletion mark set to `value`, preserving
/// every other label.
pub fn with_mark(labels: &HashMap<String, String>, value: &str) -> HashMap<String, String> {
    let mut updated = labels.clone();
    updated.insert(MARKED_FOR_DELETION.to_string(), value.to_string());
    updated
}

/// A cleanup candidate whose label state does not literally satisfy the
/// marked-for-deletion contract. Reported per item; the volume is never
/// deleted on an unverified label state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("volume {volume}: missing required label marked-for-deletion")]
    MissingLabel { volume: String },

    #[error("volume {volume}: expected label value \"true\" but got {value:?}")]
    UnexpectedValue { volume: String, value: String },
}

/// Re-validate the label invariant against a fetched record, independently of
/// whatever filter produced it.
pub fn verify_cleanup_candidate(
    volume_name: &str,
    labels: &HashMap<String, String>,
) -> Result<(), InvariantViolation> {
    match labels.get(MARKED_FOR_DELETION) {
        None => Err(InvariantViolation::MissingLabel {
            volume: volume_name.to_string(),
        }),
        Some(value) if value != MARKED_VALUE => Err(InvariantViolation::UnexpectedValue {
            volume: volume_name.to_string(),
            value: value.clone(),
        }),
        Some(_) => Ok(()),
    }
}
