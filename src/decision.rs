//! # Decision Engine
//!
//! Pure function mapping a volume's attachment recency and current label
//! state to a mark/unmark/skip action.
//!
//! The engine performs no I/O and reads no wall clock; callers inject `now`.
//! Running it twice against the same inputs always yields the same decision,
//! which is what makes a second mark pass a no-op.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::labels;

/// Action to take for a single volume during a mark pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Leave the volume untouched
    Skip,
    /// Label the volume as eligible for deletion
    Mark,
    /// Reclaim a previously marked volume that was re-attached
    Unmark,
}

impl Action {
    /// Check if this action mutates labels when applied
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Mark | Self::Unmark)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Mark => write!(f, "mark"),
            Self::Unmark => write!(f, "unmark"),
        }
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "mark" => Ok(Self::Mark),
            "unmark" => Ok(Self::Unmark),
            _ => Err(format!("Invalid action: {s}")),
        }
    }
}

/// Non-fatal outcome classification explaining why an item produced `Skip`
/// or why a mutation was suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Diagnostic {
    /// Volume was attached more recently than the cutoff
    WithinCutoff,
    /// Volume already carries the deletion mark; nothing to re-issue
    AlreadyMarked,
    /// An operator or prior pass explicitly opted this volume out
    ExplicitlyUnmarked,
    /// Dry run mode suppressed an otherwise-applicable mutation
    DryRunSuppressed,
}

impl Diagnostic {
    /// Stable string form for logging and serialized outcomes
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WithinCutoff => "within_cutoff",
            Self::AlreadyMarked => "already_marked",
            Self::ExplicitlyUnmarked => "explicitly_unmarked",
            Self::DryRunSuppressed => "dry_run_suppressed",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of deciding a single volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    pub diagnostic: Option<Diagnostic>,
}

impl Decision {
    fn mark() -> Self {
        Self {
            action: Action::Mark,
            diagnostic: None,
        }
    }

    fn unmark() -> Self {
        Self {
            action: Action::Unmark,
            diagnostic: None,
        }
    }

    fn skip(diagnostic: Diagnostic) -> Self {
        Self {
            action: Action::Skip,
            diagnostic: Some(diagnostic),
        }
    }
}

/// Per-item decision failure. Fatal for the offending volume only; the
/// pipelines report it and continue with the next item.
#[derive(Debug, thiserror::Error)]
pub enum DecisionError {
    #[error("unparsable last-attached timestamp {value:?}: {source}")]
    UnparsableTimestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Decide what to do with a volume given its last-attachment time and the
/// current value of the deletion mark label.
///
/// Rules, in order:
/// 1. Never attached (no timestamp recorded) => `Mark`, regardless of cutoff
///    or existing label.
/// 2. Timestamp present but unparsable => `DecisionError`.
/// 3. Attached within the cutoff: a `"true"` mark is reclaimed with `Unmark`;
///    anything else is `Skip(WithinCutoff)`.
/// 4. Attached at or beyond the cutoff: a `"true"` mark is already in place
///    (`Skip(AlreadyMarked)`); any other present value was an explicit opt-out
///    and is never overridden (`Skip(ExplicitlyUnmarked)`); no label at all
///    means the volume gets marked.
pub fn decide(
    last_attached_at: Option<&str>,
    current_label_value: Option<&str>,
    cutoff: Duration,
    now: DateTime<Utc>,
) -> Result<Decision, DecisionError> {
    // The service reports "never attached" as an absent or empty timestamp.
    let raw = match last_attached_at {
        None | Some("") => return Ok(Decision::mark()),
        Some(raw) => raw,
    };

    let last_attached = DateTime::parse_from_rfc3339(raw)
        .map_err(|source| DecisionError::UnparsableTimestamp {
            value: raw.to_string(),
            source,
        })?
        .with_timezone(&Utc);

    let elapsed = now.signed_duration_since(last_attached);
    let marked = current_label_value == Some(labels::MARKED_VALUE);

    if elapsed < cutoff {
        // Previously marked but attached again later: the only path that
        // removes an existing mark.
        if marked {
            return Ok(Decision::unmark());
        }
        return Ok(Decision::skip(Diagnostic::WithinCutoff));
    }

    if marked {
        return Ok(Decision::skip(Diagnostic::AlreadyMarked));
    }
    match current_label_value {
        Some(_) => Ok(Decision::skip(Diagnostic::ExplicitlyUnmarked)),
        None => Ok(Decision::mark()),
    }
}
