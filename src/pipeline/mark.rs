//! # Mark Pipeline
//!
//! Drives every volume matching the selection filter through the decision
//! engine and applies the resulting label mutation.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{report_item_fault, PipelineError, RunSummary};
use crate::compute::{self, DiskService, VolumeRecord};
use crate::decision::{decide, Action, Diagnostic};
use crate::error::ItemError;
use crate::labels;
use crate::outcome::{FailureStage, OutcomeDetail, OutcomePublisher, VolumeIdentity};

/// Sequential mark pass over the filtered volume inventory
pub struct MarkPipeline {
    service: Arc<dyn DiskService>,
    project_id: String,
    zone: String,
    publisher: OutcomePublisher,
    shutdown_rx: broadcast::Receiver<()>,
}

impl MarkPipeline {
    pub fn new(
        service: Arc<dyn DiskService>,
        project_id: impl Into<String>,
        zone: impl Into<String>,
        publisher: OutcomePublisher,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            service,
            project_id: project_id.into(),
            zone: zone.into(),
            publisher,
            shutdown_rx,
        }
    }

    /// Run the pass to inventory exhaustion. Per-item faults are published
    /// and iteration continues; only an inventory fault terminates the run
    /// with an error.
    pub async fn run(
        &mut self,
        filter: &str,
        cutoff: Duration,
        dry_run: bool,
    ) -> Result<RunSummary, PipelineError> {
        if dry_run {
            info!("dry run mode is enabled -- no write operations will be performed");
        }

        let mut inventory = self
            .service
            .list(&self.project_id, &self.zone, filter)
            .await
            .map_err(PipelineError::List)?;

        let mut summary = RunSummary::default();
        loop {
            if shutdown_requested(&mut self.shutdown_rx) {
                info!("shutdown requested, stopping mark pass");
                summary.cancelled = true;
                break;
            }
            let volume = match inventory.next().await {
                Ok(Some(volume)) => volume,
                Ok(None) => break,
                Err(err) => return Err(PipelineError::Inventory(err)),
            };
            summary.examined += 1;
            self.process_one(&volume, cutoff, dry_run, &mut summary)
                .await;
        }
        Ok(summary)
    }

    async fn process_one(
        &self,
        volume: &VolumeRecord,
        cutoff: Duration,
        dry_run: bool,
        summary: &mut RunSummary,
    ) {
        let identity = VolumeIdentity::from(volume);

        let decision = match decide(
            volume.last_attached_at.as_deref(),
            volume.marked_value(),
            cutoff,
            Utc::now(),
        ) {
            Ok(decision) => decision,
            Err(err) => {
                report_item_fault(&self.publisher, identity, ItemError::from(err), summary);
                return;
            }
        };

        debug!(
            volume = %volume.name,
            size_gb = volume.size_gb,
            last_attached_at = volume.last_attached_at.as_deref().unwrap_or(""),
            action = %decision.action,
            dry_run,
            "decided volume"
        );

        match decision.action {
            Action::Skip => {
                summary.skipped += 1;
                if let Some(diagnostic) = decision.diagnostic {
                    debug!(volume = %volume.name, %diagnostic, "skipping volume");
                }
                self.publisher.publish(
                    identity,
                    OutcomeDetail::Decided {
                        action: Action::Skip,
                        diagnostic: decision.diagnostic,
                        applied: false,
                    },
                );
            }
            action if dry_run => {
                summary.suppressed += 1;
                debug!(volume = %volume.name, %action, "not labelling volume as dry run enabled");
                self.publisher.publish(
                    identity,
                    OutcomeDetail::Decided {
                        action,
                        diagnostic: Some(Diagnostic::DryRunSuppressed),
                        applied: false,
                    },
                );
            }
            Action::Mark => {
                self.apply(volume, identity, Action::Mark, labels::MARKED_VALUE, summary)
                    .await;
            }
            Action::Unmark => {
                self.apply(
                    volume,
                    identity,
                    Action::Unmark,
                    labels::UNMARKED_VALUE,
                    summary,
                )
                .await;
            }
        }
    }

    /// Write the deletion mark, preserving all other labels and guarding the
    /// update with the fingerprint captured at fetch time.
    async fn apply(
        &self,
        volume: &VolumeRecord,
        identity: VolumeIdentity,
        action: Action,
        value: &str,
        summary: &mut RunSummary,
    ) {
        let updated = labels::with_mark(&volume.labels, value);
        let request_id = compute::new_request_id();

        match self
            .service
            .set_labels(
                &self.project_id,
                &self.zone,
                &volume.id,
                updated,
                &volume.label_fingerprint,
                &request_id,
            )
            .await
        {
            Ok(()) => {
                match action {
                    Action::Mark => summary.marked += 1,
                    Action::Unmark => summary.unmarked += 1,
                    Action::Skip => {}
                }
                info!(volume = %volume.name, %action, value, "updated deletion mark");
                self.publisher.publish(
                    identity,
                    OutcomeDetail::Decided {
                        action,
                        diagnostic: None,
                        applied: true,
                    },
                );
            }
            Err(err) => {
                report_item_fault(
                    &self.publisher,
                    identity,
                    ItemError::service(FailureStage::SetLabels, err),
                    summary,
                );
            }
        }
    }
}

/// Non-blocking check of the shutdown signal between items. A lagged
/// receiver still means a signal was sent.
pub(super) fn shutdown_requested(rx: &mut broadcast::Receiver<()>) -> bool {
    matches!(
        rx.try_recv(),
        Ok(()) | Err(broadcast::error::TryRecvError::Lagged(_))
    )
}
