//! # Cleanup Pipeline
//!
//! Destroys volumes that satisfy the label invariant, after an optional
//! safety snapshot. Per volume, snapshot completion strictly precedes the
//! delete call; there is no ordering guarantee across volumes.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};

use super::mark::shutdown_requested;
use super::{report_item_fault, PipelineError, RunSummary};
use crate::compute::{self, DiskService, SnapshotSpec, VolumeRecord};
use crate::error::ItemError;
use crate::labels;
use crate::outcome::{FailureStage, OutcomeDetail, OutcomePublisher, VolumeIdentity};

/// Sequential cleanup pass over volumes labeled for deletion
pub struct CleanupPipeline {
    service: Arc<dyn DiskService>,
    project_id: String,
    zone: String,
    publisher: OutcomePublisher,
    shutdown_rx: broadcast::Receiver<()>,
}

impl CleanupPipeline {
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

    /// Run the pass to inventory exhaustion over the server-side cleanup
    /// filter. Every candidate is re-validated locally before any mutation.
    pub async fn run(
        &mut self,
        do_snapshot: bool,
        dry_run: bool,
    ) -> Result<RunSummary, PipelineError> {
        if dry_run {
            info!("dry run mode is enabled -- no delete operations will be performed");
        }

        let filter = labels::cleanup_filter();
        let mut inventory = self
            .service
            .list(&self.project_id, &self.zone, &filter)
            .await
            .map_err(PipelineError::List)?;

        let mut summary = RunSummary::default();
        loop {
            if shutdown_requested(&mut self.shutdown_rx) {
                info!("shutdown requested, stopping cleanup pass");
                summary.cancelled = true;
                break;
            }
            let volume = match inventory.next().await {
                Ok(Some(volume)) => volume,
                Ok(None) => break,
                Err(err) => return Err(PipelineError::Inventory(err)),
            };
            summary.examined += 1;
            if !self
                .process_one(&volume, do_snapshot, dry_run, &mut summary)
                .await
            {
                summary.cancelled = true;
                break;
            }
        }
        Ok(summary)
    }

    /// Process a single candidate to completion. Returns false when the
    /// shutdown signal interrupted the snapshot wait; any in-flight snapshot
    /// is left to complete on the provider side.
    async fn process_one(
        &mut self,
        volume: &VolumeRecord,
        do_snapshot: bool,
        dry_run: bool,
        summary: &mut RunSummary,
    ) -> bool {
        let identity = VolumeIdentity::from(volume);

        // Defense in depth against a stale or misconfigured filter: never
        // delete on an unverified label state.
        if let Err(violation) = labels::verify_cleanup_candidate(&volume.name, &volume.labels) {
            report_item_fault(
                &self.publisher,
                identity,
                ItemError::from(violation),
                summary,
            );
            return true;
        }

        if do_snapshot {
            if dry_run {
                info!(
                    volume = %volume.name,
                    size_gb = volume.size_gb,
                    "dry run -- would snapshot volume prior to deletion"
                );
            } else {
                match self.snapshot_one(volume, identity.clone(), summary).await {
                    SnapshotOutcome::Completed => {}
                    // Deletion must never proceed without a completed
                    // snapshot when one was requested.
                    SnapshotOutcome::Failed => return true,
                    SnapshotOutcome::Cancelled => return false,
                }
            }
        }

        if dry_run {
            warn!(volume = %volume.name, size_gb = volume.size_gb, "dry run -- would delete volume");
            summary.suppressed += 1;
            let intended = if do_snapshot {
                "snapshot and delete"
            } else {
                "delete"
            };
            self.publisher.publish(
                identity,
                OutcomeDetail::DryRunSuppressed {
                    intended: intended.to_string(),
                },
            );
            return true;
        }

        warn!(volume = %volume.name, size_gb = volume.size_gb, "deleting volume");
        let request_id = compute::new_request_id();
        match self
            .service
            .delete(&self.project_id, &self.zone, &volume.name, &request_id)
            .await
        {
            Ok(()) => {
                summary.deleted += 1;
                self.publisher.publish(
                    identity,
                    OutcomeDetail::Deleted {
                        snapshotted: do_snapshot,
                    },
                );
            }
            Err(err) => {
                report_item_fault(
                    &self.publisher,
                    identity,
                    ItemError::service(FailureStage::Delete, err),
                    summary,
                );
            }
        }
        true
    }

    /// Snapshot the volume and block until the operation reaches a terminal
    /// state, racing the shutdown signal.
    async fn snapshot_one(
        &mut self,
        volume: &VolumeRecord,
        identity: VolumeIdentity,
        summary: &mut RunSummary,
    ) -> SnapshotOutcome {
        let spec = SnapshotSpec::for_volume(volume);
        let snapshot_name = spec.name.clone();
        let request_id = compute::new_request_id();

        info!(
            volume = %volume.name,
            size_gb = volume.size_gb,
            snapshot = %snapshot_name,
            "snapshotting volume prior to deletion"
        );

        let mut operation = match self
            .service
            .create_snapshot(&self.project_id, &self.zone, &volume.name, spec, &request_id)
            .await
        {
            Ok(operation) => operation,
            Err(err) => {
                report_item_fault(
                    &self.publisher,
                    identity,
                    ItemError::service(FailureStage::Snapshot, err),
                    summary,
                );
                return SnapshotOutcome::Failed;
            }
        };

        let waited = tokio::select! {
            result = operation.wait() => Some(result),
            _ = self.shutdown_rx.recv() => None,
        };

        match waited {
            None => {
                info!(
                    volume = %volume.name,
                    "shutdown requested, leaving in-flight snapshot to complete"
                );
                SnapshotOutcome::Cancelled
            }
            Some(Err(err)) => {
                report_item_fault(
                    &self.publisher,
                    identity,
                    ItemError::service(FailureStage::SnapshotWait, err),
                    summary,
                );
                SnapshotOutcome::Failed
            }
            Some(Ok(())) => {
                summary.snapshots += 1;
                self.publisher.publish(
                    identity,
                    OutcomeDetail::SnapshotCompleted {
                        snapshot: snapshot_name,
                    },
                );
                SnapshotOutcome::Completed
            }
        }
    }
}

/// Terminal state of the safety-snapshot step for one item
enum SnapshotOutcome {
    Completed,
    /// Snapshot creation or wait failed; the item is abandoned but the run
    /// continues
    Failed,
    /// The shutdown signal interrupted the wait; the run stops
    Cancelled,
}
