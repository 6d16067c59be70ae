//! Disk Sweeper CLI
//!
//! Thin shell around the library: flag parsing, logging setup, outcome
//! rendering, and ctrl-c wiring. All decision and pipeline logic lives in
//! the library crate.

use clap::{ArgAction, Parser, Subcommand};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use disk_sweeper::compute::{DiskService, RestDiskService};
use disk_sweeper::logging::init_logging;
use disk_sweeper::outcome::{OutcomeDetail, OutcomeEvent, OutcomePublisher};
use disk_sweeper::pipeline::{CleanupPipeline, MarkPipeline, RunSummary};
use disk_sweeper::{SweeperConfig, SweeperError};

#[derive(Parser)]
#[command(
    name = "disk-sweeper",
    about = "mark and clean up persistent disks in cloud block storage",
    version
)]
struct Cli {
    /// Only log the actions that would be taken
    #[arg(long, global = true, default_value_t = true, action = ArgAction::Set)]
    dry_run: bool,

    /// Project id (falls back to DISK_SWEEPER_PROJECT_ID, then "default")
    #[arg(long, global = true)]
    project_id: Option<String>,

    /// Compute zone (falls back to DISK_SWEEPER_ZONE, then "us-east1-a")
    #[arg(long, global = true)]
    zone: Option<String>,

    /// Verbose output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Mark disks for later deletion
    Mark {
        /// Filter for the list disks request
        /// (falls back to DISK_SWEEPER_FILTER, then "labels.goog-gke-volume:*")
        #[arg(long)]
        filter: Option<String>,

        /// How many days since the disk was last attached or detached
        /// (falls back to DISK_SWEEPER_CUTOFF_DAYS, then 30)
        #[arg(long)]
        cutoff: Option<i64>,
    },
    /// Clean up disks marked for deletion
    Cleanup {
        /// Create a snapshot of the volume prior to deletion
        #[arg(long, default_value_t = true, action = ArgAction::Set)]
        do_snapshot: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli).await {
        error!(error = %err, "failed to execute");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), SweeperError> {
    let mut config = SweeperConfig::from_env()?;
    if let Some(project_id) = cli.project_id {
        config.project_id = project_id;
    }
    if let Some(zone) = cli.zone {
        config.zone = zone;
    }

    let service: Arc<dyn DiskService> = Arc::new(RestDiskService::from_env()?);

    let publisher = OutcomePublisher::default();
    let mut outcomes = publisher.subscribe();
    let renderer = tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(event) => render(&event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "outcome renderer lagged behind the pipeline");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn({
        let shutdown_tx = shutdown_tx.clone();
        async move {
            if signal::ctrl_c().await.is_ok() {
                info!("interrupt received, finishing current volume");
                let _ = shutdown_tx.send(());
            }
        }
    });

    let summary = match cli.command {
        Command::Mark { filter, cutoff } => {
            let filter = filter.unwrap_or_else(|| config.filter.clone());
            if let Some(days) = cutoff {
                config.cutoff_days = days;
            }
            let mut pipeline = MarkPipeline::new(
                service,
                &config.project_id,
                &config.zone,
                publisher.clone(),
                shutdown_rx,
            );
            pipeline.run(&filter, config.cutoff(), cli.dry_run).await?
        }
        Command::Cleanup { do_snapshot } => {
            let mut pipeline = CleanupPipeline::new(
                service,
                &config.project_id,
                &config.zone,
                publisher.clone(),
                shutdown_rx,
            );
            pipeline.run(do_snapshot, cli.dry_run).await?
        }
    };

    // Dropping the last sender lets the renderer drain and exit.
    drop(publisher);
    let _ = renderer.await;

    log_summary(&summary);
    Ok(())
}

fn render(event: &OutcomeEvent) {
    let volume = event.volume.name.as_str();
    match &event.detail {
        OutcomeDetail::Decided {
            action,
            diagnostic,
            applied,
        } => {
            let diagnostic = diagnostic.map(|d| d.as_str()).unwrap_or("");
            if *applied {
                info!(volume, %action, "label updated");
            } else {
                debug!(volume, %action, diagnostic, "no change");
            }
        }
        OutcomeDetail::SnapshotCompleted { snapshot } => {
            info!(volume, snapshot = %snapshot, "safety snapshot completed");
        }
        OutcomeDetail::Deleted { snapshotted } => {
            warn!(volume, snapshotted = *snapshotted, "volume deleted");
        }
        OutcomeDetail::DryRunSuppressed { intended } => {
            warn!(volume, intended = %intended, "dry run -- suppressed");
        }
        OutcomeDetail::InvariantViolation { reason } => {
            warn!(volume, reason = %reason, "invariant violation, volume skipped");
        }
        OutcomeDetail::Failed { stage, error } => {
            error!(volume, %stage, error = %error, "item failed");
        }
    }
}

fn log_summary(summary: &RunSummary) {
    info!(
        examined = summary.examined,
        marked = summary.marked,
        unmarked = summary.unmarked,
        skipped = summary.skipped,
        suppressed = summary.suppressed,
        snapshots = summary.snapshots,
        deleted = summary.deleted,
        violations = summary.violations,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "pass complete"
    );
}
