use crate::error::{Result, SweeperError};
use crate::labels;
use chrono::Duration;

/// Runtime configuration shared by both pipelines
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub project_id: String,
    pub zone: String,
    /// Server-side filter for the mark pass
    pub filter: String,
    /// How many days since the volume was last attached or detached
    pub cutoff_days: i64,
    pub dry_run: bool,
    /// Create a safety snapshot prior to deletion
    pub do_snapshot: bool,
    pub verbose: bool,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            project_id: "default".to_string(),
            zone: "us-east1-a".to_string(),
            filter: labels::DEFAULT_MARK_FILTER.to_string(),
            cutoff_days: 30,
            dry_run: true,
            do_snapshot: true,
            verbose: false,
        }
    }
}

impl SweeperConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(project_id) = std::env::var("DISK_SWEEPER_PROJECT_ID") {
            config.project_id = project_id;
        }

        if let Ok(zone) = std::env::var("DISK_SWEEPER_ZONE") {
            config.zone = zone;
        }

        if let Ok(filter) = std::env::var("DISK_SWEEPER_FILTER") {
            config.filter = filter;
        }

        if let Ok(cutoff_days) = std::env::var("DISK_SWEEPER_CUTOFF_DAYS") {
            config.cutoff_days = cutoff_days
                .parse()
                .map_err(|e| SweeperError::Configuration(format!("Invalid cutoff_days: {e}")))?;
        }

        Ok(config)
    }

    /// The configured cutoff as a duration
    pub fn cutoff(&self) -> Duration {
        Duration::days(self.cutoff_days)
    }
}
