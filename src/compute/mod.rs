//! # Compute Disk Service Contract
//!
//! The service seam both pipelines run against. The pipelines only ever see
//! these traits; the REST binding in [`rest`] is one implementation, the test
//! suites supply recording mocks.
//!
//! `VolumeInventory` is a finite, non-restartable pass over the volumes
//! matching a server-side filter. `Ok(None)` is the end-of-inventory
//! sentinel and the only successful terminator; an `Err` mid-iteration is
//! fatal to the whole pipeline run.

pub mod rest;

pub use rest::RestDiskService;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Immutable snapshot of one volume, fetched fresh at the start of each
/// pipeline pass and never cached across passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeRecord {
    /// Opaque resource id, used to address label mutations
    pub id: String,
    /// Resource name, unique within project+zone
    pub name: String,
    pub size_gb: i64,
    /// RFC 3339 timestamp of the last attach/detach; absent or empty means
    /// the volume was never attached
    pub last_attached_at: Option<String>,
    /// Label map; an absent map on the wire is treated as empty
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Optimistic-concurrency token captured at fetch time and sent back
    /// with label mutations
    pub label_fingerprint: String,
    /// Region used to co-locate the safety snapshot
    pub region: Option<String>,
    pub zone: String,
}

impl VolumeRecord {
    /// Current value of the deletion mark label, if any
    pub fn marked_value(&self) -> Option<&str> {
        crate::labels::marked_value(&self.labels)
    }
}

/// Specification for the safety snapshot taken before deletion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotSpec {
    pub name: String,
    pub labels: HashMap<String, String>,
    /// Storage locations co-located with the source volume's region
    pub storage_locations: Vec<String>,
}

impl SnapshotSpec {
    /// Build the snapshot spec for a volume: `{name}-snapshot`, tagged with
    /// the tool identity, stored alongside the volume's region.
    pub fn for_volume(volume: &VolumeRecord) -> Self {
        let mut labels = HashMap::new();
        labels.insert("created-by".to_string(), "disk-sweeper".to_string());
        Self {
            name: format!("{}-snapshot", volume.name),
            labels,
            storage_locations: volume.region.iter().cloned().collect(),
        }
    }
}

/// Failure reported by the compute service for a single call
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The label fingerprint went stale: something else mutated the volume
    /// between fetch and write. Never retried; the next pass re-fetches.
    #[error("label fingerprint conflict: {0}")]
    FingerprintConflict(String),

    /// Transport or server-side failure
    #[error("backend error: {0}")]
    Backend(String),

    /// An asynchronous operation reached a terminal state other than success
    #[error("operation failed: {0}")]
    OperationFailed(String),
}

/// Fresh idempotency token for a mutating call
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Compute Disk Service operations the pipelines consume
#[async_trait]
pub trait DiskService: Send + Sync {
    /// Begin a finite pass over the volumes matching `filter`
    async fn list(
        &self,
        project_id: &str,
        zone: &str,
        filter: &str,
    ) -> Result<Box<dyn VolumeInventory>, ServiceError>;

    /// Replace the volume's label map, guarded by the fetch-time fingerprint
    async fn set_labels(
        &self,
        project_id: &str,
        zone: &str,
        volume_id: &str,
        labels: HashMap<String, String>,
        fingerprint: &str,
        request_id: &str,
    ) -> Result<(), ServiceError>;

    /// Start an asynchronous snapshot of the volume
    async fn create_snapshot(
        &self,
        project_id: &str,
        zone: &str,
        volume_name: &str,
        spec: SnapshotSpec,
        request_id: &str,
    ) -> Result<Box<dyn SnapshotOperation>, ServiceError>;

    /// Destroy the volume
    async fn delete(
        &self,
        project_id: &str,
        zone: &str,
        volume_name: &str,
        request_id: &str,
    ) -> Result<(), ServiceError>;
}

/// Lazy sequence of volume records produced by a single `list` call
#[async_trait]
pub trait VolumeInventory: Send {
    /// Next record, `Ok(None)` at end of inventory
    async fn next(&mut self) -> Result<Option<VolumeRecord>, ServiceError>;
}

/// Handle on a provider-side asynchronous operation
#[async_trait]
pub trait SnapshotOperation: Send {
    /// Block until the operation reaches a terminal state
    async fn wait(&mut self) -> Result<(), ServiceError>;
}
