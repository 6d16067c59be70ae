#![allow(dead_code)] // not every test binary uses every helper

//! Shared test doubles: a recording mock of the Compute Disk Service.
//!
//! The mock applies label mutations and deletions to its stored volumes so
//! multi-pass tests observe realistic state, and it enforces the fingerprint
//! guard the way the real service does.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use disk_sweeper::compute::{
    DiskService, ServiceError, SnapshotOperation, SnapshotSpec, VolumeInventory, VolumeRecord,
};
use disk_sweeper::labels;

/// One call observed by the mock, in issue order
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    List {
        filter: String,
    },
    SetLabels {
        volume_id: String,
        labels: HashMap<String, String>,
        fingerprint: String,
        request_id: String,
    },
    CreateSnapshot {
        volume: String,
        snapshot: String,
        storage_locations: Vec<String>,
    },
    SnapshotWait {
        volume: String,
    },
    Delete {
        volume: String,
        request_id: String,
    },
}

impl RecordedCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::List { .. })
    }
}

#[derive(Default)]
struct MockState {
    volumes: Vec<VolumeRecord>,
    calls: Vec<RecordedCall>,
    fail_set_labels: Vec<String>,
    /// Volume ids listed with a fingerprint that no longer matches the
    /// stored one, as if something mutated the volume after the fetch
    stale_fingerprints: Vec<String>,
    fail_snapshot: Vec<String>,
    fail_snapshot_wait: Vec<String>,
    hang_snapshot_wait: Vec<String>,
    fail_delete: Vec<String>,
    /// Yield this many records, then fail iteration
    inventory_fault_after: Option<usize>,
}

/// Recording in-memory `DiskService`
#[derive(Default)]
pub struct MockDiskService {
    state: Arc<Mutex<MockState>>,
}

impl MockDiskService {
    pub fn with_volumes(volumes: Vec<VolumeRecord>) -> Self {
        let service = Self::default();
        service.state.lock().unwrap().volumes = volumes;
        service
    }

    pub fn fail_set_labels_for(&self, volume_id: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_set_labels
            .push(volume_id.to_string());
    }

    pub fn fail_snapshot_for(&self, volume_name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_snapshot
            .push(volume_name.to_string());
    }

    pub fn fail_snapshot_wait_for(&self, volume_name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_snapshot_wait
            .push(volume_name.to_string());
    }

    pub fn hang_snapshot_wait_for(&self, volume_name: &str) {
        self.state
            .lock()
            .unwrap()
            .hang_snapshot_wait
            .push(volume_name.to_string());
    }

    pub fn serve_stale_fingerprint_for(&self, volume_id: &str) {
        self.state
            .lock()
            .unwrap()
            .stale_fingerprints
            .push(volume_id.to_string());
    }

    pub fn fail_delete_for(&self, volume_name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_delete
            .push(volume_name.to_string());
    }

    pub fn set_inventory_fault_after(&self, yielded: usize) {
        self.state.lock().unwrap().inventory_fault_after = Some(yielded);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(RecordedCall::is_mutation)
            .collect()
    }

    /// Current stored volumes, after any applied mutations
    pub fn volumes(&self) -> Vec<VolumeRecord> {
        self.state.lock().unwrap().volumes.clone()
    }
}

#[async_trait]
impl DiskService for MockDiskService {
    async fn list(
        &self,
        _project_id: &str,
        _zone: &str,
        filter: &str,
    ) -> Result<Box<dyn VolumeInventory>, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall::List {
            filter: filter.to_string(),
        });
        // The mock does not interpret the filter; tests control the stored
        // set, which also lets them simulate a misconfigured filter.
        let mut items = state.volumes.clone();
        for item in &mut items {
            if state.stale_fingerprints.iter().any(|id| id == &item.id) {
                item.label_fingerprint = format!("{}-stale", item.label_fingerprint);
            }
        }
        Ok(Box::new(MockInventory {
            items,
            cursor: 0,
            fault_after: state.inventory_fault_after,
        }))
    }

    async fn set_labels(
        &self,
        _project_id: &str,
        _zone: &str,
        volume_id: &str,
        labels: HashMap<String, String>,
        fingerprint: &str,
        request_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall::SetLabels {
            volume_id: volume_id.to_string(),
            labels: labels.clone(),
            fingerprint: fingerprint.to_string(),
            request_id: request_id.to_string(),
        });
        if state.fail_set_labels.iter().any(|id| id == volume_id) {
            return Err(ServiceError::Backend("set labels refused".to_string()));
        }
        let volume = state
            .volumes
            .iter_mut()
            .find(|v| v.id == volume_id)
            .ok_or_else(|| ServiceError::Backend(format!("no such volume {volume_id}")))?;
        if volume.label_fingerprint != fingerprint {
            return Err(ServiceError::FingerprintConflict(format!(
                "volume {volume_id}: labels changed since fetch"
            )));
        }
        volume.labels = labels;
        volume.label_fingerprint = format!("{fingerprint}-next");
        Ok(())
    }

    async fn create_snapshot(
        &self,
        _project_id: &str,
        _zone: &str,
        volume_name: &str,
        spec: SnapshotSpec,
        _request_id: &str,
    ) -> Result<Box<dyn SnapshotOperation>, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall::CreateSnapshot {
            volume: volume_name.to_string(),
            snapshot: spec.name.clone(),
            storage_locations: spec.storage_locations.clone(),
        });
        if state.fail_snapshot.iter().any(|name| name == volume_name) {
            return Err(ServiceError::Backend("snapshot refused".to_string()));
        }
        let fail_wait = state
            .fail_snapshot_wait
            .iter()
            .any(|name| name == volume_name);
        let hang_wait = state
            .hang_snapshot_wait
            .iter()
            .any(|name| name == volume_name);
        Ok(Box::new(MockSnapshotOperation {
            volume: volume_name.to_string(),
            fail: fail_wait,
            hang: hang_wait,
            state: Arc::clone(&self.state),
        }))
    }

    async fn delete(
        &self,
        _project_id: &str,
        _zone: &str,
        volume_name: &str,
        request_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RecordedCall::Delete {
            volume: volume_name.to_string(),
            request_id: request_id.to_string(),
        });
        if state.fail_delete.iter().any(|name| name == volume_name) {
            return Err(ServiceError::Backend("google says no".to_string()));
        }
        state.volumes.retain(|v| v.name != volume_name);
        Ok(())
    }
}

struct MockInventory {
    items: Vec<VolumeRecord>,
    cursor: usize,
    fault_after: Option<usize>,
}

#[async_trait]
impl VolumeInventory for MockInventory {
    async fn next(&mut self) -> Result<Option<VolumeRecord>, ServiceError> {
        if self.fault_after == Some(self.cursor) {
            return Err(ServiceError::Backend("inventory exploded".to_string()));
        }
        let item = self.items.get(self.cursor).cloned();
        self.cursor += 1;
        Ok(item)
    }
}

struct MockSnapshotOperation {
    volume: String,
    fail: bool,
    hang: bool,
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl SnapshotOperation for MockSnapshotOperation {
    async fn wait(&mut self) -> Result<(), ServiceError> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(RecordedCall::SnapshotWait {
                volume: self.volume.clone(),
            });
        if self.hang {
            // operation that never reaches a terminal state
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(ServiceError::OperationFailed(
                "snapshot never became ready".to_string(),
            ));
        }
        Ok(())
    }
}

/// Build a volume record. `attached_days_ago = None` means never attached;
/// `mark` sets the deletion label value when present.
pub fn volume(name: &str, attached_days_ago: Option<i64>, mark: Option<&str>) -> VolumeRecord {
    let mut label_map = HashMap::new();
    label_map.insert("goog-gke-volume".to_string(), String::new());
    if let Some(value) = mark {
        label_map.insert(labels::MARKED_FOR_DELETION.to_string(), value.to_string());
    }
    VolumeRecord {
        id: format!("id-{name}"),
        name: name.to_string(),
        size_gb: 100,
        last_attached_at: attached_days_ago.map(|d| (Utc::now() - Duration::days(d)).to_rfc3339()),
        labels: label_map,
        label_fingerprint: format!("fp-{name}"),
        region: Some("us-east1".to_string()),
        zone: "us-east1-a".to_string(),
    }
}
