//! REST binding for the Compute Disk Service.
//!
//! Thin translation layer between the [`DiskService`] contract and the
//! compute v1 JSON API. Credential acquisition stays outside: the binding
//! takes a ready-to-use bearer token. Paginated listing is folded into the
//! [`VolumeInventory`] contract, one page buffered at a time.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tracing::warn;

use super::{
    DiskService, ServiceError, SnapshotOperation, SnapshotSpec, VolumeInventory, VolumeRecord,
};
use crate::error::{Result as SweeperResult, SweeperError};

const COMPUTE_API: &str = "https://compute.googleapis.com/compute/v1";

/// How long to sleep between polls of a pending operation
const OPERATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// `DiskService` implementation over the compute v1 REST API
pub struct RestDiskService {
    http: Client,
    token: String,
    base_url: String,
}

impl RestDiskService {
    /// Build a service from a bearer token already acquired by the caller
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            token: token.into(),
            base_url: COMPUTE_API.to_string(),
        }
    }

    /// Build a service from `GOOGLE_OAUTH_ACCESS_TOKEN`
    pub fn from_env() -> SweeperResult<Self> {
        let token = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN").map_err(|_| {
            SweeperError::Configuration(
                "GOOGLE_OAUTH_ACCESS_TOKEN must be set to reach the compute API".to_string(),
            )
        })?;
        Ok(Self::new(token))
    }

    fn disks_url(&self, project_id: &str, zone: &str) -> String {
        format!("{}/projects/{project_id}/zones/{zone}/disks", self.base_url)
    }

    fn operation_url(&self, project_id: &str, zone: &str, operation: &str) -> String {
        format!(
            "{}/projects/{project_id}/zones/{zone}/operations/{operation}",
            self.base_url
        )
    }
}

/// Disk resource as returned by the compute API. Numeric ids and sizes come
/// over the wire as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiskResource {
    #[serde(default)]
    id: String,
    name: String,
    #[serde(default)]
    size_gb: String,
    last_attach_timestamp: Option<String>,
    #[serde(default)]
    labels: HashMap<String, String>,
    #[serde(default)]
    label_fingerprint: String,
    region: Option<String>,
}

impl DiskResource {
    fn into_record(self, zone: &str) -> VolumeRecord {
        let size_gb = match self.size_gb.parse() {
            Ok(size) => size,
            // size is informational only; a malformed value must not block
            // the pass
            Err(_) => {
                if !self.size_gb.is_empty() {
                    warn!(disk = %self.name, raw = %self.size_gb, "unparsable disk size, recording 0");
                }
                0
            }
        };
        VolumeRecord {
            id: self.id,
            name: self.name,
            size_gb,
            last_attached_at: self.last_attach_timestamp,
            labels: self.labels,
            label_fingerprint: self.label_fingerprint,
            region: self.region,
            zone: zone.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiskListResponse {
    #[serde(default)]
    items: Vec<DiskResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResource {
    name: String,
    status: Option<String>,
    error: Option<serde_json::Value>,
}

fn backend_error(err: reqwest::Error) -> ServiceError {
    ServiceError::Backend(err.to_string())
}

#[async_trait]
impl DiskService for RestDiskService {
    async fn list(
        &self,
        project_id: &str,
        zone: &str,
        filter: &str,
    ) -> Result<Box<dyn VolumeInventory>, ServiceError> {
        Ok(Box::new(RestVolumeInventory {
            http: self.http.clone(),
            token: self.token.clone(),
            url: self.disks_url(project_id, zone),
            zone: zone.to_string(),
            filter: filter.to_string(),
            buffered: VecDeque::new(),
            next_page_token: None,
            exhausted: false,
        }))
    }

    async fn set_labels(
        &self,
        project_id: &str,
        zone: &str,
        volume_id: &str,
        labels: HashMap<String, String>,
        fingerprint: &str,
        request_id: &str,
    ) -> Result<(), ServiceError> {
        let url = format!("{}/{volume_id}/setLabels", self.disks_url(project_id, zone));
        let body = serde_json::json!({
            "labels": labels,
            "labelFingerprint": fingerprint,
        });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[("requestId", request_id)])
            .json(&body)
            .send()
            .await
            .map_err(backend_error)?;

        if response.status() == StatusCode::PRECONDITION_FAILED
            || response.status() == StatusCode::CONFLICT
        {
            return Err(ServiceError::FingerprintConflict(format!(
                "volume {volume_id}: labels changed since fetch"
            )));
        }
        response.error_for_status().map_err(backend_error)?;
        Ok(())
    }

    async fn create_snapshot(
        &self,
        project_id: &str,
        zone: &str,
        volume_name: &str,
        spec: SnapshotSpec,
        request_id: &str,
    ) -> Result<Box<dyn SnapshotOperation>, ServiceError> {
        let url = format!(
            "{}/{volume_name}/createSnapshot",
            self.disks_url(project_id, zone)
        );
        let body = serde_json::json!({
            "name": spec.name,
            "labels": spec.labels,
            "storageLocations": spec.storage_locations,
        });
        let operation: OperationResource = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .query(&[("requestId", request_id)])
            .json(&body)
            .send()
            .await
            .map_err(backend_error)?
            .error_for_status()
            .map_err(backend_error)?
            .json()
            .await
            .map_err(backend_error)?;

        Ok(Box::new(RestSnapshotOperation {
            http: self.http.clone(),
            token: self.token.clone(),
            url: self.operation_url(project_id, zone, &operation.name),
        }))
    }

    async fn delete(
        &self,
        project_id: &str,
        zone: &str,
        volume_name: &str,
        request_id: &str,
    ) -> Result<(), ServiceError> {
        let url = format!("{}/{volume_name}", self.disks_url(project_id, zone));
        self.http
            .delete(&url)
            .bearer_auth(&self.token)
            .query(&[("requestId", request_id)])
            .send()
            .await
            .map_err(backend_error)?
            .error_for_status()
            .map_err(backend_error)?;
        Ok(())
    }
}

struct RestVolumeInventory {
    http: Client,
    token: String,
    url: String,
    zone: String,
    filter: String,
    buffered: VecDeque<VolumeRecord>,
    next_page_token: Option<String>,
    exhausted: bool,
}

#[async_trait]
impl VolumeInventory for RestVolumeInventory {
    async fn next(&mut self) -> Result<Option<VolumeRecord>, ServiceError> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }

            let mut query = vec![("filter", self.filter.clone())];
            if let Some(token) = self.next_page_token.take() {
                query.push(("pageToken", token));
            }
            let page: DiskListResponse = self
                .http
                .get(&self.url)
                .bearer_auth(&self.token)
                .query(&query)
                .send()
                .await
                .map_err(backend_error)?
                .error_for_status()
                .map_err(backend_error)?
                .json()
                .await
                .map_err(backend_error)?;

            self.next_page_token = page.next_page_token;
            self.exhausted = self.next_page_token.is_none();
            self.buffered
                .extend(page.items.into_iter().map(|d| d.into_record(&self.zone)));
        }
    }
}

struct RestSnapshotOperation {
    http: Client,
    token: String,
    url: String,
}

#[async_trait]
impl SnapshotOperation for RestSnapshotOperation {
    async fn wait(&mut self) -> Result<(), ServiceError> {
        loop {
            let operation: OperationResource = self
                .http
                .get(&self.url)
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(backend_error)?
                .error_for_status()
                .map_err(backend_error)?
                .json()
                .await
                .map_err(backend_error)?;

            if operation.status.as_deref() == Some("DONE") {
                if let Some(error) = operation.error {
                    return Err(ServiceError::OperationFailed(format!(
                        "operation {}: {error}",
                        operation.name
                    )));
                }
                return Ok(());
            }
            tokio::time::sleep(OPERATION_POLL_INTERVAL).await;
        }
    }
}
