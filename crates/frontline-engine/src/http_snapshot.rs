//! HTTP client for the authoritative upstream state.
//!
//! Sends requests to `{snapshot_url}/map_state` for the full ownership,
//! online, and population snapshot used by reconciliation, and to
//! `{snapshot_url}/facilities` for static reference data.

use std::time::Duration;

use frontline_core::{SnapshotSource, SourceError};
use frontline_types::{FacilityLink, FacilityMetadata, MapSnapshot};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;
use crate::populate::ReferenceSource;

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Facility metadata and lattice links as served upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Every facility.
    #[serde(default)]
    pub facilities: Vec<FacilityMetadata>,
    /// Every lattice link.
    #[serde(default)]
    pub links: Vec<FacilityLink>,
}

impl ReferenceData {
    /// Whether nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }
}

/// Snapshot and reference data client.
#[derive(Debug, Clone)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSnapshotSource {
    /// Create a client for `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Snapshot`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::Snapshot {
                message: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Unavailable(format!("GET {url} returned {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SourceError::Unavailable(format!("GET {url} body read failed: {e}")))?;
        debug!(url = %url, bytes = body.len(), "upstream response received");
        serde_json::from_slice(&body)
            .map_err(|e| SourceError::Malformed(format!("GET {url} returned bad JSON: {e}")))
    }
}

impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self) -> Result<MapSnapshot, SourceError> {
        self.get_json("map_state").await
    }
}

impl ReferenceSource for HttpSnapshotSource {
    async fn fetch_reference(&self) -> Result<ReferenceData, SourceError> {
        self.get_json("facilities").await
    }
}
