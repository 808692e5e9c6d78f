//! RemoteStore (A5b): an HTTP-backed `StorageBackend`, for when `store.url`
//! points at a remote relational store's ingest endpoint rather than a local
//! sqlite file. Grounded on the donor's `reqwest::Client`-per-backend shape
//! in `backtest_v2/oracle/chainlink.rs` (`ChainlinkIngestor`): one client
//! built once with a fixed timeout, JSON in, JSON out, `anyhow::Context` on
//! every fallible hop.
//!
//! The core only needs `SaveBatch`/`Healthy` (§1); this implementation picks
//! `POST {url}/batch` and `GET {url}/health` as the wire shape, which is a
//! deployment detail the spec deliberately leaves unspecified.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, warn};

use crate::model::StorageRecord;
use crate::storage::StorageBackend;

#[derive(Serialize)]
struct BatchPayload<'a> {
    records: &'a [StorageRecord],
}

pub struct RemoteStore {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl StorageBackend for RemoteStore {
    async fn save_batch(&self, batch: &[StorageRecord]) -> anyhow::Result<()> {
        let url = format!("{}/batch", self.base_url.trim_end_matches('/'));
        let request = self
            .authed(self.client.post(&url))
            .json(&BatchPayload { records: batch });
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "remote store rejected batch of {}: {}",
                batch.len(),
                response.status()
            ));
        }
        Ok(())
    }

    async fn healthy(&self) -> bool {
        let url = format!("{}/health", self.base_url.trim_end_matches('/'));
        match self.authed(self.client.get(&url)).send().await {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "remote store health check returned non-success");
                false
            }
            Err(e) => {
                error!("remote store health check failed: {e}");
                false
            }
        }
    }
}
