//! StorageSink (C8): the trait the pipeline's storage stage writes
//! through, plus the concrete sqlite-backed implementation (A5).

pub mod remote;
pub mod sqlite;

use async_trait::async_trait;

use crate::model::StorageRecord;

/// `SaveBatch`/`Healthy` — the only two operations the core needs from a
/// remote store. Batches are all-or-nothing; a failed batch is logged and
/// dropped, it never aborts the run.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn save_batch(&self, batch: &[StorageRecord]) -> anyhow::Result<()>;
    async fn healthy(&self) -> bool;
}
