//! Pipeline (C7)
//! Mission: one producer, N scraper workers, M storage workers, connected
//! by two typed channels. No mutexes in the core — all coordination is via
//! channel send/receive and task join.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::extractors::index::IndexExtractor;
use crate::model::{Candidate, ProcessedItem};
use crate::processor::ItemProcessor;
use crate::session::{BrowserSession, WorkerPages};
use crate::storage::StorageBackend;

#[derive(Debug, Clone)]
pub struct PacingConfig {
    pub delay_between_items_ms: u64,
    pub random_delay_min_ms: u64,
    pub random_delay_max_ms: u64,
    pub worker_stagger: Duration,
}

/// Candidates channel capacity is worker_count * 2, per spec.
fn candidates_capacity(worker_count: usize) -> usize {
    (worker_count * 2).max(1)
}

/// `results` channel buffer; unbounded in spirit, a very large bound in
/// practice so a slow storage stage still applies some backpressure
/// instead of growing without limit.
const RESULTS_CAPACITY: usize = 1024;

pub struct PipelineReport {
    pub accepted: usize,
    pub discarded: usize,
    /// Every processed item, in arrival order at the storage stage —
    /// unspecified cross-worker order, per the concurrency model. Consumed
    /// by the JSON report writer; not otherwise used by the core.
    pub items: Vec<ProcessedItem>,
}

pub struct Pipeline {
    pub index_extractor: Arc<IndexExtractor>,
    pub processor_factory: Arc<dyn Fn() -> ItemProcessor + Send + Sync>,
    pub pacing: PacingConfig,
}

impl Pipeline {
    /// Runs the full producer/worker/storage lifecycle to completion.
    /// `worker_pages` must have exactly `worker_count` entries, pre-created
    /// (and staggered) by `BrowserSession::open_worker_pages`.
    pub async fn run(
        &self,
        index_page: Box<dyn crate::driver::PageHandle>,
        mut worker_pages: Vec<WorkerPages>,
        limit: usize,
        storage_workers: usize,
        storage_backend: Option<Arc<dyn StorageBackend>>,
        batch_size: usize,
    ) -> anyhow::Result<PipelineReport> {
        let worker_count = worker_pages.len();
        let (cand_tx, cand_rx) = mpsc::channel::<Candidate>(candidates_capacity(worker_count));
        let (result_tx, result_rx) = mpsc::channel::<ProcessedItem>(RESULTS_CAPACITY);

        let producer = {
            let index_extractor = Arc::clone(&self.index_extractor);
            tokio::spawn(async move {
                let candidates = index_extractor.extract(index_page.as_ref(), limit).await;
                info!(count = candidates.len(), "producer enumerated candidates");
                for candidate in candidates {
                    if cand_tx.send(candidate).await.is_err() {
                        break;
                    }
                }
                index_page.close().await;
                // `cand_tx` drops here, closing the channel.
            })
        };

        let cand_rx = Arc::new(tokio::sync::Mutex::new(cand_rx));
        let mut worker_handles: Vec<JoinHandle<()>> = Vec::with_capacity(worker_count);
        for (worker_id, pages) in worker_pages.drain(..).enumerate() {
            let cand_rx = Arc::clone(&cand_rx);
            let result_tx = result_tx.clone();
            let processor = (self.processor_factory)();
            let pacing = self.pacing.clone();
            worker_handles.push(tokio::spawn(async move {
                run_worker(worker_id, processor, pages, cand_rx, result_tx, pacing).await;
            }));
        }
        // Drop the pipeline's own sender clone so `results` only closes once
        // every worker's clone has also dropped.
        drop(result_tx);

        // Invariant: no storage worker observes end-of-stream until every
        // scraper worker has exited. We enforce this by joining all worker
        // handles before the storage stage is allowed to see channel close
        // — which it naturally does once every `result_tx` clone drops,
        // and clones only live inside worker tasks.
        for handle in worker_handles {
            if let Err(e) = handle.await {
                warn!("scraper worker task panicked: {e}");
            }
        }
        producer.await.ok();

        let report = run_storage_stage(result_rx, storage_workers, storage_backend, batch_size)
            .await;

        Ok(report)
    }
}

async fn run_worker(
    worker_id: usize,
    processor: ItemProcessor,
    pages: WorkerPages,
    cand_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Candidate>>>,
    result_tx: mpsc::Sender<ProcessedItem>,
    pacing: PacingConfig,
) {
    info!(worker_id, "worker starting");
    loop {
        let candidate = {
            let mut rx = cand_rx.lock().await;
            rx.recv().await
        };
        let Some(candidate) = candidate else {
            break;
        };
        let item_name = candidate.item_name.clone();
        let processed = processor
            .process(
                candidate,
                worker_id,
                pages.cheap_page.as_ref(),
                pages.steam_page.as_ref(),
            )
            .await;
        if result_tx.send(processed).await.is_err() {
            warn!(worker_id, item_name, "results channel closed early, dropping item");
            break;
        }
        sleep_between_items(&pacing).await;
    }
    pages.cheap_page.close().await;
    pages.steam_page.close().await;
    info!(worker_id, "worker exiting");
}

async fn sleep_between_items(pacing: &PacingConfig) {
    let jitter = if pacing.random_delay_max_ms >= pacing.random_delay_min_ms {
        rand::thread_rng().gen_range(pacing.random_delay_min_ms..=pacing.random_delay_max_ms)
    } else {
        0
    };
    let total = Duration::from_millis(pacing.delay_between_items_ms + jitter);
    tokio::time::sleep(total).await;
}

/// M storage workers consuming `results`. M=0 means a single terminal
/// flush performed inline once the channel closes, rather than a
/// dedicated task — the two are the same semantics, just without the
/// task-spawn overhead (see DESIGN.md).
async fn run_storage_stage(
    result_rx: mpsc::Receiver<ProcessedItem>,
    storage_workers: usize,
    backend: Option<Arc<dyn StorageBackend>>,
    batch_size: usize,
) -> PipelineReport {
    let mut accepted = 0usize;
    let mut discarded = 0usize;
    let mut items = Vec::new();

    let Some(backend) = backend else {
        // No storage configured: drain for counting only.
        let mut rx = result_rx;
        while let Some(item) = rx.recv().await {
            tally(&item, &mut accepted, &mut discarded);
            items.push(item);
        }
        return PipelineReport { accepted, discarded, items };
    };

    if storage_workers == 0 {
        let mut rx = result_rx;
        let mut batch = Vec::with_capacity(batch_size);
        while let Some(item) = rx.recv().await {
            tally(&item, &mut accepted, &mut discarded);
            if let ProcessedItem::Accepted(accepted_item) = &item {
                batch.push(crate::model::StorageRecord::from(accepted_item));
                if batch.len() == batch_size {
                    flush(&backend, &mut batch).await;
                }
            }
            items.push(item);
        }
        flush(&backend, &mut batch).await;
        return PipelineReport { accepted, discarded, items };
    }

    // Fan the single `results` receiver out to N storage workers sharing
    // one end; each maintains its own local batch.
    let rx = Arc::new(tokio::sync::Mutex::new(result_rx));
    let collected = Arc::new(tokio::sync::Mutex::new((0usize, 0usize, Vec::new())));
    let mut handles = Vec::with_capacity(storage_workers);
    for _ in 0..storage_workers {
        let rx = Arc::clone(&rx);
        let backend = Arc::clone(&backend);
        let collected = Arc::clone(&collected);
        handles.push(tokio::spawn(async move {
            let mut batch = Vec::with_capacity(batch_size);
            loop {
                let item = {
                    let mut guard = rx.lock().await;
                    guard.recv().await
                };
                let Some(item) = item else { break };
                if let ProcessedItem::Accepted(accepted_item) = &item {
                    batch.push(crate::model::StorageRecord::from(accepted_item));
                    if batch.len() == batch_size {
                        flush(&backend, &mut batch).await;
                    }
                }
                {
                    let mut guard = collected.lock().await;
                    tally(&item, &mut guard.0, &mut guard.1);
                    guard.2.push(item);
                }
            }
            flush(&backend, &mut batch).await;
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
    // Every storage-worker task has been joined, so this is the only
    // remaining strong reference.
    let (accepted, discarded, items) = Arc::try_unwrap(collected)
        .map(|m| m.into_inner())
        .unwrap_or_else(|arc| {
            // Should be unreachable given the join above; fall back to a
            // non-blocking read rather than panic.
            arc.try_lock()
                .map(|g| (g.0, g.1, g.2.clone()))
                .unwrap_or((0, 0, Vec::new()))
        });
    PipelineReport { accepted, discarded, items }
}

fn tally(item: &ProcessedItem, accepted: &mut usize, discarded: &mut usize) {
    match item {
        ProcessedItem::Accepted(_) => *accepted += 1,
        ProcessedItem::Discarded(_) => *discarded += 1,
    }
}

async fn flush(backend: &Arc<dyn StorageBackend>, batch: &mut Vec<crate::model::StorageRecord>) {
    if batch.is_empty() {
        return;
    }
    if let Err(e) = backend.save_batch(batch).await {
        warn!("batch of {} records dropped: {e}", batch.len());
    }
    batch.clear();
}
