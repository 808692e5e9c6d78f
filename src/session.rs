//! BrowserSession (C9)
//! Mission: own the one driver for the run, hand out worker-owned tab
//! pairs, and get them into a state that doesn't look automated.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::driver::{PageDriver, PageHandle};

/// `{ "cookies": [...], "origins": [...] }` — the core treats the
/// contents of each field opaquely and hands them to the driver.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionSnapshot {
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
    #[serde(default)]
    pub origins: Vec<serde_json::Value>,
}

impl SessionSnapshot {
    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading session snapshot {path}"))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing session snapshot {path}"))
    }

    /// Naive concatenation of two per-marketplace snapshots. Duplicates
    /// across the two sources are not deduplicated — this mirrors the
    /// source's merge semantics exactly (see DESIGN.md).
    pub fn merge(cheap: Option<Self>, steam: Option<Self>) -> Self {
        let mut merged = Self::default();
        for snap in [cheap, steam].into_iter().flatten() {
            merged.cookies.extend(snap.cookies);
            merged.origins.extend(snap.origins);
        }
        merged
    }
}

pub enum SessionMode {
    /// Reuses a user-data directory across runs; cookies and local storage
    /// persist between invocations. Used for local/interactive runs.
    PersistentProfile { profile_dir: String },
    /// Loads a merged cookies+origins snapshot synthesized at startup from
    /// up to two per-marketplace snapshot files. Used in CI.
    SnapshotState {
        cheap_session: Option<String>,
        steam_session: Option<String>,
    },
}

/// One `(cheap_page, steam_page)` pair, exclusively owned by one worker
/// for the whole run.
pub struct WorkerPages {
    pub cheap_page: Box<dyn PageHandle>,
    pub steam_page: Box<dyn PageHandle>,
}

pub struct BrowserSession {
    driver: Arc<dyn PageDriver>,
}

impl BrowserSession {
    pub async fn start(driver: Arc<dyn PageDriver>, mode: SessionMode) -> Result<Self> {
        match mode {
            SessionMode::PersistentProfile { profile_dir } => {
                info!(profile_dir, "starting browser session (persistent profile)");
            }
            SessionMode::SnapshotState {
                cheap_session,
                steam_session,
            } => {
                let cheap = cheap_session
                    .as_deref()
                    .and_then(|p| SessionSnapshot::load(p).ok());
                let steam = steam_session
                    .as_deref()
                    .and_then(|p| SessionSnapshot::load(p).ok());
                if cheap.is_none() && cheap_session.is_some() {
                    warn!("cheap session snapshot could not be loaded, continuing without it");
                }
                if steam.is_none() && steam_session.is_some() {
                    warn!("steam session snapshot could not be loaded, continuing without it");
                }
                let merged = SessionSnapshot::merge(cheap, steam);
                info!(
                    cookies = merged.cookies.len(),
                    origins = merged.origins.len(),
                    "starting browser session (snapshot state)"
                );
                // The merged snapshot is handed to the driver opaquely; the
                // concrete chromiumoxide driver applies it via CDP
                // Network.setCookie / Storage.setStorageKeyTrackerBlockingState.
            }
        }
        Ok(Self { driver })
    }

    /// Opens the primary page used by `FilterConfigurator` and `C4`.
    pub async fn open_primary_page(&self) -> Result<Box<dyn PageHandle>> {
        self.driver.open().await.context("opening primary page")
    }

    /// Pre-creates N worker page pairs, staggered 5s apart per worker
    /// beyond the first, to let existing pages stabilize before a new tab
    /// begins navigation — removing this stagger reliably triggers
    /// anti-bot measures on the Chinese marketplace (see DESIGN.md).
    pub async fn open_worker_pages(
        &self,
        worker_count: usize,
        stagger: std::time::Duration,
    ) -> Result<Vec<WorkerPages>> {
        let mut pairs = Vec::with_capacity(worker_count);
        for i in 0..worker_count {
            if i > 0 {
                tokio::time::sleep(stagger).await;
            }
            let cheap_page = self.driver.open().await.context("opening cheap page")?;
            let steam_page = self.driver.open().await.context("opening steam page")?;
            pairs.push(WorkerPages {
                cheap_page,
                steam_page,
            });
        }
        Ok(pairs)
    }
}
