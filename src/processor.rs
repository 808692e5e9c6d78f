//! ItemProcessor (C6)
//! Mission: run the per-candidate state machine — fetch both marketplaces
//! in parallel on worker-owned pages, apply the validation gates, compute
//! profitability, and classify the candidate as accepted or discarded.

use chrono::Utc;
use tracing::{info, warn};

use crate::driver::{PageHandle, WaitCondition};
use crate::extractors::index::IndexSelectors;
use crate::extractors::market::MarketExtractor;
use crate::fees;
use crate::model::{AcceptedItem, Candidate, DiscardReason, DiscardedItem, ProcessedItem};
use crate::validator::{liquidity_gate, price_falling_gate, GateResult};

pub struct ItemProcessor {
    pub cheap_extractor: MarketExtractor,
    pub steam_extractor: MarketExtractor,
    pub index_selectors: IndexSelectors,
    pub liquidity_floor: u64,
    pub fx_rate: f64,
}

impl ItemProcessor {
    /// Runs one candidate to completion on the given worker-owned page
    /// pair. Never creates or destroys pages — that is the pipeline's job.
    pub async fn process(
        &self,
        mut candidate: Candidate,
        worker_id: usize,
        cheap_page: &dyn PageHandle,
        steam_page: &dyn PageHandle,
    ) -> ProcessedItem {
        self.ensure_urls(&mut candidate, cheap_page).await;

        let cheap_url = candidate.cheap_market_url.clone();
        let steam_url = candidate.steam_market_url.clone();

        // Both extractions run in parallel on distinct worker-owned pages.
        // If either returns nil the other is still allowed to complete —
        // cancelling mid-navigation risks leaving a tab in a dirty state,
        // which is worse than one wasted page load.
        let cheap_fut = async {
            match &cheap_url {
                Some(url) => {
                    self.cheap_extractor
                        .extract(cheap_page, url, &candidate.item_name, worker_id)
                        .await
                }
                None => None,
            }
        };
        let steam_fut = async {
            match &steam_url {
                Some(url) => {
                    self.steam_extractor
                        .extract(steam_page, url, &candidate.item_name, worker_id)
                        .await
                }
                None => None,
            }
        };
        let (cheap_snapshot, steam_snapshot) = tokio::join!(cheap_fut, steam_fut);

        let Some(cheap_snapshot) = cheap_snapshot else {
            return discard(candidate, DiscardReason::CheapValidationFailed);
        };
        let Some(steam_snapshot) = steam_snapshot else {
            return discard(candidate, DiscardReason::SteamExtractionFailed);
        };

        if price_falling_gate(&cheap_snapshot.listings, &cheap_snapshot.trades) == GateResult::Fail
        {
            return discard(candidate, DiscardReason::CheapValidationFailed);
        }

        if liquidity_gate(cheap_snapshot.total_volume, self.liquidity_floor) == GateResult::Fail {
            return discard(
                candidate,
                DiscardReason::LowCheapVolume {
                    volume: cheap_snapshot.total_volume,
                    floor: self.liquidity_floor,
                },
            );
        }
        if liquidity_gate(steam_snapshot.total_volume, self.liquidity_floor) == GateResult::Fail {
            return discard(
                candidate,
                DiscardReason::LowSteamVolume {
                    volume: steam_snapshot.total_volume,
                    floor: self.liquidity_floor,
                },
            );
        }

        let analysis = fees::analyze(
            cheap_snapshot.avg_price_native,
            steam_snapshot.avg_price_native,
            false,
            self.fx_rate,
        );
        if !analysis.profit_eur.is_finite() || !analysis.roi_percent.is_finite() {
            return discard(candidate, DiscardReason::ProfitabilityCalcFailed);
        }

        info!(
            item = candidate.item_name,
            worker_id,
            roi = analysis.roi_percent,
            "candidate accepted"
        );
        ProcessedItem::Accepted(AcceptedItem {
            candidate,
            cheap_snapshot,
            steam_snapshot,
            analysis,
            scraped_at: Utc::now(),
        })
    }

    /// If either market URL is missing, navigates to `index_url` and
    /// re-reads the two platform-specific outbound links.
    async fn ensure_urls(&self, candidate: &mut Candidate, page: &dyn PageHandle) {
        if candidate.cheap_market_url.is_some() && candidate.steam_market_url.is_some() {
            return;
        }
        let outcome = page
            .goto(
                &candidate.index_url,
                WaitCondition::DomReady,
                std::time::Duration::from_secs(20),
            )
            .await;
        if !matches!(outcome, crate::driver::NavOutcome::Ok) {
            warn!(
                item = candidate.item_name,
                "could not re-navigate to index page to recover market URLs"
            );
            return;
        }
        if candidate.cheap_market_url.is_none() {
            candidate.cheap_market_url = page.attr(self.index_selectors.cheap_link, "href").await;
        }
        if candidate.steam_market_url.is_none() {
            candidate.steam_market_url = page.attr(self.index_selectors.steam_link, "href").await;
        }
    }
}

fn discard(candidate: Candidate, reason: DiscardReason) -> ProcessedItem {
    ProcessedItem::Discarded(DiscardedItem { candidate, reason })
}
