//! MarketExtractor (C5)
//! Mission: turn one marketplace page into a `MarketSnapshot`, tolerating
//! per-row parse failures without ever panicking the whole extraction.
//!
//! Failure is binary at this layer: `Some(snapshot)` or `None`. The reason
//! for a `None` is logged here and not propagated — `ItemProcessor` only
//! needs to know extraction failed, not why.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::driver::{NavOutcome, PageHandle, WaitCondition};
use crate::fees::convert_cny_to_eur;
use crate::model::{Currency, Listing, MarketSnapshot, Platform, TradeRecord};

const MAX_LISTINGS: usize = 25;
const MAX_TRADES: usize = 5;

/// How a marketplace exposes its authoritative listing count.
pub enum VolumeStrategy {
    /// Cheap market: parse the pagination controls' visible page-number
    /// labels for the max page number, multiply by the row count on the
    /// current page. No pagination control found → volume is just the
    /// current row count.
    Pagination { page_link_selector: &'static str },
    /// Steam market: read a dedicated on-page counter element. Parse
    /// failure → 0.
    Counter { counter_selector: &'static str },
}

pub struct MarketSelectors {
    pub listings_table: &'static str,
    pub fallback_table: &'static str,
    pub listing_row: &'static str,
    pub listing_price_cell: &'static str,
    pub trades_row: &'static str,
    pub trades_price_cell: &'static str,
    pub trades_timestamp_cell: &'static str,
    pub volume: VolumeStrategy,
}

pub struct MarketExtractor {
    pub platform: Platform,
    pub selectors: MarketSelectors,
    pub fx_rate: f64,
    pub nav_timeout: Duration,
}

impl MarketExtractor {
    pub async fn extract(
        &self,
        page: &dyn PageHandle,
        market_url: &str,
        item_name: &str,
        worker_id: usize,
    ) -> Option<MarketSnapshot> {
        let listings_url = self.normalize_url(market_url);

        jittered_sleep(page, 2_000, 5_000).await;
        if !self.goto_with_retry(page, &listings_url).await {
            warn!(item_name, worker_id, platform = self.platform.as_str(), "listings navigation failed");
            return None;
        }

        if !self
            .wait_for_table(page, self.selectors.listings_table, self.selectors.fallback_table)
            .await
        {
            warn!(item_name, worker_id, platform = self.platform.as_str(), "listings table never appeared");
            return None;
        }

        let total_volume = self.compute_total_volume(page).await;
        let listings = self.extract_listings(page).await;

        let trades_url = self.trades_variant(&listings_url);
        jittered_sleep(page, 2_000, 5_000).await;
        let trades = if self.goto_with_retry(page, &trades_url).await
            && self
                .wait_for_table(page, self.selectors.listings_table, self.selectors.fallback_table)
                .await
        {
            self.extract_trades(page).await
        } else {
            debug!(item_name, worker_id, "trades navigation failed, proceeding with empty trade history");
            Vec::new()
        };

        if listings.is_empty() {
            warn!(item_name, worker_id, platform = self.platform.as_str(), "no listings survived extraction");
            return None;
        }

        let avg_price_native = mean_price(&listings);
        let lowest_price_native = listings
            .iter()
            .map(|l| l.price_native)
            .fold(f64::INFINITY, f64::min);

        Some(MarketSnapshot {
            platform: self.platform,
            listings,
            trades,
            total_volume,
            avg_price_native,
            lowest_price_native,
        })
    }

    /// Strips fragment and query from `url`; the cheap market then
    /// re-appends the canonical selling-tab form.
    fn normalize_url(&self, url: &str) -> String {
        let base = url.split(['#', '?']).next().unwrap_or(url);
        match self.platform {
            Platform::Cheap => format!("{base}?from=search#tab=selling"),
            Platform::Steam => base.to_string(),
        }
    }

    fn trades_variant(&self, listings_url: &str) -> String {
        let base = listings_url.split(['#', '?']).next().unwrap_or(listings_url);
        match self.platform {
            Platform::Cheap => format!("{base}?from=search#tab=history"),
            Platform::Steam => format!("{base}#tab=history"),
        }
    }

    /// `Goto(url, DOMReady, nav_timeout)`. On `aborted`, retries once:
    /// sleep 8-15s, `Goto("about:blank")`, sleep 2s, `Goto(url, Load, 30s)`.
    /// Second failure returns false.
    async fn goto_with_retry(&self, page: &dyn PageHandle, url: &str) -> bool {
        match page.goto(url, WaitCondition::DomReady, self.nav_timeout).await {
            NavOutcome::Ok => true,
            NavOutcome::Timeout => false,
            NavOutcome::Aborted => {
                jittered_sleep(page, 8_000, 15_000).await;
                page.goto("about:blank", WaitCondition::Load, Duration::from_secs(5))
                    .await;
                page.sleep(Duration::from_secs(2)).await;
                matches!(
                    page.goto(url, WaitCondition::Load, Duration::from_secs(30)).await,
                    NavOutcome::Ok
                )
            }
        }
    }

    /// Waits for the primary listings selector up to 15s; on timeout,
    /// tries the generic fallback up to 10s.
    async fn wait_for_table(&self, page: &dyn PageHandle, primary: &str, fallback: &str) -> bool {
        if super::poll_selector(page, primary, Duration::from_secs(15)).await {
            return true;
        }
        super::poll_selector(page, fallback, Duration::from_secs(10)).await
    }

    async fn compute_total_volume(&self, page: &dyn PageHandle) -> u64 {
        match &self.selectors.volume {
            VolumeStrategy::Pagination { page_link_selector } => {
                // `query_all_text` returns each pagination link's visible
                // text (just the page number, e.g. "5"), not its `href`.
                let page_labels = page.query_all_text(page_link_selector).await;
                let row_count = page.query_all_text(self.selectors.listing_row).await.len() as u64;
                let max_page = page_labels
                    .iter()
                    .filter_map(|label| parse_page_label(label))
                    .max()
                    .unwrap_or(1);
                if page_labels.is_empty() {
                    row_count
                } else {
                    max_page * row_count
                }
            }
            VolumeStrategy::Counter { counter_selector } => page
                .query_text(counter_selector)
                .await
                .and_then(|text| text.trim().parse::<u64>().ok())
                .unwrap_or(0),
        }
    }

    async fn extract_listings(&self, page: &dyn PageHandle) -> Vec<Listing> {
        let raw_prices = page.query_all_text(self.selectors.listing_price_cell).await;
        raw_prices
            .into_iter()
            .take(MAX_LISTINGS)
            .filter_map(|text| self.parse_price_text(&text))
            .collect()
    }

    async fn extract_trades(&self, page: &dyn PageHandle) -> Vec<TradeRecord> {
        let raw_prices = page.query_all_text(self.selectors.trades_price_cell).await;
        let raw_timestamps = page.query_all_text(self.selectors.trades_timestamp_cell).await;
        raw_prices
            .into_iter()
            .take(MAX_TRADES)
            .enumerate()
            .filter_map(|(i, text)| {
                let (price_native, currency) = self.parse_price_text(&text)
                    .map(|l| (l.price_native, l.currency))?;
                Some(TradeRecord {
                    price_native,
                    currency,
                    recorded_at: raw_timestamps.get(i).cloned(),
                })
            })
            .collect()
    }

    /// Strips the currency glyph and whitespace; rejects non-positive
    /// prices. For the steam market the glyph determines the tagged
    /// currency; CNY-glyph steam listings are converted to EUR here so
    /// every `Listing` downstream is comparable in its own currency.
    fn parse_price_text(&self, raw: &str) -> Option<Listing> {
        let trimmed = raw.trim();
        let is_cny = trimmed.contains('¥') || trimmed.contains("CNY");
        let is_eur = trimmed.contains('€') || trimmed.contains("EUR");
        let numeric: String = trimmed
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let value: f64 = numeric.parse().ok()?;
        if value <= 0.0 {
            return None;
        }
        match self.platform {
            Platform::Cheap => Some(Listing::new(value, Currency::Cny)),
            Platform::Steam => {
                if is_cny && !is_eur {
                    Some(Listing::new(convert_cny_to_eur(value, self.fx_rate), Currency::Eur))
                } else {
                    Some(Listing::new(value, Currency::Eur))
                }
            }
        }
    }
}

fn mean_price(listings: &[Listing]) -> f64 {
    let sum: f64 = listings.iter().map(|l| l.price_native).sum();
    sum / listings.len() as f64
}

fn parse_page_label(label: &str) -> Option<u64> {
    let digits: String = label.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

async fn jittered_sleep(page: &dyn PageHandle, min_ms: u64, max_ms: u64) {
    let millis = rand::thread_rng().gen_range(min_ms..=max_ms);
    page.sleep(Duration::from_millis(millis)).await;
}

#[cfg(test)]
impl MarketExtractor {
    /// Builds an extractor whose selectors match the fixed fixture text
    /// `pipeline::tests` sets up on its fake pages — used where a test
    /// needs a working extractor but isn't itself testing extraction.
    pub(crate) fn fake_always_pass(platform: Platform) -> Self {
        match platform {
            Platform::Cheap => Self {
                platform,
                selectors: MarketSelectors {
                    listings_table: "table.listings",
                    fallback_table: "table tbody tr",
                    listing_row: "tr.listing-row",
                    listing_price_cell: "td.price",
                    trades_row: "tr.trade-row",
                    trades_price_cell: "td.trade-price",
                    trades_timestamp_cell: "td.trade-time",
                    volume: VolumeStrategy::Counter {
                        counter_selector: "span.cheap_qty",
                    },
                },
                fx_rate: crate::fees::DEFAULT_CNY_EUR_RATE,
                nav_timeout: Duration::from_millis(50),
            },
            Platform::Steam => Self {
                platform,
                selectors: MarketSelectors {
                    listings_table: "table.market_listing_table",
                    fallback_table: "table tbody tr",
                    listing_row: "tr.market_listing_row",
                    listing_price_cell: "span.market_listing_price",
                    trades_row: "tr.market_history_row",
                    trades_price_cell: "span.market_history_price",
                    trades_timestamp_cell: "span.market_history_time",
                    volume: VolumeStrategy::Counter {
                        counter_selector: "span.market_commodity_order_qty",
                    },
                },
                fx_rate: crate::fees::DEFAULT_CNY_EUR_RATE,
                nav_timeout: Duration::from_millis(50),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakePage;

    fn cheap_extractor() -> MarketExtractor {
        MarketExtractor {
            platform: Platform::Cheap,
            selectors: MarketSelectors {
                listings_table: "table.listings",
                fallback_table: "table tbody tr",
                listing_row: "tr.listing-row",
                listing_price_cell: "td.price",
                trades_row: "tr.trade-row",
                trades_price_cell: "td.trade-price",
                trades_timestamp_cell: "td.trade-time",
                volume: VolumeStrategy::Pagination {
                    page_link_selector: "a.page-link",
                },
            },
            fx_rate: crate::fees::DEFAULT_CNY_EUR_RATE,
            nav_timeout: Duration::from_secs(1),
        }
    }

    fn steam_extractor() -> MarketExtractor {
        MarketExtractor {
            platform: Platform::Steam,
            selectors: MarketSelectors {
                listings_table: "table.market_listing_table",
                fallback_table: "table tbody tr",
                listing_row: "tr.market_listing_row",
                listing_price_cell: "span.market_listing_price",
                trades_row: "tr.market_history_row",
                trades_price_cell: "span.market_history_price",
                trades_timestamp_cell: "span.market_history_time",
                volume: VolumeStrategy::Counter {
                    counter_selector: "span.market_commodity_order_qty",
                },
            },
            fx_rate: crate::fees::DEFAULT_CNY_EUR_RATE,
            nav_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn s1_cheap_snapshot_matches_scenario() {
        let extractor = cheap_extractor();
        let page = FakePage::new()
            .with_text("table.listings", "present")
            .with_list("td.price", vec!["¥82"; 25])
            .with_list("td.trade-price", vec!["¥81"; 5])
            .with_list("a.page-link", vec!["5", "1"])
            .with_list("tr.listing-row", vec!["row"; 24]);
        let snapshot = extractor
            .extract(&page, "https://cheap.example/item", "AK-47 | Redline", 0)
            .await
            .expect("snapshot");
        assert_eq!(snapshot.total_volume, 5 * 24);
        assert_eq!(snapshot.listings.len(), 25);
        assert!((snapshot.avg_price_native - 82.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn steam_snapshot_reads_counter_and_converts_cny() {
        let extractor = steam_extractor();
        let page = FakePage::new()
            .with_text("table.market_listing_table", "present")
            .with_list("span.market_listing_price", vec!["€12.50"; 10])
            .with_text("span.market_commodity_order_qty", "200");
        let snapshot = extractor
            .extract(&page, "https://steam.example/item", "AK-47 | Redline", 0)
            .await
            .expect("snapshot");
        assert_eq!(snapshot.total_volume, 200);
        assert!((snapshot.avg_price_native - 12.50).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_listings_is_invalid_snapshot() {
        let extractor = steam_extractor();
        let page = FakePage::new().with_text("table.market_listing_table", "present");
        assert!(extractor
            .extract(&page, "https://steam.example/item", "Empty Case | Nothing", 0)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn nav_retry_succeeds_on_second_attempt() {
        let extractor = cheap_extractor();
        let page = FakePage::new()
            .with_nav_script(vec![NavOutcome::Aborted, NavOutcome::Ok])
            .with_text("table.listings", "present")
            .with_list("td.price", vec!["¥10"]);
        let snapshot = extractor
            .extract(&page, "https://cheap.example/item", "Retry | Case", 0)
            .await;
        assert!(snapshot.is_some());
    }

    #[tokio::test]
    async fn nav_failure_twice_returns_none() {
        let extractor = cheap_extractor();
        let page = FakePage::new().with_nav_script(vec![NavOutcome::Aborted, NavOutcome::Aborted]);
        let snapshot = extractor
            .extract(&page, "https://cheap.example/item", "Dead | Case", 0)
            .await;
        assert!(snapshot.is_none());
    }

    #[test]
    fn price_parsing_rejects_non_positive() {
        let extractor = cheap_extractor();
        assert!(extractor.parse_price_text("¥0").is_none());
        assert!(extractor.parse_price_text("¥-5").is_none());
        assert!(extractor.parse_price_text("not a price").is_none());
        assert!(extractor.parse_price_text("¥82.50").is_some());
    }
}
