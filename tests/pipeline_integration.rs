//! Integration tests for the scrape pipeline.
//!
//! Exercises `Pipeline::run` end-to-end through the public API with the
//! `driver::fake` in-memory page, which this crate only exposes outside
//! `src/` builds when the `test-util` feature is on (see `[dev-dependencies]`
//! in Cargo.toml). No chromiumoxide session, no network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use buff_arb_scraper::driver::fake::FakePage;
use buff_arb_scraper::extractors::index::{IndexExtractor, IndexSelectors};
use buff_arb_scraper::extractors::market::{MarketExtractor, MarketSelectors, VolumeStrategy};
use buff_arb_scraper::fees;
use buff_arb_scraper::model::{Platform, ProcessedItem};
use buff_arb_scraper::pipeline::{PacingConfig, Pipeline};
use buff_arb_scraper::processor::ItemProcessor;
use buff_arb_scraper::session::WorkerPages;
use buff_arb_scraper::storage::StorageBackend;

fn index_selectors() -> IndexSelectors {
    IndexSelectors {
        results_table: "table.results",
        fallback_table: "table tbody tr",
        row: "tr.cell-count",
        name_cell: "td.name",
        row_link: "a.row-link",
        cheap_link: "a.cheap-link",
        steam_link: "a.steam-link",
    }
}

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
            volume: VolumeStrategy::Counter {
                counter_selector: "span.cheap_qty",
            },
        },
        fx_rate: fees::DEFAULT_CNY_EUR_RATE,
        nav_timeout: Duration::from_millis(50),
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
        fx_rate: fees::DEFAULT_CNY_EUR_RATE,
        nav_timeout: Duration::from_millis(50),
    }
}

fn processor_factory() -> ItemProcessor {
    ItemProcessor {
        cheap_extractor: cheap_extractor(),
        steam_extractor: steam_extractor(),
        index_selectors: index_selectors(),
        liquidity_floor: 20,
        fx_rate: fees::DEFAULT_CNY_EUR_RATE,
    }
}

fn worker_page_pair(cheap_trade_price: &'static str, listing_qty: &'static str) -> WorkerPages {
    WorkerPages {
        cheap_page: Box::new(
            FakePage::new()
                .with_text("table.listings", "present")
                .with_list("td.price", vec!["¥82"; 25])
                .with_list("td.trade-price", vec![cheap_trade_price; 5])
                .with_text("span.cheap_qty", listing_qty),
        ),
        steam_page: Box::new(
            FakePage::new()
                .with_text("table.market_listing_table", "present")
                .with_list("span.market_listing_price", vec!["€12.50"; 25])
                .with_text("span.market_commodity_order_qty", "200"),
        ),
    }
}

struct CountingBackend {
    total: AtomicUsize,
}

#[async_trait]
impl StorageBackend for CountingBackend {
    async fn save_batch(&self, batch: &[buff_arb_scraper::model::StorageRecord]) -> anyhow::Result<()> {
        self.total.fetch_add(batch.len(), Ordering::SeqCst);
        Ok(())
    }
    async fn healthy(&self) -> bool {
        true
    }
}

/// S1-ish end-to-end run: a handful of profitable candidates flow from the
/// index page, through two scraper workers, into a counting storage sink.
#[tokio::test]
async fn full_run_accepts_profitable_candidates_and_flushes_storage() {
    let names = vec!["AK-47 | Redline (Field-Tested)", "AWP | Asiimov (Minimal Wear)"];
    let index_page = FakePage::new()
        .with_text("table.results", "present")
        .with_list("td.name", names)
        .with_list("tr.cell-count", vec!["6"; 2])
        .with_attr_list(
            "a.row-link",
            "href",
            vec!["https://index.example/item/1", "https://index.example/item/2"],
        )
        .with_attr_list("a.cheap-link", "href", vec!["https://cheap/1", "https://cheap/2"])
        .with_attr_list("a.steam-link", "href", vec!["https://steam/1", "https://steam/2"]);

    let worker_pages = vec![
        worker_page_pair("¥81", "120"),
        worker_page_pair("¥81", "120"),
    ];

    let pipeline = Pipeline {
        index_extractor: Arc::new(IndexExtractor {
            selectors: index_selectors(),
            table_timeout: Duration::from_millis(50),
            exclude_prefixes: Vec::new(),
        }),
        processor_factory: Arc::new(processor_factory),
        pacing: PacingConfig {
            delay_between_items_ms: 0,
            random_delay_min_ms: 0,
            random_delay_max_ms: 0,
            worker_stagger: Duration::from_millis(0),
        },
    };

    let backend = Arc::new(CountingBackend {
        total: AtomicUsize::new(0),
    });

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.run(Box::new(index_page), worker_pages, 10, 1, Some(backend.clone()), 10),
    )
    .await
    .expect("pipeline should terminate within the bounded time")
    .unwrap();

    assert_eq!(report.accepted + report.discarded, 2);
    assert_eq!(backend.total.load(Ordering::SeqCst), report.accepted);
    for item in &report.items {
        if let ProcessedItem::Accepted(accepted) = item {
            assert!(accepted.analysis.profit_eur > 0.0);
        }
    }
}

/// A candidate whose cheap-market listing volume sits under the liquidity
/// floor is discarded rather than propagated to storage.
#[tokio::test]
async fn full_run_discards_below_liquidity_floor() {
    let index_page = FakePage::new()
        .with_text("table.results", "present")
        .with_list("td.name", vec!["Glock-18 | Fade (Factory New)"])
        .with_list("tr.cell-count", vec!["6"])
        .with_attr_list("a.row-link", "href", vec!["https://index.example/item/1"])
        .with_attr_list("a.cheap-link", "href", vec!["https://cheap/1"])
        .with_attr_list("a.steam-link", "href", vec!["https://steam/1"]);

    let worker_pages = vec![worker_page_pair("¥81", "5")];

    let pipeline = Pipeline {
        index_extractor: Arc::new(IndexExtractor {
            selectors: index_selectors(),
            table_timeout: Duration::from_millis(50),
            exclude_prefixes: Vec::new(),
        }),
        processor_factory: Arc::new(processor_factory),
        pacing: PacingConfig {
            delay_between_items_ms: 0,
            random_delay_min_ms: 0,
            random_delay_max_ms: 0,
            worker_stagger: Duration::from_millis(0),
        },
    };

    let report = tokio::time::timeout(
        Duration::from_secs(5),
        pipeline.run(Box::new(index_page), worker_pages, 10, 0, None, 10),
    )
    .await
    .expect("pipeline should terminate within the bounded time")
    .unwrap();

    assert_eq!(report.accepted, 0);
    assert_eq!(report.discarded, 1);
    match &report.items[0] {
        ProcessedItem::Discarded(d) => assert!(d.reason.message().contains("Low cheap-market volume")),
        ProcessedItem::Accepted(_) => panic!("expected a discard"),
    }
}
