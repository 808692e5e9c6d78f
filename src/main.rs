//! buffarb: cross-market cosmetic item arbitrage scraper
//!
//! Usage:
//!   buffarb scrape [--headless|--visible] [--concurrent N] [--output PATH]
//!   buffarb test-config
//!   buffarb history --item NAME [--limit L]
//!   buffarb health
//!
//! Environment:
//!   SCRAPER_CONFIG_PATH - Path to TOML config file (default: scraper.toml)
//!   SCRAPER_HEADLESS, SCRAPER_MAX_CONCURRENT, SCRAPER_TIMEOUT_MS - overlay
//!   STORE_URL, STORE_KEY - storage backend overlay

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use buff_arb_scraper::cli::{Cli, Command, ScrapeArgs};
use buff_arb_scraper::config::{warn_unknown_platforms, ScraperConfig};
use buff_arb_scraper::driver::chromium::ChromiumDriver;
use buff_arb_scraper::extractors::index::{IndexExtractor, IndexSelectors};
use buff_arb_scraper::extractors::market::{MarketExtractor, MarketSelectors, VolumeStrategy};
use buff_arb_scraper::fees;
use buff_arb_scraper::filters::{FilterConfigurator, FilterSelectors};
use buff_arb_scraper::model::Platform;
use buff_arb_scraper::output::write_json_report;
use buff_arb_scraper::pipeline::{PacingConfig, Pipeline};
use buff_arb_scraper::processor::ItemProcessor;
use buff_arb_scraper::session::{BrowserSession, SessionMode};
use buff_arb_scraper::storage::remote::RemoteStore;
use buff_arb_scraper::storage::sqlite::SqliteStore;
use buff_arb_scraper::storage::StorageBackend;

const INDEX_URL: &str = "https://index.example/search";

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();
    init_logging();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env();
    if let Err(e) = config.validate() {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    warn_unknown_platforms(&config.platforms);

    let result = match cli.command {
        Command::Scrape(args) => run_scrape(config, args).await,
        Command::TestConfig => run_test_config(&config),
        Command::History(args) => run_history(&config, &args.item, args.limit).await,
        Command::Health => run_health(&config).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run_test_config(config: &ScraperConfig) -> anyhow::Result<ExitCode> {
    let pretty = toml::to_string_pretty(config)?;
    println!("{pretty}");
    Ok(ExitCode::SUCCESS)
}

async fn run_health(config: &ScraperConfig) -> anyhow::Result<ExitCode> {
    let Some(url) = &config.store.url else {
        warn!("store.url not configured, nothing to check");
        return Ok(ExitCode::FAILURE);
    };
    let store = open_store_backend(url, config.store.key.clone())?;
    if store.healthy().await {
        info!("store healthy");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

async fn run_history(config: &ScraperConfig, item: &str, limit: usize) -> anyhow::Result<ExitCode> {
    let Some(url) = &config.store.url else {
        error!("store.url not configured");
        return Ok(ExitCode::FAILURE);
    };
    let store = SqliteStore::open(url)?;
    let records = store.history(item, limit).await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(ExitCode::SUCCESS)
}

async fn run_scrape(mut config: ScraperConfig, args: ScrapeArgs) -> anyhow::Result<ExitCode> {
    if let Some(headless) = args.headless_override() {
        config.scraper.headless = headless;
    }
    if let Some(n) = args.concurrent {
        config.scraper.max_concurrent = n;
    }
    if let Some(save_db) = args.save_db_override() {
        if !save_db {
            config.store.url = None;
        }
    }

    info!(
        headless = config.scraper.headless,
        max_concurrent = config.scraper.max_concurrent,
        "starting scrape"
    );

    let driver = Arc::new(
        ChromiumDriver::launch(config.scraper.headless, None)
            .await
            .map_err(|e| {
                buff_arb_scraper::errors::ScraperError::DriverUnavailable(e.to_string())
            })?,
    );
    let session = BrowserSession::start(
        driver.clone(),
        SessionMode::PersistentProfile {
            profile_dir: "profile".to_string(),
        },
    )
    .await?;

    let index_page = session.open_primary_page().await?;
    index_page
        .goto(
            INDEX_URL,
            buff_arb_scraper::driver::WaitCondition::DomReady,
            Duration::from_millis(config.scraper.timeout_ms),
        )
        .await;

    let configurator = FilterConfigurator::new(index_page.as_ref(), filter_selectors());
    configurator
        .configure_and_search(
            &config.currency.code,
            &config.filters,
            &config.platforms,
            Duration::from_millis(config.scraper.wait_time_ms),
        )
        .await;

    let worker_count = config.scraper.max_concurrent;
    let worker_pages = session
        .open_worker_pages(worker_count, Duration::from_secs(5))
        .await?;

    let liquidity_floor = config.filters.min_volume;
    let fx_rate = fees::DEFAULT_CNY_EUR_RATE;
    let limit = args.limit.unwrap_or(usize::MAX);
    let nav_timeout_ms = config.scraper.timeout_ms;

    let processor_factory: Arc<dyn Fn() -> ItemProcessor + Send + Sync> = Arc::new(move || {
        ItemProcessor {
            cheap_extractor: market_extractor(Platform::Cheap, fx_rate, nav_timeout_ms),
            steam_extractor: market_extractor(Platform::Steam, fx_rate, nav_timeout_ms),
            index_selectors: index_selectors(),
            liquidity_floor,
            fx_rate,
        }
    });

    let pipeline = Pipeline {
        index_extractor: Arc::new(IndexExtractor {
            selectors: index_selectors(),
            table_timeout: Duration::from_millis(config.scraper.wait_time_ms),
            exclude_prefixes: args.exclude.clone(),
        }),
        processor_factory,
        pacing: PacingConfig {
            delay_between_items_ms: config.scraper.delay_between_items_ms,
            random_delay_min_ms: config.scraper.random_delay_min_ms,
            random_delay_max_ms: config.scraper.random_delay_max_ms,
            worker_stagger: Duration::from_secs(5),
        },
    };

    let storage_backend: Option<Arc<dyn StorageBackend>> = match &config.store.url {
        Some(url) if !args.no_db => Some(open_store_backend(url, config.store.key.clone())?),
        _ => None,
    };
    let storage_workers = if args.no_async_storage { 0 } else { 1 };

    let report = pipeline
        .run(index_page, worker_pages, limit, storage_workers, storage_backend, 50)
        .await?;

    info!(
        accepted = report.accepted,
        discarded = report.discarded,
        "scrape finished"
    );

    let output_path = args
        .output
        .unwrap_or_else(|| format!("{}/results.json", config.output.output_directory));
    write_json_report(&output_path, &report.items)?;

    Ok(ExitCode::SUCCESS)
}

/// `store.url` pointing at an `http(s)://` endpoint is treated as a remote
/// store's ingest base URL; anything else is a local sqlite file path.
fn open_store_backend(url: &str, api_key: Option<String>) -> anyhow::Result<Arc<dyn StorageBackend>> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(Arc::new(RemoteStore::new(url, api_key)?))
    } else {
        Ok(Arc::new(SqliteStore::open(url)?))
    }
}

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

fn filter_selectors() -> FilterSelectors {
    FilterSelectors {
        currency_select: "select#currency",
        sell_mode_tab: "button.sell-mode-tab",
        balance_type_tab: "button.balance-type-tab",
        min_price_input: "input#min-price",
        max_price_input: "input#max-price",
        min_volume_input: "input#min-volume",
        platform_checkbox: |name| format!("input#platform-{name}"),
        confirm_button: "button#confirm-search",
        results_area: "div#results",
    }
}

fn market_extractor(platform: Platform, fx_rate: f64, nav_timeout_ms: u64) -> MarketExtractor {
    let selectors = match platform {
        Platform::Cheap => MarketSelectors {
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
        Platform::Steam => MarketSelectors {
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
    };
    MarketExtractor {
        platform,
        selectors,
        fx_rate,
        nav_timeout: Duration::from_millis(nav_timeout_ms),
    }
}
