//! Layered configuration: TOML file + environment overlay
//! Mission: one validated config object before any browser is launched;
//! mirrors the donor repo's `*Config::from_env()` / `*Config::load()`
//! convention (see DESIGN.md).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ScraperError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperSettings {
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_wait_time_ms")]
    pub wait_time_ms: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_delay_between_items_ms")]
    pub delay_between_items_ms: u64,
    #[serde(default = "default_random_delay_min_ms")]
    pub random_delay_min_ms: u64,
    #[serde(default = "default_random_delay_max_ms")]
    pub random_delay_max_ms: u64,
    #[serde(default = "default_delay_between_batches_ms")]
    pub delay_between_batches_ms: u64,
}

fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_wait_time_ms() -> u64 {
    15_000
}
fn default_max_concurrent() -> usize {
    2
}
fn default_delay_between_items_ms() -> u64 {
    5_000
}
fn default_random_delay_min_ms() -> u64 {
    2_000
}
fn default_random_delay_max_ms() -> u64 {
    5_000
}
fn default_delay_between_batches_ms() -> u64 {
    0
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            headless: default_true(),
            timeout_ms: default_timeout_ms(),
            wait_time_ms: default_wait_time_ms(),
            max_concurrent: default_max_concurrent(),
            delay_between_items_ms: default_delay_between_items_ms(),
            random_delay_min_ms: default_random_delay_min_ms(),
            random_delay_max_ms: default_random_delay_max_ms(),
            delay_between_batches_ms: default_delay_between_batches_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSettings {
    #[serde(default)]
    pub min_price: f64,
    #[serde(default)]
    pub max_price: Option<f64>,
    #[serde(default = "default_min_volume")]
    pub min_volume: u64,
}

fn default_min_volume() -> u64 {
    20
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_price: 0.0,
            max_price: None,
            min_volume: default_min_volume(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    #[serde(default = "default_true")]
    pub cheap: bool,
    #[serde(default = "default_true")]
    pub steam: bool,
    #[serde(default)]
    pub alt1: bool,
    #[serde(default)]
    pub alt2: bool,
}

impl Default for PlatformSettings {
    fn default() -> Self {
        Self {
            cheap: true,
            steam: true,
            alt1: false,
            alt2: false,
        }
    }
}

impl PlatformSettings {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, bool)> {
        [
            ("cheap", self.cheap),
            ("steam", self.steam),
            ("alt1", self.alt1),
            ("alt2", self.alt2),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputSettings {
    #[serde(default)]
    pub save_screenshot: bool,
    #[serde(default)]
    pub save_html: bool,
    #[serde(default = "default_output_directory")]
    pub output_directory: String,
}

fn default_output_directory() -> String {
    "output".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreSettings {
    pub url: Option<String>,
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScraperConfig {
    #[serde(default)]
    pub scraper: ScraperSettings,
    #[serde(default)]
    pub currency: CurrencySettings,
    #[serde(default)]
    pub balance_type: BalanceTypeSettings,
    #[serde(default)]
    pub price_mode: PriceModeSettings,
    #[serde(default)]
    pub filters: FilterSettings,
    #[serde(default)]
    pub platforms: PlatformSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySettings {
    #[serde(default = "default_currency_code")]
    pub code: String,
}

fn default_currency_code() -> String {
    "CNY".to_string()
}

impl Default for CurrencySettings {
    fn default() -> Self {
        Self {
            code: default_currency_code(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BalanceTypeSettings {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PriceModeSettings {
    #[serde(default)]
    pub sell_mode: String,
}

const KNOWN_CURRENCIES: &[&str] = &["CNY", "USD", "RUB", "EUR"];
const KNOWN_PLATFORMS: &[&str] = &["cheap", "steam", "alt1", "alt2"];

impl ScraperConfig {
    /// Parses a TOML file at `path`; falls back to defaults if the file
    /// doesn't exist, matching the donor's `PerfConfig::load` fallback
    /// behavior.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads `$SCRAPER_CONFIG_PATH` (default `scraper.toml`), then
    /// overlays individual `SCRAPER_*`/`STORE_*` environment variables.
    pub fn from_env() -> Self {
        let path =
            std::env::var("SCRAPER_CONFIG_PATH").unwrap_or_else(|_| "scraper.toml".to_string());
        let mut config = Self::load(&path).unwrap_or_else(|e| {
            debug!("using default scraper config ({path}): {e}");
            Self::default()
        });
        config.overlay_env();
        config
    }

    fn overlay_env(&mut self) {
        if let Ok(v) = std::env::var("SCRAPER_HEADLESS") {
            if let Ok(b) = v.parse() {
                self.scraper.headless = b;
            }
        }
        if let Ok(v) = std::env::var("SCRAPER_MAX_CONCURRENT") {
            if let Ok(n) = v.parse() {
                self.scraper.max_concurrent = n;
            }
        }
        if let Ok(v) = std::env::var("SCRAPER_TIMEOUT_MS") {
            if let Ok(n) = v.parse() {
                self.scraper.timeout_ms = n;
            }
        }
        if let Ok(v) = std::env::var("STORE_URL") {
            self.store.url = Some(v);
        }
        if let Ok(v) = std::env::var("STORE_KEY") {
            self.store.key = Some(v);
        }
    }

    /// `max_concurrent ∈ 1..=5`, `random_delay_max_ms ≥ random_delay_min_ms`,
    /// `min_price ≥ 0`. Unknown currency/platform strings only warn.
    pub fn validate(&self) -> Result<(), ScraperError> {
        if !(1..=5).contains(&self.scraper.max_concurrent) {
            return Err(ScraperError::ConfigInvalid(format!(
                "scraper.max_concurrent must be in 1..=5, got {}",
                self.scraper.max_concurrent
            )));
        }
        if self.scraper.random_delay_max_ms < self.scraper.random_delay_min_ms {
            return Err(ScraperError::ConfigInvalid(
                "scraper.random_delay_max_ms must be >= random_delay_min_ms".to_string(),
            ));
        }
        if self.filters.min_price < 0.0 {
            return Err(ScraperError::ConfigInvalid(
                "filters.min_price must be >= 0".to_string(),
            ));
        }
        if !KNOWN_CURRENCIES.contains(&self.currency.code.as_str()) {
            warn!(currency = self.currency.code, "unknown currency code");
        }
        Ok(())
    }
}

pub fn warn_unknown_platforms(platforms: &PlatformSettings) {
    for (name, _) in platforms.iter() {
        if !KNOWN_PLATFORMS.contains(&name) {
            warn!(platform = name, "unknown platform");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(ScraperConfig::default().validate().is_ok());
    }

    #[test]
    fn concurrent_out_of_range_is_invalid() {
        let mut config = ScraperConfig::default();
        config.scraper.max_concurrent = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn delay_bounds_must_be_ordered() {
        let mut config = ScraperConfig::default();
        config.scraper.random_delay_min_ms = 9_000;
        config.scraper.random_delay_max_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = ScraperConfig::load("/nonexistent/scraper.toml").unwrap();
        assert_eq!(config.scraper.max_concurrent, default_max_concurrent());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = ScraperConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: ScraperConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.scraper.max_concurrent, config.scraper.max_concurrent);
    }
}
