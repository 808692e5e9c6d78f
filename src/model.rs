//! Core data model
//! Mission: every value that crosses a queue boundary is a concrete type,
//! never a loosely-typed map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Marketplace tag. `Cheap` is the CNY-priced Chinese marketplace, `Steam`
/// is the western marketplace (EUR, occasionally CNY-denominated listings
/// that get converted on ingest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Cheap,
    Steam,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Cheap => "cheap",
            Platform::Steam => "steam",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    Cny,
    Eur,
}

/// A row from the index table that survived the hard exclusion set.
/// Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub item_name: String,
    pub quality: Option<String>,
    pub stattrak: bool,
    pub index_url: String,
    pub cheap_market_url: Option<String>,
    pub steam_market_url: Option<String>,
}

impl Candidate {
    /// Names starting with `Sticker`, containing `Music Kit`, or lacking a
    /// `|` separator are excluded before a `Candidate` is ever constructed.
    pub fn passes_hard_exclusion(display_name: &str) -> bool {
        if display_name.starts_with("Sticker") {
            return false;
        }
        if display_name.contains("Music Kit") {
            return false;
        }
        if !display_name.contains('|') {
            return false;
        }
        true
    }
}

/// An offer currently on sale. Ephemeral — exists only inside one
/// extraction call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    pub price_native: f64,
    pub currency: Currency,
    pub quantity: u32,
}

impl Listing {
    pub fn new(price_native: f64, currency: Currency) -> Self {
        Self {
            price_native,
            currency,
            quantity: 1,
        }
    }
}

/// A completed sale recorded in marketplace history. Ephemeral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub price_native: f64,
    pub currency: Currency,
    pub recorded_at: Option<String>,
}

/// Per-marketplace extraction result. Invalid (and treated as extraction
/// failure) if `listings` is empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub platform: Platform,
    /// Cheapest first, bounded to 25.
    pub listings: Vec<Listing>,
    /// Most recent first, bounded to 5.
    pub trades: Vec<TradeRecord>,
    /// Authoritative liquidity counter: pagination-derived (cheap market)
    /// or on-page total (steam market).
    pub total_volume: u64,
    pub avg_price_native: f64,
    pub lowest_price_native: f64,
}

impl MarketSnapshot {
    pub fn is_valid(&self) -> bool {
        !self.listings.is_empty()
    }
}

/// Deterministic profitability result derived from two `MarketSnapshot`s.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfitabilityAnalysis {
    pub buy_avg_eur: f64,
    pub sell_avg_eur: f64,
    pub profit_eur: f64,
    pub roi_percent: f64,
}

/// Why a candidate was discarded. Matches the closed set the spec defines;
/// no other strings are ever produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    CheapValidationFailed,
    SteamExtractionFailed,
    LowCheapVolume { volume: u64, floor: u64 },
    LowSteamVolume { volume: u64, floor: u64 },
    ProfitabilityCalcFailed,
}

impl DiscardReason {
    pub fn message(&self) -> String {
        match self {
            DiscardReason::CheapValidationFailed => "BUFF validation failed".to_string(),
            DiscardReason::SteamExtractionFailed => "Steam extraction failed".to_string(),
            DiscardReason::LowCheapVolume { volume, floor } => {
                format!("Low cheap-market volume ({volume}/{floor})")
            }
            DiscardReason::LowSteamVolume { volume, floor } => {
                format!("Low steam-market volume ({volume}/{floor})")
            }
            DiscardReason::ProfitabilityCalcFailed => "Profitability calc failed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedItem {
    pub candidate: Candidate,
    pub cheap_snapshot: MarketSnapshot,
    pub steam_snapshot: MarketSnapshot,
    pub analysis: ProfitabilityAnalysis,
    pub scraped_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscardedItem {
    pub candidate: Candidate,
    pub reason: DiscardReason,
}

/// The terminal state of `ItemProcessor` for a single candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcessedItem {
    Accepted(AcceptedItem),
    Discarded(DiscardedItem),
}

impl ProcessedItem {
    pub fn candidate(&self) -> &Candidate {
        match self {
            ProcessedItem::Accepted(a) => &a.candidate,
            ProcessedItem::Discarded(d) => &d.candidate,
        }
    }
}

/// Flat projection of an `AcceptedItem`, the shape the storage sink and the
/// JSON report both write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageRecord {
    pub item_name: String,
    pub quality: Option<String>,
    pub stattrak: bool,
    pub profitability: f64,
    pub profit_eur: f64,
    pub buff_url: Option<String>,
    pub buff_price_eur: f64,
    pub steam_url: Option<String>,
    pub steam_price_eur: f64,
    pub scraped_at: String,
    pub source: &'static str,
}

impl From<&AcceptedItem> for StorageRecord {
    fn from(item: &AcceptedItem) -> Self {
        Self {
            item_name: item.candidate.item_name.clone(),
            quality: item.candidate.quality.clone(),
            stattrak: item.candidate.stattrak,
            profitability: round2(item.analysis.roi_percent),
            profit_eur: item.analysis.profit_eur,
            buff_url: item.candidate.cheap_market_url.clone(),
            buff_price_eur: item.analysis.buy_avg_eur,
            steam_url: item.candidate.steam_market_url.clone(),
            steam_price_eur: item.analysis.sell_avg_eur,
            scraped_at: format_scraped_at(item.scraped_at),
            source: "buff-arb-scraper",
        }
    }
}

pub fn format_scraped_at(ts: DateTime<Utc>) -> String {
    ts.format("%Y/%m/%d-%H:%M").to_string()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
