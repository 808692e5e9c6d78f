//! Output (A4): JSON report writer
//! Mission: serialize one run's accepted and discarded items to the path
//! given on the CLI, in the donor's `serde_json::to_writer_pretty` style.

use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::model::{DiscardedItem, ProcessedItem, StorageRecord};

/// Flat projection of a `DiscardedItem` — mirrors `StorageRecord`'s shape
/// so the two halves of the report array read consistently, but carries a
/// `reason` instead of the fee/price fields an accepted item has.
#[derive(Debug, Clone, Serialize)]
pub struct DiscardedRecord {
    pub item_name: String,
    pub quality: Option<String>,
    pub stattrak: bool,
    pub reason: String,
    pub source: &'static str,
}

impl From<&DiscardedItem> for DiscardedRecord {
    fn from(item: &DiscardedItem) -> Self {
        Self {
            item_name: item.candidate.item_name.clone(),
            quality: item.candidate.quality.clone(),
            stattrak: item.candidate.stattrak,
            reason: item.reason.message(),
            source: "buff-arb-scraper",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReportEntry {
    Accepted(StorageRecord),
    Discarded(DiscardedRecord),
}

/// Writes one JSON array: all accepted entries first (in `StorageRecord`'s
/// documented field order), then all discarded entries.
pub fn write_json_report(
    path: impl AsRef<Path>,
    results: &[ProcessedItem],
) -> anyhow::Result<()> {
    let mut entries = Vec::with_capacity(results.len());
    for item in results {
        if let ProcessedItem::Accepted(accepted) = item {
            entries.push(ReportEntry::Accepted(StorageRecord::from(accepted)));
        }
    }
    for item in results {
        if let ProcessedItem::Discarded(discarded) = item {
            entries.push(ReportEntry::Discarded(DiscardedRecord::from(discarded)));
        }
    }

    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating output report {}", path.display()))?;
    serde_json::to_writer_pretty(file, &entries)
        .with_context(|| format!("writing output report {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AcceptedItem, Candidate, Currency, DiscardReason, Listing, MarketSnapshot, Platform, ProfitabilityAnalysis};
    use chrono::{DateTime, Utc};

    fn candidate(name: &str) -> Candidate {
        Candidate {
            item_name: name.to_string(),
            quality: Some("Field-Tested".into()),
            stattrak: false,
            index_url: "https://index/item".into(),
            cheap_market_url: Some("https://cheap/item".into()),
            steam_market_url: Some("https://steam/item".into()),
        }
    }

    fn snapshot(platform: Platform) -> MarketSnapshot {
        MarketSnapshot {
            platform,
            listings: vec![Listing::new(10.0, Currency::Eur)],
            trades: vec![],
            total_volume: 100,
            avg_price_native: 10.0,
            lowest_price_native: 10.0,
        }
    }

    #[test]
    fn accepted_entries_precede_discarded_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let accepted = ProcessedItem::Accepted(AcceptedItem {
            candidate: candidate("AK-47 | Redline"),
            cheap_snapshot: snapshot(Platform::Cheap),
            steam_snapshot: snapshot(Platform::Steam),
            analysis: ProfitabilityAnalysis {
                buy_avg_eur: 10.0,
                sell_avg_eur: 12.5,
                profit_eur: 0.875,
                roi_percent: 8.75,
            },
            scraped_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
        });
        let discarded = ProcessedItem::Discarded(DiscardedItem {
            candidate: candidate("AWP | Asiimov"),
            reason: DiscardReason::CheapValidationFailed,
        });

        write_json_report(&path, std::slice::from_ref(&discarded)).unwrap();
        write_json_report(&path, &[accepted, discarded]).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["item_name"], "AK-47 | Redline");
        assert_eq!(parsed[0]["profitability"], 8.75);
        assert_eq!(parsed[1]["item_name"], "AWP | Asiimov");
        assert_eq!(parsed[1]["reason"], "BUFF validation failed");
    }
}
