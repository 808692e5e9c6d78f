//! FilterConfigurator (C10)
//! Mission: drive the index page's filter UI into the state the operator
//! asked for, then trigger the search. Each step is best-effort — a failed
//! step logs a warning and the run continues, because a missing filter
//! control shouldn't sink an otherwise-working scrape.

use std::time::Duration;

use tracing::warn;

use crate::config::{FilterSettings, PlatformSettings};
use crate::driver::PageHandle;
use crate::extractors::poll_selector;

/// Selector names are data, not design (spec §8 names them abstractly);
/// the concrete CSS lives wherever the deployment wires it in. This struct
/// carries whatever this build was configured with.
pub struct FilterSelectors {
    pub currency_select: &'static str,
    pub sell_mode_tab: &'static str,
    pub balance_type_tab: &'static str,
    pub min_price_input: &'static str,
    pub max_price_input: &'static str,
    pub min_volume_input: &'static str,
    pub platform_checkbox: fn(&str) -> String,
    pub confirm_button: &'static str,
    pub results_area: &'static str,
}

pub struct FilterConfigurator<'a> {
    selectors: FilterSelectors,
    page: &'a dyn PageHandle,
}

impl<'a> FilterConfigurator<'a> {
    pub fn new(page: &'a dyn PageHandle, selectors: FilterSelectors) -> Self {
        Self { selectors, page }
    }

    /// Applies currency, sell-mode, balance-type, price/volume bounds and
    /// per-platform checkboxes, then clicks confirm and waits for the
    /// results area to populate.
    pub async fn configure_and_search(
        &self,
        currency: &str,
        filters: &FilterSettings,
        platforms: &PlatformSettings,
        search_timeout: Duration,
    ) {
        self.best_effort("currency", self.selectors.currency_select, currency)
            .await;
        self.best_effort_click("sell mode tab", self.selectors.sell_mode_tab).await;
        self.best_effort_click("balance type tab", self.selectors.balance_type_tab)
            .await;
        self.best_effort(
            "min price",
            self.selectors.min_price_input,
            &filters.min_price.to_string(),
        )
        .await;
        if let Some(max_price) = filters.max_price {
            self.best_effort(
                "max price",
                self.selectors.max_price_input,
                &max_price.to_string(),
            )
            .await;
        }
        self.best_effort(
            "min volume",
            self.selectors.min_volume_input,
            &filters.min_volume.to_string(),
        )
        .await;

        for (name, enabled) in platforms.iter() {
            if enabled {
                let selector = (self.selectors.platform_checkbox)(name);
                self.best_effort_click(&format!("platform checkbox {name}"), &selector)
                    .await;
            }
        }

        self.best_effort_click("confirm and search", self.selectors.confirm_button)
            .await;

        if !poll_selector(self.page, self.selectors.results_area, search_timeout).await {
            warn!("results area did not populate within the search timeout");
        }
    }

    async fn best_effort(&self, step: &str, selector: &str, value: &str) {
        if !self.page.fill(selector, value).await {
            warn!(step, selector, value, "filter step target not found, continuing");
        }
    }

    async fn best_effort_click(&self, step: &str, selector: &str) {
        if !self.page.click(selector).await {
            warn!(step, selector, "click target not found, continuing");
        }
    }
}
