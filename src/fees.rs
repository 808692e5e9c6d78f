//! Fee, FX, and profitability math
//! Mission: a profitable spread on paper must be profitable after fees and
//! currency conversion.
//!
//! Every function here is pure and total: no I/O, no shared state, no
//! panics on valid input.

use crate::errors::ScraperError;

/// CNY→EUR reference rate. A design constant, not a live quote — the spec
/// treats FX as a single configured divisor, not a market feed.
pub const DEFAULT_CNY_EUR_RATE: f64 = 8.2;

/// Steam's taker fee on a sale.
const STEAM_FEE_RATE: f64 = 0.13;
/// The cheap market's taker fee on a sale.
const CHEAP_FEE_RATE: f64 = 0.025;

/// Fee charged by a named marketplace on a given native-currency price.
pub fn fee(price: f64, market: &str) -> Result<f64, ScraperError> {
    let rate = match market {
        "steam" => STEAM_FEE_RATE,
        "cheap" => CHEAP_FEE_RATE,
        other => return Err(ScraperError::UnknownMarket(other.to_string())),
    };
    Ok(price * rate)
}

/// Converts a CNY amount to EUR using the configured rate. No rounding.
pub fn convert_cny_to_eur(price_cny: f64, rate: f64) -> f64 {
    price_cny / rate
}

/// Net profit in EUR after the sell-side fee. The buy-side fee is treated
/// as already absorbed into the cheap market's quoted price — this is the
/// source's latest revision, fixed here deliberately (see DESIGN.md).
pub fn profit_eur(buy_eur: f64, sell_eur: f64) -> f64 {
    sell_eur * (1.0 - STEAM_FEE_RATE) - buy_eur
}

/// ROI percent using only the sell-side fee, matching `profit_eur`'s
/// convention. `0.0` when `buy_eur` is zero rather than dividing by zero.
pub fn roi_percent(buy_eur: f64, sell_eur: f64) -> f64 {
    if buy_eur == 0.0 {
        return 0.0;
    }
    (sell_eur * (1.0 - STEAM_FEE_RATE) / buy_eur - 1.0) * 100.0
}

/// Computes a `ProfitabilityAnalysis` from the two marketplaces' average
/// native prices, converting the cheap market's CNY average to EUR first.
pub fn analyze(
    cheap_avg_cny: f64,
    steam_avg_native: f64,
    steam_is_cny: bool,
    fx_rate: f64,
) -> crate::model::ProfitabilityAnalysis {
    let buy_avg_eur = convert_cny_to_eur(cheap_avg_cny, fx_rate);
    let sell_avg_eur = if steam_is_cny {
        convert_cny_to_eur(steam_avg_native, fx_rate)
    } else {
        steam_avg_native
    };
    crate::model::ProfitabilityAnalysis {
        buy_avg_eur,
        sell_avg_eur,
        profit_eur: profit_eur(buy_avg_eur, sell_avg_eur),
        roi_percent: roi_percent(buy_avg_eur, sell_avg_eur),
    }
}
