//! Price-stability and liquidity gates
//! Mission: keep items whose recent trade history doesn't contradict the
//! current listing price, and that have enough standing supply to trust.

use crate::model::{Listing, TradeRecord};

/// A recent-trades average that is meaningfully lower than the current
/// listing average suggests the price is actively falling and the listing
/// average can't be trusted as an entry price.
const PRICE_FALLING_RATIO: f64 = 0.90;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResult {
    Pass,
    Fail,
}

impl GateResult {
    pub fn passed(self) -> bool {
        matches!(self, GateResult::Pass)
    }
}

/// Fails when `avg(trades) <= 0.90 * avg(listings)`. Either set being empty
/// is insufficient data, not a rejection, so the gate passes.
pub fn price_falling_gate(listings: &[Listing], trades: &[TradeRecord]) -> GateResult {
    if listings.is_empty() || trades.is_empty() {
        return GateResult::Pass;
    }
    let avg_listings = mean(listings.iter().map(|l| l.price_native));
    let avg_trades = mean(trades.iter().map(|t| t.price_native));
    if avg_trades <= PRICE_FALLING_RATIO * avg_listings {
        GateResult::Fail
    } else {
        GateResult::Pass
    }
}

/// Fails when `total_volume < floor`. Applied identically to both
/// marketplaces by the caller.
pub fn liquidity_gate(total_volume: u64, floor: u64) -> GateResult {
    if total_volume < floor {
        GateResult::Fail
    } else {
        GateResult::Pass
    }
}

fn mean(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for v in values {
        sum += v;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Currency;

    fn listings(prices: &[f64]) -> Vec<Listing> {
        prices
            .iter()
            .map(|p| Listing::new(*p, Currency::Cny))
            .collect()
    }

    fn trades(prices: &[f64]) -> Vec<TradeRecord> {
        prices
            .iter()
            .map(|p| TradeRecord {
                price_native: *p,
                currency: Currency::Cny,
                recorded_at: None,
            })
            .collect()
    }

    #[test]
    fn price_falling_boundary_is_inclusive() {
        let l = listings(&[10.0, 10.0, 10.0, 10.0, 10.0]);
        let failing = trades(&[9.0, 9.0, 9.0, 9.0, 9.0]);
        assert_eq!(price_falling_gate(&l, &failing), GateResult::Fail);

        let passing = trades(&[9.01, 9.01, 9.01, 9.01, 9.01]);
        assert_eq!(price_falling_gate(&l, &passing), GateResult::Pass);
    }

    #[test]
    fn price_falling_passes_on_insufficient_data() {
        let l = listings(&[10.0]);
        assert_eq!(price_falling_gate(&l, &[]), GateResult::Pass);
        assert_eq!(price_falling_gate(&[], &trades(&[9.0])), GateResult::Pass);
    }

    #[test]
    fn liquidity_gate_boundary_is_exclusive_below() {
        assert_eq!(liquidity_gate(19, 20), GateResult::Fail);
        assert_eq!(liquidity_gate(20, 20), GateResult::Pass);
    }

    #[test]
    fn s2_price_falling_discard_figures() {
        let l = listings(&[82.0]);
        let t = trades(&[70.0]);
        assert_eq!(price_falling_gate(&l, &t), GateResult::Fail);
    }

    #[test]
    fn s3_low_volume_discard_figures() {
        assert_eq!(liquidity_gate(15, 20), GateResult::Fail);
    }
}
