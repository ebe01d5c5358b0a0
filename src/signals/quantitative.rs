//! Quantitative metrics bundle, recomputed for every active market on each
//! processor tick regardless of thresholds.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::{Orderbook, Trade};

const INFORMATION_FLOW_WINDOW_MINS: f64 = 5.0;
/// Depth considered "good" when normalizing the liquidity score.
const DEPTH_NORMALIZER: f64 = 10_000.0;
/// Markets within a day of expiration run hotter.
const PRE_EVENT_HOURS: f64 = 24.0;
const PRE_EVENT_VOL_MULTIPLIER: f64 = 1.5;

#[derive(Debug, Clone, Serialize)]
pub struct QuantitativeSignal {
    pub market_ticker: String,
    pub timestamp: DateTime<Utc>,

    // Market efficiency
    pub efficiency_score: f64,
    pub price_volatility: f64,
    pub information_flow: f64,

    // Probability calibration
    pub calibration_error: f64,
    pub expected_value: f64,
    pub historical_mean: f64,

    // Liquidity
    pub bid_ask_spread: f64,
    pub liquidity_score: f64,
    pub market_depth: i64,

    // Event-driven
    pub time_to_event: f64,
    pub event_volatility: f64,
    pub pre_event_signal: bool,

    // Statistics
    pub sharpe_ratio: f64,
    pub z_score: f64,
    pub trend_strength: f64,
}

/// Computes the bundle. None when the book is one-sided.
pub fn compute_quantitative(
    ticker: &str,
    orderbook: &Orderbook,
    trades: &[Trade],
    expiration_time: Option<DateTime<Utc>>,
) -> Option<QuantitativeSignal> {
    let best_bid = orderbook.bids.first()?.price as f64;
    let best_ask = orderbook.asks.first()?.price as f64;

    let mid_price = (best_bid + best_ask) / 2.0;
    let spread = best_ask - best_bid;

    let mut sig = QuantitativeSignal {
        market_ticker: ticker.to_string(),
        timestamp: Utc::now(),
        efficiency_score: 0.0,
        price_volatility: 0.0,
        information_flow: 0.0,
        calibration_error: 0.0,
        expected_value: mid_price / 100.0,
        historical_mean: 0.0,
        bid_ask_spread: spread,
        liquidity_score: liquidity_score(orderbook, spread),
        market_depth: orderbook.bid_depth() + orderbook.ask_depth(),
        time_to_event: 0.0,
        event_volatility: 0.0,
        pre_event_signal: false,
        sharpe_ratio: 0.0,
        z_score: 0.0,
        trend_strength: 0.0,
    };

    if trades.len() > 1 {
        sig.price_volatility = volatility(trades);
        sig.historical_mean = mean_price(trades);
        sig.z_score = z_score(mid_price / 100.0, sig.historical_mean, sig.price_volatility);
        sig.trend_strength = trend_strength(trades);
    }

    // Efficiency: how tight the spread is relative to realized volatility.
    sig.efficiency_score = if sig.price_volatility > 0.0 {
        ((spread / 100.0) / sig.price_volatility).min(1.0)
    } else {
        1.0
    };

    if !trades.is_empty() {
        let cutoff = Utc::now() - chrono::Duration::minutes(INFORMATION_FLOW_WINDOW_MINS as i64);
        let recent = trades.iter().filter(|t| t.timestamp > cutoff).count();
        sig.information_flow = recent as f64 / INFORMATION_FLOW_WINDOW_MINS;
    }

    if sig.historical_mean > 0.0 {
        sig.calibration_error = (sig.expected_value - sig.historical_mean).abs();
    }

    if let Some(expiration) = expiration_time {
        let to_event = expiration - Utc::now();
        sig.time_to_event = to_event.num_seconds() as f64 / 3600.0;
        if sig.time_to_event < PRE_EVENT_HOURS {
            sig.event_volatility = sig.price_volatility * PRE_EVENT_VOL_MULTIPLIER;
            sig.pre_event_signal = true;
        } else {
            sig.event_volatility = sig.price_volatility;
        }
    }

    if sig.price_volatility > 0.0 {
        sig.sharpe_ratio = (sig.expected_value - sig.historical_mean) / sig.price_volatility;
    }

    Some(sig)
}

fn liquidity_score(orderbook: &Orderbook, spread: f64) -> f64 {
    let depth = (orderbook.bid_depth() + orderbook.ask_depth()) as f64;
    let depth_score = (depth / DEPTH_NORMALIZER).min(1.0);
    let spread_score = (1.0 - spread / 100.0).max(0.0);
    depth_score * 0.6 + spread_score * 0.4
}

fn mean_price(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.price as f64 / 100.0).sum::<f64>() / trades.len() as f64
}

fn volatility(trades: &[Trade]) -> f64 {
    if trades.len() < 2 {
        return 0.0;
    }
    let mean = mean_price(trades);
    let variance = trades
        .iter()
        .map(|t| {
            let p = t.price as f64 / 100.0;
            (p - mean) * (p - mean)
        })
        .sum::<f64>()
        / trades.len() as f64;
    variance.sqrt()
}

fn z_score(current: f64, mean: f64, std_dev: f64) -> f64 {
    if std_dev == 0.0 {
        return 0.0;
    }
    (current - mean) / std_dev
}

/// Slope of a linear regression of trade price on ordinal index, scaled by
/// 10 and clamped to [0, 1].
fn trend_strength(trades: &[Trade]) -> f64 {
    if trades.len() < 3 {
        return 0.0;
    }

    let n = trades.len() as f64;
    let (mut sum_x, mut sum_y, mut sum_xy, mut sum_x2) = (0.0, 0.0, 0.0, 0.0);
    for (i, t) in trades.iter().enumerate() {
        let x = i as f64;
        let y = t.price as f64 / 100.0;
        sum_x += x;
        sum_y += y;
        sum_xy += x * y;
        sum_x2 += x * x;
    }

    let denom = n * sum_x2 - sum_x * sum_x;
    if denom == 0.0 {
        return 0.0;
    }
    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    (slope.abs() * 10.0).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PriceLevel, TradeSide};

    fn trade(price: i64) -> Trade {
        Trade {
            market_ticker: "T".to_string(),
            side: TradeSide::Yes,
            price,
            quantity: 1,
            timestamp: Utc::now(),
        }
    }

    fn book(bid: i64, ask: i64, qty: i64) -> Orderbook {
        let mut ob = Orderbook::new("T");
        ob.bids = vec![PriceLevel { price: bid, quantity: qty }];
        ob.asks = vec![PriceLevel { price: ask, quantity: qty }];
        ob
    }

    #[test]
    fn one_sided_book_yields_nothing() {
        let mut ob = Orderbook::new("T");
        ob.bids = vec![PriceLevel { price: 50, quantity: 10 }];
        assert!(compute_quantitative("T", &ob, &[], None).is_none());
    }

    #[test]
    fn no_volatility_means_perfect_efficiency() {
        let sig = compute_quantitative("T", &book(55, 56, 10), &[], None).unwrap();
        assert_eq!(sig.efficiency_score, 1.0);
        assert_eq!(sig.price_volatility, 0.0);
        assert!((sig.expected_value - 0.555).abs() < 1e-9);
    }

    #[test]
    fn flat_trades_have_no_trend() {
        let trades: Vec<Trade> = (0..5).map(|_| trade(50)).collect();
        assert_eq!(trend_strength(&trades), 0.0);
    }

    #[test]
    fn steep_trend_clamps_to_one() {
        // +20 cents per trade = slope 0.2 in probability units, x10 = 2.0 -> 1.0
        let trades: Vec<Trade> = (0..5).map(|i| trade(10 + i * 20)).collect();
        assert_eq!(trend_strength(&trades), 1.0);
    }

    #[test]
    fn z_score_guards_zero_stddev() {
        assert_eq!(z_score(0.6, 0.5, 0.0), 0.0);
        assert!((z_score(0.6, 0.5, 0.05) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn pre_event_regime_scales_volatility() {
        let trades = vec![trade(40), trade(60)];
        let soon = Utc::now() + chrono::Duration::hours(2);
        let sig = compute_quantitative("T", &book(45, 55, 10), &trades, Some(soon)).unwrap();
        assert!(sig.pre_event_signal);
        assert!((sig.event_volatility - sig.price_volatility * 1.5).abs() < 1e-12);

        let far = Utc::now() + chrono::Duration::days(30);
        let sig = compute_quantitative("T", &book(45, 55, 10), &trades, Some(far)).unwrap();
        assert!(!sig.pre_event_signal);
        assert_eq!(sig.event_volatility, sig.price_volatility);
    }
}
