//! Historical hit-rate estimator keyed by (alert type, market).
//!
//! An alert is scored once its outcome window has elapsed, against the
//! snapshot series: the mid move from just before the alert to the first
//! snapshot past the window decides a hit per the rules below. Confidence
//! is the running hit rate discounted by sample size.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::state::StateEngine;

use super::{Alert, AlertAction, AlertType};

/// With no history the estimator answers explicitly low, not neutral.
const COLD_START_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertStats {
    pub hit_rate: f64,
    pub sample_size: usize,
    /// Running mean post-alert mid move, cents.
    pub avg_move: f64,
    pub confidence: f64,
}

pub struct BacktestHarness {
    engine: Arc<StateEngine>,
    stats: HashMap<String, AlertStats>,
}

impl BacktestHarness {
    pub fn new(engine: Arc<StateEngine>) -> Self {
        Self {
            engine,
            stats: HashMap::new(),
        }
    }

    /// (confidence, hit_rate, sample_size) for an alert about to fire.
    pub fn alert_stats(&self, market_ticker: &str, alert_type: AlertType) -> (f64, f64, usize) {
        match self.stats.get(&stats_key(market_ticker, alert_type)) {
            Some(s) => (s.confidence, s.hit_rate, s.sample_size),
            None => (COLD_START_CONFIDENCE, 0.0, 0),
        }
    }

    /// Scores one elapsed alert and folds it into the running stats.
    pub fn score_alert(&mut self, alert: &Alert, outcome_window: Duration) -> AlertStats {
        let window = chrono::Duration::from_std(outcome_window).unwrap_or_else(|_| chrono::Duration::zero());
        let since = alert.timestamp - window;
        let snapshots = self
            .engine
            .time_series()
            .snapshots_since(&alert.market_ticker, since);

        // Last snapshot at or before the alert; the earliest in range when
        // the alert predates every snapshot we still hold.
        let before = snapshots
            .iter()
            .rev()
            .find(|s| s.timestamp <= alert.timestamp)
            .or_else(|| snapshots.first());
        let after = snapshots
            .iter()
            .find(|s| s.timestamp > alert.timestamp && s.timestamp >= alert.timestamp + window);

        let (Some(before), Some(after)) = (before, after) else {
            return AlertStats::default();
        };

        // Snapshot mids are probability units; the hit rules speak cents.
        let price_move = (after.mid_price - before.mid_price) * 100.0;
        let hit = match alert.alert_type {
            AlertType::ImbalancePressure => match alert.action {
                AlertAction::Buy => price_move >= 0.5,
                AlertAction::Sell => price_move <= -0.5,
                _ => false,
            },
            AlertType::SpreadTightened | AlertType::DepthIncreased | AlertType::ExecutionReady => {
                price_move.abs() > 0.1
            }
            AlertType::NoArbViolation => alert.estimated_edge > alert.estimated_slippage,
            AlertType::PriceDrift => price_move.abs() > 0.5,
        };

        let entry = self
            .stats
            .entry(stats_key(&alert.market_ticker, alert.alert_type))
            .or_default();

        let n = entry.sample_size as f64;
        entry.sample_size += 1;
        let hits = entry.hit_rate * n + if hit { 1.0 } else { 0.0 };
        entry.hit_rate = hits / entry.sample_size as f64;
        entry.avg_move = (entry.avg_move * n + price_move) / entry.sample_size as f64;
        entry.confidence = entry.hit_rate * sample_discount(entry.sample_size);

        *entry
    }
}

fn sample_discount(sample_size: usize) -> f64 {
    if sample_size < 10 {
        0.5
    } else if sample_size < 50 {
        0.75
    } else {
        1.0
    }
}

fn stats_key(market_ticker: &str, alert_type: AlertType) -> String {
    format!("{}_{}", alert_type.as_str(), market_ticker)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Orderbook, PriceLevel};
    use chrono::Utc;

    fn record_mid(engine: &StateEngine, ticker: &str, bid: i64, ask: i64) {
        let mut ob = Orderbook::new(ticker);
        ob.bids = vec![PriceLevel { price: bid, quantity: 100 }];
        ob.asks = vec![PriceLevel { price: ask, quantity: 100 }];
        engine.update_orderbook(ticker, ob);
    }

    fn alert(ticker: &str, alert_type: AlertType, action: AlertAction) -> Alert {
        Alert {
            id: "test".to_string(),
            alert_type,
            market_ticker: ticker.to_string(),
            title: String::new(),
            timestamp: Utc::now(),
            reason: String::new(),
            inputs: serde_json::Value::Null,
            threshold: 0.0,
            current_value: 0.0,
            suggestion: String::new(),
            action,
            confidence: 0.0,
            hit_rate: 0.0,
            sample_size: 0,
            estimated_edge: 0.0,
            estimated_slippage: 0.0,
            can_execute: false,
            recommended_size: 0,
        }
    }

    #[test]
    fn cold_start_is_explicitly_low() {
        let engine = Arc::new(StateEngine::new());
        let harness = BacktestHarness::new(engine);
        assert_eq!(
            harness.alert_stats("M", AlertType::ImbalancePressure),
            (0.3, 0.0, 0)
        );
    }

    #[test]
    fn single_hit_gives_half_confidence() {
        let engine = Arc::new(StateEngine::new());
        let mut harness = BacktestHarness::new(engine.clone());

        record_mid(&engine, "M", 55, 56); // mid 55.5
        let a = alert("M", AlertType::ImbalancePressure, AlertAction::Buy);
        record_mid(&engine, "M", 55, 57); // mid 56.0: +0.5 cents after the alert

        let stats = harness.score_alert(&a, Duration::from_secs(0));
        assert_eq!(stats.sample_size, 1);
        assert_eq!(stats.hit_rate, 1.0);
        assert_eq!(stats.confidence, 0.5);

        let (confidence, hit_rate, samples) =
            harness.alert_stats("M", AlertType::ImbalancePressure);
        assert_eq!((confidence, hit_rate, samples), (0.5, 1.0, 1));
    }

    #[test]
    fn sell_pressure_needs_a_down_move() {
        let engine = Arc::new(StateEngine::new());
        let mut harness = BacktestHarness::new(engine.clone());

        record_mid(&engine, "M", 55, 56);
        let a = alert("M", AlertType::ImbalancePressure, AlertAction::Sell);
        record_mid(&engine, "M", 56, 57); // moved up: a miss for "sell"

        let stats = harness.score_alert(&a, Duration::from_secs(0));
        assert_eq!(stats.sample_size, 1);
        assert_eq!(stats.hit_rate, 0.0);
        assert_eq!(stats.confidence, 0.0);
    }

    #[test]
    fn informational_alerts_hit_on_any_move() {
        let engine = Arc::new(StateEngine::new());
        let mut harness = BacktestHarness::new(engine.clone());

        record_mid(&engine, "M", 55, 56);
        let a = alert("M", AlertType::SpreadTightened, AlertAction::Watch);
        record_mid(&engine, "M", 55, 57); // +0.5 cents, over the 0.1 bar

        let stats = harness.score_alert(&a, Duration::from_secs(0));
        assert_eq!(stats.hit_rate, 1.0);
    }

    #[test]
    fn noarb_hit_compares_edge_to_slippage() {
        let engine = Arc::new(StateEngine::new());
        let mut harness = BacktestHarness::new(engine.clone());

        record_mid(&engine, "M", 55, 56);
        let mut a = alert("M", AlertType::NoArbViolation, AlertAction::Buy);
        a.estimated_edge = 5.0;
        a.estimated_slippage = 2.0;
        record_mid(&engine, "M", 55, 56);

        let stats = harness.score_alert(&a, Duration::from_secs(0));
        assert_eq!(stats.hit_rate, 1.0);
    }

    #[test]
    fn no_snapshots_means_no_sample() {
        let engine = Arc::new(StateEngine::new());
        let mut harness = BacktestHarness::new(engine);
        let a = alert("M", AlertType::PriceDrift, AlertAction::Watch);
        let stats = harness.score_alert(&a, Duration::from_secs(0));
        assert_eq!(stats.sample_size, 0);
    }

    #[test]
    fn sample_discount_steps() {
        assert_eq!(sample_discount(1), 0.5);
        assert_eq!(sample_discount(9), 0.5);
        assert_eq!(sample_discount(10), 0.75);
        assert_eq!(sample_discount(49), 0.75);
        assert_eq!(sample_discount(50), 1.0);
    }
}
