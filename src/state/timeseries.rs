//! Rolling time-series store: per-market snapshots, trade mirror and signal
//! history, used by the volatility and backtest helpers.
//!
//! Holds its own lock. Callers must not hold the engine's lock when calling
//! in, or the snapshot-after-update path would deadlock.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use super::orderbook::Orderbook;
use super::trade::Trade;

/// ~2.7 hours of 1s snapshots per market.
const MAX_SNAPSHOTS_PER_MARKET: usize = 10_000;
const MAX_TRADES_PER_MARKET: usize = 10_000;
const MAX_SIGNALS_PER_MARKET: usize = 10_000;

/// Compact summary of a market's book captured on every book update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub timestamp: DateTime<Utc>,
    pub market_ticker: String,
    /// Cents.
    pub best_bid: i64,
    pub best_ask: i64,
    /// Probability units: (best_bid + best_ask) / 200.
    pub mid_price: f64,
    /// Cents.
    pub spread: i64,
    pub bid_depth: i64,
    pub ask_depth: i64,
    pub imbalance: f64,
    /// Microprice on the 0-100 scale.
    pub microprice: f64,
    pub trade_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_trade: Option<Trade>,
}

/// One emitted signal, kept for the debug surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalPoint {
    pub timestamp: DateTime<Utc>,
    pub signal_type: String,
    pub value: f64,
}

#[derive(Default)]
struct TimeSeriesInner {
    snapshots: HashMap<String, VecDeque<MarketSnapshot>>,
    trades: HashMap<String, VecDeque<Trade>>,
    signals: HashMap<String, VecDeque<SignalPoint>>,
}

/// Global snapshot/trade/signal history, one lock for all three maps.
#[derive(Default)]
pub struct TimeSeriesStore {
    inner: RwLock<TimeSeriesInner>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a snapshot of the given (already updated) book. Skipped when
    /// either side is empty: there is no top-of-book to summarize.
    pub fn record_snapshot(&self, ticker: &str, orderbook: &Orderbook, trades: &[Trade]) {
        let (Some(bid), Some(ask)) = (orderbook.bids.first(), orderbook.asks.first()) else {
            return;
        };

        let best_bid = bid.price;
        let best_ask = ask.price;
        let microprice = orderbook.microprice().unwrap_or_default() * 100.0;

        let snapshot = MarketSnapshot {
            timestamp: Utc::now(),
            market_ticker: ticker.to_string(),
            best_bid,
            best_ask,
            mid_price: (best_bid + best_ask) as f64 / 200.0,
            spread: best_ask - best_bid,
            bid_depth: orderbook.bid_depth(),
            ask_depth: orderbook.ask_depth(),
            imbalance: orderbook.imbalance_ratio(),
            microprice,
            trade_count: trades.len(),
            last_trade: trades.last().cloned(),
        };

        let mut inner = self.inner.write();
        let ring = inner.snapshots.entry(ticker.to_string()).or_default();
        ring.push_back(snapshot);
        while ring.len() > MAX_SNAPSHOTS_PER_MARKET {
            ring.pop_front();
        }
    }

    pub fn record_trade(&self, ticker: &str, trade: Trade) {
        let mut inner = self.inner.write();
        let ring = inner.trades.entry(ticker.to_string()).or_default();
        ring.push_back(trade);
        while ring.len() > MAX_TRADES_PER_MARKET {
            ring.pop_front();
        }
    }

    pub fn record_signal(&self, ticker: &str, signal_type: &str, value: f64) {
        let mut inner = self.inner.write();
        let ring = inner.signals.entry(ticker.to_string()).or_default();
        ring.push_back(SignalPoint {
            timestamp: Utc::now(),
            signal_type: signal_type.to_string(),
            value,
        });
        while ring.len() > MAX_SIGNALS_PER_MARKET {
            ring.pop_front();
        }
    }

    /// Snapshots for a market at or after `since`, cloned.
    pub fn snapshots_since(&self, ticker: &str, since: DateTime<Utc>) -> Vec<MarketSnapshot> {
        let inner = self.inner.read();
        inner
            .snapshots
            .get(ticker)
            .map(|ring| {
                ring.iter()
                    .filter(|s| s.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The n most recent snapshots, cloned.
    pub fn recent_snapshots(&self, ticker: &str, n: usize) -> Vec<MarketSnapshot> {
        let inner = self.inner.read();
        inner
            .snapshots
            .get(ticker)
            .map(|ring| {
                let skip = ring.len().saturating_sub(n);
                ring.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    pub fn trades_since(&self, ticker: &str, since: DateTime<Utc>) -> Vec<Trade> {
        let inner = self.inner.read();
        inner
            .trades
            .get(ticker)
            .map(|ring| {
                ring.iter()
                    .filter(|t| t.timestamp >= since)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn signal_count(&self, ticker: &str) -> usize {
        let inner = self.inner.read();
        inner.signals.get(ticker).map(|r| r.len()).unwrap_or(0)
    }

    pub fn last_signal_at(&self, ticker: &str) -> Option<DateTime<Utc>> {
        let inner = self.inner.read();
        inner
            .signals
            .get(ticker)
            .and_then(|r| r.back())
            .map(|p| p.timestamp)
    }

    /// Standard deviation of snapshot mids over the window, in cents.
    pub fn volatility(&self, ticker: &str, window: Duration) -> f64 {
        let since = Utc::now() - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let snapshots = self.snapshots_since(ticker, since);
        if snapshots.len() < 2 {
            return 0.0;
        }

        let prices: Vec<f64> = snapshots.iter().map(|s| s.mid_price).collect();
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        let variance =
            prices.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / prices.len() as f64;
        variance.sqrt() * 100.0
    }

    /// Mid change from the oldest to the newest snapshot in the window, in
    /// cents. None with fewer than two snapshots.
    pub fn price_change(&self, ticker: &str, window: Duration) -> Option<f64> {
        let since = Utc::now() - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let snapshots = self.snapshots_since(ticker, since);
        if snapshots.len() < 2 {
            return None;
        }
        Some((snapshots.last()?.mid_price - snapshots.first()?.mid_price) * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::orderbook::PriceLevel;
    use crate::state::trade::TradeSide;

    fn book(ticker: &str, bid: i64, ask: i64) -> Orderbook {
        let mut ob = Orderbook::new(ticker);
        ob.bids = vec![PriceLevel { price: bid, quantity: 100 }];
        ob.asks = vec![PriceLevel { price: ask, quantity: 100 }];
        ob
    }

    #[test]
    fn snapshot_summarizes_top_of_book() {
        let store = TimeSeriesStore::new();
        store.record_snapshot("T", &book("T", 55, 56), &[]);

        let snaps = store.recent_snapshots("T", 10);
        assert_eq!(snaps.len(), 1);
        let s = &snaps[0];
        assert_eq!(s.best_bid, 55);
        assert_eq!(s.best_ask, 56);
        assert_eq!(s.spread, 1);
        assert!((s.mid_price - 0.555).abs() < 1e-9);
        assert_eq!(s.trade_count, 0);
    }

    #[test]
    fn snapshot_skipped_for_one_sided_book() {
        let store = TimeSeriesStore::new();
        let mut ob = Orderbook::new("T");
        ob.bids = vec![PriceLevel { price: 55, quantity: 100 }];
        store.record_snapshot("T", &ob, &[]);
        assert!(store.recent_snapshots("T", 10).is_empty());
    }

    #[test]
    fn price_change_needs_two_snapshots() {
        let store = TimeSeriesStore::new();
        store.record_snapshot("T", &book("T", 55, 56), &[]);
        assert_eq!(store.price_change("T", Duration::from_secs(60)), None);

        store.record_snapshot("T", &book("T", 57, 58), &[]);
        let change = store.price_change("T", Duration::from_secs(60)).unwrap();
        assert!((change - 2.0).abs() < 1e-9);
    }

    #[test]
    fn volatility_is_stddev_of_mids() {
        let store = TimeSeriesStore::new();
        store.record_snapshot("T", &book("T", 50, 52), &[]); // mid 51
        store.record_snapshot("T", &book("T", 54, 56), &[]); // mid 55

        let vol = store.volatility("T", Duration::from_secs(60));
        // mean 53, deviations +/-2 -> stddev 2
        assert!((vol - 2.0).abs() < 1e-9);
    }

    #[test]
    fn trade_mirror_filters_by_window() {
        let store = TimeSeriesStore::new();
        let now = Utc::now();
        store.record_trade(
            "T",
            Trade {
                market_ticker: "T".to_string(),
                side: TradeSide::Yes,
                price: 50,
                quantity: 5,
                timestamp: now,
            },
        );
        assert_eq!(store.trades_since("T", now - chrono::Duration::seconds(1)).len(), 1);
        assert!(store.trades_since("T", now + chrono::Duration::seconds(1)).is_empty());
    }
}
