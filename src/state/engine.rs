//! The in-process market-data authority.
//!
//! One reader-writer lock guards the three keyed tables (markets, order
//! books, trade logs). Mutators take the exclusive lock, queries take the
//! shared lock and return clones, so no caller ever holds a reference into
//! live state. The time-series store has its own lock and is only touched
//! after the engine's lock has been released.

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::warn;

use super::market::Market;
use super::orderbook::Orderbook;
use super::timeseries::TimeSeriesStore;
use super::trade::{Trade, TradeLog};

const SNAPSHOT_TRADE_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
struct EngineInner {
    markets: HashMap<String, Market>,
    orderbooks: HashMap<String, Orderbook>,
    trade_logs: HashMap<String, TradeLog>,
}

#[derive(Default)]
pub struct StateEngine {
    inner: RwLock<EngineInner>,
    time_series: TimeSeriesStore,
    crossed_books: AtomicU64,
}

impl StateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the market record. A market seen for the first
    /// time also gets an empty order book; an existing book is left alone.
    pub fn register_market(&self, market: Market) {
        let mut inner = self.inner.write();
        let ticker = market.ticker.clone();
        if !inner.orderbooks.contains_key(&ticker) {
            inner.orderbooks.insert(ticker.clone(), Orderbook::new(&ticker));
        }
        inner.markets.insert(ticker, market);
    }

    /// Replaces the market's book atomically, then records a snapshot from
    /// the updated book together with the trades of the last five minutes.
    /// The snapshot happens after the write lock is released so the trade
    /// lookup cannot re-enter the engine lock.
    pub fn update_orderbook(&self, ticker: &str, orderbook: Orderbook) {
        if orderbook.is_crossed() {
            self.crossed_books.fetch_add(1, Ordering::Relaxed);
            warn!(
                ticker,
                best_bid = orderbook.bids.first().map(|l| l.price),
                best_ask = orderbook.asks.first().map(|l| l.price),
                "crossed book accepted into store"
            );
        }

        let snapshot_book = orderbook.clone();
        {
            let mut inner = self.inner.write();
            inner.orderbooks.insert(ticker.to_string(), orderbook);
        }

        let trades = self.recent_trades(ticker, SNAPSHOT_TRADE_WINDOW);
        self.time_series.record_snapshot(ticker, &snapshot_book, &trades);
    }

    /// Appends to the market's trade log and mirrors into the time-series
    /// store (after the engine lock is dropped).
    pub fn add_trade(&self, trade: Trade) {
        let ticker = trade.market_ticker.clone();
        {
            let mut inner = self.inner.write();
            inner
                .trade_logs
                .entry(ticker.clone())
                .or_insert_with(TradeLog::new)
                .add(trade.clone());
        }
        self.time_series.record_trade(&ticker, trade);
    }

    pub fn market(&self, ticker: &str) -> Option<Market> {
        self.inner.read().markets.get(ticker).cloned()
    }

    pub fn orderbook(&self, ticker: &str) -> Option<Orderbook> {
        self.inner.read().orderbooks.get(ticker).cloned()
    }

    pub fn all_markets(&self) -> Vec<Market> {
        self.inner.read().markets.values().cloned().collect()
    }

    /// Trades with timestamp >= now - window, cloned.
    pub fn recent_trades(&self, ticker: &str, window: Duration) -> Vec<Trade> {
        let cutoff = Utc::now() - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
        let inner = self.inner.read();
        inner
            .trade_logs
            .get(ticker)
            .map(|log| log.since(cutoff))
            .unwrap_or_default()
    }

    /// Read-only handle; the store's own methods return copies.
    pub fn time_series(&self) -> &TimeSeriesStore {
        &self.time_series
    }

    /// Crossed books accepted since startup, surfaced on the debug endpoint.
    pub fn crossed_book_count(&self) -> u64 {
        self.crossed_books.load(Ordering::Relaxed)
    }
}
