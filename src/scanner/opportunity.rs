//! Per-market opportunity metrics derived from the current book and recent
//! trades. All prices here are cents on the 0-100 scale.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::state::{MarketStatus, Orderbook, StateEngine};

const RECENT_TRADE_WINDOW_SECS: u64 = 30;
const STALE_BOOK_SECS: f64 = 5.0;
const DEPTH_WINDOW_CENTS: i64 = 5;
const EXECUTION_TEST_QUANTITY: i64 = 100;
const EXECUTABLE_MAX_SPREAD_CENTS: i64 = 50;
/// Sentinel for "bids cannot absorb the walk".
const SLIPPAGE_CANNOT_FILL: i64 = 10_000;

#[derive(Debug, Clone, Serialize)]
pub struct MarketOpportunity {
    pub market_ticker: String,
    pub title: String,
    pub status: String,

    // Top-of-book
    pub best_bid: i64,
    pub best_ask: i64,
    pub mid_price: f64,
    pub spread: i64,
    pub spread_percent: f64,

    // Depth
    pub bid_depth: i64,
    pub ask_depth: i64,
    pub depth_at_top5: i64,
    pub liquidity_score: f64,

    // Activity
    pub recent_trades: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trade_price: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Trades per minute over the recent window.
    pub trade_intensity: f64,

    // Volatility
    pub volatility_30s: f64,
    pub price_change_30s: f64,

    // Microstructure
    pub imbalance: f64,
    pub microprice: f64,
    pub microprice_diff: f64,

    // Staleness
    pub last_update: DateTime<Utc>,
    pub staleness: f64,
    pub book_stale: bool,

    // Execution
    pub estimated_slippage_100: i64,
    pub can_execute_100: bool,
}

pub struct Scanner {
    engine: Arc<StateEngine>,
}

impl Scanner {
    pub fn new(engine: Arc<StateEngine>) -> Self {
        Self { engine }
    }

    /// Analyzes every active market with a two-sided book, sorted by
    /// liquidity score descending.
    pub fn scan_markets(&self) -> Vec<MarketOpportunity> {
        let mut opportunities: Vec<MarketOpportunity> = self
            .engine
            .all_markets()
            .into_iter()
            .filter(|m| m.status == MarketStatus::Active)
            .filter_map(|m| self.analyze_market(&m.ticker, &m.title, m.status.as_str()))
            .collect();

        opportunities.sort_by(|a, b| {
            b.liquidity_score
                .partial_cmp(&a.liquidity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        opportunities
    }

    fn analyze_market(&self, ticker: &str, title: &str, status: &str) -> Option<MarketOpportunity> {
        let orderbook = self.engine.orderbook(ticker)?;
        let best_bid = orderbook.bids.first()?.price;
        let best_ask = orderbook.asks.first()?.price;

        let spread = best_ask - best_bid;
        let mid_price = (best_bid + best_ask) as f64 / 2.0;
        let (bid_depth5, ask_depth5) = orderbook.depth_at_price(DEPTH_WINDOW_CENTS);
        let depth_at_top5 = bid_depth5 + ask_depth5;

        let spread_score = (1.0 - spread as f64 / 100.0).max(0.0);
        let depth_score = (depth_at_top5 as f64 / 1000.0).min(1.0);
        let liquidity_score = spread_score * 0.6 + depth_score * 0.4;

        let microprice = orderbook.microprice().unwrap_or_default() * 100.0;

        let staleness = (Utc::now() - orderbook.last_update).num_milliseconds() as f64 / 1000.0;

        let recent = self
            .engine
            .recent_trades(ticker, Duration::from_secs(RECENT_TRADE_WINDOW_SECS));
        let last_trade = recent.last();
        let trade_intensity = if recent.is_empty() {
            0.0
        } else {
            recent.len() as f64 * 60.0 / RECENT_TRADE_WINDOW_SECS as f64
        };

        let window = Duration::from_secs(RECENT_TRADE_WINDOW_SECS);
        let price_change_30s = self
            .engine
            .time_series()
            .price_change(ticker, window)
            .unwrap_or(0.0);
        let volatility_30s = self.engine.time_series().volatility(ticker, window);

        let estimated_slippage_100 = estimate_slippage(&orderbook, EXECUTION_TEST_QUANTITY);

        Some(MarketOpportunity {
            market_ticker: ticker.to_string(),
            title: title.to_string(),
            status: status.to_string(),
            best_bid,
            best_ask,
            mid_price,
            spread,
            spread_percent: spread as f64 / 100.0,
            bid_depth: orderbook.bid_depth(),
            ask_depth: orderbook.ask_depth(),
            depth_at_top5,
            liquidity_score,
            recent_trades: recent.len(),
            last_trade_price: last_trade.map(|t| t.price),
            last_trade_time: last_trade.map(|t| t.timestamp),
            trade_intensity,
            volatility_30s,
            price_change_30s,
            imbalance: orderbook.imbalance_ratio(),
            microprice,
            microprice_diff: microprice - mid_price,
            last_update: orderbook.last_update,
            staleness,
            book_stale: staleness > STALE_BOOK_SECS,
            estimated_slippage_100,
            can_execute_100: depth_at_top5 >= EXECUTION_TEST_QUANTITY
                && spread < EXECUTABLE_MAX_SPREAD_CENTS,
        })
    }
}

/// Average-fill distance from mid, in whole cents, for selling `quantity`
/// contracts into the bids. Returns the cannot-fill sentinel when the bids
/// cannot absorb the walk.
fn estimate_slippage(orderbook: &Orderbook, quantity: i64) -> i64 {
    let mut remaining = quantity;
    let mut total_cost = 0i64;

    for level in &orderbook.bids {
        if remaining <= 0 {
            break;
        }
        let fill = remaining.min(level.quantity);
        total_cost += level.price * fill;
        remaining -= fill;
    }

    if remaining > 0 {
        return SLIPPAGE_CANNOT_FILL;
    }

    let (Some(bid), Some(ask)) = (orderbook.bids.first(), orderbook.asks.first()) else {
        return SLIPPAGE_CANNOT_FILL;
    };

    let avg_price = total_cost as f64 / quantity as f64;
    let mid = (bid.price + ask.price) as f64 / 2.0;
    (avg_price - mid).abs() as i64
}
