//! Per-market order book and the binary-market derivation rule.
//!
//! The venue publishes bids only, for both outcomes. The YES ask side is
//! synthesized from NO bids: a NO bid at price p is a YES ask at 10000 - p.
//! That derivation is the sole source of asks in the whole system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One price level: price in whole cents, quantity in contracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: i64,
    pub quantity: i64,
}

/// Order book for a single market. Bids sorted descending, asks ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orderbook {
    pub market_ticker: String,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    pub last_update: DateTime<Utc>,
}

/// Wire shape of the venue's order-book payload, shared by the REST endpoint
/// and the stream's book frames.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KalshiOrderbookResponse {
    pub orderbook_fp: OrderbookLevels,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderbookLevels {
    #[serde(default)]
    pub yes_dollars: Vec<Vec<String>>,
    #[serde(default)]
    pub no_dollars: Vec<Vec<String>>,
}

impl Orderbook {
    pub fn new(market_ticker: impl Into<String>) -> Self {
        Self {
            market_ticker: market_ticker.into(),
            bids: Vec::new(),
            asks: Vec::new(),
            last_update: Utc::now(),
        }
    }

    /// Replaces both sides from a venue payload.
    ///
    /// YES bids land as our bids; NO bids fold into asks via the price map
    /// p_ask = 10000 - p_no_bid with quantities preserved. Malformed levels
    /// are skipped, both sides re-sorted, and the update instant stamped.
    pub fn update_from_kalshi(&mut self, resp: &KalshiOrderbookResponse) {
        self.bids.clear();
        self.asks.clear();

        for level in &resp.orderbook_fp.yes_dollars {
            if let Some(l) = parse_level(level) {
                self.bids.push(l);
            }
        }

        for level in &resp.orderbook_fp.no_dollars {
            if let Some(l) = parse_level(level) {
                self.asks.push(PriceLevel {
                    price: 10_000 - l.price,
                    quantity: l.quantity,
                });
            }
        }

        self.bids.sort_by(|a, b| b.price.cmp(&a.price));
        self.asks.sort_by(|a, b| a.price.cmp(&b.price));
        self.last_update = Utc::now();
    }

    /// Best ask minus best bid, undefined when either side is empty.
    pub fn spread(&self) -> Option<i64> {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    /// Total notional on the bid side: sum of price * quantity.
    pub fn bid_depth(&self) -> i64 {
        self.bids.iter().map(|l| l.price * l.quantity).sum()
    }

    /// Total notional on the ask side.
    pub fn ask_depth(&self) -> i64 {
        self.asks.iter().map(|l| l.price * l.quantity).sum()
    }

    /// (bid_depth - ask_depth) / (bid_depth + ask_depth), in [-1, 1].
    /// Zero when both sides are empty.
    pub fn imbalance_ratio(&self) -> f64 {
        let bid_depth = self.bid_depth() as f64;
        let ask_depth = self.ask_depth() as f64;
        let total = bid_depth + ask_depth;
        if total == 0.0 {
            return 0.0;
        }
        (bid_depth - ask_depth) / total
    }

    /// Volume-weighted mid using the opposite side's top-level size.
    /// Falls back to the simple mid when both top quantities are zero;
    /// undefined when either side is empty. Probability units (dollars).
    pub fn microprice(&self) -> Option<f64> {
        let bid = self.bids.first()?;
        let ask = self.asks.first()?;

        let best_bid = bid.price as f64 / 100.0;
        let best_ask = ask.price as f64 / 100.0;
        let bid_qty = bid.quantity as f64;
        let ask_qty = ask.quantity as f64;

        let total_qty = bid_qty + ask_qty;
        if total_qty == 0.0 {
            return Some((best_bid + best_ask) / 2.0);
        }

        Some((best_bid * ask_qty + best_ask * bid_qty) / total_qty)
    }

    /// Quantity available within `cents_from_mid` of the mid, per side.
    pub fn depth_at_price(&self, cents_from_mid: i64) -> (i64, i64) {
        let (Some(bid), Some(ask)) = (self.bids.first(), self.asks.first()) else {
            return (0, 0);
        };

        let mid = (bid.price + ask.price) / 2;
        let bid_threshold = mid - cents_from_mid;
        let ask_threshold = mid + cents_from_mid;

        let bid_depth = self
            .bids
            .iter()
            .filter(|l| l.price >= bid_threshold)
            .map(|l| l.quantity)
            .sum();
        let ask_depth = self
            .asks
            .iter()
            .filter(|l| l.price <= ask_threshold)
            .map(|l| l.quantity)
            .sum();

        (bid_depth, ask_depth)
    }

    /// Best ask below best bid. Acceptable only transiently during updates;
    /// surfaced on the debug endpoint, never silently filtered.
    pub fn is_crossed(&self) -> bool {
        match (self.bids.first(), self.asks.first()) {
            (Some(bid), Some(ask)) => ask.price < bid.price,
            _ => false,
        }
    }
}

fn parse_level(level: &[String]) -> Option<PriceLevel> {
    if level.len() < 2 {
        return None;
    }
    let price = parse_dollars_to_cents(&level[0])?;
    let quantity = parse_quantity(&level[1])?;
    if quantity < 0 || !(0..=10_000).contains(&price) {
        return None;
    }
    Some(PriceLevel { price, quantity })
}

/// "0.73" -> 73 cents. Floors, so "0.735" is also 73.
pub fn parse_dollars_to_cents(s: &str) -> Option<i64> {
    let dollars: f64 = s.trim().parse().ok()?;
    Some((dollars * 100.0).floor() as i64)
}

/// The venue renders counts as fixed-point strings; fractional parts drop.
pub fn parse_quantity(s: &str) -> Option<i64> {
    let count: f64 = s.trim().parse().ok()?;
    Some(count as i64)
}
