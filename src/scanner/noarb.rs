//! Event-group no-arbitrage check.
//!
//! YES prices across a mutually-exclusive event group should sum to 1.
//! Buying every outcome below 1.00, or selling every outcome above 1.00,
//! is an arb. The cost model is deliberately crude (flat fee and slippage
//! per leg): a threshold prior for detection, not an execution model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::state::{MarketStatus, StateEngine};

const FEE_RATE_PER_LEG: f64 = 0.05;
const SLIPPAGE_PER_LEG: f64 = 0.01;
const ACTIONABLE_NET_ARB: f64 = 0.02;
const MIN_ACTIONABLE_LIQUIDITY: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct NoArbViolation {
    pub event_ticker: String,
    pub markets: Vec<String>,
    /// Cost to buy every outcome, in probability units.
    pub sum_buy_price: f64,
    /// Revenue from selling every outcome.
    pub sum_sell_price: f64,
    /// Net edge after the cost model.
    pub net_arb: f64,
    pub estimated_fees: f64,
    pub estimated_slippage: f64,
    /// Minimum top-of-book size across all legs.
    pub liquidity: i64,
    pub timestamp: DateTime<Utc>,
    pub actionable: bool,
}

impl NoArbViolation {
    pub fn describe(&self) -> String {
        if self.sum_buy_price < 1.0 {
            format!(
                "BUY ARB: event {} - buy all outcomes for {:.2} cents, guaranteed 100 cent payout. \
                 Net after costs: {:.2} cents. Liquidity: {} contracts",
                self.event_ticker,
                self.sum_buy_price * 100.0,
                self.net_arb * 100.0,
                self.liquidity,
            )
        } else {
            format!(
                "SELL ARB: event {} - sell all outcomes for {:.2} cents, guaranteed 100 cent cost. \
                 Net after costs: {:.2} cents. Liquidity: {} contracts",
                self.event_ticker,
                self.sum_sell_price * 100.0,
                self.net_arb * 100.0,
                self.liquidity,
            )
        }
    }
}

pub struct NoArbDetector {
    engine: Arc<StateEngine>,
}

impl NoArbDetector {
    pub fn new(engine: Arc<StateEngine>) -> Self {
        Self { engine }
    }

    /// Active markets grouped by event ticker.
    pub fn group_markets_by_event(&self) -> HashMap<String, Vec<String>> {
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for market in self.engine.all_markets() {
            if market.status != MarketStatus::Active || market.event_ticker.is_empty() {
                continue;
            }
            groups
                .entry(market.event_ticker)
                .or_default()
                .push(market.ticker);
        }
        groups
    }

    /// Violations with positive net edge across all event groups with at
    /// least two members. Groups with any one-sided book are skipped.
    pub fn check_violations(&self) -> Vec<NoArbViolation> {
        self.group_markets_by_event()
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .filter_map(|(event, members)| self.check_event_group(event, members))
            .collect()
    }

    fn check_event_group(
        &self,
        event_ticker: String,
        markets: Vec<String>,
    ) -> Option<NoArbViolation> {
        let mut sum_buy_price = 0.0;
        let mut sum_sell_price = 0.0;
        let mut min_liquidity = i64::MAX;

        for ticker in &markets {
            let orderbook = self.engine.orderbook(ticker)?;
            let bid = orderbook.bids.first()?;
            let ask = orderbook.asks.first()?;

            sum_buy_price += ask.price as f64 / 100.0;
            sum_sell_price += bid.price as f64 / 100.0;
            min_liquidity = min_liquidity.min(bid.quantity).min(ask.quantity);
        }

        let legs = markets.len() as f64;
        let (gross, fee_basis) = if sum_buy_price < 1.0 {
            (1.0 - sum_buy_price, sum_buy_price)
        } else if sum_sell_price > 1.0 {
            (sum_sell_price - 1.0, sum_sell_price)
        } else {
            return None;
        };

        let estimated_fees = fee_basis * FEE_RATE_PER_LEG * legs;
        let estimated_slippage = SLIPPAGE_PER_LEG * legs;
        let net_arb = gross - estimated_fees - estimated_slippage;
        if net_arb <= 0.0 {
            return None;
        }

        Some(NoArbViolation {
            event_ticker,
            markets,
            sum_buy_price,
            sum_sell_price,
            net_arb,
            estimated_fees,
            estimated_slippage,
            liquidity: min_liquidity,
            timestamp: Utc::now(),
            actionable: net_arb > ACTIONABLE_NET_ARB && min_liquidity >= MIN_ACTIONABLE_LIQUIDITY,
        })
    }
}
