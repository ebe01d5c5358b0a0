//! Trade records and the per-market bounded trade log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const TRADE_LOG_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Yes,
    No,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub market_ticker: String,
    pub side: TradeSide,
    /// Execution price in cents.
    pub price: i64,
    pub quantity: i64,
    pub timestamp: DateTime<Utc>,
}

/// Ring of the most recent trades for one market. Guarded by the engine's
/// lock; no lock of its own.
#[derive(Debug, Default)]
pub struct TradeLog {
    trades: VecDeque<Trade>,
}

impl TradeLog {
    pub fn new() -> Self {
        Self {
            trades: VecDeque::with_capacity(TRADE_LOG_CAPACITY),
        }
    }

    pub fn add(&mut self, trade: Trade) {
        self.trades.push_back(trade);
        while self.trades.len() > TRADE_LOG_CAPACITY {
            self.trades.pop_front();
        }
    }

    /// Trades with timestamp >= cutoff, oldest first, cloned.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<Trade> {
        self.trades
            .iter()
            .filter(|t| t.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn trade_at(ts: DateTime<Utc>, price: i64) -> Trade {
        Trade {
            market_ticker: "TEST".to_string(),
            side: TradeSide::Yes,
            price,
            quantity: 1,
            timestamp: ts,
        }
    }

    #[test]
    fn log_caps_at_capacity() {
        let mut log = TradeLog::new();
        let now = Utc::now();
        for i in 0..(TRADE_LOG_CAPACITY + 50) {
            log.add(trade_at(now, i as i64));
        }
        assert_eq!(log.len(), TRADE_LOG_CAPACITY);
        // Oldest entries rotate out.
        let all = log.since(now - Duration::hours(1));
        assert_eq!(all.first().unwrap().price, 50);
    }

    #[test]
    fn since_filters_by_cutoff_inclusive() {
        let mut log = TradeLog::new();
        let now = Utc::now();
        log.add(trade_at(now - Duration::seconds(120), 10));
        log.add(trade_at(now - Duration::seconds(30), 20));
        log.add(trade_at(now, 30));

        let recent = log.since(now - Duration::seconds(30));
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].price, 20);
    }
}
