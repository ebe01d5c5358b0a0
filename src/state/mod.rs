//! In-memory market state: markets, order books, trade logs and the rolling
//! snapshot time-series. Everything here is owned by the [`StateEngine`];
//! readers get defensive clones.

pub mod engine;
pub mod market;
pub mod orderbook;
pub mod timeseries;
pub mod trade;

pub use engine::StateEngine;
pub use market::{Market, MarketStatus};
pub use orderbook::{KalshiOrderbookResponse, Orderbook, OrderbookLevels, PriceLevel};
pub use timeseries::{MarketSnapshot, TimeSeriesStore};
pub use trade::{Trade, TradeLog, TradeSide};
