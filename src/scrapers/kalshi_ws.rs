//! Push-stream handler.
//!
//! Holds one connection to the venue's stream endpoint, dispatches book and
//! trade frames into the state engine, pings every 30 seconds and reconnects
//! with exponential back-off (base delay doubled per failure, capped at 60s,
//! reset on a successful connect).

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::state::{
    KalshiOrderbookResponse, Orderbook, OrderbookLevels, StateEngine, Trade, TradeSide,
};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

pub struct StreamHandler {
    url: String,
    base_delay: Duration,
    engine: Arc<StateEngine>,
}

impl StreamHandler {
    pub fn new(url: impl Into<String>, base_delay: Duration, engine: Arc<StateEngine>) -> Self {
        Self {
            url: url.into(),
            base_delay,
            engine,
        }
    }

    /// Connect / listen / back off, until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut delay = self.base_delay;

        loop {
            if *shutdown.borrow() {
                return;
            }

            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    info!(url = %self.url, "stream connected");
                    delay = self.base_delay;

                    if let Err(e) = self.listen(stream, &mut shutdown).await {
                        warn!(error = %e, "stream connection lost");
                    } else {
                        // Clean exit only happens on shutdown.
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "stream connect failed");
                }
            }

            debug!(delay_secs = delay.as_secs(), "reconnecting after backoff");
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = sleep(delay) => {}
            }
            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
        }
    }

    async fn listen(
        &self,
        stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let (mut write, mut read) = stream.split();

        let mut ping = interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                _ = ping.tick() => {
                    write
                        .send(Message::Ping(Vec::new()))
                        .await
                        .context("failed to send ping")?;
                }
                frame = read.next() => {
                    match frame {
                        None => return Err(anyhow!("stream ended")),
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            return Err(anyhow!("closed by peer: {frame:?}"));
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        }
    }

    /// Dispatches one frame by its `type` field. Frames without a type, or
    /// with an unknown one, are ignored.
    fn handle_frame(&self, text: &str) {
        let msg: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "unparseable stream frame");
                return;
            }
        };

        let Some(msg_type) = msg.get("type").and_then(Value::as_str) else {
            return;
        };

        match msg_type {
            "orderbook" | "orderbook_update" => self.apply_book_frame(&msg),
            "trade" | "trade_update" => self.apply_trade_frame(&msg),
            _ => {}
        }
    }

    /// Full book replacement through the same derivation rule as REST.
    fn apply_book_frame(&self, msg: &Value) {
        let Some(ticker) = msg.get("ticker").and_then(Value::as_str) else {
            return;
        };
        let Some(book_data) = msg.get("orderbook_fp") else {
            return;
        };

        let resp = KalshiOrderbookResponse {
            orderbook_fp: OrderbookLevels {
                yes_dollars: levels_from_value(book_data.get("yes_dollars")),
                no_dollars: levels_from_value(book_data.get("no_dollars")),
            },
        };

        let mut book = Orderbook::new(ticker);
        book.update_from_kalshi(&resp);
        self.engine.update_orderbook(ticker, book);
    }

    /// Trade frame: price in dollars, count in contracts, timestamp is the
    /// receipt time.
    fn apply_trade_frame(&self, msg: &Value) {
        let Some(ticker) = msg.get("ticker").and_then(Value::as_str) else {
            return;
        };

        let price = msg.get("price").and_then(Value::as_f64).unwrap_or(0.0);
        let quantity = msg.get("count").and_then(Value::as_f64).unwrap_or(0.0);
        let side = match msg.get("side").and_then(Value::as_str) {
            Some("yes") => TradeSide::Yes,
            _ => TradeSide::No,
        };

        self.engine.add_trade(Trade {
            market_ticker: ticker.to_string(),
            side,
            price: (price * 100.0).floor() as i64,
            quantity: quantity as i64,
            timestamp: Utc::now(),
        });
    }
}

/// Level arrays arrive as string pairs, but some frames render numbers;
/// both are accepted.
fn levels_from_value(value: Option<&Value>) -> Vec<Vec<String>> {
    let Some(Value::Array(rows)) = value else {
        return Vec::new();
    };

    rows.iter()
        .filter_map(|row| {
            let Value::Array(cells) = row else {
                return None;
            };
            let level: Vec<String> = cells
                .iter()
                .filter_map(|cell| match cell {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => n.as_f64().map(|f| format!("{f:.4}")),
                    _ => None,
                })
                .collect();
            (level.len() >= 2).then_some(level)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Market, MarketStatus};

    fn handler() -> (StreamHandler, Arc<StateEngine>) {
        let engine = Arc::new(StateEngine::new());
        engine.register_market(Market {
            ticker: "KXTEST".to_string(),
            title: "Test".to_string(),
            category: "Politics".to_string(),
            status: MarketStatus::Active,
            expiration_time: None,
            event_ticker: "KXEVT".to_string(),
            yes_sub_title: None,
            no_sub_title: None,
        });
        (
            StreamHandler::new("wss://unused", Duration::from_secs(5), engine.clone()),
            engine,
        )
    }

    #[test]
    fn orderbook_frame_replaces_the_book() {
        let (handler, engine) = handler();
        handler.handle_frame(
            r#"{"type":"orderbook","ticker":"KXTEST",
                "orderbook_fp":{"yes_dollars":[["0.60","100"]],"no_dollars":[["0.39","80"]]}}"#,
        );

        let book = engine.orderbook("KXTEST").unwrap();
        assert_eq!(book.bids[0].price, 60);
        assert_eq!(book.asks[0].price, 9961);
    }

    #[test]
    fn numeric_levels_are_accepted() {
        let (handler, engine) = handler();
        handler.handle_frame(
            r#"{"type":"orderbook_update","ticker":"KXTEST",
                "orderbook_fp":{"yes_dollars":[[0.55,25]],"no_dollars":[]}}"#,
        );

        let book = engine.orderbook("KXTEST").unwrap();
        assert_eq!(book.bids[0].price, 55);
        assert_eq!(book.bids[0].quantity, 25);
    }

    #[test]
    fn trade_frame_lands_in_the_log() {
        let (handler, engine) = handler();
        handler
            .handle_frame(r#"{"type":"trade","ticker":"KXTEST","price":0.57,"count":12,"side":"yes"}"#);

        let trades = engine.recent_trades("KXTEST", Duration::from_secs(60));
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].price, 57);
        assert_eq!(trades[0].quantity, 12);
        assert_eq!(trades[0].side, TradeSide::Yes);
    }

    #[test]
    fn unknown_and_malformed_frames_are_ignored() {
        let (handler, engine) = handler();
        handler.handle_frame(r#"{"type":"heartbeat"}"#);
        handler.handle_frame("not json at all");
        handler.handle_frame(r#"{"ticker":"KXTEST"}"#);

        assert!(engine.recent_trades("KXTEST", Duration::from_secs(60)).is_empty());
        assert!(engine.orderbook("KXTEST").unwrap().bids.is_empty());
    }
}
