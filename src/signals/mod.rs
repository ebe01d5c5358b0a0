//! Microstructure signals and the bounded fan-out that carries them to the
//! API ring and the alert dispatcher.

pub mod processor;
pub mod quantitative;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

pub use processor::SignalProcessor;
pub use quantitative::QuantitativeSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    OrderbookImbalance,
    ImpliedProbabilityDrift,
    VolumeSurge,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::OrderbookImbalance => "orderbook_imbalance",
            SignalType::ImpliedProbabilityDrift => "implied_probability_drift",
            SignalType::VolumeSurge => "volume_surge",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_value: Option<f64>,
    pub threshold_crossed: bool,
    /// 0.0 to 1.0.
    pub confidence: f64,
}

/// Type-specific payload; at most one variant accompanies a signal. The
/// externally tagged serialization keeps the JSON field name equal to the
/// signal type, so consumers can key on either.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalPayload {
    OrderbookImbalance { bid_ratio: f64, spread_cents: i64 },
    ImpliedProbabilityDrift { delta: f64, window_secs: u64 },
    VolumeSurge { volume_multiplier: f64, window_secs: u64 },
}

#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub market_ticker: String,
    #[serde(rename = "type")]
    pub signal_type: SignalType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: SignalMetadata,
    #[serde(flatten)]
    pub payload: Option<SignalPayload>,
}

/// Fan-out of signals to bounded per-consumer queues.
///
/// Sends are non-blocking; a full queue drops the signal for that consumer
/// and bumps the dropped counter. That is load shedding, not a bug: signals
/// are regenerated every tick and consumers are best-effort.
#[derive(Default)]
pub struct SignalBus {
    senders: Vec<mpsc::Sender<Signal>>,
    dropped: AtomicU64,
}

impl SignalBus {
    pub const CHANNEL_CAPACITY: usize = 100;

    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a consumer; call before the bus is shared.
    pub fn add_consumer(&mut self) -> mpsc::Receiver<Signal> {
        let (tx, rx) = mpsc::channel(Self::CHANNEL_CAPACITY);
        self.senders.push(tx);
        rx
    }

    pub fn publish(&self, signal: &Signal) {
        for tx in &self.senders {
            if tx.try_send(signal.clone()).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Signals dropped on overflow since startup, for the debug endpoint.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(ticker: &str) -> Signal {
        Signal {
            market_ticker: ticker.to_string(),
            signal_type: SignalType::OrderbookImbalance,
            value: 0.5,
            timestamp: Utc::now(),
            metadata: SignalMetadata {
                previous_value: None,
                threshold_crossed: true,
                confidence: 1.0,
            },
            payload: Some(SignalPayload::OrderbookImbalance {
                bid_ratio: 0.5,
                spread_cents: 2,
            }),
        }
    }

    #[test]
    fn payload_serializes_under_type_name() {
        let json = serde_json::to_value(signal("T")).unwrap();
        assert_eq!(json["type"], "orderbook_imbalance");
        assert_eq!(json["orderbook_imbalance"]["spread_cents"], 2);
        assert_eq!(json["metadata"]["threshold_crossed"], true);
    }

    #[test]
    fn publish_reaches_every_consumer() {
        let mut bus = SignalBus::new();
        let mut rx1 = bus.add_consumer();
        let mut rx2 = bus.add_consumer();

        bus.publish(&signal("T"));
        assert_eq!(rx1.try_recv().unwrap().market_ticker, "T");
        assert_eq!(rx2.try_recv().unwrap().market_ticker, "T");
    }

    #[test]
    fn overflow_drops_silently_and_counts() {
        let mut bus = SignalBus::new();
        let _rx = bus.add_consumer(); // never drained

        for _ in 0..(SignalBus::CHANNEL_CAPACITY + 25) {
            bus.publish(&signal("T"));
        }
        assert_eq!(bus.dropped_count(), 25);
    }

    #[test]
    fn publish_without_consumers_is_a_no_op() {
        let bus = SignalBus::new();
        bus.publish(&signal("T"));
        assert_eq!(bus.dropped_count(), 0);
    }
}
