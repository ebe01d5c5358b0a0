//! Outbound notification dispatch with per-(market, type) cool-down.

pub mod webhook;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::config::AlertingConfig;
use crate::signals::{Signal, SignalPayload, SignalType};

pub use webhook::{SinkKind, WebhookSink};

/// Consumes the signal channel and forwards threshold crossings to every
/// configured sink, suppressing duplicates inside the cool-down window.
pub struct AlertDispatcher {
    cooldown: Duration,
    sinks: Vec<WebhookSink>,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl AlertDispatcher {
    pub fn new(config: &AlertingConfig, client: reqwest::Client) -> Self {
        let mut sinks = Vec::new();
        if !config.slack_webhook_url.is_empty() {
            sinks.push(WebhookSink::slack(&config.slack_webhook_url, client.clone()));
        }
        if !config.discord_webhook_url.is_empty() {
            sinks.push(WebhookSink::discord(&config.discord_webhook_url, client));
        }

        Self {
            cooldown: Duration::from_secs(config.alert_cooldown_secs),
            sinks,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(
        &self,
        mut signals: mpsc::Receiver<Signal>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                signal = signals.recv() => {
                    let Some(signal) = signal else { return };
                    if signal.metadata.threshold_crossed {
                        self.handle_signal(&signal);
                    }
                }
            }
        }
    }

    fn handle_signal(&self, signal: &Signal) {
        let key = format!("{}{}", signal.market_ticker, signal.signal_type.as_str());
        if !self.pass_cooldown(&key) {
            debug!(ticker = %signal.market_ticker, "alert suppressed by cooldown");
            return;
        }

        let message = format_signal_message(signal);
        for sink in &self.sinks {
            let sink = sink.clone();
            let message = message.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.send(&message).await {
                    warn!(kind = ?sink.kind(), error = %e, "webhook delivery failed");
                }
            });
        }
    }

    /// True when the key is outside its cool-down; stamps it when passing.
    fn pass_cooldown(&self, key: &str) -> bool {
        let cooldown = chrono::Duration::from_std(self.cooldown).unwrap_or_else(|_| chrono::Duration::zero());
        let now = Utc::now();
        let mut last_sent = self.last_sent.lock();

        if let Some(last) = last_sent.get(key) {
            if now - *last < cooldown {
                return false;
            }
        }
        last_sent.insert(key.to_string(), now);
        true
    }
}

fn format_signal_message(signal: &Signal) -> String {
    let confidence_pct = signal.metadata.confidence * 100.0;
    match &signal.payload {
        Some(SignalPayload::ImpliedProbabilityDrift { delta, .. }) => format!(
            "🚨 **Implied Probability Drift**\nMarket: {}\nDelta: {:.2}%\nDrift: {:.2}σ\nConfidence: {:.0}%",
            signal.market_ticker,
            delta * 100.0,
            signal.value,
            confidence_pct,
        ),
        Some(SignalPayload::OrderbookImbalance { bid_ratio, spread_cents }) => format!(
            "⚖️ **Orderbook Imbalance**\nMarket: {}\nBid Ratio: {:.2}\nSpread: {} cents\nConfidence: {:.0}%",
            signal.market_ticker, bid_ratio, spread_cents, confidence_pct,
        ),
        Some(SignalPayload::VolumeSurge { volume_multiplier, .. }) => format!(
            "📈 **Volume Surge**\nMarket: {}\nMultiplier: {:.2}x\nConfidence: {:.0}%",
            signal.market_ticker, volume_multiplier, confidence_pct,
        ),
        None => format!(
            "Signal: {} on {} (Value: {:.2})",
            signal.signal_type.as_str(),
            signal.market_ticker,
            signal.value,
        ),
    }
}
