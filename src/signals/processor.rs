//! Fixed-tick signal computation over every active market.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::config::SignalConfig;
use crate::state::{MarketStatus, Orderbook, StateEngine};

use super::quantitative::compute_quantitative;
use super::{Signal, SignalBus, SignalMetadata, SignalPayload, SignalType};

/// Baseline window for the volume-surge check is this multiple of the
/// recent window; the surge ratio divides by the same constant.
const BASELINE_WINDOW_MULTIPLE: u64 = 5;
const QUANT_TRADE_WINDOW: Duration = Duration::from_secs(5 * 60);

pub struct SignalProcessor {
    engine: Arc<StateEngine>,
    bus: Arc<SignalBus>,
    config: SignalConfig,
}

impl SignalProcessor {
    pub fn new(engine: Arc<StateEngine>, bus: Arc<SignalBus>, config: SignalConfig) -> Self {
        Self { engine, bus, config }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(Duration::from_secs(self.config.computation_interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => self.compute_signals(),
            }
        }
    }

    fn compute_signals(&self) {
        for market in self.engine.all_markets() {
            if market.status != MarketStatus::Active {
                continue;
            }
            let Some(orderbook) = self.engine.orderbook(&market.ticker) else {
                continue;
            };

            if let Some(signal) = self.orderbook_imbalance(&market.ticker, &orderbook) {
                self.emit(signal);
            }
            if let Some(signal) = self.implied_probability_drift(&market.ticker, &orderbook) {
                self.emit(signal);
            }
            if let Some(signal) = self.volume_surge(&market.ticker) {
                self.emit(signal);
            }

            // The quantitative bundle goes out every tick, threshold or not,
            // as a low-priority imbalance-type signal: liquidity score as
            // value, efficiency score as confidence.
            let trades = self.engine.recent_trades(&market.ticker, QUANT_TRADE_WINDOW);
            if let Some(quant) =
                compute_quantitative(&market.ticker, &orderbook, &trades, market.expiration_time)
            {
                self.bus.publish(&Signal {
                    market_ticker: market.ticker.clone(),
                    signal_type: SignalType::OrderbookImbalance,
                    value: quant.liquidity_score,
                    timestamp: quant.timestamp,
                    metadata: SignalMetadata {
                        previous_value: None,
                        threshold_crossed: false,
                        confidence: quant.efficiency_score,
                    },
                    payload: None,
                });
            }
        }
    }

    /// Threshold-crossed signals also land in the time-series history.
    fn emit(&self, signal: Signal) {
        self.engine.time_series().record_signal(
            &signal.market_ticker,
            signal.signal_type.as_str(),
            signal.value,
        );
        debug!(
            ticker = %signal.market_ticker,
            signal_type = signal.signal_type.as_str(),
            value = signal.value,
            "signal emitted"
        );
        self.bus.publish(&signal);
    }

    fn orderbook_imbalance(&self, ticker: &str, orderbook: &Orderbook) -> Option<Signal> {
        let spread = orderbook.spread()?;
        let ratio = orderbook.imbalance_ratio();

        if ratio.abs() <= self.config.imbalance_threshold {
            return None;
        }

        Some(Signal {
            market_ticker: ticker.to_string(),
            signal_type: SignalType::OrderbookImbalance,
            value: ratio,
            timestamp: Utc::now(),
            metadata: SignalMetadata {
                previous_value: None,
                threshold_crossed: true,
                confidence: (ratio.abs() / self.config.imbalance_threshold).min(1.0),
            },
            payload: Some(SignalPayload::OrderbookImbalance {
                bid_ratio: ratio,
                spread_cents: spread,
            }),
        })
    }

    fn implied_probability_drift(&self, ticker: &str, orderbook: &Orderbook) -> Option<Signal> {
        let best_bid = orderbook.bids.first()?.price as f64;
        let best_ask = orderbook.asks.first()?.price as f64;
        let current_prob = (best_bid + best_ask) / 200.0;

        let window = Duration::from_secs(self.config.drift_window_secs);
        let trades = self.engine.recent_trades(ticker, window);
        if trades.is_empty() {
            return None;
        }

        let probs: Vec<f64> = trades.iter().map(|t| t.price as f64 / 100.0).collect();
        let mean = probs.iter().sum::<f64>() / probs.len() as f64;
        let variance =
            probs.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / probs.len() as f64;
        let std_dev = variance.sqrt();
        if std_dev == 0.0 {
            return None;
        }

        let drift = (current_prob - mean) / std_dev;
        if drift.abs() <= self.config.drift_threshold {
            return None;
        }

        Some(Signal {
            market_ticker: ticker.to_string(),
            signal_type: SignalType::ImpliedProbabilityDrift,
            value: drift,
            timestamp: Utc::now(),
            metadata: SignalMetadata {
                previous_value: Some(mean),
                threshold_crossed: true,
                confidence: (drift.abs() / self.config.drift_threshold).min(1.0),
            },
            payload: Some(SignalPayload::ImpliedProbabilityDrift {
                delta: current_prob - mean,
                window_secs: self.config.drift_window_secs,
            }),
        })
    }

    fn volume_surge(&self, ticker: &str) -> Option<Signal> {
        let window = Duration::from_secs(self.config.volume_window_secs);
        let recent_trades = self.engine.recent_trades(ticker, window);
        if recent_trades.is_empty() {
            return None;
        }
        let recent_volume: i64 = recent_trades.iter().map(|t| t.quantity).sum();

        let baseline_window =
            Duration::from_secs(self.config.volume_window_secs * BASELINE_WINDOW_MULTIPLE);
        let baseline_trades = self.engine.recent_trades(ticker, baseline_window);
        if baseline_trades.len() < 2 {
            return None;
        }
        let baseline_volume: i64 = baseline_trades.iter().map(|t| t.quantity).sum();

        let baseline_avg = baseline_volume as f64 / BASELINE_WINDOW_MULTIPLE as f64;
        if baseline_avg == 0.0 {
            return None;
        }

        let surge_ratio = recent_volume as f64 / baseline_avg;
        if surge_ratio <= self.config.volume_surge_threshold {
            return None;
        }

        Some(Signal {
            market_ticker: ticker.to_string(),
            signal_type: SignalType::VolumeSurge,
            value: surge_ratio,
            timestamp: Utc::now(),
            metadata: SignalMetadata {
                previous_value: Some(baseline_avg),
                threshold_crossed: true,
                confidence: (surge_ratio / self.config.volume_surge_threshold).min(1.0),
            },
            payload: Some(SignalPayload::VolumeSurge {
                volume_multiplier: surge_ratio,
                window_secs: self.config.volume_window_secs,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Market, MarketStatus, PriceLevel, Trade, TradeSide};

    fn processor() -> (SignalProcessor, Arc<StateEngine>, tokio::sync::mpsc::Receiver<Signal>) {
        let engine = Arc::new(StateEngine::new());
        let mut bus = SignalBus::new();
        let rx = bus.add_consumer();
        let processor =
            SignalProcessor::new(engine.clone(), Arc::new(bus), SignalConfig::default());
        (processor, engine, rx)
    }

    fn register_active(engine: &StateEngine, ticker: &str) {
        engine.register_market(Market {
            ticker: ticker.to_string(),
            title: ticker.to_string(),
            category: "Politics".to_string(),
            status: MarketStatus::Active,
            expiration_time: None,
            event_ticker: "EVT".to_string(),
            yes_sub_title: None,
            no_sub_title: None,
        });
    }

    fn set_book(engine: &StateEngine, ticker: &str, bid: (i64, i64), ask: (i64, i64)) {
        let mut ob = Orderbook::new(ticker);
        ob.bids = vec![PriceLevel { price: bid.0, quantity: bid.1 }];
        ob.asks = vec![PriceLevel { price: ask.0, quantity: ask.1 }];
        engine.update_orderbook(ticker, ob);
    }

    fn add_trade(engine: &StateEngine, ticker: &str, price: i64, quantity: i64, secs_ago: i64) {
        engine.add_trade(Trade {
            market_ticker: ticker.to_string(),
            side: TradeSide::Yes,
            price,
            quantity,
            timestamp: Utc::now() - chrono::Duration::seconds(secs_ago),
        });
    }

    #[test]
    fn imbalance_signal_fires_with_saturated_confidence() {
        let (processor, engine, _rx) = processor();
        register_active(&engine, "T");
        set_book(&engine, "T", (55, 800), (56, 200));

        let orderbook = engine.orderbook("T").unwrap();
        let signal = processor.orderbook_imbalance("T", &orderbook).unwrap();

        // bid depth 44000, ask depth 11200 -> ratio ~0.594 over threshold 0.3
        assert!((signal.value - 0.5942028985507246).abs() < 1e-9);
        assert!(signal.metadata.threshold_crossed);
        assert_eq!(signal.metadata.confidence, 1.0);
        match signal.payload {
            Some(SignalPayload::OrderbookImbalance { spread_cents, .. }) => {
                assert_eq!(spread_cents, 1)
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn balanced_book_stays_quiet() {
        let (processor, engine, _rx) = processor();
        register_active(&engine, "T");
        set_book(&engine, "T", (55, 500), (56, 500));

        let orderbook = engine.orderbook("T").unwrap();
        assert!(processor.orderbook_imbalance("T", &orderbook).is_none());
    }

    #[test]
    fn drift_skipped_when_stddev_is_zero() {
        let (processor, engine, _rx) = processor();
        register_active(&engine, "T");
        set_book(&engine, "T", (70, 100), (72, 100));
        for _ in 0..5 {
            add_trade(&engine, "T", 50, 10, 5);
        }

        let orderbook = engine.orderbook("T").unwrap();
        assert!(processor.implied_probability_drift("T", &orderbook).is_none());
    }

    #[test]
    fn drift_fires_when_price_leaves_the_trade_band() {
        let (processor, engine, _rx) = processor();
        register_active(&engine, "T");
        // Trades around 0.50 with small dispersion; book far above.
        add_trade(&engine, "T", 49, 10, 10);
        add_trade(&engine, "T", 51, 10, 8);
        add_trade(&engine, "T", 49, 10, 6);
        add_trade(&engine, "T", 51, 10, 4);
        set_book(&engine, "T", (70, 100), (72, 100));

        let orderbook = engine.orderbook("T").unwrap();
        let signal = processor.implied_probability_drift("T", &orderbook).unwrap();
        assert_eq!(signal.signal_type, SignalType::ImpliedProbabilityDrift);
        assert!(signal.value > 2.0);
        assert_eq!(signal.metadata.confidence, 1.0);
    }

    #[test]
    fn volume_surge_needs_a_baseline() {
        let (processor, engine, _rx) = processor();
        register_active(&engine, "T");
        add_trade(&engine, "T", 50, 100, 5);
        // Only one trade in the baseline window: no signal.
        assert!(processor.volume_surge("T").is_none());
    }

    #[test]
    fn volume_surge_fires_on_concentrated_volume() {
        let (processor, engine, _rx) = processor();
        register_active(&engine, "T");
        // Old baseline trade outside the recent window, inside the baseline.
        add_trade(&engine, "T", 50, 10, 100);
        // Recent burst.
        add_trade(&engine, "T", 50, 100, 5);

        let signal = processor.volume_surge("T").unwrap();
        // recent 100 vs baseline 110/5 = 22 -> ratio ~4.5 over threshold 3
        assert!(signal.value > 4.0);
        assert!(signal.metadata.threshold_crossed);
    }

    #[test]
    fn quant_bundle_flows_even_without_threshold_crossings() {
        let (processor, engine, mut rx) = processor();
        register_active(&engine, "T");
        set_book(&engine, "T", (55, 500), (56, 500));

        processor.compute_signals();

        let signal = rx.try_recv().unwrap();
        assert!(!signal.metadata.threshold_crossed);
        assert!(signal.payload.is_none());
    }

    #[test]
    fn inactive_markets_are_skipped() {
        let (processor, engine, mut rx) = processor();
        engine.register_market(Market {
            ticker: "CLOSED".to_string(),
            title: "closed".to_string(),
            category: String::new(),
            status: MarketStatus::Closed,
            expiration_time: None,
            event_ticker: String::new(),
            yes_sub_title: None,
            no_sub_title: None,
        });
        set_book(&engine, "CLOSED", (55, 800), (56, 200));

        processor.compute_signals();
        assert!(rx.try_recv().is_err());
    }
}
