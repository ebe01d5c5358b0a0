//! Rule pass turning scanner output and no-arb violations into alerts.
//!
//! Runs every 5 seconds. The engine holds copies of scanner and no-arb
//! output, never references into the state engine. Fired alerts queue up
//! until their outcome window elapses, then feed the hit-rate estimator.

use chrono::Utc;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::scanner::{MarketOpportunity, NoArbDetector, NoArbViolation, Scanner};
use crate::state::StateEngine;

use super::backtest::BacktestHarness;
use super::{generate_alert_id, Alert, AlertAction, AlertType};

pub const ALERT_CHECK_INTERVAL: Duration = Duration::from_secs(5);
/// Post-alert window the hit rules are judged over.
const OUTCOME_WINDOW: Duration = Duration::from_secs(60);

const SPREAD_TIGHT_THRESHOLD: f64 = 0.5;
const DEPTH_THRESHOLD: i64 = 500;
const IMBALANCE_PRESSURE_THRESHOLD: f64 = 0.6;
const MICROPRICE_LAG_CENTS: f64 = 1.0;
const EXECUTION_READY_LIQUIDITY: f64 = 0.7;
const NOARB_NET_THRESHOLD: f64 = 0.02;

pub struct AlertEngine {
    scanner: Scanner,
    noarb: NoArbDetector,
    backtest: BacktestHarness,
    pending: VecDeque<Alert>,
}

impl AlertEngine {
    pub fn new(engine: Arc<StateEngine>) -> Self {
        Self {
            scanner: Scanner::new(engine.clone()),
            noarb: NoArbDetector::new(engine.clone()),
            backtest: BacktestHarness::new(engine),
            pending: VecDeque::new(),
        }
    }

    /// One tick: settle elapsed alerts, then scan for new ones.
    pub fn check_alerts(&mut self) -> Vec<Alert> {
        self.settle_elapsed();

        let mut alerts = Vec::new();

        for opportunity in self.scanner.scan_markets() {
            alerts.extend(self.market_alerts(&opportunity));
        }

        for violation in self.noarb.check_violations() {
            if violation.actionable {
                alerts.push(self.noarb_alert(&violation));
            }
        }

        for alert in &alerts {
            self.pending.push_back(alert.clone());
        }

        alerts
    }

    /// Scores every pending alert whose outcome window has fully elapsed.
    fn settle_elapsed(&mut self) {
        let window = chrono::Duration::from_std(OUTCOME_WINDOW).unwrap_or_else(|_| chrono::Duration::zero());
        let now = Utc::now();
        while self
            .pending
            .front()
            .is_some_and(|front| now >= front.timestamp + window)
        {
            if let Some(alert) = self.pending.pop_front() {
                self.backtest.score_alert(&alert, OUTCOME_WINDOW);
            }
        }
    }

    fn market_alerts(&self, opp: &MarketOpportunity) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if opp.spread_percent < SPREAD_TIGHT_THRESHOLD && opp.spread_percent > 0.0 {
            alerts.push(self.finish(Alert {
                id: generate_alert_id(&opp.market_ticker, AlertType::SpreadTightened),
                alert_type: AlertType::SpreadTightened,
                market_ticker: opp.market_ticker.clone(),
                title: opp.title.clone(),
                timestamp: Utc::now(),
                reason: "Spread tightened below 0.5%".to_string(),
                inputs: json!({ "spread_percent": opp.spread_percent }),
                threshold: SPREAD_TIGHT_THRESHOLD,
                current_value: opp.spread_percent,
                suggestion: "Liquidity improved: easier to enter/exit".to_string(),
                action: AlertAction::Watch,
                confidence: 0.0,
                hit_rate: 0.0,
                sample_size: 0,
                estimated_edge: 0.0,
                estimated_slippage: opp.estimated_slippage_100 as f64 / 100.0,
                can_execute: opp.can_execute_100,
                recommended_size: 0,
            }));
        }

        if opp.depth_at_top5 > DEPTH_THRESHOLD {
            alerts.push(self.finish(Alert {
                id: generate_alert_id(&opp.market_ticker, AlertType::DepthIncreased),
                alert_type: AlertType::DepthIncreased,
                market_ticker: opp.market_ticker.clone(),
                title: opp.title.clone(),
                timestamp: Utc::now(),
                reason: "Depth at top-5 levels exceeds 500 contracts".to_string(),
                inputs: json!({ "depth_at_top5": opp.depth_at_top5 }),
                threshold: DEPTH_THRESHOLD as f64,
                current_value: opp.depth_at_top5 as f64,
                suggestion: "High liquidity: can execute larger size".to_string(),
                action: AlertAction::Watch,
                confidence: 0.0,
                hit_rate: 0.0,
                sample_size: 0,
                estimated_edge: 0.0,
                estimated_slippage: 0.0,
                can_execute: true,
                recommended_size: opp.depth_at_top5 / 2,
            }));
        }

        if opp.imbalance.abs() > IMBALANCE_PRESSURE_THRESHOLD
            && opp.microprice_diff.abs() > MICROPRICE_LAG_CENTS
        {
            let action = if opp.imbalance > 0.0 {
                AlertAction::Buy
            } else {
                AlertAction::Sell
            };

            alerts.push(self.finish(Alert {
                id: generate_alert_id(&opp.market_ticker, AlertType::ImbalancePressure),
                alert_type: AlertType::ImbalancePressure,
                market_ticker: opp.market_ticker.clone(),
                title: opp.title.clone(),
                timestamp: Utc::now(),
                reason: "Strong orderbook imbalance detected with price lag".to_string(),
                inputs: json!({
                    "imbalance": opp.imbalance,
                    "microprice_diff": opp.microprice_diff,
                }),
                threshold: IMBALANCE_PRESSURE_THRESHOLD,
                current_value: opp.imbalance.abs(),
                suggestion: "Pressure detected: watch for price movement".to_string(),
                action,
                confidence: 0.0,
                hit_rate: 0.0,
                sample_size: 0,
                estimated_edge: 0.0,
                estimated_slippage: opp.estimated_slippage_100 as f64 / 100.0,
                can_execute: opp.can_execute_100,
                recommended_size: 0,
            }));
        }

        if opp.liquidity_score > EXECUTION_READY_LIQUIDITY
            && opp.spread_percent < 1.0
            && opp.can_execute_100
        {
            alerts.push(self.finish(Alert {
                id: generate_alert_id(&opp.market_ticker, AlertType::ExecutionReady),
                alert_type: AlertType::ExecutionReady,
                market_ticker: opp.market_ticker.clone(),
                title: opp.title.clone(),
                timestamp: Utc::now(),
                reason: "Optimal execution conditions: tight spread + good depth".to_string(),
                inputs: json!({
                    "liquidity_score": opp.liquidity_score,
                    "spread_percent": opp.spread_percent,
                }),
                threshold: EXECUTION_READY_LIQUIDITY,
                current_value: opp.liquidity_score,
                suggestion: "Good entry/exit conditions".to_string(),
                action: AlertAction::Watch,
                confidence: 0.0,
                hit_rate: 0.0,
                sample_size: 0,
                estimated_edge: 0.0,
                estimated_slippage: opp.estimated_slippage_100 as f64 / 100.0,
                can_execute: true,
                recommended_size: 100,
            }));
        }

        alerts
    }

    fn noarb_alert(&self, violation: &NoArbViolation) -> Alert {
        self.finish(Alert {
            id: generate_alert_id(&violation.event_ticker, AlertType::NoArbViolation),
            alert_type: AlertType::NoArbViolation,
            market_ticker: violation.event_ticker.clone(),
            title: violation.describe(),
            timestamp: Utc::now(),
            reason: "Arbitrage opportunity detected".to_string(),
            inputs: json!({
                "sum_buy_price": violation.sum_buy_price,
                "sum_sell_price": violation.sum_sell_price,
                "net_arb": violation.net_arb,
            }),
            threshold: NOARB_NET_THRESHOLD,
            current_value: violation.net_arb,
            suggestion: "Systematic arbitrage: execute if liquidity sufficient".to_string(),
            action: AlertAction::Buy,
            confidence: 0.0,
            hit_rate: 0.0,
            sample_size: 0,
            estimated_edge: violation.net_arb * 100.0,
            estimated_slippage: violation.estimated_slippage * 100.0,
            can_execute: violation.liquidity >= 10,
            recommended_size: violation.liquidity,
        })
    }

    /// Pairs a fresh alert with the estimator's view of its rule.
    fn finish(&self, mut alert: Alert) -> Alert {
        let (confidence, hit_rate, sample_size) = self
            .backtest
            .alert_stats(&alert.market_ticker, alert.alert_type);
        alert.confidence = confidence;
        alert.hit_rate = hit_rate;
        alert.sample_size = sample_size;
        alert
    }
}
