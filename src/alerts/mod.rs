//! Actionable alerts fused from scanner output, no-arb violations and the
//! historical hit-rate estimator.

pub mod backtest;
pub mod engine;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use backtest::{AlertStats, BacktestHarness};
pub use engine::{AlertEngine, ALERT_CHECK_INTERVAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SpreadTightened,
    DepthIncreased,
    ImbalancePressure,
    NoArbViolation,
    ExecutionReady,
    PriceDrift,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::SpreadTightened => "spread_tightened",
            AlertType::DepthIncreased => "depth_increased",
            AlertType::ImbalancePressure => "imbalance_pressure",
            AlertType::NoArbViolation => "no_arb_violation",
            AlertType::ExecutionReady => "execution_ready",
            AlertType::PriceDrift => "price_drift",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertAction {
    Buy,
    Sell,
    Watch,
    Skip,
}

/// A mechanical trading alert: why it fired, what it suggests, and how the
/// same rule has performed historically on the same market.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// Market ticker, or the event ticker for arb alerts.
    pub market_ticker: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,

    // Why it fired
    pub reason: String,
    pub inputs: serde_json::Value,
    pub threshold: f64,
    pub current_value: f64,

    // What it suggests
    pub suggestion: String,
    pub action: AlertAction,

    // From the backtest estimator
    pub confidence: f64,
    pub hit_rate: f64,
    pub sample_size: usize,

    // Execution context, cents
    pub estimated_edge: f64,
    pub estimated_slippage: f64,
    pub can_execute: bool,
    pub recommended_size: i64,
}

/// Alert ids fold the subject, the rule and a second-precision wall-clock
/// stamp.
pub fn generate_alert_id(subject: &str, alert_type: AlertType) -> String {
    format!(
        "{}_{}_{}",
        subject,
        alert_type.as_str(),
        Utc::now().format("%Y%m%d%H%M%S")
    )
}
