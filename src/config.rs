//! Environment-first configuration with an optional TOML overlay.
//!
//! Every key has a `KALSHI__SECTION__KEY` environment variable and a
//! deployment default; `config/default.toml`, when present, overrides the
//! defaults and an unreadable file fails startup.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

const TOML_PATH: &str = "config/default.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub kalshi: KalshiConfig,
    pub ingestion: IngestionConfig,
    pub signals: SignalConfig,
    pub api: ApiConfig,
    pub alerting: AlertingConfig,
}

#[derive(Debug, Clone)]
pub struct KalshiConfig {
    pub api_base_url: String,
    pub websocket_url: String,
    pub api_key_id: String,
    pub private_key_path: String,
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub websocket_reconnect_delay_secs: u64,
    pub rest_poll_interval_secs: u64,
    pub rate_limit_per_second: u32,
    pub series_category: String,
}

#[derive(Debug, Clone)]
pub struct SignalConfig {
    pub computation_interval_secs: u64,
    pub drift_window_secs: u64,
    pub drift_threshold: f64,
    pub imbalance_threshold: f64,
    pub volume_surge_threshold: f64,
    pub volume_window_secs: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            computation_interval_secs: 1,
            drift_window_secs: 60,
            drift_threshold: 2.0,
            imbalance_threshold: 0.3,
            volume_surge_threshold: 3.0,
            volume_window_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_address: String,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AlertingConfig {
    pub enabled: bool,
    pub slack_webhook_url: String,
    pub discord_webhook_url: String,
    pub alert_cooldown_secs: u64,
}

/// Optional sections mirrored from `config/default.toml`.
#[derive(Debug, Default, Deserialize)]
struct TomlOverlay {
    #[serde(default)]
    kalshi: TomlKalshi,
    #[serde(default)]
    ingestion: TomlIngestion,
    #[serde(default)]
    signals: TomlSignals,
    #[serde(default)]
    api: TomlApi,
    #[serde(default)]
    alerting: TomlAlerting,
}

#[derive(Debug, Default, Deserialize)]
struct TomlKalshi {
    api_base_url: Option<String>,
    websocket_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlIngestion {
    websocket_reconnect_delay_secs: Option<u64>,
    rest_poll_interval_secs: Option<u64>,
    rate_limit_per_second: Option<u32>,
    series_category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlSignals {
    computation_interval_secs: Option<u64>,
    drift_window_secs: Option<u64>,
    drift_threshold: Option<f64>,
    imbalance_threshold: Option<f64>,
    volume_surge_threshold: Option<f64>,
    volume_window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlApi {
    bind_address: Option<String>,
    cors_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlAlerting {
    enabled: Option<bool>,
    alert_cooldown_secs: Option<u64>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut cfg = Self::from_env();

        if Path::new(TOML_PATH).exists() {
            let data = std::fs::read_to_string(TOML_PATH)
                .with_context(|| format!("failed to read {TOML_PATH}"))?;
            let overlay: TomlOverlay =
                toml::from_str(&data).with_context(|| format!("failed to parse {TOML_PATH}"))?;
            cfg.apply_overlay(overlay);
        }

        Ok(cfg)
    }

    fn from_env() -> Self {
        Self {
            kalshi: KalshiConfig {
                api_base_url: env_str(
                    "KALSHI__KALSHI__API_BASE_URL",
                    "https://api.elections.kalshi.com/trade-api/v2",
                ),
                websocket_url: env_str(
                    "KALSHI__KALSHI__WEBSOCKET_URL",
                    "wss://api.elections.kalshi.com/trade-api/v2/ws",
                ),
                api_key_id: env_str("KALSHI__KALSHI__API_KEY_ID", ""),
                private_key_path: env_str("KALSHI__KALSHI__PRIVATE_KEY_PATH", ""),
            },
            ingestion: IngestionConfig {
                websocket_reconnect_delay_secs: env_parse(
                    "KALSHI__INGESTION__WEBSOCKET_RECONNECT_DELAY_SECS",
                    5,
                ),
                rest_poll_interval_secs: env_parse("KALSHI__INGESTION__REST_POLL_INTERVAL_SECS", 60),
                rate_limit_per_second: env_parse("KALSHI__INGESTION__RATE_LIMIT_PER_SECOND", 10),
                series_category: env_str("KALSHI__INGESTION__SERIES_CATEGORY", "Politics"),
            },
            signals: SignalConfig {
                computation_interval_secs: env_parse("KALSHI__SIGNALS__COMPUTATION_INTERVAL_SECS", 1),
                drift_window_secs: env_parse("KALSHI__SIGNALS__DRIFT_WINDOW_SECS", 60),
                drift_threshold: env_parse("KALSHI__SIGNALS__DRIFT_THRESHOLD", 2.0),
                imbalance_threshold: env_parse("KALSHI__SIGNALS__IMBALANCE_THRESHOLD", 0.3),
                volume_surge_threshold: env_parse("KALSHI__SIGNALS__VOLUME_SURGE_THRESHOLD", 3.0),
                volume_window_secs: env_parse("KALSHI__SIGNALS__VOLUME_WINDOW_SECS", 30),
            },
            api: ApiConfig {
                bind_address: env_str("KALSHI__API__BIND_ADDRESS", "0.0.0.0:8080"),
                cors_origins: env_list(
                    "KALSHI__API__CORS_ORIGINS",
                    &["http://localhost:3000"],
                ),
            },
            alerting: AlertingConfig {
                enabled: env_parse("KALSHI__ALERTING__ENABLED", true),
                slack_webhook_url: env_str("KALSHI__ALERTING__SLACK_WEBHOOK_URL", ""),
                discord_webhook_url: env_str("KALSHI__ALERTING__DISCORD_WEBHOOK_URL", ""),
                alert_cooldown_secs: env_parse("KALSHI__ALERTING__ALERT_COOLDOWN_SECS", 300),
            },
        }
    }

    fn apply_overlay(&mut self, overlay: TomlOverlay) {
        let TomlOverlay {
            kalshi,
            ingestion,
            signals,
            api,
            alerting,
        } = overlay;

        if let Some(v) = kalshi.api_base_url {
            self.kalshi.api_base_url = v;
        }
        if let Some(v) = kalshi.websocket_url {
            self.kalshi.websocket_url = v;
        }

        if let Some(v) = ingestion.websocket_reconnect_delay_secs {
            self.ingestion.websocket_reconnect_delay_secs = v;
        }
        if let Some(v) = ingestion.rest_poll_interval_secs {
            self.ingestion.rest_poll_interval_secs = v;
        }
        if let Some(v) = ingestion.rate_limit_per_second {
            self.ingestion.rate_limit_per_second = v;
        }
        if let Some(v) = ingestion.series_category {
            self.ingestion.series_category = v;
        }

        if let Some(v) = signals.computation_interval_secs {
            self.signals.computation_interval_secs = v;
        }
        if let Some(v) = signals.drift_window_secs {
            self.signals.drift_window_secs = v;
        }
        if let Some(v) = signals.drift_threshold {
            self.signals.drift_threshold = v;
        }
        if let Some(v) = signals.imbalance_threshold {
            self.signals.imbalance_threshold = v;
        }
        if let Some(v) = signals.volume_surge_threshold {
            self.signals.volume_surge_threshold = v;
        }
        if let Some(v) = signals.volume_window_secs {
            self.signals.volume_window_secs = v;
        }

        if let Some(v) = api.bind_address {
            self.api.bind_address = v;
        }
        if let Some(v) = api.cors_origins {
            self.api.cors_origins = v;
        }

        if let Some(v) = alerting.enabled {
            self.alerting.enabled = v;
        }
        if let Some(v) = alerting.alert_cooldown_secs {
            self.alerting.alert_cooldown_secs = v;
        }
    }
}

fn env_str(key: &str, default: &str) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v.split(',').map(|s| s.trim().to_string()).collect(),
        _ => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployment() {
        let cfg = Config::from_env();
        assert_eq!(cfg.ingestion.rest_poll_interval_secs, 60);
        assert_eq!(cfg.ingestion.rate_limit_per_second, 10);
        assert_eq!(cfg.signals.computation_interval_secs, 1);
        assert_eq!(cfg.signals.imbalance_threshold, 0.3);
        assert_eq!(cfg.signals.drift_threshold, 2.0);
        assert_eq!(cfg.signals.volume_surge_threshold, 3.0);
        assert_eq!(cfg.alerting.alert_cooldown_secs, 300);
        assert_eq!(cfg.ingestion.series_category, "Politics");
    }

    #[test]
    fn overlay_overrides_only_present_keys() {
        let mut cfg = Config::from_env();
        let overlay: TomlOverlay = toml::from_str(
            r#"
            [signals]
            imbalance_threshold = 0.5

            [api]
            bind_address = "127.0.0.1:9999"
            "#,
        )
        .unwrap();
        cfg.apply_overlay(overlay);

        assert_eq!(cfg.signals.imbalance_threshold, 0.5);
        assert_eq!(cfg.api.bind_address, "127.0.0.1:9999");
        // Untouched keys keep their defaults.
        assert_eq!(cfg.signals.drift_threshold, 2.0);
    }

    #[test]
    fn unparseable_overlay_is_an_error() {
        let result: std::result::Result<TomlOverlay, _> = toml::from_str("signals = 5");
        assert!(result.is_err());
    }

    #[test]
    fn env_list_splits_on_commas() {
        std::env::set_var("KALSHI_TEST_CORS", "http://a.example, http://b.example");
        let list = env_list("KALSHI_TEST_CORS", &["x"]);
        assert_eq!(list, vec!["http://a.example", "http://b.example"]);
        std::env::remove_var("KALSHI_TEST_CORS");
    }
}
