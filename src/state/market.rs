//! Market records as reported by the venue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a market on the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Initialized,
    Inactive,
    Active,
    Closed,
    Determined,
    Disputed,
    Amended,
    Finalized,
}

impl MarketStatus {
    /// Parses the venue's status string. Unknown values map to `Inactive`.
    pub fn parse(s: &str) -> Self {
        match s {
            "initialized" => MarketStatus::Initialized,
            "inactive" => MarketStatus::Inactive,
            "active" => MarketStatus::Active,
            "closed" => MarketStatus::Closed,
            "determined" => MarketStatus::Determined,
            "disputed" => MarketStatus::Disputed,
            "amended" => MarketStatus::Amended,
            "finalized" => MarketStatus::Finalized,
            _ => MarketStatus::Inactive,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Initialized => "initialized",
            MarketStatus::Inactive => "inactive",
            MarketStatus::Active => "active",
            MarketStatus::Closed => "closed",
            MarketStatus::Determined => "determined",
            MarketStatus::Disputed => "disputed",
            MarketStatus::Amended => "amended",
            MarketStatus::Finalized => "finalized",
        }
    }
}

/// A single binary market, keyed by ticker. Created on first appearance in a
/// market-list response and refreshed on every re-poll; never destroyed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub ticker: String,
    pub title: String,
    pub category: String,
    pub status: MarketStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub expiration_time: Option<DateTime<Utc>>,
    pub event_ticker: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub yes_sub_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub no_sub_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_statuses() {
        assert_eq!(MarketStatus::parse("active"), MarketStatus::Active);
        assert_eq!(MarketStatus::parse("finalized"), MarketStatus::Finalized);
        assert_eq!(MarketStatus::parse("determined"), MarketStatus::Determined);
    }

    #[test]
    fn unknown_status_is_inactive() {
        assert_eq!(MarketStatus::parse("garbage"), MarketStatus::Inactive);
        assert_eq!(MarketStatus::parse(""), MarketStatus::Inactive);
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in [
            "initialized",
            "inactive",
            "active",
            "closed",
            "determined",
            "disputed",
            "amended",
            "finalized",
        ] {
            assert_eq!(MarketStatus::parse(s).as_str(), s);
        }
    }
}
