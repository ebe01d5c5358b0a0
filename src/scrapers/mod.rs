//! Upstream ingestion: REST discovery/polling, the push stream, request
//! signing and outbound rate limiting.

pub mod kalshi_auth;
pub mod kalshi_rest;
pub mod kalshi_ws;
pub mod rate_limiter;

use thiserror::Error;

/// Errors raised by the ingestion layer. `Config` is fatal at startup;
/// everything else is transient and confined to the iteration that hit it.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Parse(#[from] serde_json::Error),
}
