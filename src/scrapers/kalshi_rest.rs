//! REST side of ingestion: series discovery, market refresh and per-market
//! order-book polling.
//!
//! Both loops run until shutdown. No upstream error is fatal inside a loop;
//! failures are counted, logged at a throttled cadence and retried on the
//! next cycle.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{IngestionConfig, KalshiConfig};
use crate::state::{KalshiOrderbookResponse, Market, MarketStatus, Orderbook, StateEngine};

use super::kalshi_auth::RequestSigner;
use super::rate_limiter::RestRateLimiter;
use super::IngestError;

const PAGE_LIMIT: &str = "100";
const MARKET_CYCLE_PAUSE: Duration = Duration::from_secs(60);
const ORDERBOOK_FETCH_TIMEOUT: Duration = Duration::from_secs(5);
const BULK_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Log the 1st error and every 10th after that.
const ERROR_LOG_EVERY: u64 = 10;

#[derive(Debug, Deserialize)]
pub struct SeriesResponse {
    #[serde(default)]
    pub series: Vec<ApiSeries>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSeries {
    pub ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct MarketsResponse {
    #[serde(default)]
    pub markets: Vec<ApiMarket>,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiMarket {
    pub ticker: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: String,
    pub expiration_time: Option<String>,
    #[serde(default)]
    pub event_ticker: String,
    pub yes_sub_title: Option<String>,
    pub no_sub_title: Option<String>,
}

pub fn market_from_api(m: ApiMarket) -> Market {
    let expiration_time = m
        .expiration_time
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));

    Market {
        ticker: m.ticker,
        title: m.title,
        category: m.category,
        status: MarketStatus::parse(&m.status),
        expiration_time,
        event_ticker: m.event_ticker,
        yes_sub_title: m.yes_sub_title,
        no_sub_title: m.no_sub_title,
    }
}

/// HTTP client for the venue's trade API. Market and series listings are
/// public; order-book fetches carry the signed headers when a signer is
/// configured.
pub struct KalshiRestClient {
    base_url: String,
    client: reqwest::Client,
    signer: Option<RequestSigner>,
    limiter: RestRateLimiter,
}

impl KalshiRestClient {
    pub fn new(kalshi: &KalshiConfig, ingestion: &IngestionConfig) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .timeout(BULK_FETCH_TIMEOUT)
            .build()
            .map_err(IngestError::Network)?;

        let signer = match (
            kalshi.api_key_id.is_empty(),
            kalshi.private_key_path.is_empty(),
        ) {
            (true, true) => None,
            (false, false) => {
                let pem = std::fs::read_to_string(&kalshi.private_key_path).map_err(|e| {
                    IngestError::Config(format!(
                        "failed to read private key {}: {e}",
                        kalshi.private_key_path
                    ))
                })?;
                Some(RequestSigner::new(&kalshi.api_key_id, &pem)?)
            }
            _ => {
                return Err(IngestError::Config(
                    "orderbook auth requires both an API key id and a private key path".to_string(),
                ))
            }
        };

        Ok(Self {
            base_url: kalshi.api_base_url.trim_end_matches('/').to_string(),
            client,
            signer,
            limiter: RestRateLimiter::per_second(ingestion.rate_limit_per_second),
        })
    }

    /// Pages through `/series` for one category and returns the tickers.
    pub async fn fetch_series(&self, category: &str) -> Result<Vec<String>, IngestError> {
        let mut tickers = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            self.limiter.acquire().await;

            let mut request = self
                .client
                .get(format!("{}/series", self.base_url))
                .query(&[("category", category), ("limit", PAGE_LIMIT)]);
            if let Some(c) = &cursor {
                request = request.query(&[("cursor", c.as_str())]);
            }

            let resp: SeriesResponse = check_status(request.send().await?).await?;
            tickers.extend(resp.series.into_iter().map(|s| s.ticker));

            match resp.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(tickers)
    }

    /// One page of open markets for a series.
    pub async fn fetch_markets_page(
        &self,
        series_ticker: &str,
        cursor: Option<&str>,
    ) -> Result<MarketsResponse, IngestError> {
        self.limiter.acquire().await;

        let mut request = self
            .client
            .get(format!("{}/markets", self.base_url))
            .query(&[
                ("limit", PAGE_LIMIT),
                ("status", "open"),
                ("series_ticker", series_ticker),
            ]);
        if let Some(c) = cursor {
            request = request.query(&[("cursor", c)]);
        }

        check_status(request.send().await?).await
    }

    /// Fetches one market's order book with a tight per-request timeout,
    /// independent of the overall poll cadence.
    pub async fn fetch_orderbook(
        &self,
        ticker: &str,
    ) -> Result<KalshiOrderbookResponse, IngestError> {
        self.limiter.acquire().await;

        let path = format!("/markets/{ticker}/orderbook");
        let mut request = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .timeout(ORDERBOOK_FETCH_TIMEOUT);

        if let Some(signer) = &self.signer {
            let headers = signer.sign("GET", &path, None);
            for (name, value) in headers.as_tuples() {
                request = request.header(name, value);
            }
        }

        check_status(request.send().await?).await
    }
}

async fn check_status<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, IngestError> {
    let status = resp.status();
    if !status.is_success() {
        let message = resp.text().await.unwrap_or_default();
        return Err(IngestError::Api {
            status: status.as_u16(),
            message,
        });
    }
    Ok(resp.json::<T>().await?)
}

/// Market discovery / refresh loop. Discovers the category's series once,
/// then keeps re-registering their open markets with a pause between cycles.
pub async fn run_market_poller(
    client: Arc<KalshiRestClient>,
    engine: Arc<StateEngine>,
    category: String,
    mut shutdown: watch::Receiver<bool>,
) {
    let series = loop {
        match client.fetch_series(&category).await {
            Ok(series) => {
                info!(category = %category, count = series.len(), "discovered series");
                break series;
            }
            Err(e) => {
                warn!(error = %e, "series discovery failed, retrying");
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = sleep(MARKET_CYCLE_PAUSE) => {}
                }
            }
        }
    };

    loop {
        for series_ticker in &series {
            if *shutdown.borrow() {
                return;
            }

            let mut cursor: Option<String> = None;
            loop {
                match client
                    .fetch_markets_page(series_ticker, cursor.as_deref())
                    .await
                {
                    Ok(page) => {
                        for m in page.markets {
                            engine.register_market(market_from_api(m));
                        }
                        match page.cursor {
                            Some(c) if !c.is_empty() => cursor = Some(c),
                            _ => break,
                        }
                    }
                    Err(e) => {
                        warn!(series = %series_ticker, error = %e, "market page fetch failed");
                        break;
                    }
                }
            }
        }

        debug!("market poll cycle complete");
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = sleep(MARKET_CYCLE_PAUSE) => {}
        }
    }
}

/// Per-market order-book loop. Walks the current active markets on every
/// tick and hands parsed books to the engine.
pub async fn run_orderbook_poller(
    client: Arc<KalshiRestClient>,
    engine: Arc<StateEngine>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut error_count: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {}
        }

        let mut attempts: u64 = 0;
        let mut successes: u64 = 0;

        for market in engine.all_markets() {
            if *shutdown.borrow() {
                return;
            }
            if market.status != MarketStatus::Active {
                continue;
            }
            attempts += 1;

            match client.fetch_orderbook(&market.ticker).await {
                Ok(resp) => {
                    let mut book = Orderbook::new(&market.ticker);
                    book.update_from_kalshi(&resp);
                    engine.update_orderbook(&market.ticker, book);
                    successes += 1;
                }
                Err(e) => {
                    error_count += 1;
                    if error_count % ERROR_LOG_EVERY == 1 {
                        warn!(ticker = %market.ticker, error = %e, "orderbook fetch failed");
                    }
                }
            }
        }

        if attempts > 0 {
            info!(successes, attempts, "orderbook poll cycle complete");
        }
    }
}
