//! `/api/v1` handlers and the background tasks that feed the server-owned
//! signal and alert windows.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::Stream;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

use crate::alerts::{Alert, AlertEngine, ALERT_CHECK_INTERVAL};
use crate::categories::categorize_market;
use crate::scanner::{MarketOpportunity, NoArbDetector, NoArbViolation, Scanner};
use crate::signals::{Signal, SignalBus};
use crate::state::{Market, MarketStatus, Orderbook, StateEngine};

use super::Ring;

/// Rolling windows held by the server itself.
const SIGNAL_WINDOW: usize = 1000;
const ALERT_WINDOW: usize = 1000;
const STREAM_POLL_INTERVAL: Duration = Duration::from_secs(1);
const DEBUG_TRADE_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<StateEngine>,
    pub signals: Arc<RwLock<Ring<Signal>>>,
    pub alerts: Arc<RwLock<Ring<Alert>>>,
    pub signal_bus: Arc<SignalBus>,
}

impl ApiState {
    pub fn new(engine: Arc<StateEngine>, signal_bus: Arc<SignalBus>) -> Self {
        Self {
            engine,
            signals: Arc::new(RwLock::new(Ring::new(SIGNAL_WINDOW))),
            alerts: Arc::new(RwLock::new(Ring::new(ALERT_WINDOW))),
            signal_bus,
        }
    }
}

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(get_health))
        .route("/api/v1/markets", get(get_markets))
        .route("/api/v1/markets/:ticker", get(get_market))
        .route("/api/v1/markets/:ticker/orderbook", get(get_orderbook))
        .route("/api/v1/markets/:ticker/debug", get(get_market_debug))
        .route("/api/v1/categories", get(get_categories))
        .route("/api/v1/scanner/opportunities", get(get_opportunities))
        .route("/api/v1/scanner/noarb", get(get_noarb))
        .route("/api/v1/signals", get(get_signals))
        .route("/api/v1/alerts", get(get_alerts))
        .route("/api/v1/stream/signals", get(stream_signals))
        .with_state(state)
}

/// Drains the processor channel into the server's signal ring.
pub async fn run_signal_collector(
    signals: Arc<RwLock<Ring<Signal>>>,
    mut rx: mpsc::Receiver<Signal>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            signal = rx.recv() => {
                let Some(signal) = signal else { return };
                signals.write().push(signal);
            }
        }
    }
}

/// Runs the alert engine on its fixed tick and appends into the alert ring.
pub async fn run_alert_engine(
    engine: Arc<StateEngine>,
    alerts: Arc<RwLock<Ring<Alert>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut alert_engine = AlertEngine::new(engine);
    let mut ticker = tokio::time::interval(ALERT_CHECK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                let new_alerts = alert_engine.check_alerts();
                if !new_alerts.is_empty() {
                    let mut ring = alerts.write();
                    for alert in new_alerts {
                        ring.push(alert);
                    }
                }
            }
        }
    }
}

// ===== Route handlers =====

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: DateTime<Utc>,
    markets: usize,
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        markets: state.engine.all_markets().len(),
    })
}

#[derive(Serialize)]
struct MarketsResponse {
    markets: Vec<Market>,
    count: usize,
}

async fn get_markets(State(state): State<ApiState>) -> Json<MarketsResponse> {
    let markets = state.engine.all_markets();
    Json(MarketsResponse {
        count: markets.len(),
        markets,
    })
}

async fn get_market(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Json<Market>, ApiError> {
    state
        .engine
        .market(&ticker)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("market {ticker} not found")))
}

async fn get_orderbook(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Json<Orderbook>, ApiError> {
    // A registered market always has a book (empty until the first update);
    // only a truly unknown ticker is a 404.
    state
        .engine
        .orderbook(&ticker)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("orderbook for {ticker} not found")))
}

#[derive(Serialize)]
struct MarketDebugResponse {
    market_ticker: String,
    market_status: &'static str,
    has_orderbook: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    orderbook_timestamp: Option<DateTime<Utc>>,
    bid_levels: usize,
    ask_levels: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_bid: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    best_ask: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spread: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    microprice: Option<f64>,
    trade_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_trade_timestamp: Option<DateTime<Utc>>,
    signal_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_signal_timestamp: Option<DateTime<Utc>>,
    // Instrumentation: load shedding and invariant anomalies since startup.
    dropped_signals: u64,
    crossed_books: u64,
}

async fn get_market_debug(
    State(state): State<ApiState>,
    Path(ticker): Path<String>,
) -> Result<Json<MarketDebugResponse>, ApiError> {
    let market = state
        .engine
        .market(&ticker)
        .ok_or_else(|| ApiError::NotFound(format!("market {ticker} not found")))?;

    let orderbook = state.engine.orderbook(&ticker);
    let trades = state.engine.recent_trades(&ticker, DEBUG_TRADE_WINDOW);
    let time_series = state.engine.time_series();

    let mut debug = MarketDebugResponse {
        market_ticker: ticker.clone(),
        market_status: market.status.as_str(),
        has_orderbook: orderbook.is_some(),
        orderbook_timestamp: None,
        bid_levels: 0,
        ask_levels: 0,
        best_bid: None,
        best_ask: None,
        spread: None,
        microprice: None,
        trade_count: trades.len(),
        last_trade_timestamp: trades.last().map(|t| t.timestamp),
        signal_count: time_series.signal_count(&ticker),
        last_signal_timestamp: time_series.last_signal_at(&ticker),
        dropped_signals: state.signal_bus.dropped_count(),
        crossed_books: state.engine.crossed_book_count(),
    };

    if let Some(book) = orderbook {
        debug.orderbook_timestamp = Some(book.last_update);
        debug.bid_levels = book.bids.len();
        debug.ask_levels = book.asks.len();
        debug.best_bid = book.bids.first().map(|l| l.price);
        debug.best_ask = book.asks.first().map(|l| l.price);
        debug.spread = book.spread();
        debug.microprice = book.microprice();
    }

    Ok(Json(debug))
}

#[derive(Serialize)]
struct CategoryEvent {
    event_ticker: String,
    markets: Vec<Market>,
    count: usize,
}

#[derive(Serialize)]
struct CategoryGroup {
    category: String,
    event_tickers: Vec<String>,
    total_markets: usize,
    events: HashMap<String, CategoryEvent>,
}

#[derive(Serialize)]
struct CategoriesResponse {
    categories: Vec<CategoryGroup>,
    count: usize,
    timestamp: DateTime<Utc>,
}

async fn get_categories(State(state): State<ApiState>) -> Json<CategoriesResponse> {
    let mut grouped: HashMap<&'static str, HashMap<String, Vec<Market>>> = HashMap::new();

    for market in state.engine.all_markets() {
        if market.status != MarketStatus::Active {
            continue;
        }
        let category = categorize_market(&market.title, &market.ticker);
        let event = if market.event_ticker.is_empty() {
            "General".to_string()
        } else {
            market.event_ticker.clone()
        };
        grouped
            .entry(category)
            .or_default()
            .entry(event)
            .or_default()
            .push(market);
    }

    let categories: Vec<CategoryGroup> = grouped
        .into_iter()
        .map(|(category, events)| {
            let mut total_markets = 0;
            let mut event_tickers = Vec::with_capacity(events.len());
            let events: HashMap<String, CategoryEvent> = events
                .into_iter()
                .map(|(event_ticker, markets)| {
                    total_markets += markets.len();
                    event_tickers.push(event_ticker.clone());
                    let event = CategoryEvent {
                        event_ticker: event_ticker.clone(),
                        count: markets.len(),
                        markets,
                    };
                    (event_ticker, event)
                })
                .collect();

            CategoryGroup {
                category: category.to_string(),
                event_tickers,
                total_markets,
                events,
            }
        })
        .collect();

    Json(CategoriesResponse {
        count: categories.len(),
        categories,
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
struct OpportunitiesResponse {
    opportunities: Vec<MarketOpportunity>,
    count: usize,
    timestamp: DateTime<Utc>,
}

async fn get_opportunities(State(state): State<ApiState>) -> Json<OpportunitiesResponse> {
    let opportunities = Scanner::new(state.engine.clone()).scan_markets();
    Json(OpportunitiesResponse {
        count: opportunities.len(),
        opportunities,
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
struct NoArbResponse {
    violations: Vec<NoArbViolation>,
    count: usize,
    timestamp: DateTime<Utc>,
}

async fn get_noarb(State(state): State<ApiState>) -> Json<NoArbResponse> {
    let violations = NoArbDetector::new(state.engine.clone()).check_violations();
    Json(NoArbResponse {
        count: violations.len(),
        violations,
        timestamp: Utc::now(),
    })
}

#[derive(Deserialize)]
struct WindowQuery {
    market_ticker: Option<String>,
    #[serde(rename = "type")]
    type_filter: Option<String>,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct SignalsResponse {
    signals: Vec<Signal>,
    count: usize,
}

async fn get_signals(
    State(state): State<ApiState>,
    Query(params): Query<WindowQuery>,
) -> Json<SignalsResponse> {
    let snapshot = state.signals.read().to_vec();
    let signals = filter_window(
        snapshot,
        params.market_ticker.as_deref(),
        params.type_filter.as_deref(),
        params.limit,
        |s| (&s.market_ticker, s.signal_type.as_str()),
    );
    Json(SignalsResponse {
        count: signals.len(),
        signals,
    })
}

#[derive(Serialize)]
struct AlertsResponse {
    alerts: Vec<Alert>,
    count: usize,
    timestamp: DateTime<Utc>,
}

async fn get_alerts(
    State(state): State<ApiState>,
    Query(params): Query<WindowQuery>,
) -> Json<AlertsResponse> {
    let snapshot = state.alerts.read().to_vec();
    let alerts = filter_window(
        snapshot,
        params.market_ticker.as_deref(),
        params.type_filter.as_deref(),
        params.limit,
        |a| (&a.market_ticker, a.alert_type.as_str()),
    );
    Json(AlertsResponse {
        count: alerts.len(),
        alerts,
        timestamp: Utc::now(),
    })
}

/// Ticker/type filters, then the most recent `limit` entries.
fn filter_window<T, F>(
    items: Vec<T>,
    market_ticker: Option<&str>,
    type_filter: Option<&str>,
    limit: Option<usize>,
    key: F,
) -> Vec<T>
where
    F: Fn(&T) -> (&String, &str),
{
    let mut filtered: Vec<T> = items
        .into_iter()
        .filter(|item| {
            let (ticker, item_type) = key(item);
            market_ticker.map_or(true, |m| ticker == m)
                && type_filter.map_or(true, |t| item_type == t)
        })
        .collect();

    if let Some(limit) = limit {
        if limit < filtered.len() {
            filtered.drain(..filtered.len() - limit);
        }
    }
    filtered
}

/// Server-push text stream of new signals, polled from the ring at 1 Hz.
async fn stream_signals(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    struct StreamState {
        signals: Arc<RwLock<Ring<Signal>>>,
        seen: u64,
        interval: tokio::time::Interval,
        pending: VecDeque<Event>,
    }

    let seen = state.signals.read().total();
    let mut interval = tokio::time::interval(STREAM_POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut pending = VecDeque::new();
    pending.push_back(Event::default().data(r#"{"type":"connected"}"#));

    let stream = futures_util::stream::unfold(
        StreamState {
            signals: state.signals.clone(),
            seen,
            interval,
            pending,
        },
        |mut st| async move {
            loop {
                if let Some(event) = st.pending.pop_front() {
                    return Some((Ok(event), st));
                }

                st.interval.tick().await;

                {
                    let ring = st.signals.read();
                    let total = ring.total();
                    if total > st.seen {
                        let fresh = (total - st.seen) as usize;
                        for signal in ring.last_n(fresh) {
                            let data = serde_json::to_string(&signal).unwrap_or_default();
                            st.pending.push_back(Event::default().data(data));
                        }
                        st.seen = total;
                    }
                }
            }
        },
    );

    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ===== Error handling =====

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{SignalMetadata, SignalType};

    fn state() -> ApiState {
        ApiState::new(Arc::new(StateEngine::new()), Arc::new(SignalBus::new()))
    }

    fn market(ticker: &str, title: &str) -> Market {
        Market {
            ticker: ticker.to_string(),
            title: title.to_string(),
            category: "Politics".to_string(),
            status: MarketStatus::Active,
            expiration_time: None,
            event_ticker: "EVT".to_string(),
            yes_sub_title: None,
            no_sub_title: None,
        }
    }

    fn signal(ticker: &str, signal_type: SignalType) -> Signal {
        Signal {
            market_ticker: ticker.to_string(),
            signal_type,
            value: 1.0,
            timestamp: Utc::now(),
            metadata: SignalMetadata::default(),
            payload: None,
        }
    }

    #[tokio::test]
    async fn health_reports_market_count() {
        let state = state();
        state.engine.register_market(market("A", "a"));
        let Json(resp) = get_health(State(state)).await;
        assert_eq!(resp.status, "healthy");
        assert_eq!(resp.markets, 1);
    }

    #[tokio::test]
    async fn unknown_market_is_404_but_registered_empty_book_is_not() {
        let state = state();
        state.engine.register_market(market("A", "a"));

        assert!(get_market(State(state.clone()), Path("NOPE".to_string()))
            .await
            .is_err());

        // Registered but never updated: empty default book, not a 404.
        let Json(book) = get_orderbook(State(state.clone()), Path("A".to_string()))
            .await
            .unwrap();
        assert!(book.bids.is_empty() && book.asks.is_empty());

        assert!(get_orderbook(State(state), Path("NOPE".to_string()))
            .await
            .is_err());
    }

    #[test]
    fn window_filters_by_ticker_type_and_limit() {
        let items = vec![
            signal("A", SignalType::OrderbookImbalance),
            signal("B", SignalType::VolumeSurge),
            signal("A", SignalType::VolumeSurge),
            signal("A", SignalType::VolumeSurge),
        ];

        fn key(s: &Signal) -> (&String, &str) {
            (&s.market_ticker, s.signal_type.as_str())
        }

        let by_ticker = filter_window(items.clone(), Some("A"), None, None, key);
        assert_eq!(by_ticker.len(), 3);

        let by_type = filter_window(items.clone(), None, Some("volume_surge"), None, key);
        assert_eq!(by_type.len(), 3);

        let limited = filter_window(items, Some("A"), Some("volume_surge"), Some(1), key);
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn signals_endpoint_reads_the_ring() {
        let state = state();
        state.signals.write().push(signal("A", SignalType::VolumeSurge));
        state.signals.write().push(signal("B", SignalType::VolumeSurge));

        let Json(resp) = get_signals(
            State(state),
            Query(WindowQuery {
                market_ticker: Some("A".to_string()),
                type_filter: None,
                limit: None,
            }),
        )
        .await;

        assert_eq!(resp.count, 1);
        assert_eq!(resp.signals[0].market_ticker, "A");
    }

    #[tokio::test]
    async fn debug_includes_overflow_and_anomaly_counters() {
        let state = state();
        state.engine.register_market(market("A", "a"));

        let Json(debug) = get_market_debug(State(state), Path("A".to_string()))
            .await
            .unwrap();
        assert!(debug.has_orderbook);
        assert_eq!(debug.bid_levels, 0);
        assert_eq!(debug.dropped_signals, 0);
        assert_eq!(debug.crossed_books, 0);
    }

    #[tokio::test]
    async fn categories_group_active_markets() {
        let state = state();
        state
            .engine
            .register_market(market("KXSEN", "Senate race winner"));
        state
            .engine
            .register_market(market("KXFED", "Will Jerome Powell cut rates?"));

        let Json(resp) = get_categories(State(state)).await;
        assert_eq!(resp.count, 2);
        let labels: Vec<&str> = resp.categories.iter().map(|c| c.category.as_str()).collect();
        assert!(labels.contains(&"Elections - Senate"));
        assert!(labels.contains(&"Economics - Federal Reserve"));
    }
}
