//! Web server for the dashboard.
//!
//! Provides the dashboard view model over HTTP using:
//! - Axum for the HTTP server
//! - SSE (Server-Sent Events) pushing a fresh view on every controller update
//! - A single embedded HTML page; map and chart rendering stay in the browser

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{
        Html, IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

use crate::aggregate::DashboardView;
use crate::client::UsgsClient;
use crate::models::SeismicEvent;
use crate::query::FilterConfig;
use crate::refresh::{DashboardState, RefreshController, RefreshHandle, RefreshStatus};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub base_url: String,
    pub refresh_period: Duration,
    pub filter: FilterConfig,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Controller handle; the only path to the snapshot
    refresh: RefreshHandle,
    /// Client used for per-event detail lookups
    client: UsgsClient,
}

impl AppState {
    #[must_use]
    pub fn new(refresh: RefreshHandle, client: UsgsClient) -> Self {
        Self { refresh, client }
    }
}

/// Body of `/api/dashboard` and of each SSE `dashboard` event.
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub status: RefreshStatus,
    pub config: FilterConfig,
    pub generation: u64,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub view: DashboardView,
}

impl DashboardResponse {
    #[must_use]
    pub fn from_state(state: &DashboardState, now: DateTime<Utc>) -> Self {
        Self {
            status: state.status,
            config: state.config.clone(),
            generation: state.generation,
            last_updated: state.last_updated,
            last_error: state.last_error.clone(),
            view: DashboardView::build(&state.snapshot, now),
        }
    }
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/stream", get(sse_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/events", get(events_handler))
        .route("/api/events/{id}", get(event_detail_handler))
        .route("/api/config", post(set_config_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Start the refresh controller and the web server.
///
/// # Errors
///
/// Returns an error if the client cannot be built or the listener fails.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let client = UsgsClient::with_base_url(&config.base_url)?;
    let (refresh, controller) = RefreshController::spawn(
        Arc::new(client.clone()),
        config.filter.clone(),
        config.refresh_period,
    );

    let app = create_router(AppState::new(refresh.clone(), client));

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("🌍 seismodash starting at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The controller may already be gone if the runtime is tearing down.
    if refresh.shutdown().await.is_ok() {
        controller.await?;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Main page handler - serves the HTML UI.
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Current view model plus controller status.
async fn dashboard_handler(State(state): State<AppState>) -> Json<DashboardResponse> {
    Json(DashboardResponse::from_state(&state.refresh.state(), Utc::now()))
}

/// Raw snapshot events, in feed order.
async fn events_handler(State(state): State<AppState>) -> Json<Vec<SeismicEvent>> {
    Json(state.refresh.state().snapshot.events().to_vec())
}

/// Extended detail for one event; failures stay local to this request.
async fn event_detail_handler(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.client.fetch_detail(&id).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => {
            tracing::warn!("{}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "details unavailable", "id": id })),
            )
                .into_response()
        }
    }
}

/// Replace the filter configuration.
async fn set_config_handler(State(state): State<AppState>, Json(config): Json<FilterConfig>) -> Response {
    if let Err(e) = config.validate() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
    }
    match state.refresh.set_config(config.clone()).await {
        Ok(()) => {
            tracing::info!("filter configuration updated via UI");
            (StatusCode::ACCEPTED, Json(config)).into_response()
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// Fetch again with the current configuration.
async fn refresh_handler(State(state): State<AppState>) -> Response {
    match state.refresh.refresh().await {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// SSE stream: one `dashboard` event per published controller state.
async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, axum::Error>>> {
    let stream = WatchStream::new(state.refresh.subscribe()).map(|dashboard| {
        Event::default()
            .event("dashboard")
            .json_data(DashboardResponse::from_state(&dashboard, Utc::now()))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Health check endpoint.
async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// HTML Template (embedded for single-binary deployment)
// ============================================================================

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>seismodash</title>
    <style>
        :root { --bg: #0f172a; --card: #1e293b; --text: #e2e8f0; --muted: #94a3b8; --accent: #818cf8; }
        body { margin: 0; font-family: system-ui, sans-serif; background: var(--bg); color: var(--text); }
        header { display: flex; justify-content: space-between; align-items: center; padding: 1rem 1.5rem; }
        main { display: grid; grid-template-columns: repeat(auto-fit, minmax(320px, 1fr)); gap: 1rem; padding: 0 1.5rem 1.5rem; }
        section { background: var(--card); border-radius: 12px; padding: 1rem; }
        h2 { font-size: 0.9rem; text-transform: uppercase; color: var(--muted); margin: 0 0 0.75rem; }
        form { display: flex; gap: 0.5rem; flex-wrap: wrap; align-items: center; }
        input, select, button { background: var(--bg); color: var(--text); border: 1px solid #334155; border-radius: 6px; padding: 0.3rem 0.5rem; }
        .status { color: var(--muted); font-size: 0.85rem; }
        .stats { display: grid; grid-template-columns: 1fr 1fr; gap: 0.5rem; }
        .stat b { display: block; font-size: 1.5rem; }
        .row { display: flex; align-items: center; gap: 0.5rem; font-size: 0.8rem; margin: 2px 0; }
        .row span:first-child { width: 6rem; color: var(--muted); }
        .bar { height: 10px; border-radius: 3px; background: var(--accent); }
        .event { display: flex; gap: 0.75rem; padding: 0.4rem 0; border-bottom: 1px solid #334155; cursor: pointer; }
        .mag { font-weight: 700; min-width: 3rem; }
        #detail pre { white-space: pre-wrap; font-size: 0.8rem; }
    </style>
</head>
<body>
    <header>
        <strong>🌍 seismodash</strong>
        <form id="filters">
            <select name="time_range">
                <option value="hour">Past hour</option>
                <option value="day" selected>Past day</option>
                <option value="week">Past week</option>
                <option value="month">Past month</option>
            </select>
            <input name="min_magnitude" type="number" min="0" max="10" step="0.1" placeholder="min M">
            <input name="max_magnitude" type="number" min="0" max="10" step="0.1" placeholder="max M">
            <select name="limit">
                <option>50</option><option selected>100</option><option>250</option><option>500</option>
            </select>
            <button type="submit">Apply</button>
            <button type="button" id="refresh">Refresh</button>
        </form>
        <span class="status" id="status">connecting</span>
    </header>
    <main>
        <section><h2>Summary</h2><div class="stats" id="summary"></div></section>
        <section><h2>Magnitude bands</h2><div id="bands"></div></section>
        <section><h2>Depth</h2><div id="depth"></div></section>
        <section><h2>Magnitude histogram</h2><div id="histogram"></div></section>
        <section><h2>Hourly activity</h2><div id="hourly"></div></section>
        <section><h2>Most recent</h2><div id="recent"></div></section>
        <section id="detail"><h2>Event detail</h2><pre>Select an event</pre></section>
    </main>
    <script>
        const $ = (id) => document.getElementById(id);
        const bars = (rows) => {
            const max = Math.max(1, ...rows.map(r => r[1]));
            return rows.map(([label, n, color]) =>
                `<div class="row"><span>${label}</span><div class="bar" style="width:${(n / max) * 70}%;background:${color || ''}"></div><span>${n}</span></div>`
            ).join('');
        };

        function render(d) {
            const v = d.view, s = v.summary;
            $('status').textContent = `${d.status}` + (d.last_updated ? ` · ${new Date(d.last_updated).toLocaleTimeString()}` : '');
            $('summary').innerHTML = [
                ['Total', s.total], ['Last 24h', s.count_last_24h],
                ['Largest', s.largest_magnitude.toFixed(1)], ['Average', s.average_magnitude.toFixed(2)]
            ].map(([k, n]) => `<div class="stat">${k}<b>${n}</b></div>`).join('');
            const rows = (bands) => bands.map(b => [b.band, b.count, b.color]);
            $('bands').innerHTML = bars(rows(v.magnitude_bands));
            $('depth').innerHTML = bars(rows(v.depth_bands));
            $('histogram').innerHTML = bars(v.magnitude_histogram.filter(b => b.count > 0).map(b => [`${b.x0}–${b.x1}`, b.count]));
            $('hourly').innerHTML = bars(v.hourly_activity.map(b => [`${b.hours_ago}h ago`, b.count]));
            $('recent').innerHTML = v.recent.map(e =>
                `<div class="event" data-id="${e.id}"><span class="mag" style="color:${e.color}">${e.magnitude == null ? '?' : 'M' + e.magnitude.toFixed(1)}</span>` +
                `<span>${e.place || 'Unknown location'}<br><small class="status">${new Date(e.time_ms).toISOString()}</small></span></div>`
            ).join('') || '<p class="status">No events</p>';
        }

        $('recent').addEventListener('click', async (ev) => {
            const row = ev.target.closest('.event');
            if (!row) return;
            const res = await fetch(`/api/events/${encodeURIComponent(row.dataset.id)}`);
            const body = await res.json();
            $('detail').querySelector('pre').textContent = res.ok ? JSON.stringify(body, null, 2) : 'Details unavailable';
        });

        $('filters').addEventListener('submit', async (ev) => {
            ev.preventDefault();
            const f = new FormData(ev.target);
            const num = (k) => f.get(k) === '' ? null : Number(f.get(k));
            const res = await fetch('/api/config', {
                method: 'POST', headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({ time_range: f.get('time_range'), min_magnitude: num('min_magnitude'),
                    max_magnitude: num('max_magnitude'), limit: Number(f.get('limit')) })
            });
            if (!res.ok) $('status').textContent = (await res.json()).error;
        });

        $('refresh').addEventListener('click', () => fetch('/api/refresh', { method: 'POST' }));

        const source = new EventSource('/stream');
        source.addEventListener('dashboard', (ev) => render(JSON.parse(ev.data)));
        source.onerror = () => { $('status').textContent = 'disconnected'; };
    </script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Snapshot;
    use crate::query::FEED_QUERY_PATH;
    use crate::refresh::DEFAULT_REFRESH_PERIOD;
    use axum::extract::Query;
    use std::collections::HashMap;

    const FEED: &str = r#"{"type":"FeatureCollection","features":[
        {"id":"ak0001","geometry":{"coordinates":[-150.1,61.2,35.0]},
         "properties":{"mag":4.2,"place":"Anchorage, Alaska","time":1700000000000}}
    ]}"#;

    /// Upstream feed: one event per query, 404 for every detail lookup and
    /// 503 when asked for magnitude 9 and up.
    async fn spawn_feed() -> String {
        let feed = Router::new().route(
            FEED_QUERY_PATH,
            get(|Query(params): Query<HashMap<String, String>>| async move {
                if params.contains_key("eventid") {
                    (StatusCode::NOT_FOUND, "Error 404: No data found")
                } else if params.get("minmagnitude").map(String::as_str) == Some("9") {
                    (StatusCode::SERVICE_UNAVAILABLE, "Error 503: Service unavailable")
                } else {
                    (StatusCode::OK, FEED)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, feed).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// Serve the router on an ephemeral port against the given feed host.
    async fn spawn_app(feed_url: &str) -> (String, RefreshHandle) {
        let client = UsgsClient::with_base_url(feed_url).unwrap();
        let (refresh, _task) = RefreshController::spawn(
            Arc::new(client.clone()),
            FilterConfig::default(),
            DEFAULT_REFRESH_PERIOD,
        );
        let app = create_router(AppState::new(refresh.clone(), client));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), refresh)
    }

    #[test]
    fn test_dashboard_response_from_state() {
        let state = DashboardState {
            status: RefreshStatus::Ready,
            config: FilterConfig::default(),
            snapshot: Snapshot::empty(),
            generation: 3,
            last_updated: None,
            last_error: None,
            stale_discarded: 0,
        };
        let body = serde_json::to_value(DashboardResponse::from_state(&state, Utc::now())).unwrap();
        assert_eq!(body["status"], "ready");
        assert_eq!(body["generation"], 3);
        assert_eq!(body["config"]["time_range"], "day");
        assert_eq!(body["view"]["summary"]["total"], 0);
    }

    #[tokio::test]
    async fn test_routes() {
        // Port 9 (discard) on localhost is closed, so every fetch fails.
        let (base, refresh) = spawn_app("http://127.0.0.1:9").await;
        let http = reqwest::Client::new();

        let health = http.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.text().await.unwrap(), "OK");

        let index = http.get(format!("{base}/")).send().await.unwrap();
        assert!(index.text().await.unwrap().contains("seismodash"));

        let bad = http
            .post(format!("{base}/api/config"))
            .json(&json!({ "min_magnitude": 12.0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(bad.status(), reqwest::StatusCode::BAD_REQUEST);

        let good = http
            .post(format!("{base}/api/config"))
            .json(&json!({ "time_range": "week", "min_magnitude": 0.0, "limit": 250 }))
            .send()
            .await
            .unwrap();
        assert_eq!(good.status(), reqwest::StatusCode::ACCEPTED);

        let mut rx = refresh.subscribe();
        let state = rx
            .wait_for(|s| s.generation == 1 && s.status == RefreshStatus::Failed)
            .await
            .unwrap()
            .clone();
        assert!(state.snapshot.is_empty());
        assert_eq!(state.config.min_magnitude, Some(0.0));

        let dashboard: serde_json::Value = http
            .get(format!("{base}/api/dashboard"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(dashboard["status"], "failed");
        assert_eq!(dashboard["config"]["limit"], 250);

        let events: serde_json::Value = http
            .get(format!("{base}/api/events"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(events, json!([]));

        let detail = http
            .get(format!("{base}/api/events/us7000abcd"))
            .send()
            .await
            .unwrap();
        assert_eq!(detail.status(), reqwest::StatusCode::BAD_GATEWAY);

        let refreshed = http.post(format!("{base}/api/refresh")).send().await.unwrap();
        assert_eq!(refreshed.status(), reqwest::StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_detail_failure_keeps_snapshot() {
        let feed = spawn_feed().await;
        let (base, refresh) = spawn_app(&feed).await;

        let mut rx = refresh.subscribe();
        let ready = rx
            .wait_for(|s| s.status == RefreshStatus::Ready)
            .await
            .unwrap()
            .clone();
        assert_eq!(ready.snapshot.len(), 1);
        assert_eq!(ready.snapshot.events()[0].id, "ak0001");

        let detail = reqwest::get(format!("{base}/api/events/ak0001")).await.unwrap();
        assert_eq!(detail.status(), reqwest::StatusCode::BAD_GATEWAY);
        let body: serde_json::Value = detail.json().await.unwrap();
        assert_eq!(body["error"], "details unavailable");
        assert_eq!(body["id"], "ak0001");

        let after = refresh.state();
        assert_eq!(after.status, RefreshStatus::Ready);
        assert_eq!(after.generation, ready.generation);
        assert_eq!(after.last_updated, ready.last_updated);
        assert_eq!(after.last_error, None);
        assert!(std::ptr::eq(after.snapshot.events(), ready.snapshot.events()));

        let events: serde_json::Value = reqwest::get(format!("{base}/api/events"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(events[0]["id"], "ak0001");
    }

    #[tokio::test]
    async fn test_upstream_error_status_fails_refresh() {
        let feed = spawn_feed().await;
        let (base, refresh) = spawn_app(&feed).await;

        let mut rx = refresh.subscribe();
        rx.wait_for(|s| s.status == RefreshStatus::Ready).await.unwrap();

        let accepted = reqwest::Client::new()
            .post(format!("{base}/api/config"))
            .json(&json!({ "min_magnitude": 9.0 }))
            .send()
            .await
            .unwrap();
        assert_eq!(accepted.status(), reqwest::StatusCode::ACCEPTED);

        let failed = rx
            .wait_for(|s| s.generation == 1 && s.status == RefreshStatus::Failed)
            .await
            .unwrap()
            .clone();
        assert!(failed.snapshot.is_empty());
        assert!(failed.last_error.as_deref().is_some_and(|e| e.contains("HTTP 503")));
    }
}
