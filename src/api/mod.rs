pub mod stats;
pub mod ws;

use crate::context::AppContext;
use crate::metrics::MetricsRegistry;
use crate::utils::redact_query;
use axum::{
    extract::{DefaultBodyLimit, MatchedPath, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus_client::encoding::text::encode;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
}

/// Start the metrics/health HTTP server with graceful shutdown support.
pub async fn start_metrics_server(
    listen_addr: &str,
    metrics: Arc<MetricsRegistry>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(|| async { "ok" }))
        .route("/livez", get(|| async { "ok" }))
        .with_state(metrics);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    info!(addr = %listen_addr, "Metrics server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;
    Ok(())
}

async fn metrics_handler(State(metrics): State<Arc<MetricsRegistry>>) -> impl IntoResponse {
    let mut buffer = String::new();
    if encode(&mut buffer, &metrics.registry).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response();
    }
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

/// HTTP metrics middleware: records request count and duration per route pattern.
async fn api_metrics_middleware(
    State(state): State<AppState>,
    matched_path: Option<MatchedPath>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> impl IntoResponse {
    let method = req.method().to_string();
    let path = matched_path
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = std::time::Instant::now();

    let response = next.run(req).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    state.ctx.metrics.record_http_request(&method, &path, status);
    state
        .ctx
        .metrics
        .record_http_request_duration(&method, &path, duration);

    response
}

/// Log every request line. Passwords in the query string are masked.
async fn request_log_middleware(
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> impl IntoResponse {
    let uri = req.uri();
    let target = match uri.query() {
        Some(q) => format!("{}?{}", uri.path(), redact_query(q)),
        None => uri.path().to_string(),
    };
    info!(method = %req.method(), uri = %target, "HTTP request");
    next.run(req).await
}

/// Build the relay router: WebSocket endpoint, status page, stats API, probes.
pub fn router(ctx: Arc<AppContext>) -> Router {
    let state = AppState { ctx };
    let ws_path = state.ctx.config.server.ws_path.clone();

    let app = Router::new()
        .route(&ws_path, get(ws::ws_handler))
        .route("/", get(stats::status_page))
        .route("/api/stats", get(stats::stats_handler))
        .route("/livez", get(|| async { "ok" }));

    app.layer(middleware::from_fn_with_state(
        state.clone(),
        api_metrics_middleware,
    ))
    .layer(middleware::from_fn(request_log_middleware))
    .layer(DefaultBodyLimit::max(64 * 1024))
    .with_state(state)
}

/// Start the relay HTTP server on a pre-bound listener (avoids TOCTOU port races in tests).
pub async fn start_server_on_listener(
    listener: tokio::net::TcpListener,
    ctx: Arc<AppContext>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let app = router(ctx);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.cancelled_owned())
    .await?;
    Ok(())
}
