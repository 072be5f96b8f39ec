use crate::api::AppState;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Query, State},
    http::{HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::net::SocketAddr;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub active_connections: usize,
    pub connections: Vec<ConnectionStats>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub id: String,
    pub host: String,
    pub username: String,
    pub established: bool,
    pub connected_at: String,
    pub connection_duration: u64,
}

pub async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let connections: Vec<ConnectionStats> = state
        .ctx
        .registry
        .snapshot()
        .into_iter()
        .map(|s| ConnectionStats {
            id: s.id,
            host: s.host,
            username: s.username,
            established: s.established,
            connected_at: s.connected_at.to_rfc3339(),
            connection_duration: s.connection_duration,
        })
        .collect();
    Json(StatsResponse {
        active_connections: connections.len(),
        connections,
    })
}

/// `GET /`: an upgrade request is relayed like one on the WebSocket path.
/// Anything else gets the status page, or 404 when `server.status_page`
/// is off.
pub async fn status_page(
    upgrade: Result<WebSocketUpgrade, axum::extract::ws::rejection::WebSocketUpgradeRejection>,
    state: State<AppState>,
    peer: ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Query<crate::relay::session::ConnectQuery>,
) -> Response {
    if let Ok(ws) = upgrade {
        return super::ws::ws_handler(ws, state, peer, headers, query).await;
    }
    if !state.ctx.config.server.status_page {
        return StatusCode::NOT_FOUND.into_response();
    }

    let active = state.ctx.registry.len();
    let body = format!(
        "<!DOCTYPE html>\n<html>\n  <head><title>WebSocket SSH relay</title></head>\n  <body>\n    <h1>WebSocket SSH relay</h1>\n    <p>Server is running. Active connections: {}</p>\n    <p>Version {}</p>\n  </body>\n</html>\n",
        active,
        env!("CARGO_PKG_VERSION")
    );
    (StatusCode::OK, Html(body)).into_response()
}
