use crate::api::AppState;
use crate::context::AppContext;
use crate::relay::bridge::{Frame, Inbound};
use crate::relay::session::{reject, run_session, ConnectQuery};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let client_address = client_address(
        &headers,
        peer,
        state.ctx.config.server.trust_forwarded_for,
    );
    let ctx = state.ctx;
    ws.on_upgrade(move |socket| handle_socket(socket, ctx, query, client_address))
        .into_response()
}

/// First `X-Forwarded-For` hop when trusted, otherwise the socket peer IP.
pub fn client_address(headers: &HeaderMap, peer: SocketAddr, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(addr) = forwarded {
            return addr.to_string();
        }
    }
    peer.ip().to_string()
}

async fn handle_socket(
    socket: WebSocket,
    ctx: Arc<AppContext>,
    query: ConnectQuery,
    client_address: String,
) {
    info!(client_ip = %client_address, "WebSocket connection accepted");
    let (sink, stream) = socket.split();
    let (tx, rx) = mpsc::channel(ctx.config.relay.outbound_queue_capacity);
    let writer = tokio::spawn(write_frames(sink, rx, client_address.clone()));

    match query.into_params(&ctx.config.relay.default_username) {
        Ok(params) => {
            let inbound = Box::pin(stream.filter_map(|msg| async move { to_inbound(msg) }));
            run_session(ctx, params, client_address, inbound, tx).await;
        }
        Err(e) => {
            reject(&ctx, e, &client_address, &tx).await;
            drop(tx);
        }
    }

    if let Err(e) = writer.await {
        warn!(error = %e, "WebSocket writer task failed");
    }
}

fn to_inbound(msg: Result<Message, axum::Error>) -> Option<Inbound> {
    match msg {
        Ok(Message::Text(text)) => Some(Inbound::Data(text.as_bytes().to_vec())),
        Ok(Message::Binary(data)) => Some(Inbound::Data(data.to_vec())),
        Ok(Message::Close(_)) => Some(Inbound::Closed),
        // Pings are answered by the WebSocket layer
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
        Err(e) => {
            debug!(error = %e, "WebSocket receive failed");
            Some(Inbound::Closed)
        }
    }
}

/// Drain the outbound queue into the socket, then close it. Send failures
/// are logged once and the queue keeps draining so the session never
/// blocks on a dead socket.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
    client_address: String,
) {
    let mut failed = false;
    while let Some(frame) = rx.recv().await {
        if failed {
            continue;
        }
        let msg = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(data) => Message::Binary(data.into()),
        };
        if let Err(e) = sink.send(msg).await {
            warn!(client_ip = %client_address, error = %e, "WebSocket send failed");
            failed = true;
        }
    }
    if !failed {
        let _ = sink.send(Message::Close(None)).await;
    }
    let _ = sink.close().await;
}
