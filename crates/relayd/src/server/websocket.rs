//! WebSocket upgrade and per-connection pumps.
//!
//! Each upgraded socket is split in two. The write pump drains the
//! connection's outbound queue and keeps the peer alive with pings; the read
//! pump enforces the idle deadline and discards inbound content. When the read
//! side ends the connection is unregistered, which closes the queue and lets
//! the write pump send a Close frame and exit.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Socket errors end the pumps; they never propagate

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_core::{ConnectionId, SessionId, UserId};
use relay_protocol::ErrorResponse;

use super::{AppState, ServerConfig};
use crate::hub::Outbound;

/// Query parameters of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConnectParams {
    user_id: Option<String>,
    session_id: Option<String>,
}

/// `GET /ws?userId=..&sessionId=..`
///
/// The user id is checked before the upgrade so a missing one is answered
/// with a plain 400.
pub(crate) async fn ws_handler(
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user_id = match UserId::parse(params.user_id.unwrap_or_default()) {
        Ok(user_id) => user_id,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string())))
                .into_response();
        }
    };
    let session_id = SessionId::from_optional(params.session_id.as_deref());

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let max_size = state.config.max_message_size;
    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| serve_socket(socket, state, user_id, session_id))
}

/// Registers the connection and runs both pumps until the peer goes away.
async fn serve_socket(
    socket: WebSocket,
    state: AppState,
    user_id: UserId,
    session_id: Option<SessionId>,
) {
    let (connection, queue) = match state.hub.connect(user_id, session_id).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, "Rejecting WebSocket connection");
            return;
        }
    };

    info!(
        connection_id = %connection.id(),
        user_id = %connection.user_id(),
        session_id = connection.session_id().map(SessionId::as_str).unwrap_or(""),
        "WebSocket connection established"
    );

    let (sink, stream) = socket.split();
    let writer_done = CancellationToken::new();

    let writer = tokio::spawn(write_pump(
        sink,
        queue,
        Arc::clone(&state.config),
        writer_done.clone(),
        connection.id(),
    ));

    let reason = read_pump(stream, state.config.read_timeout, &writer_done).await;
    debug!(connection_id = %connection.id(), reason, "Read pump finished");

    match state.hub.unregister(Arc::clone(&connection)).await {
        Ok(_) => {}
        // The shutdown sweep closes the queue instead.
        Err(e) => debug!(connection_id = %connection.id(), error = %e, "Unregister skipped"),
    }

    if let Err(e) = writer.await {
        warn!(connection_id = %connection.id(), error = %e, "Write pump task failed");
    }

    info!(connection_id = %connection.id(), "WebSocket connection closed");
}

/// Drains the outbound queue onto the socket.
///
/// Exits on queue closure (after a Close frame), on a failed or late write,
/// and cancels `done` on the way out.
async fn write_pump(
    mut sink: SplitSink<WebSocket, WsMessage>,
    mut queue: mpsc::Receiver<Outbound>,
    config: Arc<ServerConfig>,
    done: CancellationToken,
    connection_id: ConnectionId,
) {
    let period = config.ping_interval();
    let now = Instant::now();
    let mut ping = interval_at(now.checked_add(period).unwrap_or(now), period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            item = queue.recv() => match item {
                Some(message) => {
                    let text = match serde_json::to_string(message.as_ref()) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(%connection_id, error = %e, "Failed to encode message");
                            continue;
                        }
                    };
                    if !send_within(&mut sink, WsMessage::Text(text.into()), config.write_timeout).await {
                        debug!(%connection_id, "Write failed");
                        break;
                    }
                }
                None => {
                    let _ = send_within(&mut sink, WsMessage::Close(None), config.write_timeout).await;
                    break;
                }
            },

            _ = ping.tick() => {
                if !send_within(&mut sink, WsMessage::Ping(Bytes::new()), config.write_timeout).await {
                    debug!(%connection_id, "Ping failed");
                    break;
                }
            }
        }
    }

    done.cancel();
}

async fn send_within(
    sink: &mut SplitSink<WebSocket, WsMessage>,
    frame: WsMessage,
    deadline: Duration,
) -> bool {
    matches!(timeout(deadline, sink.send(frame)).await, Ok(Ok(())))
}

/// Reads until the peer closes, errors, idles past `read_timeout`, or the
/// write side gives up. Inbound text is discarded.
async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    read_timeout: Duration,
    writer_done: &CancellationToken,
) -> &'static str {
    loop {
        let frame = tokio::select! {
            _ = writer_done.cancelled() => return "write side closed",
            frame = timeout(read_timeout, stream.next()) => frame,
        };

        match frame {
            Err(_) => return "read deadline exceeded",
            Ok(None) => return "stream ended",
            Ok(Some(Err(_))) => return "read error",
            Ok(Some(Ok(WsMessage::Close(_)))) => return "peer closed",
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                debug!(len = text.len(), "Ignoring inbound text frame");
            }
            // Pong and other frames only refresh the deadline.
            Ok(Some(Ok(_))) => {}
        }
    }
}
