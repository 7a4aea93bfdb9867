//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::{DisconnectReason, Outbound, WorldEvent, WorldHandle};
use crate::util::rate_limit::SessionRateLimiter;
use crate::ws::protocol::{ClientMsg, SessionId};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = state.world.allocate_session_id();
    info!(session_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let connected = WorldEvent::Connected {
        session_id,
        outbound: outbound_tx,
    };
    if state.world.send(connected).await.is_err() {
        error!(session_id, "World loop is gone, dropping connection");
        return;
    }

    let limiter = SessionRateLimiter::new(state.config.inbound_rate_limit);
    let mut writer = tokio::spawn(run_writer(session_id, ws_sink, outbound_rx));

    // Whichever side finishes first ends the session: the reader on close or
    // error, the writer when the world asks for a close or the socket breaks.
    let reason = tokio::select! {
        reason = run_reader(session_id, ws_stream, &state.world, &limiter) => reason,
        _ = &mut writer => DisconnectReason::Closed,
    };
    writer.abort();

    let _ = state
        .world
        .send(WorldEvent::Disconnected { session_id, reason })
        .await;

    info!(session_id, "WebSocket connection closed");
}

/// Reader loop: WebSocket -> world
async fn run_reader(
    session_id: SessionId,
    mut ws_stream: SplitStream<WebSocket>,
    world: &WorldHandle,
    limiter: &SessionRateLimiter,
) -> DisconnectReason {
    while let Some(result) = ws_stream.next().await {
        let event = match result {
            Ok(Message::Text(text)) => {
                if !limiter.check_inbound() {
                    warn!(session_id, "Rate limited inbound message");
                    WorldEvent::Activity { session_id }
                } else {
                    match ClientMsg::decode(&text) {
                        Ok(msg) => WorldEvent::Message { session_id, msg },
                        Err(e) => {
                            warn!(session_id, error = %e, "Failed to parse client message");
                            WorldEvent::Activity { session_id }
                        }
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id, "Received binary message, ignoring");
                WorldEvent::Activity { session_id }
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!(session_id, "Received keepalive frame");
                WorldEvent::Activity { session_id }
            }
            Ok(Message::Close(_)) => {
                info!(session_id, "Client initiated close");
                return DisconnectReason::Closed;
            }
            Err(e) => {
                error!(session_id, error = %e, "WebSocket error");
                return DisconnectReason::TransportError(e.to_string());
            }
        };

        if world.send(event).await.is_err() {
            debug!(session_id, "World channel closed");
            return DisconnectReason::Closed;
        }
    }

    DisconnectReason::Closed
}

/// Writer loop: world -> WebSocket
async fn run_writer(
    session_id: SessionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        let result = match frame {
            Outbound::Text(text) => ws_sink.send(Message::Text(text.to_string())).await,
            Outbound::Ping => ws_sink.send(Message::Ping(Vec::new())).await,
            Outbound::Close => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        };

        if let Err(e) = result {
            debug!(session_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}
