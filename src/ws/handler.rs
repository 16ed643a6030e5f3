//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::SessionId;
use crate::server::{Outbound, ServerHandle, SESSION_QUEUE};
use crate::util::rate_limit::SessionRateLimiter;
use crate::wire::InputFrame;
use crate::ws::protocol::ClientMsg;

/// WebSocket upgrade handler. Every connection gets a fresh session id.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let session = Uuid::new_v4();
    debug!(session_id = %session, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, session, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, session: SessionId, state: AppState) {
    info!(session_id = %session, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (out_tx, out_rx) = mpsc::channel(SESSION_QUEUE);

    if let Err(e) = state.server.connect(session, out_tx).await {
        error!(session_id = %session, error = %e, "Failed to register session");
        return;
    }

    let limiter = SessionRateLimiter::new(
        state.config.input_rate_limit,
        state.config.command_rate_limit,
    );
    run_session(session, ws_sink, ws_stream, out_rx, &state.server, &limiter).await;

    // Cleanup on disconnect
    if state.server.disconnect(session).await.is_err() {
        debug!(session_id = %session, "Server gone before disconnect");
    }

    info!(session_id = %session, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session: SessionId,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut out_rx: mpsc::Receiver<Outbound>,
    server: &ServerHandle,
    limiter: &SessionRateLimiter,
) {
    // Spawn writer task: server frames -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            let message = match frame {
                Outbound::Text(text) => Message::Text(text),
                Outbound::Binary(bytes) => Message::Binary(bytes.to_vec()),
            };
            if let Err(e) = ws_sink.send(message).await {
                debug!(session_id = %session, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> game server
    while let Some(result) = ws_stream.next().await {
        let forwarded = match result {
            Ok(Message::Text(text)) => {
                if !limiter.check_command() {
                    warn!(session_id = %session, "Rate limited command");
                    continue;
                }
                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => server.client(session, msg).await,
                    Err(e) => {
                        warn!(session_id = %session, error = %e, "Failed to parse client message");
                        continue;
                    }
                }
            }
            Ok(Message::Binary(data)) => {
                if !limiter.check_input() {
                    warn!(session_id = %session, "Rate limited input frame");
                    continue;
                }
                match InputFrame::decode(data.as_slice()) {
                    Ok(frame) => server.input(session, frame).await,
                    Err(e) => {
                        warn!(session_id = %session, error = %e, len = data.len(), "Malformed input frame");
                        continue;
                    }
                }
            }
            Ok(Message::Ping(_)) => {
                debug!(session_id = %session, "Received ping");
                continue;
            }
            Ok(Message::Pong(_)) => {
                debug!(session_id = %session, "Received pong");
                continue;
            }
            Ok(Message::Close(_)) => {
                info!(session_id = %session, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session, error = %e, "WebSocket error");
                break;
            }
        };

        if forwarded.is_err() {
            debug!(session_id = %session, "Game server channel closed");
            break;
        }
    }

    // Abort writer task
    writer_handle.abort();
}
