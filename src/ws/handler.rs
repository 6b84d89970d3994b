//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{MatchCommand, MatchHandle, PlayerInput};
use crate::http::middleware::verify_jwt;
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Query parameters for WebSocket connection
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// JWT token for authentication
    pub token: String,
    /// Match created through `POST /matches`
    pub match_id: Uuid,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let claims = match verify_jwt(&query.token, &state.config.supabase_jwt_secret) {
        Ok(claims) => claims,
        Err(e) => {
            error!(error = %e, "WebSocket auth failed");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    let Some(handle) = state.match_registry.get(&query.match_id) else {
        warn!(match_id = %query.match_id, "WebSocket for unknown match");
        return (StatusCode::NOT_FOUND, "Match not found").into_response();
    };

    if handle.owner_id != claims.sub {
        warn!(
            match_id = %query.match_id,
            user_id = %claims.sub,
            "WebSocket for a match owned by someone else"
        );
        return (StatusCode::FORBIDDEN, "Not your match").into_response();
    }

    info!(user_id = %claims.sub, match_id = %handle.id, "WebSocket upgrade for match owner");
    ws.on_upgrade(move |socket| handle_socket(socket, claims.sub, handle))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: Uuid, handle: MatchHandle) {
    info!(user_id = %user_id, match_id = %handle.id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let welcome = ServerMsg::Welcome {
        user_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(user_id = %user_id, error = %e, "Failed to send welcome");
        return;
    }

    // Subscribe before attaching so the arena message is not missed
    let match_rx = handle.msg_tx.subscribe();
    let attach = PlayerInput {
        user_id,
        command: MatchCommand::Attach,
    };
    if handle.input_tx.send(attach).await.is_err() {
        warn!(user_id = %user_id, match_id = %handle.id, "Match ended before attach");
        let _ = send_msg(
            &mut ws_sink,
            &ServerMsg::Error {
                code: "match_closed".to_string(),
                message: "Match is no longer running".to_string(),
            },
        )
        .await;
        return;
    }

    run_session(user_id, ws_sink, ws_stream, handle.input_tx, match_rx).await;

    info!(user_id = %user_id, match_id = %handle.id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    user_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    input_tx: mpsc::Sender<PlayerInput>,
    mut match_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = SessionRateLimiter::new();

    // Writer task: match broadcast -> WebSocket. Ends after the summary.
    let writer_user_id = user_id;
    let writer_handle = tokio::spawn(async move {
        loop {
            match match_rx.recv().await {
                Ok(msg) => {
                    let is_end = matches!(msg, ServerMsg::MatchEnd { .. });
                    if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                        debug!(user_id = %writer_user_id, error = %e, "WebSocket send failed");
                        break;
                    }
                    if is_end {
                        let _ = ws_sink.send(Message::Close(None)).await;
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        user_id = %writer_user_id,
                        lagged_count = n,
                        "Client lagged, skipping {} messages", n
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(user_id = %writer_user_id, "Match channel closed");
                    break;
                }
            }
        }
    });

    // Reader loop: WebSocket -> match task
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(user_id = %user_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        let leaving = matches!(client_msg, ClientMsg::Leave);
                        let input = PlayerInput {
                            user_id,
                            command: MatchCommand::Client(client_msg),
                        };

                        if input_tx.send(input).await.is_err() {
                            debug!(user_id = %user_id, "Input channel closed");
                            break;
                        }
                        if leaving {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(user_id = %user_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(user_id = %user_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(user_id = %user_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // A dropped connection abandons the match
    let _ = input_tx
        .send(PlayerInput {
            user_id,
            command: MatchCommand::Client(ClientMsg::Leave),
        })
        .await;

    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
