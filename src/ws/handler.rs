use axum::{
    extract::{
        ws::{close_code, rejection::WebSocketUpgradeRejection, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::StoreError;
use crate::models::{decode_client_message, CollabMessage, ErrorResponse};
use crate::services::auth_service::{authenticate, get_auth_token_from, AuthUser};
use crate::ws::ParticipantHandle;
use crate::AppState;

/// WebSocket handler for `/ws/diagrams/:diagram_id`
pub async fn websocket_handler(
    State(state): State<AppState>,
    Path(diagram_id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    // Plain HTTP requests are answered with 400/426, never routed further
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!("Rejected non-upgrade request for diagram {}: {}", diagram_id, rejection.body_text());
            return ErrorResponse::build(rejection.status(), "invalid_input", rejection.body_text()).into_response();
        }
    };

    let diagram_uuid = match Uuid::parse_str(&diagram_id) {
        Ok(uuid) => uuid,
        Err(e) => {
            error!("Invalid diagram UUID '{}': {}", diagram_id, e);
            return ErrorResponse::bad_request(format!("Invalid diagram UUID '{}'", diagram_id)).into_response();
        }
    };

    let Some(secret) = state.config.auth_jwt_secret.as_deref() else {
        error!("Auth JWT secret not configured");
        return ErrorResponse::server_error("Authentication is not configured").into_response();
    };
    let user = match get_auth_token_from(&headers, &uri).and_then(|token| authenticate(&token, secret)) {
        Ok(user) => user,
        Err(e) => {
            warn!("Unauthenticated connection attempt for diagram {}: {}", diagram_uuid, e);
            return ErrorResponse::unauthorized(e).into_response();
        }
    };

    match state.store.get_diagram(&diagram_uuid).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            return ErrorResponse::not_found(format!("Diagram {} not found", diagram_uuid)).into_response();
        }
        Err(e) => {
            error!("Failed to load diagram {}: {}", diagram_uuid, e);
            return ErrorResponse::server_error(format!("Failed to load diagram {}", diagram_uuid)).into_response();
        }
    }

    info!("New WebSocket connection attempt by {} for diagram {}", user.user_id, diagram_uuid);
    let max_size = state.config.ws_max_message_size;
    ws.max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| handle_socket(socket, diagram_uuid, user, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, diagram_id: Uuid, user: AuthUser, state: AppState) {
    let (handle, mut outbound) = ParticipantHandle::new(&user.user_id, state.hub.settings().outbound_queue_size);
    let connection_id = handle.connection_id;

    // Split the socket into sender and receiver
    let (mut sender, mut receiver) = socket.split();

    let session = match state.hub.join(&diagram_id, handle) {
        Ok(session) => session,
        Err(e) => {
            warn!("{} could not join diagram {}: {}", user.user_id, diagram_id, e);
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    info!(
        "WebSocket connection {} established for {} on diagram {} (session {})",
        connection_id,
        user.user_id,
        diagram_id,
        session.id()
    );

    // Outbound: drain this connection's queue in order and ping on a timer.
    // The queue closes when the relay drops the connection or the session ends.
    let ping_interval = state.config.ws_ping_interval();
    let mut write_task = tokio::spawn(async move {
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + ping_interval, ping_interval);
        loop {
            let msg = tokio::select! {
                msg = outbound.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                _ = ping.tick() => {
                    if let Err(e) = sender.send(Message::Ping(Vec::new())).await {
                        debug!("Ping to connection {} failed: {}", connection_id, e);
                        return;
                    }
                    continue;
                }
            };

            let text = match serde_json::to_string(msg.as_ref()) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize message for connection {}: {}", connection_id, e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(text)).await {
                debug!("Write to connection {} failed: {}", connection_id, e);
                return;
            }
        }
        let _ = sender.close().await;
    });

    // Inbound: decode, validate, persist and hand every operation to the relay.
    // Any frame, pongs included, resets the read deadline.
    let read_timeout = state.config.ws_read_timeout();
    let reader_session = session.clone();
    let store = state.store.clone();
    let user_id = user.user_id.clone();
    let mut read_task = tokio::spawn(async move {
        loop {
            let frame = match tokio::time::timeout(read_timeout, receiver.next()).await {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Connection {} of {} on diagram {} silent for {:?}, dropping it",
                        connection_id, user_id, diagram_id, read_timeout
                    );
                    break;
                }
            };
            match frame {
                Ok(Message::Text(text)) => {
                    reader_session.touch();

                    let operation = match decode_client_message(&text) {
                        Ok(operation) => operation,
                        Err(e) => {
                            warn!("Dropping message from {} on diagram {}: {}", user_id, diagram_id, e);
                            continue;
                        }
                    };

                    match store.apply_operation(&diagram_id, &operation).await {
                        Ok(_) => {}
                        Err(StoreError::InvalidOperation(e)) => {
                            warn!("Dropping '{}' from {} on diagram {}: {}", operation.op_type, user_id, diagram_id, e);
                            continue;
                        }
                        // Relayed anyway so the participants stay consistent with each other
                        Err(e) => warn!(
                            "Failed to persist '{}' from {} on diagram {}: {}",
                            operation.op_type, user_id, diagram_id, e
                        ),
                    }

                    if !reader_session
                        .broadcast(connection_id, CollabMessage::update(&user_id, operation))
                        .await
                    {
                        break;
                    }
                }
                Ok(Message::Binary(_)) => {
                    warn!("Dropping binary frame from {} on diagram {}", user_id, diagram_id);
                }
                Ok(Message::Close(_)) => break,
                // Pings are answered by axum
                Ok(_) => {}
                Err(e) => {
                    debug!("Read from connection {} failed: {}", connection_id, e);
                    break;
                }
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut write_task) => read_task.abort(),
        _ = (&mut read_task) => write_task.abort(),
    };

    session.unregister(connection_id).await;
    info!("WebSocket connection {} of {} on diagram {} terminated", connection_id, user.user_id, diagram_id);
}
