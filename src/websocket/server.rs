//! WebSocket endpoint and per-connection loop

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::Utc;
use futures::stream::StreamExt;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use super::{
    connection::{Connection, MessageWriter},
    messages::{ClientMessage, ServerMessage},
    session::Session,
    WebSocketState,
};
use crate::metrics::WEBSOCKET_MESSAGES_TOTAL;

/// WebSocket endpoint handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<WebSocketState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Response {
    let addr = connect_info.map(|ConnectInfo(addr)| addr);
    info!(remote_addr = ?addr, "WebSocket connection request");

    ws.on_upgrade(move |socket| handle_socket(socket, state, addr))
}

async fn handle_socket(socket: WebSocket, state: Arc<WebSocketState>, addr: Option<SocketAddr>) {
    let (sender, mut receiver) = socket.split();
    let mut writer = MessageWriter::new(sender);

    let session = Session::new();
    let session_id = session.id.clone();

    let (connection, mut message_rx) = state
        .connections
        .register(session, addr.map(|a| a.to_string()));

    let welcome = ServerMessage::Welcome {
        session_id: session_id.clone(),
        server_time: Utc::now(),
    };
    if let Err(e) = writer.send(welcome).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome message");
        state.connections.unregister(&session_id);
        return;
    }

    let writer_session_id = session_id.clone();
    let sender_handle = tokio::spawn(async move {
        while let Some(message) = message_rx.recv().await {
            if let Err(e) = writer.send(message).await {
                debug!(session_id = %writer_session_id, error = %e, "Failed to send message");
                break;
            }
        }
        let _ = writer.close().await;
    });

    let heartbeat_connection = connection.clone();
    let heartbeat_secs = state.settings.heartbeat_interval_secs.max(1);
    let heartbeat_handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(heartbeat_secs));
        // First tick fires immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pong = ServerMessage::Pong {
                timestamp: Utc::now(),
            };
            if heartbeat_connection.send(pong).is_err() {
                debug!("Heartbeat failed, connection closed");
                break;
            }
        }
    });

    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                WEBSOCKET_MESSAGES_TOTAL.with_label_values(&["inbound"]).inc();
                if let Err(e) = handle_client_message(&text, &connection) {
                    warn!(session_id = %session_id, error = %e, "Rejected client message");
                    let _ = connection.send(ServerMessage::Error {
                        code: "INVALID_MESSAGE".to_string(),
                        message: e,
                    });
                }
            }
            Message::Binary(_) => {
                let _ = connection.send(ServerMessage::Error {
                    code: "UNSUPPORTED".to_string(),
                    message: "Binary messages are not supported".to_string(),
                });
            }
            Message::Ping(_) | Message::Pong(_) => {
                // axum answers protocol pings itself
                connection.session.write().touch();
            }
            Message::Close(_) => {
                debug!(session_id = %session_id, "Client closed connection");
                break;
            }
        }
    }

    info!(session_id = %session_id, "WebSocket session ended");
    sender_handle.abort();
    heartbeat_handle.abort();
    state.connections.unregister(&session_id);
}

/// Apply one client message to the session, queueing the reply
pub(crate) fn handle_client_message(text: &str, connection: &Connection) -> Result<(), String> {
    let message: ClientMessage =
        serde_json::from_str(text).map_err(|e| format!("Invalid message: {}", e))?;

    let session_id = connection.session_id();

    let reply = match message {
        ClientMessage::Subscribe {
            subscription_id,
            filters,
        } => {
            debug!(
                session_id = %session_id,
                subscription_id = %subscription_id,
                "Client subscribing to events"
            );
            connection
                .session
                .write()
                .subscribe(subscription_id.clone(), filters.clone());
            ServerMessage::Subscribed {
                subscription_id,
                filters,
            }
        }
        ClientMessage::Unsubscribe { subscription_id } => {
            if connection.session.write().unsubscribe(&subscription_id) {
                ServerMessage::Unsubscribed { subscription_id }
            } else {
                ServerMessage::Error {
                    code: "NOT_FOUND".to_string(),
                    message: format!("Subscription {} not found", subscription_id),
                }
            }
        }
        ClientMessage::Ping { timestamp } => {
            connection.session.write().touch();
            ServerMessage::Pong {
                timestamp: timestamp.unwrap_or_else(Utc::now),
            }
        }
    };

    connection.send(reply).map_err(|e| e.to_string())
}

/// Periodically drop idle sessions
pub async fn cleanup_task(state: Arc<WebSocketState>) {
    let timeout = state.settings.session_timeout_secs;
    let mut ticker = interval(Duration::from_secs((timeout / 2).clamp(1, 60)));

    loop {
        ticker.tick().await;
        let removed = state.connections.cleanup_expired(timeout as i64);
        if removed > 0 {
            debug!(removed = removed, "Removed idle WebSocket sessions");
        }
    }
}
