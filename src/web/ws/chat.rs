//! Chat WebSocket handler.
//!
//! Bridges one socket to one hub connection: inbound frames become
//! [`ClientEvent`]s, and the connection's outbox is drained into the socket.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{Sink, SinkExt, StreamExt};
use std::sync::Arc;

use crate::chat::{ChatHub, ClientEvent, ServerEvent};

/// WebSocket chat handler.
///
/// GET /ws
///
/// The socket starts anonymous; clients send `authenticate` with their token
/// before joining rooms.
pub async fn chat_ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<ChatHub>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Handle a WebSocket connection.
async fn handle_socket(socket: WebSocket, hub: Arc<ChatHub>) {
    let (conn, mut outbox) = hub.connect().await;
    tracing::debug!("WebSocket session started: {}", conn);

    // Split the socket into sender and receiver
    let (mut ws_sender, mut ws_receiver) = socket.split();

    loop {
        tokio::select! {
            // Handle incoming WebSocket messages
            msg_result = ws_receiver.next() => {
                let Some(msg_result) = msg_result else {
                    break;
                };
                match msg_result {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ClientEvent>(&text) {
                        Ok(event) => hub.handle(conn, event).await,
                        Err(e) => {
                            tracing::debug!("Failed to parse client event: {}", e);
                            let error = ServerEvent::error("bad_request", "Invalid event format");
                            if !send_event(&mut ws_sender, &error).await {
                                break;
                            }
                        }
                    },
                    Ok(Message::Close(_)) => {
                        tracing::debug!("WebSocket closed by client: {}", conn);
                        break;
                    }
                    Ok(Message::Ping(data)) => {
                        let _ = ws_sender.send(Message::Pong(data)).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                }
            }

            // Forward events queued for this connection
            event = outbox.recv() => {
                let Some(event) = event else {
                    // Released by the gateway.
                    break;
                };
                if !send_event(&mut ws_sender, &event).await {
                    break;
                }
                if let ServerEvent::Terminated { reason } = event {
                    let _ = ws_sender
                        .send(Message::Close(Some(CloseFrame {
                            code: axum::extract::ws::close_code::POLICY,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    }

    hub.disconnect(conn).await;
    tracing::debug!("WebSocket session ended: {}", conn);
}

/// Write one event to the socket. Returns false once the socket is gone.
async fn send_event<S>(sender: &mut S, event: &ServerEvent) -> bool
where
    S: Sink<Message> + Unpin,
{
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to serialize {} event: {}", event.name(), e);
            return true;
        }
    };
    sender.send(Message::Text(json.into())).await.is_ok()
}
