//! WebSocket push of workflow events

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::api::active_user;
use crate::error::Result;
use crate::workflow::{WorkflowEvent, WorkflowNotice};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub user_id: Uuid,
}

/// WebSocket handler; the connecting user is named by `?user_id=`
pub async fn handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ConnectParams>,
) -> Result<impl IntoResponse> {
    let user = active_user(&state, params.user_id).await?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user.id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.workflow.subscribe();
    tracing::debug!(user_id = %user_id, "WebSocket connected");

    if send(&mut sender, &ServerMessage::Connected { user_id })
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            notice = events.recv() => {
                let msg = match notice {
                    Ok(notice) if is_recipient(&notice, user_id) => ServerMessage::Event { event: notice.event },
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(user_id = %user_id, skipped, "WebSocket client lagged");
                        ServerMessage::Error {
                            message: format!("Missed {} events", skipped),
                        }
                    }
                    Err(RecvError::Closed) => break,
                };
                if send(&mut sender, &msg).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                };

                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Ping) => ServerMessage::Pong,
                    Err(e) => ServerMessage::Error {
                        message: format!("Invalid message: {}", e),
                    },
                };
                if send(&mut sender, &reply).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::debug!(user_id = %user_id, "WebSocket disconnected");
}

fn is_recipient(notice: &WorkflowNotice, user_id: Uuid) -> bool {
    notice.recipients.contains(&user_id)
}

async fn send(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> std::result::Result<(), ()> {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            return Err(());
        }
    };
    sender.send(Message::Text(text)).await.map_err(|e| {
        tracing::error!("Failed to send message: {}", e);
    })
}

/// Messages from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Keepalive
    Ping,
}

/// Messages from server to client
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Subscription established
    Connected { user_id: Uuid },
    /// A workflow event concerning this user
    Event { event: WorkflowEvent },
    Pong,
    /// Error occurred
    Error { message: String },
}
