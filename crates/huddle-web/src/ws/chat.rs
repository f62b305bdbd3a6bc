use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use huddle_core::{Frame, InboundEvent};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use crate::dto::PostMessageRequest;
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatQuery {
    user_id: Option<String>,
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Query(query): Query<ChatQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(user_id) = query.user_id.filter(|u| !u.is_empty()) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    ws.on_upgrade(move |socket| handle_chat(socket, state, user_id))
        .into_response()
}

/// Channel messages reach everyone; direct messages only their participants.
fn visible_to(event: &InboundEvent, user_id: &str) -> bool {
    match event {
        InboundEvent::ChannelMessage(_) => true,
        InboundEvent::DirectMessage(message) => message.involves(user_id),
    }
}

#[derive(Debug, PartialEq)]
enum Outbound {
    Send(String),
    Skip,
    Close,
}

/// What to do with one hub receive for `user_id`'s socket.
///
/// A lagged receiver has lost events it can never replay, so the socket is
/// closed and the client's reconnect path takes over.
fn outbound(received: Result<InboundEvent, RecvError>, user_id: &str) -> Outbound {
    match received {
        Ok(event) if !visible_to(&event, user_id) => Outbound::Skip,
        Ok(event) => match serde_json::to_string(&event) {
            Ok(text) => Outbound::Send(text),
            Err(e) => {
                tracing::error!("Failed to encode event: {e}");
                Outbound::Skip
            }
        },
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!("Chat socket for {user_id} lagged by {skipped} events, closing");
            Outbound::Close
        }
        Err(RecvError::Closed) => Outbound::Close,
    }
}

async fn handle_chat(socket: WebSocket, state: AppState, user_id: String) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let mut events = state.hub.subscribe();
    tracing::debug!("Chat socket opened for {user_id}");

    loop {
        tokio::select! {
            received = events.recv() => match outbound(received, &user_id) {
                Outbound::Send(text) => {
                    if ws_sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Skip => {}
                Outbound::Close => break,
            },
            frame = ws_receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => handle_client_frame(&state, &user_id, text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!("Chat socket read error for {user_id}: {e}");
                    break;
                }
            },
        }
    }

    let _ = ws_sender.close().await;
    tracing::debug!("Chat socket closed for {user_id}");
}

/// Persists a `{type, payload}` frame sent by the client. The sender is
/// always the socket's user, whatever the payload claims.
fn handle_client_frame(state: &AppState, user_id: &str, text: &str) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!("Ignoring malformed frame from {user_id}: {e}");
            return;
        }
    };
    if frame.kind != "channel_message" && frame.kind != "direct_message" {
        tracing::debug!("Ignoring {} frame from {user_id}", frame.kind);
        return;
    }

    let request: PostMessageRequest = match serde_json::from_value(frame.payload) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!("Ignoring {} frame with bad payload: {e}", frame.kind);
            return;
        }
    };
    if let Err(e) = state.publish(user_id, request) {
        tracing::debug!("Rejected {} frame from {user_id}: {e:?}", frame.kind);
    }
}
