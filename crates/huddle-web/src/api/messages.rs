use axum::extract::{Query, State};
use axum::Json;
use huddle_core::{ChatMessage, MessagesResponse};

use crate::dto::{MessagesQuery, PostMessageRequest};
use crate::error::AppError;
use crate::state::AppState;

/// `GET /api/messages` with exactly one of `channelId`, `userId` or `parentId`.
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<MessagesResponse>, AppError> {
    let messages = match (query.channel_id, query.user_id, query.parent_id) {
        (Some(channel), None, None) => state.messages.channel_messages(&channel)?,
        (None, Some(user), None) => state.messages.messages_for_user(&user),
        (None, None, Some(parent)) => state.messages.replies(&parent),
        _ => {
            return Err(AppError::BadRequest(
                "Exactly one of channelId, userId or parentId is required".to_string(),
            ))
        }
    };
    Ok(Json(MessagesResponse { messages }))
}

/// HTTP fallback for sending when no socket is connected.
pub async fn post_message(
    State(state): State<AppState>,
    Json(mut body): Json<PostMessageRequest>,
) -> Result<Json<ChatMessage>, AppError> {
    let sender_id = body.sender_id.take().unwrap_or_default();
    let message = state.publish(&sender_id, body)?;
    Ok(Json(message))
}
