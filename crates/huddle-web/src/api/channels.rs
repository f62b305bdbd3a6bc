use axum::extract::State;
use axum::Json;

use crate::auth::middleware::AuthUser;
use crate::dto::{ChannelsResponse, CreateChannelRequest};
use crate::error::AppError;
use crate::state::AppState;
use crate::store::Channel;

pub async fn list_channels(State(state): State<AppState>) -> Json<ChannelsResponse> {
    Json(ChannelsResponse {
        channels: state.messages.channels(),
    })
}

pub async fn create_channel(
    user: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<CreateChannelRequest>,
) -> Result<Json<Channel>, AppError> {
    let channel = state.messages.create_channel(&body.name)?;
    tracing::info!("{} created channel #{}", user.email, channel.id);
    Ok(Json(channel))
}
