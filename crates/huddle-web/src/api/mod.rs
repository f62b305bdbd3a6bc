mod admin;
mod auth_handlers;
mod channels;
mod messages;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(auth_handlers::login))
        .route("/auth/me", get(auth_handlers::me))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/admin/rate-limits/clear", post(admin::clear_rate_limits))
        .route("/admin/users", get(admin::list_users).post(admin::create_user))
}

/// Message and channel routes used by the client transport.
pub fn messaging_router() -> Router<AppState> {
    Router::new()
        .route("/messages", get(messages::list_messages).post(messages::post_message))
        .route("/channels", get(channels::list_channels).post(channels::create_channel))
}
