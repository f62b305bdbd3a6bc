use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{api, ws};

pub fn build_app(state: AppState) -> Router {
    // Same-origin only by default.
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let api_routes = api::auth_router()
        .merge(api::admin_router())
        .merge(api::messaging_router())
        .merge(ws::router());

    Router::new()
        .nest("/api", api_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_kb * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
