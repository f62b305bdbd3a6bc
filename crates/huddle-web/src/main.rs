mod api;
mod app;
mod auth;
mod client_ip;
mod config;
mod dto;
mod error;
mod state;
mod store;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use huddle_core::SystemClock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::ServerConfig;
use crate::state::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_web=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load()?;
    let bind_addr = config.bind_addr;
    let state = AppState::new(config, Arc::new(SystemClock));

    auth::bootstrap::seed_admin(&state.users, &state.config.bootstrap);
    tracing::info!("{} user account(s) loaded", state.users.len());

    // Expired governor records
    let kv = state.kv.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            let purged = kv.purge_expired();
            if purged > 0 {
                tracing::debug!("Purged {purged} expired governor records");
            }
        }
    });

    let app = app::build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("huddle-web listening on http://{}", bind_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
