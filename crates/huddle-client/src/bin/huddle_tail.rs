//! Tails a channel or a user's direct messages and posts stdin lines.
//!
//! Usage: `huddle-tail [USER_ID] [CHANNEL_ID]`
//!
//! Arguments override `HUDDLE_USER_ID` / `HUDDLE_CHANNEL_ID` and the
//! `HUDDLE_CLIENT_CONFIG` file.

use std::sync::Arc;

use huddle_client::api::NewMessage;
use huddle_client::{ClientConfig, HttpApi, TransportManager, WsConnector};
use huddle_core::InboundEvent;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = ClientConfig::load()?;
    let mut args = std::env::args().skip(1);
    if let Some(user) = args.next() {
        config.user_id = user;
    }
    if let Some(channel) = args.next() {
        config.channel_id = Some(channel);
    }
    if config.user_id.is_empty() {
        anyhow::bail!("No user id given. Pass it as the first argument or set HUDDLE_USER_ID.");
    }

    let server = config.server_url()?;
    let api = HttpApi::new(server.clone());
    let connector = Arc::new(WsConnector::new(&server)?);
    let mut manager =
        TransportManager::new(connector, Arc::new(api.clone()), config.transport.clone());

    let handle = manager.open(&config.user_id, config.poll_scope()).await;
    let mut events = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    tracing::info!("Tailing as {} via {}", config.user_id, server);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Dropped {n} events");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(line) if !line.trim().is_empty() => {
                    send_line(&handle, &api, &config, line).await;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    manager.close().await;
    Ok(())
}

fn print_event(event: &InboundEvent) {
    let message = event.message();
    let scope = match (&message.channel_id, &message.recipient_id) {
        (Some(channel), _) => format!("#{channel}"),
        (None, Some(recipient)) => format!("@{recipient}"),
        (None, None) => "?".to_string(),
    };
    println!("[{scope}] {}: {}", message.sender.name, message.content);
}

async fn send_line(
    handle: &huddle_client::TransportHandle,
    api: &HttpApi,
    config: &ClientConfig,
    line: String,
) {
    // Without a channel, lines are `@recipient text`.
    let (recipient_id, content) = match &config.channel_id {
        Some(_) => (None, line),
        None => match line.strip_prefix('@').and_then(|rest| rest.split_once(' ')) {
            Some((recipient, text)) => (Some(recipient.to_string()), text.to_string()),
            None => {
                eprintln!("direct messages are written as `@recipient text`");
                return;
            }
        },
    };
    let message = NewMessage {
        sender_id: config.user_id.clone(),
        content,
        channel_id: config.channel_id.clone(),
        recipient_id,
        parent_id: None,
    };
    let kind = if message.channel_id.is_some() {
        "channel_message"
    } else {
        "direct_message"
    };

    let payload = match serde_json::to_value(&message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("Failed to encode message: {e}");
            return;
        }
    };
    if handle.send(kind, payload) {
        return;
    }
    if let Err(e) = api.post_message(&message).await {
        tracing::error!("Failed to send message: {e}");
    }
}
