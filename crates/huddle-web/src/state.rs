use std::sync::Arc;

use huddle_core::{ChatMessage, Clock, InboundEvent, LoginGovernor, MemoryStore, Sender};
use tokio::sync::broadcast;

use crate::auth::users::UserDirectory;
use crate::config::ServerConfig;
use crate::dto::PostMessageRequest;
use crate::error::AppError;
use crate::store::{Draft, MessageStore};

const HUB_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Backing store for the governor; purged periodically by `main`.
    pub kv: Arc<MemoryStore>,
    pub governor: Arc<LoginGovernor>,
    pub users: Arc<UserDirectory>,
    pub messages: Arc<MessageStore>,
    /// Every stored message, for WebSocket subscribers.
    pub hub: broadcast::Sender<InboundEvent>,
}

impl AppState {
    pub fn new(config: ServerConfig, clock: Arc<dyn Clock>) -> Self {
        let kv = Arc::new(MemoryStore::with_clock(Arc::clone(&clock)));
        let governor = LoginGovernor::new(kv.clone(), Arc::clone(&clock), config.governor.clone());
        let messages = MessageStore::new(clock, &config.channels);
        let (hub, _) = broadcast::channel(HUB_CAPACITY);

        Self {
            config: Arc::new(config),
            kv,
            governor: Arc::new(governor),
            users: Arc::new(UserDirectory::new()),
            messages: Arc::new(messages),
            hub,
        }
    }

    /// Stores a message from `sender_id` and fans it out to socket subscribers.
    pub fn publish(
        &self,
        sender_id: &str,
        request: PostMessageRequest,
    ) -> Result<ChatMessage, AppError> {
        if sender_id.is_empty() {
            return Err(AppError::BadRequest("senderId is required".to_string()));
        }
        let draft = Draft {
            sender: Sender {
                id: sender_id.to_string(),
                name: self.users.display_name(sender_id),
            },
            content: request.content,
            channel_id: request.channel_id,
            recipient_id: request.recipient_id,
            parent_id: request.parent_id,
        };
        // Broadcast under the store's sequence lock so the hub sees ids in order.
        let message = self.messages.post_and_announce(draft, |message| {
            // No subscribers is not an error.
            let _ = self.hub.send(InboundEvent::from_message(message.clone()));
        })?;
        tracing::debug!("Stored message {} from {}", message.id, sender_id);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::{ManualClock, MessageBuffer};

    #[test]
    fn concurrent_publishers_broadcast_in_id_order() {
        let state = AppState::new(ServerConfig::default(), Arc::new(ManualClock::new(0)));
        let mut events = state.hub.subscribe();

        std::thread::scope(|scope| {
            for sender in ["u1", "u2", "u3", "u4", "u5", "u6", "u7", "u8"] {
                let state = state.clone();
                scope.spawn(move || {
                    for _ in 0..100 {
                        let request = PostMessageRequest {
                            sender_id: None,
                            content: "hello".to_string(),
                            channel_id: Some("general".to_string()),
                            recipient_id: None,
                            parent_id: None,
                        };
                        state.publish(sender, request).unwrap();
                    }
                });
            }
        });

        let mut buffer = MessageBuffer::new();
        let mut received = 0;
        while let Ok(event) = events.try_recv() {
            received += 1;
            assert!(buffer.push(event), "event {received} was dropped as a duplicate");
        }
        assert_eq!(received, 800);
        assert_eq!(buffer.len(), 800);
        assert_eq!(buffer.last_seen(), Some("800"));
    }
}
