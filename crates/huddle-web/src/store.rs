//! In-memory channels and messages.
//!
//! Each conversation (a channel, or the DM pair keyed by [`dm_key`]) is a
//! `Vec` ordered by id. Posting is serialized by a sequence lock that also
//! covers the caller's notification, so announcements leave in id order and
//! a reader never sees id `n + 1` without id `n`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use dashmap::DashMap;
use huddle_core::{compare_ids, dm_key, ChatMessage, Clock, Sender};
use serde::Serialize;

use crate::error::AppError;

const MAX_CONTENT_CHARS: usize = 4000;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub created_at: u64,
}

/// A message before the store assigns its id and timestamp.
#[derive(Debug, Clone)]
pub struct Draft {
    pub sender: Sender,
    pub content: String,
    pub channel_id: Option<String>,
    pub recipient_id: Option<String>,
    pub parent_id: Option<String>,
}

pub struct MessageStore {
    clock: Arc<dyn Clock>,
    sequence: RwLock<()>,
    next_id: AtomicU64,
    channels: DashMap<String, Channel>,
    channel_messages: DashMap<String, Vec<ChatMessage>>,
    direct_messages: DashMap<String, Vec<ChatMessage>>,
}

fn channel_slug(name: &str) -> Option<String> {
    let slug: String = name
        .trim()
        .trim_start_matches('#')
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let valid = !slug.is_empty()
        && slug.len() <= 80
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    valid.then_some(slug)
}

impl MessageStore {
    pub fn new(clock: Arc<dyn Clock>, default_channels: &[String]) -> Self {
        let store = Self {
            clock,
            sequence: RwLock::new(()),
            next_id: AtomicU64::new(0),
            channels: DashMap::new(),
            channel_messages: DashMap::new(),
            direct_messages: DashMap::new(),
        };
        for name in default_channels {
            if let Err(e) = store.create_channel(name) {
                tracing::warn!("Skipping default channel {name}: {e:?}");
            }
        }
        store
    }

    /// Channels ordered by name.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.channels.iter().map(|c| c.value().clone()).collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name));
        channels
    }

    pub fn create_channel(&self, name: &str) -> Result<Channel, AppError> {
        let id = channel_slug(name).ok_or_else(|| {
            AppError::BadRequest(
                "Channel names may contain letters, digits, '-' and '_' only".to_string(),
            )
        })?;

        match self.channels.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(AppError::Conflict(format!("Channel #{id} already exists")))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let channel = Channel {
                    id: id.clone(),
                    name: id,
                    created_at: self.clock.now_millis(),
                };
                slot.insert(channel.clone());
                Ok(channel)
            }
        }
    }

    pub fn has_channel(&self, id: &str) -> bool {
        self.channels.contains_key(id)
    }

    fn read_sequence(&self) -> RwLockReadGuard<'_, ()> {
        self.sequence.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a channel message or DM and returns it with id and timestamp.
    ///
    /// Exactly one of `channel_id` / `recipient_id` must be set. A
    /// `parent_id` must name a message in the same conversation.
    pub fn post(&self, draft: Draft) -> Result<ChatMessage, AppError> {
        self.post_and_announce(draft, |_| {})
    }

    /// [`post`](Self::post), running `announce` on the stored message before
    /// the next message can be allocated an id.
    pub fn post_and_announce(
        &self,
        draft: Draft,
        announce: impl FnOnce(&ChatMessage),
    ) -> Result<ChatMessage, AppError> {
        let content = draft.content.trim().to_string();
        if content.is_empty() {
            return Err(AppError::BadRequest("Message content is required".to_string()));
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(AppError::BadRequest(format!(
                "Message content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }

        let channel_id = draft.channel_id.filter(|c| !c.is_empty());
        let recipient_id = draft.recipient_id.filter(|r| !r.is_empty());
        let (conversations, key) = match (&channel_id, &recipient_id) {
            (Some(channel), None) => {
                if !self.has_channel(channel) {
                    return Err(AppError::NotFound(format!("Channel #{channel} not found")));
                }
                (&self.channel_messages, channel.clone())
            }
            (None, Some(recipient)) => (&self.direct_messages, dm_key(&draft.sender.id, recipient)),
            _ => {
                return Err(AppError::BadRequest(
                    "Exactly one of channelId or recipientId is required".to_string(),
                ))
            }
        };

        let _sequence = self.sequence.write().unwrap_or_else(PoisonError::into_inner);
        let mut conversation = conversations.entry(key).or_default();
        if let Some(parent) = &draft.parent_id {
            if !conversation.iter().any(|m| &m.id == parent) {
                return Err(AppError::NotFound(format!("Parent message {parent} not found")));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let message = ChatMessage {
            id: id.to_string(),
            content,
            sender: draft.sender,
            timestamp: self.clock.now_millis(),
            channel_id,
            recipient_id,
            parent_id: draft.parent_id,
        };
        conversation.push(message.clone());
        drop(conversation);
        announce(&message);
        Ok(message)
    }

    /// Every message in a channel, replies included, oldest first.
    pub fn channel_messages(&self, channel_id: &str) -> Result<Vec<ChatMessage>, AppError> {
        if !self.has_channel(channel_id) {
            return Err(AppError::NotFound(format!("Channel #{channel_id} not found")));
        }
        let _sequence = self.read_sequence();
        Ok(self
            .channel_messages
            .get(channel_id)
            .map(|c| c.value().clone())
            .unwrap_or_default())
    }

    /// Every direct message sent or received by `user_id`, oldest first.
    pub fn messages_for_user(&self, user_id: &str) -> Vec<ChatMessage> {
        let _sequence = self.read_sequence();
        let mut messages: Vec<ChatMessage> = self
            .direct_messages
            .iter()
            .flat_map(|c| {
                c.value()
                    .iter()
                    .filter(|m| m.involves(user_id))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        messages.sort_by(|a, b| compare_ids(&a.id, &b.id));
        messages
    }

    /// Replies to `parent_id` across all conversations, oldest first.
    pub fn replies(&self, parent_id: &str) -> Vec<ChatMessage> {
        let collect = |map: &DashMap<String, Vec<ChatMessage>>| -> Vec<ChatMessage> {
            map.iter()
                .flat_map(|c| {
                    c.value()
                        .iter()
                        .filter(|m| m.parent_id.as_deref() == Some(parent_id))
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .collect()
        };
        let _sequence = self.read_sequence();
        let mut replies = collect(&self.channel_messages);
        replies.extend(collect(&self.direct_messages));
        replies.sort_by(|a, b| compare_ids(&a.id, &b.id));
        replies
    }
}
