//! Message and event types shared by the client transport and the server.
//!
//! The JSON shapes here are the wire contract: the polling endpoint returns
//! [`MessagesResponse`], and the duplex socket carries `{type, payload}`
//! frames that deserialize into [`InboundEvent`].

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// The author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    pub name: String,
}

/// A single chat message as stored by the server and seen by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Set for direct messages; the other participant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Set for thread replies; the message the thread hangs off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl ChatMessage {
    pub fn is_direct(&self) -> bool {
        self.recipient_id.is_some()
    }

    /// Returns `true` if `user_id` wrote or received this message.
    ///
    /// Channel messages involve every user.
    pub fn involves(&self, user_id: &str) -> bool {
        match &self.recipient_id {
            Some(recipient) => recipient == user_id || self.sender.id == user_id,
            None => true,
        }
    }
}

/// An event delivered to a client, over the socket or via polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum InboundEvent {
    ChannelMessage(ChatMessage),
    DirectMessage(ChatMessage),
}

impl InboundEvent {
    /// Wraps a message in the event variant matching its conversation kind.
    pub fn from_message(message: ChatMessage) -> Self {
        if message.is_direct() {
            Self::DirectMessage(message)
        } else {
            Self::ChannelMessage(message)
        }
    }

    pub fn message(&self) -> &ChatMessage {
        match self {
            Self::ChannelMessage(m) | Self::DirectMessage(m) => m,
        }
    }

    pub fn id(&self) -> &str {
        &self.message().id
    }

    /// The `type` tag used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChannelMessage(_) => "channel_message",
            Self::DirectMessage(_) => "direct_message",
        }
    }
}

/// An untyped `{type, payload}` frame, as sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Body of `GET /api/messages`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<ChatMessage>,
}

/// Which conversation a polling fetch covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PollScope {
    /// A single channel.
    Channel(String),
    /// Every message visible to a user.
    User(String),
}

impl PollScope {
    /// Query parameter understood by `GET /api/messages`.
    pub fn query_pair(&self) -> (&'static str, &str) {
        match self {
            Self::Channel(id) => ("channelId", id),
            Self::User(id) => ("userId", id),
        }
    }
}

/// Orders message identifiers.
///
/// Numeric identifiers compare by value so `"99" < "100"`; numeric ids sort
/// before non-numeric ones, which compare lexicographically.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Conversation key for a direct message between two users.
///
/// Participants are sorted so both sides map to the same key.
pub fn dm_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}
