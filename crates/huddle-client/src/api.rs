//! HTTP side of the transport: polling fetches and the send fallback.

use async_trait::async_trait;
use huddle_core::{ChatMessage, MessagesResponse, PollScope};
use serde::Serialize;
use url::Url;

use crate::error::ClientError;

#[async_trait]
pub trait MessagePoller: Send + Sync + 'static {
    /// Fetches the messages currently visible in `scope`, oldest first.
    async fn fetch(&self, scope: &PollScope) -> Result<Vec<ChatMessage>, ClientError>;
}

/// Body of `POST /api/messages`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub sender_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// reqwest client for the Huddle REST endpoints.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpApi {
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
        }
    }

    pub fn messages_url(&self, scope: &PollScope) -> Result<Url, ClientError> {
        let mut url = self.base.join("/api/messages")?;
        let (key, value) = scope.query_pair();
        url.query_pairs_mut().append_pair(key, value);
        Ok(url)
    }

    /// Sends a message over HTTP. Used when
    /// [`TransportHandle::send`](crate::TransportHandle::send) returns `false`.
    pub async fn post_message(&self, message: &NewMessage) -> Result<ChatMessage, ClientError> {
        let url = self.base.join("/api/messages")?;
        let created = self
            .client
            .post(url)
            .json(message)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatMessage>()
            .await?;
        Ok(created)
    }
}

#[async_trait]
impl MessagePoller for HttpApi {
    async fn fetch(&self, scope: &PollScope) -> Result<Vec<ChatMessage>, ClientError> {
        let url = self.messages_url(scope)?;
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<MessagesResponse>()
            .await?;
        Ok(body.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_scope_url() {
        let api = HttpApi::new(Url::parse("http://localhost:8080").unwrap());
        let url = api
            .messages_url(&PollScope::Channel("general".to_string()))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/messages?channelId=general");
    }

    #[test]
    fn user_scope_url() {
        let api = HttpApi::new(Url::parse("http://localhost:8080/").unwrap());
        let url = api.messages_url(&PollScope::User("u-7".to_string())).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/api/messages?userId=u-7");
    }

    #[test]
    fn new_message_omits_empty_targets() {
        let body = NewMessage {
            sender_id: "u1".to_string(),
            content: "hello".to_string(),
            channel_id: Some("general".to_string()),
            recipient_id: None,
            parent_id: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["senderId"], "u1");
        assert_eq!(json["channelId"], "general");
        assert!(json.get("recipientId").is_none());
    }
}
