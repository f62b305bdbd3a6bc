use std::path::{Path, PathBuf};

use huddle_core::{PollScope, TransportConfig};
use serde::Deserialize;
use url::Url;

/// Client-side settings for `huddle-tail` and embedders.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_server_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            user_id: String::new(),
            channel_id: None,
            transport: TransportConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Loads from `HUDDLE_CLIENT_CONFIG` (if set), then applies
    /// `HUDDLE_SERVER_URL`, `HUDDLE_USER_ID` and `HUDDLE_CHANNEL_ID`.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("HUDDLE_CLIENT_CONFIG").map(PathBuf::from) {
            Ok(path) => Self::from_path(&path)?,
            Err(_) => Self::default(),
        };

        if let Ok(url) = std::env::var("HUDDLE_SERVER_URL") {
            config.server_url = url;
        }
        if let Ok(user) = std::env::var("HUDDLE_USER_ID") {
            config.user_id = user;
        }
        if let Ok(channel) = std::env::var("HUDDLE_CHANNEL_ID") {
            config.channel_id = Some(channel).filter(|c| !c.is_empty());
        }

        config.server_url()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        Ok(huddle_core::config::load_toml(path)?)
    }

    pub fn server_url(&self) -> anyhow::Result<Url> {
        Ok(Url::parse(&self.server_url)?)
    }

    /// Channel scope when a channel is configured, otherwise the user's DMs.
    pub fn poll_scope(&self) -> PollScope {
        match &self.channel_id {
            Some(channel) => PollScope::Channel(channel.clone()),
            None => PollScope::User(self.user_id.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.server_url, "http://127.0.0.1:8080");
        assert!(config.user_id.is_empty());
        assert_eq!(config.transport.max_reconnect_attempts, 3);
        assert_eq!(config.poll_scope(), PollScope::User(String::new()));
    }

    #[test]
    fn from_path_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
server_url = "https://chat.example.com"
user_id = "u42"
channel_id = "general"

[transport]
poll_interval_ms = 5000
"#
        )
        .unwrap();

        let config = ClientConfig::from_path(file.path()).unwrap();
        assert_eq!(config.user_id, "u42");
        assert_eq!(config.transport.poll_interval_ms, 5000);
        assert_eq!(config.transport.base_delay_ms, 1000);
        assert_eq!(config.poll_scope(), PollScope::Channel("general".to_string()));
        assert_eq!(config.server_url().unwrap().scheme(), "https");
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ClientConfig::from_path(&dir.path().join("absent.toml")).is_err());
    }
}
