use std::net::SocketAddr;
use std::path::PathBuf;

use huddle_core::GovernorConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub governor: GovernorConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,
    #[serde(default = "default_max_body_kb")]
    pub max_body_kb: usize,
    /// Take the client address from `x-forwarded-for` / `x-real-ip`. Only
    /// enable behind a proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_ttl_hours")]
    pub jwt_ttl_hours: u64,
}

/// Administrator account installed once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_admin_name")]
    pub name: String,
    #[serde(default)]
    pub password_hash: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_ttl_hours: default_jwt_ttl_hours(),
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            email: String::new(),
            name: default_admin_name(),
            password_hash: String::new(),
        }
    }
}

impl BootstrapConfig {
    pub fn is_configured(&self) -> bool {
        !self.email.is_empty() && !self.password_hash.is_empty()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            auth: AuthConfig::default(),
            governor: GovernorConfig::default(),
            bootstrap: BootstrapConfig::default(),
            channels: default_channels(),
            max_body_kb: default_max_body_kb(),
            trust_proxy_headers: false,
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_jwt_ttl_hours() -> u64 { 24 }
fn default_admin_name() -> String { "Administrator".to_string() }
fn default_max_body_kb() -> usize { 64 }

fn default_channels() -> Vec<String> {
    vec!["general".to_string(), "random".to_string()]
}

const WEAK_SECRETS: &[&str] = &[
    "change-me-to-a-random-secret",
    "secret",
    "password",
    "jwt-secret",
];

impl ServerConfig {
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("HUDDLE_WEB_CONFIG").map(PathBuf::from) {
            Ok(path) => {
                let contents = std::fs::read_to_string(&path)?;
                toml::from_str(&contents)?
            }
            Err(_) => ServerConfig::default(),
        };

        if let Ok(secret) = std::env::var("HUDDLE_JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if let Ok(email) = std::env::var("HUDDLE_ADMIN_EMAIL") {
            config.bootstrap.email = email;
        }
        if let Ok(hash) = std::env::var("HUDDLE_ADMIN_PASSWORD_HASH") {
            config.bootstrap.password_hash = hash;
        }
        if let Ok(addr) = std::env::var("HUDDLE_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }
        if let Ok(trust) = std::env::var("HUDDLE_TRUST_PROXY_HEADERS") {
            config.trust_proxy_headers = trust.parse()?;
        }

        config.finish()?;
        Ok(config)
    }

    /// Fills in a random JWT secret when none is set and rejects
    /// placeholder secrets.
    pub fn finish(&mut self) -> anyhow::Result<()> {
        if self.auth.jwt_secret.is_empty() {
            self.auth.jwt_secret = uuid::Uuid::new_v4().to_string();
            tracing::warn!(
                "No JWT secret configured. Generated random secret (will change on restart)."
            );
        }

        if WEAK_SECRETS.contains(&self.auth.jwt_secret.as_str()) {
            anyhow::bail!(
                "JWT secret matches a known weak/placeholder value. \
                 Set a strong random secret via HUDDLE_JWT_SECRET."
            );
        }
        if self.auth.jwt_secret.len() < 32 {
            tracing::warn!(
                "JWT secret is shorter than 32 characters. \
                 Consider using a stronger secret via HUDDLE_JWT_SECRET."
            );
        }

        self.bootstrap.email = self.bootstrap.email.trim().to_lowercase();
        if !self.bootstrap.is_configured() {
            tracing::warn!(
                "No bootstrap administrator configured. \
                 Set HUDDLE_ADMIN_EMAIL and HUDDLE_ADMIN_PASSWORD_HASH to create one."
            );
        }
        Ok(())
    }
}
