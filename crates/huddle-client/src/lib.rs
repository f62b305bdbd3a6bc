//! Huddle client transport.
//!
//! Receives message events over a WebSocket when one can be held open and
//! falls back to HTTP polling when it cannot. The decisions live in
//! [`huddle_core::ConnectionMachine`]; this crate drives them on tokio.
//!
//! - [`manager`]: [`TransportManager`] and the per-open [`TransportHandle`].
//! - [`connector`]: the [`SocketConnector`] seam and its WebSocket implementation.
//! - [`api`]: the [`MessagePoller`] seam and the reqwest-backed [`HttpApi`].
//! - [`config`]: client configuration loaded from TOML and the environment.

pub mod api;
pub mod config;
pub mod connector;
pub mod error;
pub mod manager;

pub use api::{HttpApi, MessagePoller};
pub use config::ClientConfig;
pub use connector::{SocketConnector, SocketLink, WsConnector};
pub use error::ClientError;
pub use manager::{Observation, TransportHandle, TransportManager};
