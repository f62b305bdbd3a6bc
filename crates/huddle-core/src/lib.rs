//! Huddle core library: UI-agnostic messaging and login governance logic.
//!
//! `huddle-core` holds the parts of Huddle that do not depend on a network
//! runtime, so that both the client transport (`huddle-client`) and the
//! server (`huddle-web`) share the same types and decisions.
//!
//! # Modules
//!
//! - [`message`]: Chat message, inbound event and poll scope types.
//! - [`transport`]: Connection state machine and the pending message buffer.
//! - [`kv`]: Key-value store trait and the in-memory [`MemoryStore`].
//! - [`governor`]: Failed-login tracking, lockout and per-action rate limits.
//! - [`clock`]: Injectable wall clock ([`SystemClock`], [`ManualClock`]).
//! - [`config`]: TOML-deserialisable tuning for the transport and governor.
//! - [`error`]: Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod clock;
pub mod config;
pub mod error;
pub mod governor;
pub mod kv;
pub mod message;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GovernorConfig, TransportConfig};
pub use error::{CoreError, CoreResult};
pub use governor::{Checked, LockState, LoginGovernor};
pub use kv::memory::MemoryStore;
pub use kv::KvStore;
pub use message::{
    compare_ids, dm_key, ChatMessage, Frame, InboundEvent, MessagesResponse, PollScope, Sender,
};
pub use transport::buffer::MessageBuffer;
pub use transport::state::{
    ConnectionMachine, ConnectionState, ConnectionStatus, TransportAction, TransportInput,
};
