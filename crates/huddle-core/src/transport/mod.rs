//! Runtime-independent pieces of the client transport.
//!
//! - [`state`]: the socket/polling state machine and its transition function.
//! - [`buffer`]: the append-only inbound message buffer with high-water-mark
//!   de-duplication.

pub mod buffer;
pub mod state;
