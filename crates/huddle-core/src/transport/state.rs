//! Connection state machine for the socket-with-polling-fallback transport.
//!
//! [`ConnectionMachine::apply`] consumes a [`TransportInput`] and returns the
//! [`TransportAction`] the runtime must perform next. The machine never
//! touches timers or sockets itself, so every transition is testable
//! without a runtime.

use std::time::Duration;

use serde::Serialize;

use crate::config::TransportConfig;

/// Coarse connectivity status exposed to the UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Polling,
}

/// Something that happened to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportInput {
    /// The owner opened the transport.
    Open { socket_supported: bool },
    /// The socket handshake completed.
    HandshakeSucceeded,
    /// A connection attempt failed.
    ConnectFailed(String),
    /// An established socket closed.
    SocketClosed(Option<String>),
    /// A scheduled reconnect delay elapsed.
    RetryDue,
    /// A polling fetch failed.
    PollFailed(String),
    /// The owner closed the transport.
    Close,
}

/// What the runtime must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportAction {
    /// Start a socket connection attempt.
    Connect,
    /// Wait, then feed [`TransportInput::RetryDue`].
    RetryAfter(Duration),
    /// Stop using sockets and start the polling loop.
    StartPolling,
    /// Drop the socket and any timers.
    Release,
    /// Keep doing whatever is in progress.
    Continue,
}

/// Observable connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub last_error: Option<String>,
    /// Set by [`TransportInput::Close`]; all later inputs except `Open` are ignored.
    pub closed: bool,
}

/// The transition function plus the state it mutates.
#[derive(Debug, Clone)]
pub struct ConnectionMachine {
    state: ConnectionState,
    config: TransportConfig,
}

const UNSUPPORTED: &str = "persistent connections are not supported; using polling";

impl ConnectionMachine {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            state: ConnectionState::default(),
            config,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn apply(&mut self, input: TransportInput) -> TransportAction {
        use ConnectionStatus::*;

        if let TransportInput::Open { socket_supported } = input {
            self.state = ConnectionState::default();
            if socket_supported {
                self.state.status = Connecting;
                return TransportAction::Connect;
            }
            self.state.status = Polling;
            self.state.last_error = Some(UNSUPPORTED.to_string());
            return TransportAction::StartPolling;
        }

        if self.state.closed {
            return TransportAction::Release;
        }

        match (self.state.status, input) {
            (_, TransportInput::Close) => {
                self.state.status = Disconnected;
                self.state.closed = true;
                TransportAction::Release
            }
            (Connecting, TransportInput::HandshakeSucceeded) => {
                self.state.status = Connected;
                self.state.reconnect_attempts = 0;
                self.state.last_error = None;
                TransportAction::Continue
            }
            (Connecting, TransportInput::ConnectFailed(reason)) => {
                self.state.last_error = Some(reason);
                self.schedule_reconnect(Connecting)
            }
            (Connected, TransportInput::SocketClosed(reason)) => {
                self.state.last_error =
                    Some(reason.unwrap_or_else(|| "connection closed".to_string()));
                self.schedule_reconnect(Disconnected)
            }
            (Connecting | Disconnected, TransportInput::RetryDue) => {
                self.state.status = Connecting;
                TransportAction::Connect
            }
            (Polling, TransportInput::PollFailed(reason)) => {
                self.state.last_error = Some(reason);
                TransportAction::Continue
            }
            (status, input) => {
                tracing::trace!(?status, ?input, "transport input ignored");
                TransportAction::Continue
            }
        }
    }

    /// Either schedules the next reconnect (leaving the status as `waiting`)
    /// or gives up on sockets once the budget is spent.
    fn schedule_reconnect(&mut self, waiting: ConnectionStatus) -> TransportAction {
        let attempt = self.state.reconnect_attempts;
        if attempt < self.config.max_reconnect_attempts {
            let delay = self.config.reconnect_delay(attempt);
            self.state.reconnect_attempts = attempt + 1;
            self.state.status = waiting;
            TransportAction::RetryAfter(delay)
        } else {
            self.state.status = ConnectionStatus::Polling;
            TransportAction::StartPolling
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> ConnectionMachine {
        let mut machine = ConnectionMachine::new(TransportConfig::default());
        assert_eq!(
            machine.apply(TransportInput::Open {
                socket_supported: true
            }),
            TransportAction::Connect
        );
        machine
    }

    fn fail(machine: &mut ConnectionMachine) -> TransportAction {
        machine.apply(TransportInput::ConnectFailed("refused".to_string()))
    }

    #[test]
    fn new_machine_is_disconnected() {
        let machine = ConnectionMachine::new(TransportConfig::default());
        assert_eq!(machine.state().status, ConnectionStatus::Disconnected);
        assert_eq!(machine.state().reconnect_attempts, 0);
    }

    #[test]
    fn open_moves_to_connecting() {
        let machine = open();
        assert_eq!(machine.state().status, ConnectionStatus::Connecting);
    }

    #[test]
    fn unsupported_sockets_skip_to_polling() {
        let mut machine = ConnectionMachine::new(TransportConfig::default());
        let action = machine.apply(TransportInput::Open {
            socket_supported: false,
        });
        assert_eq!(action, TransportAction::StartPolling);
        assert_eq!(machine.state().status, ConnectionStatus::Polling);
        assert!(machine.state().last_error.is_some());
    }

    #[test]
    fn failures_back_off_exponentially_then_poll() {
        let mut machine = open();

        assert_eq!(
            fail(&mut machine),
            TransportAction::RetryAfter(Duration::from_millis(1_000))
        );
        assert_eq!(machine.apply(TransportInput::RetryDue), TransportAction::Connect);
        assert_eq!(
            fail(&mut machine),
            TransportAction::RetryAfter(Duration::from_millis(2_000))
        );
        assert_eq!(machine.apply(TransportInput::RetryDue), TransportAction::Connect);
        assert_eq!(
            fail(&mut machine),
            TransportAction::RetryAfter(Duration::from_millis(4_000))
        );
        assert_eq!(machine.state().reconnect_attempts, 3);
        assert_eq!(machine.state().status, ConnectionStatus::Connecting);

        assert_eq!(machine.apply(TransportInput::RetryDue), TransportAction::Connect);
        assert_eq!(fail(&mut machine), TransportAction::StartPolling);
        assert_eq!(machine.state().status, ConnectionStatus::Polling);
        assert_eq!(machine.state().last_error.as_deref(), Some("refused"));
    }

    #[test]
    fn handshake_resets_attempts_and_error() {
        let mut machine = open();
        fail(&mut machine);
        machine.apply(TransportInput::RetryDue);

        let action = machine.apply(TransportInput::HandshakeSucceeded);

        assert_eq!(action, TransportAction::Continue);
        assert_eq!(machine.state().status, ConnectionStatus::Connected);
        assert_eq!(machine.state().reconnect_attempts, 0);
        assert!(machine.state().last_error.is_none());
    }

    #[test]
    fn socket_close_disconnects_and_schedules_reconnect() {
        let mut machine = open();
        machine.apply(TransportInput::HandshakeSucceeded);

        let action = machine.apply(TransportInput::SocketClosed(None));

        assert_eq!(action, TransportAction::RetryAfter(Duration::from_millis(1_000)));
        assert_eq!(machine.state().status, ConnectionStatus::Disconnected);
        assert_eq!(machine.state().last_error.as_deref(), Some("connection closed"));
        assert_eq!(machine.apply(TransportInput::RetryDue), TransportAction::Connect);
        assert_eq!(machine.state().status, ConnectionStatus::Connecting);
    }

    #[test]
    fn polling_never_upgrades_on_its_own() {
        let mut machine = ConnectionMachine::new(TransportConfig::default());
        machine.apply(TransportInput::Open {
            socket_supported: false,
        });

        assert_eq!(machine.apply(TransportInput::RetryDue), TransportAction::Continue);
        assert_eq!(
            machine.apply(TransportInput::HandshakeSucceeded),
            TransportAction::Continue
        );
        assert_eq!(machine.state().status, ConnectionStatus::Polling);
    }

    #[test]
    fn poll_failure_records_error_and_keeps_polling() {
        let mut machine = ConnectionMachine::new(TransportConfig::default());
        machine.apply(TransportInput::Open {
            socket_supported: false,
        });

        let action = machine.apply(TransportInput::PollFailed("HTTP 502".to_string()));

        assert_eq!(action, TransportAction::Continue);
        assert_eq!(machine.state().status, ConnectionStatus::Polling);
        assert_eq!(machine.state().last_error.as_deref(), Some("HTTP 502"));
    }

    #[test]
    fn close_releases_from_any_state() {
        for status_setup in [0, 1, 2] {
            let mut machine = open();
            match status_setup {
                1 => {
                    machine.apply(TransportInput::HandshakeSucceeded);
                }
                2 => {
                    for _ in 0..4 {
                        fail(&mut machine);
                        machine.apply(TransportInput::RetryDue);
                    }
                    assert_eq!(machine.state().status, ConnectionStatus::Polling);
                }
                _ => {}
            }
            assert_eq!(machine.apply(TransportInput::Close), TransportAction::Release);
            assert_eq!(machine.state().status, ConnectionStatus::Disconnected);
        }
    }

    #[test]
    fn inputs_after_close_never_reconnect() {
        let mut machine = open();
        machine.apply(TransportInput::Close);

        assert_eq!(fail(&mut machine), TransportAction::Release);
        assert_eq!(machine.apply(TransportInput::RetryDue), TransportAction::Release);
        assert_eq!(machine.state().status, ConnectionStatus::Disconnected);
        assert_eq!(machine.state().reconnect_attempts, 0);
    }

    #[test]
    fn reopen_resets_attempts_and_error() {
        let mut machine = open();
        fail(&mut machine);
        machine.apply(TransportInput::Close);

        machine.apply(TransportInput::Open {
            socket_supported: true,
        });

        assert_eq!(machine.state().status, ConnectionStatus::Connecting);
        assert_eq!(machine.state().reconnect_attempts, 0);
        assert!(machine.state().last_error.is_none());
        assert!(!machine.state().closed);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Polling).unwrap(),
            "\"polling\""
        );
    }
}
