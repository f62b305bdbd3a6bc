//! Socket-with-polling-fallback transport runtime.
//!
//! [`TransportManager::open`] spawns one driver task per handle. The driver
//! feeds socket and timer outcomes into a [`ConnectionMachine`] and performs
//! the [`TransportAction`] it returns. Exactly one of {socket, polling loop}
//! is live at a time, and every await is raced against the handle's
//! cancellation token so nothing outlives [`TransportHandle::close`].

use std::sync::Arc;

use huddle_core::{
    ChatMessage, ConnectionMachine, ConnectionStatus, Frame, InboundEvent, MessageBuffer,
    PollScope, TransportAction, TransportConfig, TransportInput,
};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::api::MessagePoller;
use crate::connector::{SocketConnector, SocketLink};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Read-only projection of a handle's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    pub status: ConnectionStatus,
    pub is_connected: bool,
    pub is_polling: bool,
    pub connection_error: Option<String>,
    pub reconnect_attempts: u32,
    pub messages: Vec<InboundEvent>,
}

/// State shared between a handle and its driver. Every mutation goes
/// through `watch::Sender::send_modify`, which serializes writers.
struct Shared {
    machine: ConnectionMachine,
    buffer: MessageBuffer,
}

impl Shared {
    fn observe(&self) -> Observation {
        let state = self.machine.state();
        Observation {
            status: state.status,
            is_connected: state.status == ConnectionStatus::Connected,
            is_polling: state.status == ConnectionStatus::Polling,
            connection_error: state.last_error.clone(),
            reconnect_attempts: state.reconnect_attempts,
            messages: self.buffer.events().to_vec(),
        }
    }
}

type Outbound = Option<mpsc::UnboundedSender<String>>;

struct HandleInner {
    user_id: String,
    cancel: CancellationToken,
    shared: Arc<watch::Sender<Shared>>,
    outbound: Arc<watch::Sender<Outbound>>,
    events: broadcast::Sender<InboundEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A live (or idle) transport for one user identity.
///
/// Clones share the same connection. The connection is released by
/// [`close`](Self::close) or when the last clone is dropped.
#[derive(Clone)]
pub struct TransportHandle {
    inner: Arc<HandleInner>,
}

impl TransportHandle {
    fn new(user_id: &str, machine: ConnectionMachine) -> Self {
        let (shared, _) = watch::channel(Shared {
            machine,
            buffer: MessageBuffer::new(),
        });
        let (outbound, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(HandleInner {
                user_id: user_id.to_string(),
                cancel: CancellationToken::new(),
                shared: Arc::new(shared),
                outbound: Arc::new(outbound),
                events,
                task: Mutex::new(None),
            }),
        }
    }

    /// A handle that never connects, for an empty identity.
    fn idle(config: TransportConfig) -> Self {
        Self::new("", ConnectionMachine::new(config))
    }

    fn spawn(
        user_id: &str,
        scope: PollScope,
        connector: Arc<dyn SocketConnector>,
        poller: Arc<dyn MessagePoller>,
        config: TransportConfig,
    ) -> Self {
        let poll_interval = config.poll_interval();
        let mut machine = ConnectionMachine::new(config);
        let first = machine.apply(TransportInput::Open {
            socket_supported: connector.supports_sockets(),
        });
        let handle = Self::new(user_id, machine);

        let driver = Driver {
            user_id: user_id.to_string(),
            scope,
            connector,
            poller,
            poll_interval,
            cancel: handle.inner.cancel.clone(),
            shared: Arc::clone(&handle.inner.shared),
            outbound: Arc::clone(&handle.inner.outbound),
            events: handle.inner.events.clone(),
        };
        let task = tokio::spawn(driver.run(first));
        if let Ok(mut slot) = handle.inner.task.try_lock() {
            *slot = Some(task);
        }
        handle
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn observe(&self) -> Observation {
        self.inner.shared.borrow().observe()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.shared.borrow().machine.state().status
    }

    /// Stream of events appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<InboundEvent> {
        self.inner.events.subscribe()
    }

    /// Sends a `{type, payload}` frame over the live socket.
    ///
    /// Returns `false` when no socket is connected; the caller should then
    /// post the message over HTTP and let delivery reflect it back.
    pub fn send(&self, kind: &str, payload: serde_json::Value) -> bool {
        let frame = Frame {
            kind: kind.to_string(),
            payload,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode outbound frame: {e}");
                return false;
            }
        };
        self.inner
            .outbound
            .borrow()
            .as_ref()
            .is_some_and(|tx| tx.send(text).is_ok())
    }

    /// Releases the socket or polling loop. Safe to call repeatedly.
    pub fn close(&self) {
        if self.inner.cancel.is_cancelled() {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.shared.send_modify(|s| {
            s.machine.apply(TransportInput::Close);
        });
        self.inner.outbound.send_replace(None);
        tracing::debug!("Transport closed for {}", self.inner.user_id);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Closes the handle and waits for its driver task to finish.
    pub async fn shutdown(&self) {
        self.close();
        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("Transport driver for {} panicked", self.inner.user_id);
                }
            }
        }
    }
}

struct Driver {
    user_id: String,
    scope: PollScope,
    connector: Arc<dyn SocketConnector>,
    poller: Arc<dyn MessagePoller>,
    poll_interval: std::time::Duration,
    cancel: CancellationToken,
    shared: Arc<watch::Sender<Shared>>,
    outbound: Arc<watch::Sender<Outbound>>,
    events: broadcast::Sender<InboundEvent>,
}

impl Driver {
    async fn run(self, first: TransportAction) {
        let mut action = first;
        loop {
            let next = match action {
                TransportAction::Connect => self.connect_once().await,
                TransportAction::RetryAfter(delay) => {
                    tracing::debug!("Reconnecting {} in {:?}", self.user_id, delay);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => None,
                        _ = tokio::time::sleep(delay) => self.apply(TransportInput::RetryDue),
                    }
                }
                TransportAction::StartPolling => {
                    self.poll_loop().await;
                    None
                }
                TransportAction::Release | TransportAction::Continue => None,
            };
            match next {
                Some(next) => action = next,
                None => break,
            }
        }
        self.outbound.send_replace(None);
        tracing::debug!("Transport driver for {} stopped", self.user_id);
    }

    /// Feeds `input` to the machine unless the handle has been closed.
    ///
    /// Returns `None` after close, which the caller treats as "stop".
    fn apply(&self, input: TransportInput) -> Option<TransportAction> {
        let mut action = None;
        self.shared.send_modify(|s| {
            if !self.cancel.is_cancelled() {
                action = Some(s.machine.apply(input));
            }
        });
        action
    }

    async fn connect_once(&self) -> Option<TransportAction> {
        let attempt = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return None,
            result = self.connector.connect(&self.user_id) => result,
        };
        let link = match attempt {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!("Connection attempt for {} failed: {e}", self.user_id);
                return self.apply(TransportInput::ConnectFailed(e.to_string()));
            }
        };

        self.apply(TransportInput::HandshakeSucceeded)?;
        tracing::info!("Transport connected for {}", self.user_id);
        let reason = self.pump(link).await?;
        tracing::info!("Transport socket closed for {}", self.user_id);
        self.apply(TransportInput::SocketClosed(reason))
    }

    /// Relays inbound frames until the socket closes (`Some(reason)`) or the
    /// handle is closed (`None`).
    async fn pump(&self, link: SocketLink) -> Option<Option<String>> {
        let SocketLink {
            outbound,
            mut inbound,
        } = link;
        self.outbound.send_replace(Some(outbound));

        let outcome = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break None,
                frame = inbound.recv() => match frame {
                    Some(text) => self.deliver_frame(&text),
                    None => break Some(None),
                },
            }
        };
        self.outbound.send_replace(None);
        outcome
    }

    async fn poll_loop(&self) {
        tracing::info!(
            "Transport for {} polling every {:?}",
            self.user_id,
            self.poll_interval
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                result = self.poller.fetch(&self.scope) => result,
            };
            match fetched {
                Ok(messages) => self.merge(messages),
                Err(e) => {
                    tracing::warn!("Polling fetch for {} failed: {e}", self.user_id);
                    self.apply(TransportInput::PollFailed(e.to_string()));
                }
            }
        }
    }

    fn deliver_frame(&self, text: &str) {
        let event = match serde_json::from_str::<InboundEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!("Ignoring unrecognised frame: {e}");
                return;
            }
        };
        let mut appended = false;
        self.shared.send_modify(|s| {
            if !self.cancel.is_cancelled() {
                appended = s.buffer.push(event.clone());
            }
        });
        if appended {
            let _ = self.events.send(event);
        }
    }

    fn merge(&self, messages: Vec<ChatMessage>) {
        let mut appended = Vec::new();
        self.shared.send_modify(|s| {
            if !self.cancel.is_cancelled() {
                appended = s.buffer.merge_polled(messages);
            }
        });
        for event in appended {
            let _ = self.events.send(event);
        }
    }
}

/// Owns the current transport handle and guarantees the previous one is
/// fully shut down before a new one is opened.
pub struct TransportManager {
    connector: Arc<dyn SocketConnector>,
    poller: Arc<dyn MessagePoller>,
    config: TransportConfig,
    current: Option<TransportHandle>,
}

impl TransportManager {
    pub fn new(
        connector: Arc<dyn SocketConnector>,
        poller: Arc<dyn MessagePoller>,
        config: TransportConfig,
    ) -> Self {
        Self {
            connector,
            poller,
            config,
            current: None,
        }
    }

    /// Opens a transport for `user_id`, closing any previous one first.
    ///
    /// An empty `user_id` yields an idle handle that never connects.
    /// Must be called from within a tokio runtime.
    pub async fn open(&mut self, user_id: &str, scope: PollScope) -> TransportHandle {
        if let Some(previous) = self.current.take() {
            previous.shutdown().await;
        }
        let handle = if user_id.is_empty() {
            TransportHandle::idle(self.config.clone())
        } else {
            TransportHandle::spawn(
                user_id,
                scope,
                Arc::clone(&self.connector),
                Arc::clone(&self.poller),
                self.config.clone(),
            )
        };
        self.current = Some(handle.clone());
        handle
    }

    pub async fn close(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.shutdown().await;
        }
    }

    pub fn current(&self) -> Option<&TransportHandle> {
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use huddle_core::Sender;
    use tokio_tungstenite::tungstenite;

    use crate::error::ClientError;

    fn msg(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.to_string(),
            content: format!("message {id}"),
            sender: Sender {
                id: "u2".to_string(),
                name: "Grace".to_string(),
            },
            timestamp: 0,
            channel_id: Some("general".to_string()),
            recipient_id: None,
            parent_id: None,
        }
    }

    fn refused() -> ClientError {
        ClientError::Socket(tungstenite::Error::ConnectionClosed)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[derive(Default)]
    struct FailingConnector {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl SocketConnector for FailingConnector {
        async fn connect(&self, _user_id: &str) -> Result<SocketLink, ClientError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(refused())
        }
    }

    #[derive(Default)]
    struct NoSockets {
        attempts: AtomicU32,
    }

    #[async_trait]
    impl SocketConnector for NoSockets {
        fn supports_sockets(&self) -> bool {
            false
        }

        async fn connect(&self, _user_id: &str) -> Result<SocketLink, ClientError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(refused())
        }
    }

    /// Server ends of a test socket: push frames in, read frames sent out.
    type ServerEnds = (mpsc::UnboundedSender<String>, mpsc::UnboundedReceiver<String>);

    struct ChannelConnector {
        links: mpsc::UnboundedSender<ServerEnds>,
    }

    #[async_trait]
    impl SocketConnector for ChannelConnector {
        async fn connect(&self, _user_id: &str) -> Result<SocketLink, ClientError> {
            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let (out_tx, out_rx) = mpsc::unbounded_channel();
            let _ = self.links.send((in_tx, out_rx));
            Ok(SocketLink {
                outbound: out_tx,
                inbound: in_rx,
            })
        }
    }

    struct StaticPoller {
        messages: Vec<ChatMessage>,
        delay: Duration,
        fail: bool,
        calls: AtomicU32,
    }

    impl StaticPoller {
        fn new(messages: Vec<ChatMessage>) -> Self {
            Self {
                messages,
                delay: Duration::ZERO,
                fail: false,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessagePoller for StaticPoller {
        async fn fetch(&self, _scope: &PollScope) -> Result<Vec<ChatMessage>, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(refused());
            }
            Ok(self.messages.clone())
        }
    }

    fn scope() -> PollScope {
        PollScope::User("u1".to_string())
    }

    #[tokio::test(start_paused = true)]
    async fn empty_user_id_gives_idle_handle() {
        let connector = Arc::new(FailingConnector::default());
        let poller = Arc::new(StaticPoller::new(vec![]));
        let mut manager =
            TransportManager::new(connector.clone(), poller.clone(), TransportConfig::default());

        let handle = manager.open("", scope()).await;
        settle().await;

        assert_eq!(handle.status(), ConnectionStatus::Disconnected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
        assert_eq!(poller.calls(), 0);
        assert!(!handle.send("channel_message", serde_json::json!({})));
    }

    #[tokio::test(start_paused = true)]
    async fn falls_back_to_polling_after_reconnects_exhausted() {
        let connector = Arc::new(FailingConnector::default());
        let poller = Arc::new(StaticPoller::new(vec![msg("1")]));
        let mut manager =
            TransportManager::new(connector.clone(), poller.clone(), TransportConfig::default());

        let handle = manager.open("u1", scope()).await;
        settle().await;

        let observed = handle.observe();
        assert_eq!(observed.status, ConnectionStatus::Connecting);
        assert_eq!(observed.reconnect_attempts, 1);
        assert!(observed.connection_error.is_some());
        assert_eq!(poller.calls(), 0);

        // Retries at +1 s, +2 s and +4 s, then polling starts.
        tokio::time::sleep(Duration::from_millis(7_000)).await;

        let observed = handle.observe();
        assert!(observed.is_polling);
        assert!(!observed.is_connected);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
        assert_eq!(poller.calls(), 1);
        assert_eq!(observed.messages.len(), 1);

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(poller.calls(), 2);
        assert_eq!(handle.observe().messages.len(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_sockets_poll_immediately() {
        let connector = Arc::new(NoSockets::default());
        let poller = Arc::new(StaticPoller::new(vec![msg("1"), msg("2")]));
        let mut manager =
            TransportManager::new(connector.clone(), poller.clone(), TransportConfig::default());

        let handle = manager.open("u1", scope()).await;
        settle().await;

        let observed = handle.observe();
        assert!(observed.is_polling);
        assert!(observed.connection_error.is_some());
        assert_eq!(observed.messages.len(), 2);
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn socket_frames_are_buffered_and_sends_go_out() {
        let (links_tx, mut links_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(ChannelConnector { links: links_tx });
        let poller = Arc::new(StaticPoller::new(vec![]));
        let mut manager = TransportManager::new(connector, poller, TransportConfig::default());

        let handle = manager.open("u1", scope()).await;
        let mut events = handle.subscribe();
        let (server_tx, mut server_rx) = links_rx.recv().await.unwrap();
        settle().await;
        assert!(handle.observe().is_connected);

        let event = InboundEvent::from_message(msg("5"));
        server_tx.send(serde_json::to_string(&event).unwrap()).unwrap();
        server_tx.send("not json".to_string()).unwrap();
        server_tx.send(serde_json::to_string(&event).unwrap()).unwrap();
        settle().await;

        assert_eq!(handle.observe().messages, vec![event.clone()]);
        assert_eq!(events.recv().await.unwrap(), event);

        assert!(handle.send("channel_message", serde_json::json!({"content": "hi"})));
        let sent: Frame = serde_json::from_str(&server_rx.recv().await.unwrap()).unwrap();
        assert_eq!(sent.kind, "channel_message");
        assert_eq!(sent.payload["content"], "hi");
    }

    #[tokio::test(start_paused = true)]
    async fn socket_close_reconnects_after_backoff() {
        let (links_tx, mut links_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(ChannelConnector { links: links_tx });
        let poller = Arc::new(StaticPoller::new(vec![]));
        let mut manager = TransportManager::new(connector, poller, TransportConfig::default());

        let handle = manager.open("u1", scope()).await;
        let (server_tx, _server_rx) = links_rx.recv().await.unwrap();
        settle().await;

        drop(server_tx);
        settle().await;

        let observed = handle.observe();
        assert_eq!(observed.status, ConnectionStatus::Disconnected);
        assert_eq!(observed.connection_error.as_deref(), Some("connection closed"));
        assert!(!handle.send("channel_message", serde_json::json!({})));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        let _second = links_rx.recv().await.unwrap();
        settle().await;

        let observed = handle.observe();
        assert!(observed.is_connected);
        assert_eq!(observed.reconnect_attempts, 0);
        assert!(observed.connection_error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_polling_and_is_idempotent() {
        let connector = Arc::new(NoSockets::default());
        let poller = Arc::new(StaticPoller::new(vec![msg("1")]));
        let mut manager =
            TransportManager::new(connector, poller.clone(), TransportConfig::default());

        let handle = manager.open("u1", scope()).await;
        settle().await;
        assert_eq!(poller.calls(), 1);

        handle.close();
        handle.close();
        assert!(handle.is_closed());
        assert_eq!(handle.status(), ConnectionStatus::Disconnected);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(poller.calls(), 1);

        manager.close().await;
        assert!(manager.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_results_after_close_are_discarded() {
        let connector = Arc::new(NoSockets::default());
        let poller = Arc::new(StaticPoller {
            delay: Duration::from_millis(500),
            ..StaticPoller::new(vec![msg("1")])
        });
        let mut manager =
            TransportManager::new(connector, poller.clone(), TransportConfig::default());

        let handle = manager.open("u1", scope()).await;
        settle().await;
        assert_eq!(poller.calls(), 1);

        handle.close();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(handle.observe().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_failures_are_reported_not_fatal() {
        let connector = Arc::new(NoSockets::default());
        let poller = Arc::new(StaticPoller {
            fail: true,
            ..StaticPoller::new(vec![])
        });
        let mut manager =
            TransportManager::new(connector, poller.clone(), TransportConfig::default());

        let handle = manager.open("u1", scope()).await;
        settle().await;

        let observed = handle.observe();
        assert!(observed.is_polling);
        assert!(observed
            .connection_error
            .as_deref()
            .is_some_and(|e| e.starts_with("socket error")));

        tokio::time::sleep(Duration::from_millis(3_000)).await;
        assert_eq!(poller.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_closes_previous_and_resets_state() {
        let connector = Arc::new(FailingConnector::default());
        let poller = Arc::new(StaticPoller::new(vec![]));
        let mut manager =
            TransportManager::new(connector.clone(), poller, TransportConfig::default());

        let first = manager.open("u1", scope()).await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(first.observe().reconnect_attempts, 2);
        assert!(first.observe().connection_error.is_some());

        let second = manager.open("u1", scope()).await;

        assert!(first.is_closed());
        assert_eq!(first.status(), ConnectionStatus::Disconnected);
        let observed = second.observe();
        assert_eq!(observed.status, ConnectionStatus::Connecting);
        assert_eq!(observed.reconnect_attempts, 0);
        assert!(observed.connection_error.is_none());
        assert!(observed.messages.is_empty());
    }
}
