//! WebSocket client for the notification channel.
//!
//! [`WebSocketClient::connect`] spawns a background task that owns the
//! transport connection. The task forwards outgoing frames queued by
//! [`WebSocketClient::send`], answers pings, and dispatches parsed
//! [`WebSocketMessage`]s to the registered [`EventHandlers`].
//!
//! Every connection carries a generation number. Tearing a connection down
//! (explicitly, or by connecting somewhere else) bumps the generation, so a
//! superseded task can never dispatch callbacks.
//!
//! The client does not retry. Reconnect decisions belong to the caller.

// Rust guideline compliant 2026-02

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};

use super::message::WebSocketMessage;
use super::transport::{http_to_ws_scheme, Frame, Transport};
use super::{ConnectionState, Subscription};
use crate::constants::NOTIFICATION_WS_PATH;

/// Called with every decoded message.
pub type MessageHandler = Box<dyn Fn(&WebSocketMessage) + Send + Sync>;
/// Called on every connection state change.
pub type ConnectionChangeHandler = Box<dyn Fn(ConnectionState) + Send + Sync>;
/// Called with a human-readable reason when the connection fails.
pub type ErrorHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Callback set. Unset callbacks are skipped.
#[derive(Default)]
pub struct EventHandlers {
    /// Decoded inbound messages, unknown types included.
    pub on_message: Option<MessageHandler>,
    /// Connection state changes.
    pub on_connection_change: Option<ConnectionChangeHandler>,
    /// Connect or read failures.
    pub on_error: Option<ErrorHandler>,
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_message", &self.on_message.is_some())
            .field("on_connection_change", &self.on_connection_change.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Connection bookkeeping shared with the background task.
#[derive(Debug, Default)]
struct Shared {
    state: ConnectionState,
    subscription: Option<Subscription>,
    generation: u64,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Shared {
    /// Stop the current task (if any) and invalidate its generation.
    fn teardown(&mut self) {
        self.generation += 1;
        self.outgoing = None;
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.state = ConnectionState::Disconnected;
    }
}

/// Client for `{ws_base}/api/v1/ws/notifications`.
pub struct WebSocketClient {
    transport: Arc<dyn Transport>,
    ws_base: String,
    token: Option<String>,
    shared: Arc<Mutex<Shared>>,
    handlers: Arc<Mutex<EventHandlers>>,
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = lock(&self.shared);
        f.debug_struct("WebSocketClient")
            .field("ws_base", &self.ws_base)
            .field("state", &shared.state)
            .field("room", &shared.subscription.as_ref().map(|s| &s.room))
            .finish_non_exhaustive()
    }
}

impl WebSocketClient {
    /// Create a disconnected client.
    ///
    /// `ws_base` may use `http(s)://` or `ws(s)://`. When `token` is set it
    /// is sent as `Authorization: Bearer <token>` on every handshake.
    pub fn new(
        transport: Arc<dyn Transport>,
        ws_base: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            transport,
            ws_base: ws_base.into(),
            token,
            shared: Arc::new(Mutex::new(Shared::default())),
            handlers: Arc::new(Mutex::new(EventHandlers::default())),
        }
    }

    /// Replace the callback set. The last registration wins.
    pub fn set_event_handlers(&self, handlers: EventHandlers) {
        *lock(&self.handlers) = handlers;
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        lock(&self.shared).state
    }

    /// Subscription of the current (or last failed) connection.
    #[must_use]
    pub fn subscription(&self) -> Option<Subscription> {
        lock(&self.shared).subscription.clone()
    }

    /// Connect to the room of `subscription`.
    ///
    /// Returns `false` without doing anything when a connection for the same
    /// user and organization is already connecting or connected. Otherwise
    /// any existing connection is torn down and a new one is started on a
    /// spawned task. Must be called from within a tokio runtime.
    pub fn connect(&self, subscription: Subscription) -> bool {
        let (generation, outgoing_rx, shutdown_rx, room) = {
            let mut shared = lock(&self.shared);

            let same = shared
                .subscription
                .as_ref()
                .is_some_and(|current| current.same_identity(&subscription));
            if same && shared.state.is_live() {
                log::debug!(
                    "[WebSocket] Already {} to {}, skipping connect",
                    shared.state,
                    subscription.room
                );
                return false;
            }

            shared.teardown();

            let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            let room = subscription.room.clone();

            shared.state = ConnectionState::Connecting;
            shared.subscription = Some(subscription);
            shared.outgoing = Some(outgoing_tx);
            shared.shutdown = Some(shutdown_tx);

            (shared.generation, outgoing_rx, shutdown_rx, room)
        };

        log::info!("[WebSocket] Connecting to room {}", room);
        emit_state(&self.handlers, ConnectionState::Connecting);

        let task = ConnectionTask {
            transport: Arc::clone(&self.transport),
            url: notification_url(&self.ws_base, &room),
            headers: self.headers(),
            generation,
            shared: Arc::clone(&self.shared),
            handlers: Arc::clone(&self.handlers),
        };
        tokio::spawn(task.run(outgoing_rx, shutdown_rx));

        true
    }

    /// Tear down the connection, if any.
    ///
    /// Clears the subscription and moves to `Disconnected` without
    /// emitting callbacks.
    pub fn disconnect(&self) {
        let mut shared = lock(&self.shared);
        if shared.subscription.is_none() && shared.shutdown.is_none() {
            return;
        }
        if let Some(sub) = &shared.subscription {
            log::info!("[WebSocket] Disconnecting from room {}", sub.room);
        }
        shared.teardown();
        shared.subscription = None;
    }

    /// Queue a JSON text frame on the open connection.
    pub fn send(&self, value: &serde_json::Value) -> Result<()> {
        let shared = lock(&self.shared);
        if shared.state != ConnectionState::Connected {
            anyhow::bail!("WebSocket is not connected ({})", shared.state);
        }
        let outgoing = shared
            .outgoing
            .as_ref()
            .context("WebSocket has no outgoing channel")?;
        outgoing
            .send(value.to_string())
            .map_err(|_| anyhow::anyhow!("WebSocket connection task has exited"))
    }

    fn headers(&self) -> Vec<(String, String)> {
        self.token
            .iter()
            .map(|token| ("Authorization".to_string(), format!("Bearer {token}")))
            .collect()
    }
}

impl Drop for WebSocketClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Build the channel URL for `room` under `ws_base`.
pub fn notification_url(ws_base: &str, room: &str) -> Result<String> {
    let base = http_to_ws_scheme(ws_base.trim_end_matches('/'));
    let mut url = reqwest::Url::parse(&format!("{base}{NOTIFICATION_WS_PATH}"))
        .with_context(|| format!("invalid WebSocket base URL: {ws_base}"))?;
    url.query_pairs_mut().append_pair("room", room);
    Ok(url.to_string())
}

/// Everything the background task needs for one connection.
struct ConnectionTask {
    transport: Arc<dyn Transport>,
    url: Result<String>,
    headers: Vec<(String, String)>,
    generation: u64,
    shared: Arc<Mutex<Shared>>,
    handlers: Arc<Mutex<EventHandlers>>,
}

impl ConnectionTask {
    async fn run(
        self,
        mut outgoing_rx: mpsc::UnboundedReceiver<String>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let url = match &self.url {
            Ok(url) => url.clone(),
            Err(e) => {
                self.finish(Some(format!("{e:#}")));
                return;
            }
        };

        let opened = tokio::select! {
            result = self.transport.open(&url, &self.headers) => result,
            _ = &mut shutdown_rx => return,
        };

        let (mut sink, mut source) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                self.finish(Some(format!("{e:#}")));
                return;
            }
        };

        if !self.transition(ConnectionState::Connected) {
            let _ = sink.close().await;
            return;
        }
        log::info!("[WebSocket] Connected");
        emit_state(&self.handlers, ConnectionState::Connected);

        let failure = loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    let _ = sink.close().await;
                    return;
                }
                Some(text) = outgoing_rx.recv() => {
                    if let Err(e) = sink.send_text(&text).await {
                        break Some(format!("{e:#}"));
                    }
                }
                frame = source.recv() => match frame {
                    Some(Ok(Frame::Text(text))) => self.dispatch(&text),
                    Some(Ok(Frame::Ping(data))) => {
                        if let Err(e) = sink.send_pong(data).await {
                            log::warn!("[WebSocket] Failed to answer ping: {:#}", e);
                        }
                    }
                    Some(Ok(Frame::Close { code, reason })) => {
                        log::info!("[WebSocket] Server closed connection ({}): {}", code, reason);
                        break None;
                    }
                    Some(Ok(Frame::Binary(_) | Frame::Pong(_))) => {}
                    Some(Err(e)) => break Some(format!("{e:#}")),
                    None => {
                        log::info!("[WebSocket] Stream ended");
                        break None;
                    }
                },
            }
        };

        self.finish(failure);
    }

    /// Move to `state` if this task is still current.
    fn transition(&self, state: ConnectionState) -> bool {
        let mut shared = lock(&self.shared);
        if shared.generation != self.generation {
            return false;
        }
        shared.state = state;
        true
    }

    fn is_current(&self) -> bool {
        lock(&self.shared).generation == self.generation
    }

    /// Mark the connection as gone and report it, unless superseded.
    fn finish(&self, failure: Option<String>) {
        {
            let mut shared = lock(&self.shared);
            if shared.generation != self.generation {
                return;
            }
            shared.state = ConnectionState::Disconnected;
            shared.outgoing = None;
            shared.shutdown = None;
        }

        if let Some(reason) = &failure {
            log::warn!("[WebSocket] Connection failed: {}", reason);
            let handlers = lock(&self.handlers);
            if let Some(on_error) = &handlers.on_error {
                on_error(reason);
            }
        }
        emit_state(&self.handlers, ConnectionState::Disconnected);
    }

    fn dispatch(&self, text: &str) {
        let message = match WebSocketMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("[WebSocket] Dropping unparseable frame: {}", e);
                return;
            }
        };

        if !self.is_current() {
            return;
        }

        log::debug!("[WebSocket] Received {}", message.kind());
        let handlers = lock(&self.handlers);
        if let Some(on_message) = &handlers.on_message {
            on_message(&message);
        }
    }
}

fn emit_state(handlers: &Mutex<EventHandlers>, state: ConnectionState) {
    let handlers = lock(handlers);
    if let Some(on_change) = &handlers.on_connection_change {
        on_change(state);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::transport::{ScriptedConnection, ScriptedTransport};
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum Event {
        Message(String),
        State(ConnectionState),
        Error(String),
    }

    fn client() -> (
        WebSocketClient,
        ScriptedTransport,
        mpsc::UnboundedReceiver<ScriptedConnection>,
        mpsc::UnboundedReceiver<Event>,
    ) {
        let (transport, connections) = ScriptedTransport::new();
        let client = WebSocketClient::new(
            Arc::new(transport.clone()),
            "https://tms.example.com/",
            Some("tok".into()),
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let (tx_msg, tx_state, tx_err) = (tx.clone(), tx.clone(), tx);
        client.set_event_handlers(EventHandlers {
            on_message: Some(Box::new(move |m: &WebSocketMessage| {
                let _ = tx_msg.send(Event::Message(m.kind().to_string()));
            })),
            on_connection_change: Some(Box::new(move |s: ConnectionState| {
                let _ = tx_state.send(Event::State(s));
            })),
            on_error: Some(Box::new(move |e: &str| {
                let _ = tx_err.send(Event::Error(e.to_string()));
            })),
        });

        (client, transport, connections, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn assert_quiet(rx: &mut mpsc::UnboundedReceiver<Event>) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_notification_url() {
        assert_eq!(
            notification_url("https://tms.example.com/", "org_o_user_u").unwrap(),
            "wss://tms.example.com/api/v1/ws/notifications?room=org_o_user_u"
        );
        assert_eq!(
            notification_url("http://localhost:3001", "r").unwrap(),
            "ws://localhost:3001/api/v1/ws/notifications?room=r"
        );
        assert!(notification_url("not a url", "r").is_err());
    }

    #[tokio::test]
    async fn test_connect_opens_with_auth_header() {
        let (client, _transport, mut connections, mut events) = client();

        assert!(client.connect(Subscription::new("u1", "o1", "bu1")));
        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Connecting));

        let conn = connections.recv().await.unwrap();
        assert_eq!(
            conn.url,
            "wss://tms.example.com/api/v1/ws/notifications?room=org_o1_user_u1"
        );
        assert_eq!(
            conn.headers,
            vec![("Authorization".to_string(), "Bearer tok".to_string())]
        );

        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Connected));
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_connect_same_identity_is_noop() {
        let (client, transport, mut connections, mut events) = client();

        assert!(client.connect(Subscription::new("u1", "o1", "bu1")));
        assert!(!client.connect(Subscription::new("u1", "o1", "bu1")));

        let _conn = connections.recv().await.unwrap();
        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Connecting));
        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Connected));

        assert!(!client.connect(Subscription::new("u1", "o1", "bu2")));
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn test_messages_are_dispatched() {
        let (client, _transport, mut connections, mut events) = client();
        client.connect(Subscription::new("u1", "o1", "bu1"));
        let conn = connections.recv().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;

        let frame = json!({"type": "notification", "data": {"id": "n1", "title": "t", "message": "m"}});
        conn.frames.send(Ok(Frame::Text(frame.to_string()))).unwrap();
        conn.frames
            .send(Ok(Frame::Text(r#"{"type":"presence","data":{}}"#.into())))
            .unwrap();
        conn.frames.send(Ok(Frame::Text("garbage".into()))).unwrap();

        assert_eq!(next(&mut events).await, Event::Message("notification".into()));
        assert_eq!(next(&mut events).await, Event::Message("presence".into()));
        assert_quiet(&mut events).await;
    }

    #[tokio::test]
    async fn test_server_close_moves_to_disconnected() {
        let (client, _transport, mut connections, mut events) = client();
        client.connect(Subscription::new("u1", "o1", "bu1"));
        let conn = connections.recv().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;

        conn.frames
            .send(Ok(Frame::Close {
                code: 1000,
                reason: "bye".into(),
            }))
            .unwrap();

        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Disconnected));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        // Subscription is kept so the caller can reconnect
        assert!(client.subscription().is_some());
    }

    #[tokio::test]
    async fn test_read_error_reports_and_disconnects() {
        let (client, _transport, mut connections, mut events) = client();
        client.connect(Subscription::new("u1", "o1", "bu1"));
        let conn = connections.recv().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;

        conn.frames.send(Err(anyhow::anyhow!("reset by peer"))).unwrap();

        assert_eq!(next(&mut events).await, Event::Error("reset by peer".into()));
        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Disconnected));
    }

    #[tokio::test]
    async fn test_open_failure_reports_error() {
        let (client, transport, _connections, mut events) = client();
        transport.fail_next_open("connection refused");

        client.connect(Subscription::new("u1", "o1", "bu1"));

        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Connecting));
        assert_eq!(next(&mut events).await, Event::Error("connection refused".into()));
        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Disconnected));

        // A failed connection is not live, so the same identity may retry
        assert!(client.connect(Subscription::new("u1", "o1", "bu1")));
    }

    #[tokio::test]
    async fn test_disconnect_is_silent() {
        let (client, _transport, mut connections, mut events) = client();
        client.connect(Subscription::new("u1", "o1", "bu1"));
        let conn = connections.recv().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(client.subscription().is_none());

        let _ = conn
            .frames
            .send(Ok(Frame::Text(r#"{"type":"connection_confirmed"}"#.into())));
        assert_quiet(&mut events).await;
    }

    #[tokio::test]
    async fn test_new_identity_supersedes_old_connection() {
        let (client, transport, mut connections, mut events) = client();
        client.connect(Subscription::new("u1", "o1", "bu1"));
        let old = connections.recv().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;

        assert!(client.connect(Subscription::new("u1", "o2", "bu1")));
        let new = connections.recv().await.unwrap();
        assert!(new.url.ends_with("room=org_o2_user_u1"));
        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Connecting));
        assert_eq!(next(&mut events).await, Event::State(ConnectionState::Connected));

        let _ = old
            .frames
            .send(Ok(Frame::Text(r#"{"type":"connection_confirmed"}"#.into())));
        assert_quiet(&mut events).await;
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let (client, _transport, mut connections, mut events) = client();
        assert!(client.send(&json!({"type": "ping"})).is_err());

        client.connect(Subscription::new("u1", "o1", "bu1"));
        let mut conn = connections.recv().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;

        client.send(&json!({"type": "ping"})).unwrap();
        assert_eq!(conn.sent.recv().await.unwrap(), r#"{"type":"ping"}"#);
    }
}
