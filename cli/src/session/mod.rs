//! Notification session: binds auth state to the notification channel.
//!
//! [`NotificationSession`] owns the [`WebSocketClient`], the
//! [`NotificationGateway`] and the reconnect policy. It routes every
//! inbound message to the in-app store, to a native notification (or a
//! toast when native delivery is declined) and to external callbacks.
//!
//! # Event loop
//!
//! [`NotificationSession::run`] is a single task selecting over:
//!
//! ```text
//!   auth watch ─────────┐
//!   visibility watch ───┤
//!   native events ──────┤
//!   client events ──────┼──► NotificationSession ──► gateway / store / shell
//!   reconnect timer ────┤
//!   rate-limit wake ────┤
//!   cancellation ───────┘
//! ```
//!
//! Client callbacks only forward into an mpsc channel, so all state is
//! mutated from the loop.

// Rust guideline compliant 2026-02

pub mod dedup;
pub mod shell;
pub mod store;

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub use crate::api::AuthState;
use crate::constants::{DEDUP_CAPACITY, NOTIFICATION_STORE_CAPACITY};
use crate::notifications::{NativeEvent, NotificationConfig, NotificationGateway};
use crate::realtime::message::{EntityUpdatePayload, NotificationPayload, Priority};
use crate::realtime::{
    ConnectionState, EventHandlers, ReconnectPolicy, Subscription, WebSocketClient,
    WebSocketMessage,
};
use dedup::SeenIds;
use shell::{AppShell, Toast, ToastAction, ToastLevel};
use store::{entity_update_title, NotificationStore, StoredNotification};

/// Event forwarded from the client's callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Decoded inbound message.
    Message(WebSocketMessage),
    /// Client connection state changed.
    ConnectionChange(ConnectionState),
    /// Client reported a failure.
    Error(String),
}

/// Session tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Recently seen notification ids kept for duplicate suppression.
    pub dedup_capacity: usize,
    /// Entries kept in the notification store.
    pub store_capacity: usize,
    /// Backoff for unexpected disconnects.
    pub reconnect: ReconnectPolicy,
    /// Whether the session should connect at all.
    pub enabled: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: DEDUP_CAPACITY,
            store_capacity: NOTIFICATION_STORE_CAPACITY,
            reconnect: ReconnectPolicy::default(),
            enabled: true,
        }
    }
}

/// Inputs consumed by [`NotificationSession::run`].
#[derive(Debug)]
pub struct SessionInputs {
    /// Latest resolved auth state.
    pub auth: watch::Receiver<AuthState>,
    /// Application visibility (true = foreground).
    pub visibility: watch::Receiver<bool>,
    /// Lifecycle events from the notification platform.
    pub native_events: mpsc::UnboundedReceiver<NativeEvent>,
    /// Signalled when persisted permission or opt-in may have changed
    /// outside this process.
    pub preference_changes: mpsc::UnboundedReceiver<()>,
}

/// External message callback.
pub type SessionMessageCallback = Box<dyn FnMut(&WebSocketMessage) + Send>;
/// External connection state callback.
pub type SessionStateCallback = Box<dyn FnMut(ConnectionState) + Send>;
/// External error callback.
pub type SessionErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Composition root for real-time notifications.
pub struct NotificationSession {
    client: WebSocketClient,
    gateway: NotificationGateway,
    shell: Arc<dyn AppShell>,
    auth: AuthState,
    enabled: bool,
    seen: SeenIds,
    store: NotificationStore,
    reconnect: ReconnectPolicy,
    reconnect_at: Option<Instant>,
    state: ConnectionState,
    last_error: Option<String>,
    events_rx: Option<mpsc::UnboundedReceiver<ClientEvent>>,
    on_message: Option<SessionMessageCallback>,
    on_connection_change: Option<SessionStateCallback>,
    on_error: Option<SessionErrorCallback>,
}

impl std::fmt::Debug for NotificationSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSession")
            .field("state", &self.state)
            .field("enabled", &self.enabled)
            .field("authenticated", &self.auth.authenticated)
            .field("reconnect_attempts", &self.reconnect.attempts())
            .field("stored", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl NotificationSession {
    /// Wire a session around `client` and `gateway`.
    ///
    /// Replaces the client's event handlers.
    pub fn new(
        client: WebSocketClient,
        gateway: NotificationGateway,
        shell: Arc<dyn AppShell>,
        config: SessionConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx_msg, tx_state, tx_err) = (events_tx.clone(), events_tx.clone(), events_tx);

        client.set_event_handlers(EventHandlers {
            on_message: Some(Box::new(move |message: &WebSocketMessage| {
                let _ = tx_msg.send(ClientEvent::Message(message.clone()));
            })),
            on_connection_change: Some(Box::new(move |state: ConnectionState| {
                let _ = tx_state.send(ClientEvent::ConnectionChange(state));
            })),
            on_error: Some(Box::new(move |error: &str| {
                let _ = tx_err.send(ClientEvent::Error(error.to_string()));
            })),
        });

        Self {
            client,
            gateway,
            shell,
            auth: AuthState::unauthenticated(),
            enabled: config.enabled,
            seen: SeenIds::new(config.dedup_capacity),
            store: NotificationStore::new(config.store_capacity),
            reconnect: config.reconnect,
            reconnect_at: None,
            state: ConnectionState::Disconnected,
            last_error: None,
            events_rx: Some(events_rx),
            on_message: None,
            on_connection_change: None,
            on_error: None,
        }
    }

    /// Forward every inbound message (unknown types included).
    pub fn set_on_message(&mut self, f: impl FnMut(&WebSocketMessage) + Send + 'static) {
        self.on_message = Some(Box::new(f));
    }

    /// Forward connection state changes.
    pub fn set_on_connection_change(&mut self, f: impl FnMut(ConnectionState) + Send + 'static) {
        self.on_connection_change = Some(Box::new(f));
    }

    /// Forward connection errors.
    pub fn set_on_error(&mut self, f: impl FnMut(&str) + Send + 'static) {
        self.on_error = Some(Box::new(f));
    }

    /// Session view of the connection.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.state
    }

    /// Last error reported by the server or the transport.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Current auth state.
    #[must_use]
    pub fn auth(&self) -> &AuthState {
        &self.auth
    }

    /// Whether the session is allowed to connect.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Received notifications.
    #[must_use]
    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    /// Received notifications, mutable (read markers, dismissals).
    pub fn store_mut(&mut self) -> &mut NotificationStore {
        &mut self.store
    }

    /// The notification gateway.
    #[must_use]
    pub fn gateway(&self) -> &NotificationGateway {
        &self.gateway
    }

    /// The notification gateway, mutable (enable / disable).
    pub fn gateway_mut(&mut self) -> &mut NotificationGateway {
        &mut self.gateway
    }

    /// The underlying client.
    #[must_use]
    pub fn client(&self) -> &WebSocketClient {
        &self.client
    }

    /// When the pending reconnect fires, if one is scheduled.
    #[must_use]
    pub fn reconnect_pending(&self) -> Option<Instant> {
        self.reconnect_at
    }

    /// Consecutive reconnect attempts since the last confirmed connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    /// Subscription for the current auth state, if it is fully resolved.
    #[must_use]
    pub fn create_subscription(&self) -> Option<Subscription> {
        self.auth.subscription()
    }

    /// Replace the auth state and reconcile the connection.
    pub fn update_auth(&mut self, auth: AuthState) {
        if auth != self.auth {
            // A new identity gets a fresh retry budget
            self.reconnect.reset();
            self.auth = auth;
        }
        self.reconcile();
    }

    /// Turn the session on or off and reconcile the connection.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.reconcile();
    }

    /// Connect if everything needed is present, otherwise disconnect.
    ///
    /// Connecting with the identity already live is a no-op.
    pub fn reconcile(&mut self) {
        let target = if self.enabled {
            self.create_subscription()
        } else {
            None
        };

        match target {
            Some(subscription) => {
                if self.client.connect(subscription) {
                    self.reconnect_at = None;
                }
            }
            None => {
                if self.client.subscription().is_some() {
                    log::info!("[Session] Auth incomplete or disabled, disconnecting");
                }
                self.client.disconnect();
                self.reconnect_at = None;
                self.set_state(ConnectionState::Disconnected);
            }
        }
    }

    /// Route one inbound message.
    pub fn handle_message(&mut self, message: WebSocketMessage) {
        match &message {
            WebSocketMessage::Notification(payload) => self.route_notification(payload),
            WebSocketMessage::EntityUpdate(payload) => self.route_entity_update(payload),
            WebSocketMessage::ConnectionConfirmed(_) => {
                log::info!("[Session] Subscription confirmed");
                self.reconnect.reset();
                self.set_state(ConnectionState::Connected);
            }
            WebSocketMessage::Error(payload) => {
                log::warn!("[Session] Server error: {}", payload.message);
                self.last_error = Some(payload.message.clone());
            }
            WebSocketMessage::Unknown { kind, .. } => {
                log::debug!("[Session] Ignoring '{}' message", kind);
            }
        }

        if let Some(on_message) = self.on_message.as_mut() {
            on_message(&message);
        }
    }

    /// Apply one event forwarded from the client.
    pub fn handle_client_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Message(message) => self.handle_message(message),
            ClientEvent::ConnectionChange(state) => {
                // Stale report from a connection that has since been replaced
                if state == ConnectionState::Disconnected && self.client.state().is_live() {
                    return;
                }
                self.set_state(state);
                match state {
                    // An open transport ends the failure streak; the server
                    // may never send connection_confirmed
                    ConnectionState::Connected => self.reconnect.reset(),
                    ConnectionState::Disconnected => self.schedule_reconnect(),
                    ConnectionState::Connecting => {}
                }
            }
            ClientEvent::Error(error) => {
                self.last_error = Some(error.clone());
                if let Some(on_error) = self.on_error.as_mut() {
                    on_error(&error);
                }
            }
        }
    }

    /// Apply every client event queued so far. Returns how many were handled.
    ///
    /// Used when driving the session without [`run`](Self::run).
    pub fn drain_client_events(&mut self) -> usize {
        let Some(mut rx) = self.events_rx.take() else {
            return 0;
        };
        let mut handled = 0;
        while let Ok(event) = rx.try_recv() {
            self.handle_client_event(event);
            handled += 1;
        }
        self.events_rx = Some(rx);
        handled
    }

    /// Run until `cancel` fires, then disconnect.
    pub async fn run(&mut self, mut inputs: SessionInputs, cancel: CancellationToken) {
        let Some(mut client_events) = self.events_rx.take() else {
            log::warn!("[Session] Event loop already running");
            return;
        };

        let initial = inputs.auth.borrow_and_update().clone();
        self.update_auth(initial);

        let mut auth_open = true;
        let mut visibility_open = true;

        loop {
            let reconnect_at = self.reconnect_at;
            let drain_at = self.gateway.next_drain_at().map(Instant::from_std);

            tokio::select! {
                () = cancel.cancelled() => {
                    log::info!("[Session] Shutting down");
                    break;
                }
                changed = inputs.auth.changed(), if auth_open => {
                    if changed.is_ok() {
                        let auth = inputs.auth.borrow_and_update().clone();
                        self.update_auth(auth);
                    } else {
                        auth_open = false;
                    }
                }
                changed = inputs.visibility.changed(), if visibility_open => {
                    if changed.is_ok() {
                        let visible = *inputs.visibility.borrow_and_update();
                        log::debug!("[Session] Application visible: {}", visible);
                        self.gateway.handle_visibility_change();
                    } else {
                        visibility_open = false;
                    }
                }
                Some(event) = inputs.native_events.recv() => {
                    self.gateway.handle_native_event(event);
                }
                Some(()) = inputs.preference_changes.recv() => {
                    self.gateway.reload_preferences();
                }
                Some(event) = client_events.recv() => {
                    self.handle_client_event(event);
                }
                () = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if reconnect_at.is_some() =>
                {
                    self.reconnect_at = None;
                    log::info!(
                        "[Session] Reconnecting (attempt {})",
                        self.reconnect.attempts()
                    );
                    self.reconcile();
                }
                () = tokio::time::sleep_until(drain_at.unwrap_or_else(Instant::now)),
                    if drain_at.is_some() =>
                {
                    self.gateway.process_queue();
                }
            }
        }

        self.shutdown();
        self.events_rx = Some(client_events);
    }

    /// Disconnect and drop any pending reconnect.
    pub fn shutdown(&mut self) {
        self.client.disconnect();
        self.reconnect_at = None;
        self.set_state(ConnectionState::Disconnected);
    }

    fn route_notification(&mut self, payload: &NotificationPayload) {
        if let Some(id) = &payload.id {
            if !self.seen.insert(id) {
                log::debug!("[Session] Dropping duplicate notification {}", id);
                return;
            }
        }

        self.store.add(StoredNotification::from_notification(payload));

        let priority = payload.priority.unwrap_or_default();
        let link = payload.entity_path();

        let mut config = NotificationConfig::new(payload.title.clone(), payload.message.clone());
        config.options.tag = payload.id.clone();
        config.options.require_interaction = priority.requires_interaction();
        config.options.data = payload.data.clone();
        if let Some(path) = link.clone() {
            let shell = Arc::clone(&self.shell);
            config = config.on_click(move |_| shell.navigate(&path));
        }

        if self.gateway.show_notification(config).is_none() {
            self.shell.toast(&Toast {
                title: payload.title.clone(),
                description: non_empty(&payload.message),
                level: toast_level(priority),
                action: link.map(|path| ToastAction {
                    label: "View".to_string(),
                    path,
                }),
            });
        }
    }

    fn route_entity_update(&mut self, payload: &EntityUpdatePayload) {
        self.store.add(StoredNotification::from_entity_update(payload));
        self.shell.toast(&Toast {
            title: entity_update_title(payload),
            description: payload.message.as_deref().and_then(non_empty),
            level: ToastLevel::Info,
            action: Some(ToastAction {
                label: "View".to_string(),
                path: payload.path(),
            }),
        });
    }

    fn schedule_reconnect(&mut self) {
        if !self.enabled || self.create_subscription().is_none() {
            return;
        }
        if self.reconnect_at.is_some() {
            return;
        }

        match self.reconnect.next_delay() {
            Some(delay) => {
                log::info!(
                    "[Session] Connection lost, reconnecting in {:.1}s",
                    delay.as_secs_f32()
                );
                self.reconnect_at = Some(Instant::now() + delay);
            }
            None => {
                log::warn!(
                    "[Session] Giving up after {} reconnect attempts",
                    self.reconnect.attempts()
                );
            }
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        log::debug!("[Session] Connection {} -> {}", self.state, state);
        self.state = state;
        if let Some(on_change) = self.on_connection_change.as_mut() {
            on_change(state);
        }
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.client.disconnect();
    }
}

fn toast_level(priority: Priority) -> ToastLevel {
    match priority {
        Priority::Critical => ToastLevel::Error,
        Priority::High => ToastLevel::Warning,
        Priority::Medium | Priority::Low => ToastLevel::Info,
    }
}

fn non_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
