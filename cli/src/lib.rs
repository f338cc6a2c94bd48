//! TMS real-time notifications.
//!
//! Keeps one WebSocket subscription per signed-in user and turns server
//! pushes into desktop notifications, in-app toasts and a local
//! notification list.
//!
//! # Architecture
//!
//! - **Session** - Composition root, binds auth to the channel, routes messages
//! - **Realtime** - WebSocket client, frame decoding, reconnect backoff
//! - **Notifications** - Permission, opt-in, rate limit and queue in front of the platform
//! - **Api** - REST lookups for the current user and organization
//!
//! # Modules
//!
//! - [`session`] - Notification session and its event loop
//! - [`realtime`] - WebSocket client and transport seam
//! - [`notifications`] - Notification gateway and platforms
//! - [`api`] - TMS REST client
//! - [`config`] - Configuration loading/saving
//! - [`settings_watcher`] - Picks up preference changes made by other processes

// Library modules
pub mod api;
pub mod clock;
pub mod config;
pub mod constants;
pub mod env;
pub mod notifications;
pub mod realtime;
pub mod session;
pub mod settings_watcher;
pub mod storage;

// Re-export commonly used types
pub use api::{ApiClient, AuthState};
pub use config::Config;
pub use notifications::{NotificationConfig, NotificationGateway};
pub use realtime::{ConnectionState, Subscription, WebSocketClient, WebSocketMessage};
pub use session::{NotificationSession, SessionConfig, SessionInputs};

/// In-process doubles for every injected seam.
pub mod testing {
    pub use crate::clock::ManualClock;
    pub use crate::notifications::platform::{RecordingPlatform, ShownNotification};
    pub use crate::realtime::transport::{ScriptedConnection, ScriptedTransport};
    pub use crate::session::shell::RecordingShell;
    pub use crate::storage::MemoryStore;
}
