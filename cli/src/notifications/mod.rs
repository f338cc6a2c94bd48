//! Desktop notification delivery.
//!
//! Turns notification requests into OS-level notifications while
//! respecting platform permission, the user's opt-in, and a rate limit.
//!
//! # Architecture
//!
//! ```text
//! show_notification(config)
//!     ↓  gate: supported + granted + enabled + app hidden
//! NotificationQueue (bounded FIFO, oldest dropped)
//!     ↓  drain while RateLimiter has capacity
//! NotificationPlatform::show()
//!     ↓  Shown / Clicked / Closed / Failed
//! NotificationGateway::handle_native_event() → item callbacks
//! ```
//!
//! The platform is injected: [`terminal::TerminalPlatform`] writes OSC
//! escape sequences to the controlling terminal, and
//! [`platform::RecordingPlatform`] records calls for tests.

// Rust guideline compliant 2026-02

pub mod gateway;
pub mod platform;
pub mod queue;
pub mod rate_limit;
pub mod terminal;

use serde::{Deserialize, Serialize};

pub use gateway::{GatewayConfig, NotificationGateway};
pub use platform::{NativeEvent, NativeEventKind, NotificationPlatform};

/// Identifier of a queued or displayed notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NotificationId(pub String);

impl NotificationId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Platform notification permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    /// The user has not been asked yet.
    #[default]
    Default,
    /// The user refused. Platforms do not allow asking again.
    Denied,
    /// The user allowed notifications.
    Granted,
}

impl PermissionState {
    /// Returns the lowercase name used in persisted state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Denied => "denied",
            Self::Granted => "granted",
        }
    }

    /// Parse a persisted name, falling back to `Default`.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "granted" => Self::Granted,
            "denied" => Self::Denied,
            _ => Self::Default,
        }
    }
}

impl std::fmt::Display for PermissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation options for a native notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationOptions {
    /// Body text.
    pub body: Option<String>,
    /// Icon URL or path.
    pub icon: Option<String>,
    /// Replacement tag. Also used as the notification id when set.
    pub tag: Option<String>,
    /// Keep the notification on screen until the user acts on it.
    pub require_interaction: bool,
    /// Suppress sound.
    pub silent: bool,
    /// Arbitrary payload carried back to callbacks.
    pub data: Option<serde_json::Value>,
}

/// Callback invoked with the notification id.
pub type NotificationCallback = Box<dyn FnMut(&NotificationId) + Send>;

/// Callback invoked with the notification id and an error description.
pub type NotificationErrorCallback = Box<dyn FnMut(&NotificationId, &str) + Send>;

/// Lifecycle callbacks attached to one notification.
#[derive(Default)]
pub struct NotificationCallbacks {
    /// The user clicked the notification.
    pub on_click: Option<NotificationCallback>,
    /// The notification was closed.
    pub on_close: Option<NotificationCallback>,
    /// Construction or display failed.
    pub on_error: Option<NotificationErrorCallback>,
    /// The notification became visible.
    pub on_show: Option<NotificationCallback>,
}

impl std::fmt::Debug for NotificationCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCallbacks")
            .field("on_click", &self.on_click.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_show", &self.on_show.is_some())
            .finish()
    }
}

/// A request to show one notification.
#[derive(Debug, Default)]
pub struct NotificationConfig {
    /// Title line.
    pub title: String,
    /// Presentation options.
    pub options: NotificationOptions,
    /// Lifecycle callbacks.
    pub callbacks: NotificationCallbacks,
}

impl NotificationConfig {
    /// Create a request with a title and body and no callbacks.
    #[must_use]
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            options: NotificationOptions {
                body: Some(body.into()),
                ..NotificationOptions::default()
            },
            callbacks: NotificationCallbacks::default(),
        }
    }

    /// Set the replacement tag (and therefore the id).
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.options.tag = Some(tag.into());
        self
    }

    /// Set the click callback.
    pub fn on_click(mut self, f: impl FnMut(&NotificationId) + Send + 'static) -> Self {
        self.callbacks.on_click = Some(Box::new(f));
        self
    }

    /// Set the close callback.
    pub fn on_close(mut self, f: impl FnMut(&NotificationId) + Send + 'static) -> Self {
        self.callbacks.on_close = Some(Box::new(f));
        self
    }

    /// Set the error callback.
    pub fn on_error(mut self, f: impl FnMut(&NotificationId, &str) + Send + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    /// Set the show callback.
    pub fn on_show(mut self, f: impl FnMut(&NotificationId) + Send + 'static) -> Self {
        self.callbacks.on_show = Some(Box::new(f));
        self
    }
}
