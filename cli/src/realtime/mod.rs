//! Real-time notification channel.
//!
//! One WebSocket connection per session, bound to a per-user room on the
//! TMS backend.
//!
//! # Architecture
//!
//! ```text
//!   NotificationSession (owns ReconnectPolicy)
//!         │ connect(subscription) / disconnect()
//!         ▼
//!   WebSocketClient ──spawn──► connection task
//!         │                        │  Transport::open(url, headers)
//!         │                        ▼
//!         │                  FrameSource / FrameSink
//!         │                        │
//!         ◄── EventHandlers ───────┘  on_message / on_connection_change / on_error
//! ```
//!
//! The client never retries on its own; the session decides when to
//! reconnect.

// Rust guideline compliant 2026-02

pub mod client;
pub mod message;
pub mod reconnect;
pub mod transport;

pub use client::{EventHandlers, WebSocketClient};
pub use message::WebSocketMessage;
pub use reconnect::ReconnectPolicy;
pub use transport::{Frame, FrameSink, FrameSource, Transport, TungsteniteTransport};

/// The room a connection is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    /// Authenticated user.
    pub user_id: String,
    /// User's current organization.
    pub organization_id: String,
    /// Organization's business unit.
    pub business_unit_id: String,
    /// Server-side room name.
    pub room: String,
}

impl Subscription {
    /// Build a subscription and derive its room name.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        organization_id: impl Into<String>,
        business_unit_id: impl Into<String>,
    ) -> Self {
        let user_id = user_id.into();
        let organization_id = organization_id.into();
        let room = room_name(&organization_id, &user_id);
        Self {
            user_id,
            organization_id,
            business_unit_id: business_unit_id.into(),
            room,
        }
    }

    /// Whether `other` targets the same user in the same organization.
    ///
    /// This is the identity used for idempotent connects.
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        self.user_id == other.user_id && self.organization_id == other.organization_id
    }
}

/// Room name for a user inside an organization.
#[must_use]
pub fn room_name(organization_id: &str, user_id: &str) -> String {
    format!("org_{organization_id}_user_{user_id}")
}

/// Connection state of the notification channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Transport handshake in progress.
    Connecting,
    /// Transport open.
    Connected,
}

impl ConnectionState {
    /// Whether a connection is open or being opened.
    #[must_use]
    pub fn is_live(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_format() {
        assert_eq!(room_name("org1", "usr1"), "org_org1_user_usr1");
    }

    #[test]
    fn test_subscription_derives_room() {
        let sub = Subscription::new("usr_1", "org_9", "bu_3");
        assert_eq!(sub.room, "org_org_9_user_usr_1");
        assert_eq!(sub.business_unit_id, "bu_3");
    }

    #[test]
    fn test_same_identity_ignores_business_unit() {
        let a = Subscription::new("u", "o", "bu1");
        let b = Subscription::new("u", "o", "bu2");
        let c = Subscription::new("u", "other", "bu1");
        assert!(a.same_identity(&b));
        assert!(!a.same_identity(&c));
    }

    #[test]
    fn test_connection_state_liveness() {
        assert!(ConnectionState::Connecting.is_live());
        assert!(ConnectionState::Connected.is_live());
        assert!(!ConnectionState::Disconnected.is_live());
        assert_eq!(ConnectionState::Connected.to_string(), "connected");
    }
}
