//! Inbound notification channel frames.
//!
//! Frames are JSON objects `{ "type": ..., "data": ..., "timestamp"?: ... }`.
//! Known `type`s are decoded into typed payloads; everything else is kept
//! as [`WebSocketMessage::Unknown`] so newer servers do not break older
//! clients.

use serde::{Deserialize, Serialize};

/// Notification priority assigned by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational.
    Low,
    /// Default.
    #[default]
    Medium,
    /// Status changes and similar.
    High,
    /// Compliance and other must-see events.
    Critical,
}

impl Priority {
    /// Whether a notification of this priority should stay until acted on.
    #[must_use]
    pub fn requires_interaction(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// Payload of a `notification` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Server id, used for duplicate suppression.
    #[serde(default)]
    pub id: Option<String>,
    /// Title line.
    #[serde(default)]
    pub title: String,
    /// Body text.
    #[serde(default)]
    pub message: String,
    /// Server-assigned priority.
    #[serde(default)]
    pub priority: Option<Priority>,
    /// Event kind, e.g. `shipment.updated`.
    #[serde(default)]
    pub event_type: Option<String>,
    /// Free-form payload (may carry `entityType` / `entityId`).
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Creation time, unix seconds.
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl NotificationPayload {
    /// Application path of the related entity, if the payload names one.
    #[must_use]
    pub fn entity_path(&self) -> Option<String> {
        let data = self.data.as_ref()?;
        let entity_type = data.get("entityType")?.as_str()?;
        let entity_id = data.get("entityId")?.as_str()?;
        Some(entity_path(entity_type, entity_id))
    }
}

/// Payload of an `entity_update_notification` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityUpdatePayload {
    /// Server id, if any.
    #[serde(default)]
    pub id: Option<String>,
    /// Entity kind, e.g. `shipments`.
    pub entity_type: String,
    /// Entity id.
    pub entity_id: String,
    /// Title line.
    #[serde(default)]
    pub title: Option<String>,
    /// Body text.
    #[serde(default)]
    pub message: Option<String>,
    /// Display name of whoever made the change.
    #[serde(default)]
    pub updated_by: Option<String>,
    /// Kind of change, e.g. `status_change`.
    #[serde(default)]
    pub update_type: Option<String>,
}

impl EntityUpdatePayload {
    /// Application path of the updated entity.
    #[must_use]
    pub fn path(&self) -> String {
        entity_path(&self.entity_type, &self.entity_id)
    }
}

/// Payload of an `error` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable description.
    pub message: String,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum WebSocketMessage {
    /// User-facing notification.
    Notification(NotificationPayload),
    /// An entity the user follows changed.
    EntityUpdate(EntityUpdatePayload),
    /// The server accepted the subscription.
    ConnectionConfirmed(serde_json::Value),
    /// Server-reported error.
    Error(ErrorPayload),
    /// Any other (or malformed) frame, passed through untouched.
    Unknown {
        /// Value of the `type` field.
        kind: String,
        /// Raw `data` payload.
        data: serde_json::Value,
    },
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl WebSocketMessage {
    /// Decode a text frame.
    ///
    /// Fails only when the frame is not a JSON object with a string `type`.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let raw: RawFrame = serde_json::from_str(text)?;
        Ok(Self::from_parts(raw.kind, raw.data))
    }

    fn from_parts(kind: String, data: serde_json::Value) -> Self {
        let decoded = match kind.as_str() {
            "notification" => Some(serde_json::from_value(data.clone()).map(Self::Notification)),
            "entity_update_notification" => {
                Some(serde_json::from_value(data.clone()).map(Self::EntityUpdate))
            }
            "connection_confirmed" => return Self::ConnectionConfirmed(data),
            "error" => return Self::Error(error_payload(&data)),
            _ => None,
        };

        match decoded {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                log::warn!("[WebSocket] Malformed '{}' payload, passing through: {}", kind, e);
                Self::Unknown { kind, data }
            }
            None => Self::Unknown { kind, data },
        }
    }

    /// The frame's `type` tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Notification(_) => "notification",
            Self::EntityUpdate(_) => "entity_update_notification",
            Self::ConnectionConfirmed(_) => "connection_confirmed",
            Self::Error(_) => "error",
            Self::Unknown { kind, .. } => kind,
        }
    }
}

fn error_payload(data: &serde_json::Value) -> ErrorPayload {
    let message = match data {
        serde_json::Value::String(s) => s.clone(),
        other => other
            .get("message")
            .and_then(|m| m.as_str())
            .map_or_else(|| other.to_string(), str::to_string),
    };
    ErrorPayload { message }
}

/// Application path for an entity.
///
/// Each segment is percent-encoded, so server values containing `/`, `?`
/// or `#` stay inside their segment.
#[must_use]
pub fn entity_path(entity_type: &str, entity_id: &str) -> String {
    let Ok(mut url) = reqwest::Url::parse("http://app.invalid/") else {
        return format!("/{entity_type}/{entity_id}");
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(entity_type).push(entity_id);
    }
    url.path().to_string()
}
