//! Client-side list of received notifications.
//!
//! Newest first, bounded. Backs unread counters and the notification
//! list in the host application.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constants::NOTIFICATION_STORE_CAPACITY;
use crate::realtime::message::{EntityUpdatePayload, NotificationPayload, Priority};

/// What produced a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoredKind {
    /// A `notification` frame.
    Notification,
    /// An `entity_update_notification` frame.
    EntityUpdate,
}

/// One received notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredNotification {
    /// Server id, or a generated one when the server sent none.
    pub id: String,
    /// Source frame kind.
    pub kind: StoredKind,
    /// Title line.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Server priority.
    pub priority: Priority,
    /// Application path of the related entity.
    pub link: Option<String>,
    /// When the client received it.
    pub received_at: DateTime<Utc>,
    /// Whether the user has seen it.
    pub read: bool,
}

impl StoredNotification {
    /// Entry for a `notification` frame.
    #[must_use]
    pub fn from_notification(payload: &NotificationPayload) -> Self {
        Self {
            id: payload
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            kind: StoredKind::Notification,
            title: payload.title.clone(),
            message: payload.message.clone(),
            priority: payload.priority.unwrap_or_default(),
            link: payload.entity_path(),
            received_at: Utc::now(),
            read: false,
        }
    }

    /// Entry for an `entity_update_notification` frame.
    #[must_use]
    pub fn from_entity_update(payload: &EntityUpdatePayload) -> Self {
        Self {
            id: payload
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            kind: StoredKind::EntityUpdate,
            title: entity_update_title(payload),
            message: payload.message.clone().unwrap_or_default(),
            priority: Priority::default(),
            link: Some(payload.path()),
            received_at: Utc::now(),
            read: false,
        }
    }
}

/// Title for an entity update, falling back to a generated one.
#[must_use]
pub fn entity_update_title(payload: &EntityUpdatePayload) -> String {
    payload.title.clone().unwrap_or_else(|| match &payload.updated_by {
        Some(who) => format!("{} {} updated by {}", payload.entity_type, payload.entity_id, who),
        None => format!("{} {} updated", payload.entity_type, payload.entity_id),
    })
}

/// Bounded, newest-first notification list.
#[derive(Debug, Clone)]
pub struct NotificationStore {
    entries: VecDeque<StoredNotification>,
    capacity: usize,
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new(NOTIFICATION_STORE_CAPACITY)
    }
}

impl NotificationStore {
    /// Create an empty store (minimum capacity 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Insert at the front, dropping the oldest entry past capacity.
    pub fn add(&mut self, entry: StoredNotification) {
        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Entries, newest first.
    pub fn list(&self) -> impl Iterator<Item = &StoredNotification> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of unread entries.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.read).count()
    }

    /// Mark one entry read. Returns `false` for unknown ids.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.read = true;
                true
            }
            None => false,
        }
    }

    /// Mark every entry read.
    pub fn mark_all_read(&mut self) {
        for entry in &mut self.entries {
            entry.read = true;
        }
    }

    /// Remove one entry. Returns `false` for unknown ids.
    pub fn dismiss(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(id: &str) -> NotificationPayload {
        NotificationPayload {
            id: Some(id.into()),
            title: format!("title {id}"),
            message: "body".into(),
            priority: None,
            event_type: None,
            data: None,
            created_at: None,
        }
    }

    #[test]
    fn test_newest_first_and_bounded() {
        let mut store = NotificationStore::new(3);
        for i in 0..5 {
            store.add(StoredNotification::from_notification(&payload(&format!("n{i}"))));
        }
        let ids: Vec<&str> = store.list().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["n4", "n3", "n2"]);
    }

    #[test]
    fn test_read_tracking() {
        let mut store = NotificationStore::default();
        store.add(StoredNotification::from_notification(&payload("a")));
        store.add(StoredNotification::from_notification(&payload("b")));
        assert_eq!(store.unread_count(), 2);

        assert!(store.mark_read("a"));
        assert!(!store.mark_read("missing"));
        assert_eq!(store.unread_count(), 1);

        store.mark_all_read();
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_dismiss() {
        let mut store = NotificationStore::default();
        store.add(StoredNotification::from_notification(&payload("a")));
        assert!(store.dismiss("a"));
        assert!(!store.dismiss("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_missing_id_is_generated() {
        let mut p = payload("x");
        p.id = None;
        let entry = StoredNotification::from_notification(&p);
        assert!(!entry.id.is_empty());
        assert_eq!(entry.priority, Priority::Medium);
    }

    #[test]
    fn test_entity_update_entry() {
        let update = EntityUpdatePayload {
            id: None,
            entity_type: "shipments".into(),
            entity_id: "shp_1".into(),
            title: None,
            message: None,
            updated_by: Some("Dana".into()),
            update_type: None,
        };
        let entry = StoredNotification::from_entity_update(&update);
        assert_eq!(entry.kind, StoredKind::EntityUpdate);
        assert_eq!(entry.title, "shipments shp_1 updated by Dana");
        assert_eq!(entry.link.as_deref(), Some("/shipments/shp_1"));
    }
}
