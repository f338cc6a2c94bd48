//! Notification gateway: permission, opt-in, rate limit and queue.
//!
//! [`NotificationGateway`] decides whether a notification request may
//! become a native notification, queues accepted requests, and drains the
//! queue as the rate limit allows.
//!
//! # Delivery gate
//!
//! A request is accepted only when all of these hold:
//!
//! - the platform supports notifications
//! - permission is `Granted`
//! - the user has not disabled notifications
//! - the application is **not** visible (foreground apps use in-app toasts)
//!
//! # Permission state machine
//!
//! ```text
//! Default ──(prompt granted)──► Granted ──(disable)──► Granted + enabled=false
//!    │
//!    └─────(prompt denied)───► Denied   (never prompted again)
//! ```
//!
//! `{permission, enabled}` is persisted under
//! [`NOTIFICATION_PREFERENCES_KEY`] so it survives restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::platform::{NativeEvent, NativeEventKind, NotificationPlatform};
use super::queue::{NotificationQueue, NotificationQueueItem};
use super::rate_limit::RateLimiter;
use super::{NotificationCallbacks, NotificationConfig, NotificationId, PermissionState};
use crate::clock::Clock;
use crate::constants::{
    NOTIFICATION_PREFERENCES_KEY, NOTIFICATION_QUEUE_CAPACITY, NOTIFICATION_RATE_LIMIT,
    NOTIFICATION_RATE_WINDOW,
};
use crate::storage::KeyValueStore;

/// Tunables for [`NotificationGateway`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Pending notifications kept before the oldest is dropped.
    pub queue_capacity: usize,
    /// Native notifications allowed per `rate_limit_window`.
    pub rate_limit_max: usize,
    /// Rolling rate window.
    pub rate_limit_window: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            queue_capacity: NOTIFICATION_QUEUE_CAPACITY,
            rate_limit_max: NOTIFICATION_RATE_LIMIT,
            rate_limit_window: NOTIFICATION_RATE_WINDOW,
        }
    }
}

/// Persisted preferences.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct StoredPreferences {
    permission: PermissionState,
    enabled: bool,
}

/// Gatekeeper between notification requests and the platform.
pub struct NotificationGateway {
    platform: Box<dyn NotificationPlatform>,
    store: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    queue: NotificationQueue,
    rate_limiter: RateLimiter,
    active: HashMap<NotificationId, NotificationCallbacks>,
    permission: PermissionState,
    enabled: bool,
    processing_queue: bool,
}

impl std::fmt::Debug for NotificationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationGateway")
            .field("permission", &self.permission)
            .field("enabled", &self.enabled)
            .field("pending", &self.queue.len())
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

impl NotificationGateway {
    /// Build a gateway, restoring persisted preferences from `store`.
    ///
    /// `enabled` is only restored when the platform still reports
    /// `Granted`; a permission revoked outside the app wins.
    pub fn new(
        platform: Box<dyn NotificationPlatform>,
        store: Box<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: GatewayConfig,
    ) -> Self {
        let permission = if platform.is_supported() {
            platform.permission()
        } else {
            PermissionState::Default
        };

        let enabled = permission == PermissionState::Granted && stored_enabled(store.as_ref());

        Self {
            platform,
            store,
            clock,
            queue: NotificationQueue::new(config.queue_capacity),
            rate_limiter: RateLimiter::new(config.rate_limit_max, config.rate_limit_window),
            active: HashMap::new(),
            permission,
            enabled,
            processing_queue: false,
        }
    }

    /// Whether the platform can show notifications at all.
    pub fn is_supported(&self) -> bool {
        self.platform.is_supported()
    }

    /// Last known platform permission.
    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Whether the user has notifications switched on.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the application is currently in the foreground.
    pub fn is_visible(&self) -> bool {
        self.platform.is_visible()
    }

    /// Number of accepted requests waiting for display.
    pub fn pending_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of displayed notifications still tracked.
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Prompt for permission once.
    ///
    /// Returns `true` only when the prompt grants permission. Every outcome
    /// is persisted.
    pub fn request_permission(&mut self) -> bool {
        if !self.platform.is_supported() {
            log::warn!("[Notifications] Notifications are not supported on this platform");
            return false;
        }

        let outcome = self.platform.request_permission();
        self.permission = outcome;
        self.enabled = outcome == PermissionState::Granted;
        self.persist();

        log::info!("[Notifications] Permission request resolved: {}", outcome);
        self.enabled
    }

    /// Switch notifications on, prompting only when permission was never asked.
    ///
    /// A previously denied permission returns `false` without prompting.
    pub fn enable_notifications(&mut self) -> bool {
        if !self.platform.is_supported() {
            log::warn!("[Notifications] Cannot enable: notifications are not supported");
            return false;
        }

        self.permission = self.platform.permission();
        match self.permission {
            PermissionState::Granted => {
                self.enabled = true;
                self.persist();
                self.process_queue();
                true
            }
            PermissionState::Default => self.request_permission(),
            PermissionState::Denied => {
                log::info!("[Notifications] Permission denied previously; not prompting again");
                false
            }
        }
    }

    /// Switch notifications off and close everything this gateway displayed.
    pub fn disable_notifications(&mut self) {
        self.enabled = false;
        self.persist();
        self.queue.clear();
        self.close_all_active();
        log::info!("[Notifications] Notifications disabled");
    }

    /// Request a notification.
    ///
    /// Returns the id the request was queued under, or `None` if the
    /// delivery gate rejected it.
    pub fn show_notification(&mut self, config: NotificationConfig) -> Option<NotificationId> {
        if !self.platform.is_supported() {
            log::warn!("[Notifications] Dropping '{}': notifications not supported", config.title);
            return None;
        }
        if self.permission != PermissionState::Granted || !self.enabled {
            log::debug!(
                "[Notifications] Dropping '{}': permission={} enabled={}",
                config.title,
                self.permission,
                self.enabled
            );
            return None;
        }
        if self.platform.is_visible() {
            log::debug!("[Notifications] Dropping '{}': application is visible", config.title);
            return None;
        }

        let id = config
            .options
            .tag
            .clone()
            .map_or_else(NotificationId::generate, NotificationId::from);

        let item = NotificationQueueItem {
            id: id.clone(),
            title: config.title,
            options: config.options,
            callbacks: config.callbacks,
            timestamp: self.clock.now(),
        };

        if let Some(evicted) = self.queue.push(item) {
            log::debug!("[Notifications] Queue full, dropped oldest ({})", evicted.id);
        }

        self.process_queue();
        Some(id)
    }

    /// Drain the queue while the rate limit and visibility allow.
    pub fn process_queue(&mut self) {
        if self.processing_queue {
            return;
        }
        self.processing_queue = true;

        while !self.queue.is_empty() {
            if !self.can_deliver() || self.platform.is_visible() {
                break;
            }

            let now = self.clock.now();
            if !self.rate_limiter.has_capacity(now) {
                log::debug!(
                    "[Notifications] Rate limit reached, {} notification(s) waiting",
                    self.queue.len()
                );
                break;
            }

            let Some(item) = self.queue.pop() else {
                break;
            };
            self.display(item, now);
        }

        self.processing_queue = false;
    }

    /// React to an application visibility change.
    ///
    /// Becoming hidden resumes the drain.
    pub fn handle_visibility_change(&mut self) {
        if !self.platform.is_visible() {
            self.process_queue();
        }
    }

    /// Mirror a permission change reported by the platform.
    ///
    /// Losing `Granted` also disables notifications.
    pub fn handle_permission_change(&mut self, permission: PermissionState) {
        if permission == self.permission {
            return;
        }
        log::info!(
            "[Notifications] Permission changed: {} -> {}",
            self.permission,
            permission
        );
        self.permission = permission;
        if permission != PermissionState::Granted {
            self.enabled = false;
        }
        self.persist();
    }

    /// Dispatch a lifecycle event from the platform.
    pub fn handle_native_event(&mut self, event: NativeEvent) {
        let NativeEvent { id, kind } = event;

        match kind {
            NativeEventKind::Shown => {
                if let Some(callbacks) = self.active.get_mut(&id) {
                    if let Some(on_show) = callbacks.on_show.as_mut() {
                        on_show(&id);
                    }
                } else {
                    log::trace!("[Notifications] Shown event for untracked {}", id);
                }
            }
            NativeEventKind::Clicked => {
                if let Some(mut callbacks) = self.active.remove(&id) {
                    self.platform.focus_window();
                    if let Some(on_click) = callbacks.on_click.as_mut() {
                        on_click(&id);
                    }
                    self.platform.close(&id);
                    if let Some(on_close) = callbacks.on_close.as_mut() {
                        on_close(&id);
                    }
                }
            }
            NativeEventKind::Closed => {
                if let Some(mut callbacks) = self.active.remove(&id) {
                    if let Some(on_close) = callbacks.on_close.as_mut() {
                        on_close(&id);
                    }
                }
            }
            NativeEventKind::Failed(reason) => {
                if let Some(mut callbacks) = self.active.remove(&id) {
                    log::warn!("[Notifications] Notification {} failed: {}", id, reason);
                    if let Some(on_error) = callbacks.on_error.as_mut() {
                        on_error(&id, &reason);
                    }
                }
            }
        }
    }

    /// Pick up permission and opt-in changes persisted by another process
    /// (for example `tms-realtime notifications disable`).
    ///
    /// Permission changes go through [`handle_permission_change`]. Turning
    /// off drops the pending queue and closes everything displayed, like
    /// [`disable_notifications`].
    ///
    /// [`handle_permission_change`]: Self::handle_permission_change
    /// [`disable_notifications`]: Self::disable_notifications
    pub fn reload_preferences(&mut self) {
        if let Err(e) = self.store.reload() {
            log::warn!("[Notifications] Failed to reload preferences: {:#}", e);
            return;
        }
        self.platform.reload();

        // Read before handle_permission_change persists over it
        let wanted = stored_enabled(self.store.as_ref());
        let was_enabled = self.enabled;
        let permission = if self.platform.is_supported() {
            self.platform.permission()
        } else {
            PermissionState::Default
        };
        self.handle_permission_change(permission);

        let enabled = wanted && self.permission == PermissionState::Granted;
        if enabled == was_enabled {
            return;
        }

        self.enabled = enabled;
        self.persist();
        if enabled {
            log::info!("[Notifications] Notifications enabled elsewhere");
            self.process_queue();
        } else {
            log::info!("[Notifications] Notifications disabled elsewhere");
            self.queue.clear();
            self.close_all_active();
        }
    }

    /// Drop every pending request and close every displayed notification.
    pub fn clear_all(&mut self) {
        self.queue.clear();
        self.close_all_active();
    }

    /// Remove `id` from the queue and close it if displayed.
    ///
    /// Returns whether anything was removed.
    pub fn clear_notification(&mut self, id: &NotificationId) -> bool {
        let mut removed = self.queue.remove(id) > 0;
        if let Some(callbacks) = self.active.remove(id) {
            self.close_tracked(id, callbacks);
            removed = true;
        }
        removed
    }

    /// When the next queued item can be displayed, if it is only waiting on
    /// the rate limit.
    pub fn next_drain_at(&mut self) -> Option<Instant> {
        if self.queue.is_empty() || !self.can_deliver() || self.platform.is_visible() {
            return None;
        }
        self.rate_limiter.next_slot_at(self.clock.now())
    }

    fn can_deliver(&self) -> bool {
        self.enabled
            && self.permission == PermissionState::Granted
            && self.platform.is_supported()
    }

    fn display(&mut self, item: NotificationQueueItem, now: Instant) {
        let NotificationQueueItem {
            id,
            title,
            options,
            mut callbacks,
            ..
        } = item;

        // Same tag replaces the previous notification
        if let Some(previous) = self.active.remove(&id) {
            self.close_tracked(&id, previous);
        }

        match self.platform.show(&id, &title, &options) {
            Ok(()) => {
                self.rate_limiter.record(now);
                self.active.insert(id.clone(), callbacks);
                log::debug!("[Notifications] Displayed {} '{}'", id, title);
            }
            Err(e) => {
                let reason = format!("{e:#}");
                log::warn!("[Notifications] Failed to display '{}': {}", title, reason);
                if let Some(on_error) = callbacks.on_error.as_mut() {
                    on_error(&id, &reason);
                }
            }
        }
    }

    fn close_tracked(&mut self, id: &NotificationId, mut callbacks: NotificationCallbacks) {
        self.platform.close(id);
        if let Some(on_close) = callbacks.on_close.as_mut() {
            on_close(id);
        }
    }

    fn close_all_active(&mut self) {
        let active: Vec<_> = self.active.drain().collect();
        for (id, callbacks) in active {
            self.close_tracked(&id, callbacks);
        }
    }

    fn persist(&mut self) {
        let prefs = StoredPreferences {
            permission: self.permission,
            enabled: self.enabled,
        };
        let result = serde_json::to_string(&prefs)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.store.set(NOTIFICATION_PREFERENCES_KEY, &json));
        if let Err(e) = result {
            log::warn!("[Notifications] Failed to persist preferences: {:#}", e);
        }
    }
}

/// Whether the persisted preferences opt in.
fn stored_enabled(store: &dyn KeyValueStore) -> bool {
    store
        .get(NOTIFICATION_PREFERENCES_KEY)
        .and_then(|raw| match serde_json::from_str::<StoredPreferences>(&raw) {
            Ok(prefs) => Some(prefs),
            Err(e) => {
                log::warn!("[Notifications] Ignoring unreadable preferences: {}", e);
                None
            }
        })
        .is_some_and(|prefs| prefs.enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notifications::platform::RecordingPlatform;
    use crate::storage::MemoryStore;
    use std::sync::Mutex;

    fn gateway_with(platform: &RecordingPlatform) -> (NotificationGateway, ManualClock, MemoryStore) {
        let clock = ManualClock::new();
        let store = MemoryStore::new();
        let gateway = NotificationGateway::new(
            Box::new(platform.clone()),
            Box::new(store.clone()),
            Arc::new(clock.clone()),
            GatewayConfig::default(),
        );
        (gateway, clock, store)
    }

    fn enabled_gateway() -> (NotificationGateway, RecordingPlatform, ManualClock) {
        let platform = RecordingPlatform::granted();
        let (mut gateway, clock, _store) = gateway_with(&platform);
        assert!(gateway.enable_notifications());
        (gateway, platform, clock)
    }

    fn log_sink() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Box<dyn FnMut(&NotificationId) + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&log);
        let make = move |label: &str| {
            let log = Arc::clone(&captured);
            let label = label.to_string();
            Box::new(move |id: &NotificationId| {
                log.lock().unwrap().push(format!("{label}:{id}"));
            }) as Box<dyn FnMut(&NotificationId) + Send>
        };
        (log, make)
    }

    #[test]
    fn test_visible_application_never_constructs() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        platform.set_visible(true);

        for i in 0..5 {
            assert!(gateway
                .show_notification(NotificationConfig::new(format!("t{i}"), "body"))
                .is_none());
        }
        assert_eq!(platform.shown_count(), 0);
        assert_eq!(gateway.pending_len(), 0);
    }

    #[test]
    fn test_rate_limit_holds_excess_until_window_advances() {
        let (mut gateway, platform, clock) = enabled_gateway();

        for i in 0..15 {
            assert!(gateway
                .show_notification(NotificationConfig::new(format!("t{i}"), "body"))
                .is_some());
        }
        assert_eq!(platform.shown_count(), 10);
        assert_eq!(gateway.pending_len(), 5);

        clock.advance(Duration::from_secs(30));
        gateway.process_queue();
        assert_eq!(platform.shown_count(), 10);

        clock.advance(Duration::from_secs(30));
        gateway.handle_visibility_change();
        assert_eq!(platform.shown_count(), 15);
        assert_eq!(gateway.pending_len(), 0);

        let titles: Vec<_> = platform.shown().into_iter().map(|n| n.title).collect();
        assert_eq!(titles[10], "t10");
    }

    #[test]
    fn test_queue_bound_drops_oldest() {
        let (mut gateway, platform, _clock) = enabled_gateway();

        // Exhaust the rate window so every further request stays queued
        for i in 0..10 {
            gateway.show_notification(NotificationConfig::new(format!("warm{i}"), ""));
        }
        assert_eq!(platform.shown_count(), 10);

        for i in 0..60 {
            gateway.show_notification(NotificationConfig::new(format!("q{i}"), "").with_tag(format!("q{i}")));
        }
        assert_eq!(gateway.pending_len(), 50);
        assert!(!gateway.clear_notification(&NotificationId::from("q9")));
        assert!(gateway.clear_notification(&NotificationId::from("q10")));
    }

    #[test]
    fn test_disable_then_show_returns_none() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        gateway.disable_notifications();

        assert!(gateway
            .show_notification(NotificationConfig::new("after disable", "body"))
            .is_none());
        assert_eq!(platform.shown_count(), 0);
        assert!(!gateway.is_enabled());
        assert_eq!(gateway.permission(), PermissionState::Granted);
    }

    #[test]
    fn test_disable_closes_active_and_drops_pending() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        for i in 0..12 {
            gateway.show_notification(NotificationConfig::new(format!("t{i}"), "").with_tag(format!("id{i}")));
        }
        assert_eq!(gateway.active_len(), 10);
        assert_eq!(gateway.pending_len(), 2);

        gateway.disable_notifications();
        gateway.disable_notifications();

        assert_eq!(gateway.active_len(), 0);
        assert_eq!(gateway.pending_len(), 0);
        assert_eq!(platform.closed().len(), 10);
    }

    #[test]
    fn test_denied_permission_never_prompts() {
        let platform = RecordingPlatform::new();
        platform.set_permission(PermissionState::Denied);
        let (mut gateway, _clock, _store) = gateway_with(&platform);

        assert!(!gateway.enable_notifications());
        assert_eq!(platform.prompt_count(), 0);
    }

    #[test]
    fn test_default_permission_prompts_once_and_persists() {
        let platform = RecordingPlatform::new();
        let (mut gateway, _clock, store) = gateway_with(&platform);

        assert!(gateway.enable_notifications());
        assert_eq!(platform.prompt_count(), 1);
        assert!(gateway.is_enabled());

        let raw = store.get(NOTIFICATION_PREFERENCES_KEY).unwrap();
        let prefs: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(prefs["permission"], "granted");
        assert_eq!(prefs["enabled"], true);

        // Already granted: no second prompt
        assert!(gateway.enable_notifications());
        assert_eq!(platform.prompt_count(), 1);
    }

    #[test]
    fn test_request_permission_denied_persists_disabled() {
        let platform = RecordingPlatform::new();
        platform.set_prompt_answer(PermissionState::Denied);
        let (mut gateway, _clock, store) = gateway_with(&platform);

        assert!(!gateway.request_permission());
        assert_eq!(gateway.permission(), PermissionState::Denied);

        let raw = store.get(NOTIFICATION_PREFERENCES_KEY).unwrap();
        assert!(raw.contains("\"denied\""));
        assert!(raw.contains("false"));
    }

    #[test]
    fn test_unsupported_platform_degrades() {
        let platform = RecordingPlatform::granted();
        platform.set_supported(false);
        let (mut gateway, _clock, _store) = gateway_with(&platform);

        assert!(!gateway.request_permission());
        assert!(!gateway.enable_notifications());
        assert!(gateway.show_notification(NotificationConfig::new("x", "y")).is_none());
        assert_eq!(platform.prompt_count(), 0);
        assert_eq!(platform.shown_count(), 0);
    }

    #[test]
    fn test_preferences_restored_on_new_gateway() {
        let platform = RecordingPlatform::granted();
        let clock = ManualClock::new();
        let store = MemoryStore::new();

        let mut first = NotificationGateway::new(
            Box::new(platform.clone()),
            Box::new(store.clone()),
            Arc::new(clock.clone()),
            GatewayConfig::default(),
        );
        assert!(first.enable_notifications());

        let second = NotificationGateway::new(
            Box::new(platform.clone()),
            Box::new(store.clone()),
            Arc::new(clock.clone()),
            GatewayConfig::default(),
        );
        assert!(second.is_enabled());

        // Permission revoked outside the app: stored flag is not trusted
        platform.set_permission(PermissionState::Denied);
        let third = NotificationGateway::new(
            Box::new(platform),
            Box::new(store),
            Arc::new(clock),
            GatewayConfig::default(),
        );
        assert!(!third.is_enabled());
    }

    #[test]
    fn test_construction_failure_reports_and_continues() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        platform.fail_title("broken");

        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        gateway.show_notification(
            NotificationConfig::new("broken", "body").on_error(move |id, reason| {
                sink.lock().unwrap().push(format!("{id}:{reason}"));
            }).with_tag("bad"),
        );
        gateway.show_notification(NotificationConfig::new("fine", "body"));

        assert_eq!(errors.lock().unwrap().len(), 1);
        assert!(errors.lock().unwrap()[0].starts_with("bad:"));
        assert_eq!(platform.shown_count(), 1);
        assert_eq!(gateway.active_len(), 1);
    }

    #[test]
    fn test_failed_constructions_do_not_consume_rate_budget() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        platform.fail_title("broken");

        for _ in 0..10 {
            gateway.show_notification(NotificationConfig::new("broken", ""));
        }
        gateway.show_notification(NotificationConfig::new("fine", ""));
        assert_eq!(platform.shown_count(), 1);
    }

    #[test]
    fn test_click_focuses_closes_and_untracks() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        let (log, make) = log_sink();

        let mut config = NotificationConfig::new("click me", "").with_tag("n1");
        config.callbacks.on_click = Some(make("click"));
        config.callbacks.on_close = Some(make("close"));
        config.callbacks.on_show = Some(make("show"));
        gateway.show_notification(config);

        let id = NotificationId::from("n1");
        gateway.handle_native_event(NativeEvent { id: id.clone(), kind: NativeEventKind::Shown });
        gateway.handle_native_event(NativeEvent { id: id.clone(), kind: NativeEventKind::Clicked });
        // Late close from the platform after we already untracked it
        gateway.handle_native_event(NativeEvent { id: id.clone(), kind: NativeEventKind::Closed });

        assert_eq!(*log.lock().unwrap(), vec!["show:n1", "click:n1", "close:n1"]);
        assert_eq!(platform.focus_count(), 1);
        assert_eq!(platform.closed(), vec![id]);
        assert_eq!(gateway.active_len(), 0);
    }

    #[test]
    fn test_failed_event_reports_error() {
        let (mut gateway, _platform, _clock) = enabled_gateway();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        gateway.show_notification(
            NotificationConfig::new("t", "")
                .with_tag("n2")
                .on_error(move |_, reason| sink.lock().unwrap().push(reason.to_string())),
        );

        gateway.handle_native_event(NativeEvent {
            id: NotificationId::from("n2"),
            kind: NativeEventKind::Failed("quota".into()),
        });
        assert_eq!(*errors.lock().unwrap(), vec!["quota"]);
        assert_eq!(gateway.active_len(), 0);
    }

    #[test]
    fn test_same_tag_replaces_previous() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        gateway.show_notification(NotificationConfig::new("v1", "").with_tag("same"));
        gateway.show_notification(NotificationConfig::new("v2", "").with_tag("same"));

        assert_eq!(platform.shown_count(), 2);
        assert_eq!(platform.closed(), vec![NotificationId::from("same")]);
        assert_eq!(gateway.active_len(), 1);
    }

    #[test]
    fn test_clear_unknown_ids_are_noops() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        assert!(!gateway.clear_notification(&NotificationId::from("missing")));
        gateway.clear_all();
        assert!(platform.closed().is_empty());
    }

    #[test]
    fn test_clear_all_closes_active() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        gateway.show_notification(NotificationConfig::new("a", "").with_tag("a"));
        gateway.show_notification(NotificationConfig::new("b", "").with_tag("b"));

        gateway.clear_all();
        assert_eq!(gateway.active_len(), 0);
        assert_eq!(platform.closed().len(), 2);
    }

    #[test]
    fn test_permission_loss_disables() {
        let (mut gateway, _platform, _clock) = enabled_gateway();
        gateway.handle_permission_change(PermissionState::Denied);

        assert!(!gateway.is_enabled());
        assert!(gateway.show_notification(NotificationConfig::new("x", "")).is_none());
    }

    #[test]
    fn test_reload_applies_disable_written_elsewhere() {
        let platform = RecordingPlatform::granted();
        let (mut gateway, _clock, store) = gateway_with(&platform);
        assert!(gateway.enable_notifications());
        for i in 0..12 {
            gateway.show_notification(NotificationConfig::new(format!("t{i}"), ""));
        }
        assert_eq!(gateway.pending_len(), 2);

        let mut other = store.clone();
        other
            .set(NOTIFICATION_PREFERENCES_KEY, r#"{"permission":"granted","enabled":false}"#)
            .unwrap();
        gateway.reload_preferences();

        assert!(!gateway.is_enabled());
        assert_eq!(gateway.pending_len(), 0);
        assert_eq!(gateway.active_len(), 0);
        assert_eq!(platform.closed().len(), 10);
        assert!(gateway.show_notification(NotificationConfig::new("late", "")).is_none());
    }

    #[test]
    fn test_reload_applies_enable_written_elsewhere() {
        let platform = RecordingPlatform::granted();
        let (mut gateway, _clock, store) = gateway_with(&platform);
        assert!(!gateway.is_enabled());

        let mut other = store.clone();
        other
            .set(NOTIFICATION_PREFERENCES_KEY, r#"{"permission":"granted","enabled":true}"#)
            .unwrap();
        gateway.reload_preferences();

        assert!(gateway.is_enabled());
        assert!(gateway.show_notification(NotificationConfig::new("hello", "")).is_some());
        assert_eq!(platform.shown_count(), 1);
    }

    #[test]
    fn test_reload_applies_revoked_permission() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        gateway.show_notification(NotificationConfig::new("open", ""));
        assert_eq!(gateway.active_len(), 1);

        platform.set_permission(PermissionState::Denied);
        gateway.reload_preferences();

        assert_eq!(gateway.permission(), PermissionState::Denied);
        assert!(!gateway.is_enabled());
        assert_eq!(gateway.active_len(), 0);
    }

    #[test]
    fn test_reload_without_changes_keeps_state() {
        let (mut gateway, platform, _clock) = enabled_gateway();
        gateway.show_notification(NotificationConfig::new("open", ""));

        gateway.reload_preferences();
        gateway.reload_preferences();

        assert!(gateway.is_enabled());
        assert_eq!(gateway.active_len(), 1);
        assert!(platform.closed().is_empty());
    }

    #[test]
    fn test_drain_waits_while_visible_then_resumes() {
        let (mut gateway, platform, clock) = enabled_gateway();
        for i in 0..12 {
            gateway.show_notification(NotificationConfig::new(format!("t{i}"), ""));
        }
        assert_eq!(gateway.pending_len(), 2);

        clock.advance(Duration::from_secs(61));
        platform.set_visible(true);
        gateway.handle_visibility_change();
        assert_eq!(platform.shown_count(), 10);

        platform.set_visible(false);
        gateway.handle_visibility_change();
        assert_eq!(platform.shown_count(), 12);
    }

    #[test]
    fn test_next_drain_at_tracks_oldest_window_entry() {
        let (mut gateway, _platform, clock) = enabled_gateway();
        assert!(gateway.next_drain_at().is_none());

        let start = clock.now();
        for i in 0..11 {
            gateway.show_notification(NotificationConfig::new(format!("t{i}"), ""));
        }
        assert_eq!(gateway.next_drain_at(), Some(start + Duration::from_secs(60)));
    }
}
