//! Application-wide constants for tms-realtime.
//!
//! This module centralizes the magic numbers of the notification pipeline
//! so the defaults in [`crate::config`] and the tests agree on them.
//!
//! # Categories
//!
//! - **Timeouts**: Network and operation timeouts
//! - **Notifications**: Queue, rate limit and dedup bounds
//! - **Reconnect**: Backoff defaults for the WebSocket session
//! - **Storage**: Persisted keys and file names

use std::time::Duration;

// ============================================================================
// Timeouts
// ============================================================================

/// HTTP client request timeout for API calls.
///
/// Applies to the user and organization lookups. 10 seconds is enough for
/// those while preventing indefinite hangs on network issues.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default interval between authentication re-checks in `listen` mode.
pub const AUTH_CHECK_INTERVAL: Duration = Duration::from_secs(300);

// ============================================================================
// Notifications
// ============================================================================

/// Maximum number of pending notifications before the oldest is dropped.
pub const NOTIFICATION_QUEUE_CAPACITY: usize = 50;

/// Maximum native notifications per rate window.
pub const NOTIFICATION_RATE_LIMIT: usize = 10;

/// Rolling window for [`NOTIFICATION_RATE_LIMIT`].
pub const NOTIFICATION_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Number of notification ids remembered for duplicate suppression.
pub const DEDUP_CAPACITY: usize = 100;

/// Maximum notifications kept in the client-side store.
pub const NOTIFICATION_STORE_CAPACITY: usize = 200;

// ============================================================================
// Reconnect
// ============================================================================

/// Initial reconnection delay.
pub const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum reconnection delay.
pub const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Reconnect attempts before the session gives up until auth changes.
pub const RECONNECT_MAX_ATTEMPTS: u32 = 10;

/// Upper bound of the random jitter added to each reconnect delay.
pub const RECONNECT_JITTER: Duration = Duration::from_millis(500);

// ============================================================================
// Storage
// ============================================================================

/// Store key holding the persisted `{permission, enabled}` preferences.
pub const NOTIFICATION_PREFERENCES_KEY: &str = "tms.notifications.preferences";

/// Store key holding the terminal platform's permission decision.
pub const TERMINAL_PERMISSION_KEY: &str = "tms.terminal.permission";

/// File backing the gateway preferences store.
pub const PREFERENCES_FILE: &str = "preferences.json";

/// File backing the terminal permission store.
pub const TERMINAL_PERMISSION_FILE: &str = "terminal-permission.json";

/// Path of the notification WebSocket endpoint, relative to the WS base.
pub const NOTIFICATION_WS_PATH: &str = "/api/v1/ws/notifications";
