//! Platform capability seam for native notifications.
//!
//! [`NotificationPlatform`] hides everything platform-specific: whether
//! notifications exist at all, the persisted permission, the permission
//! prompt, application visibility, and constructing/closing notifications.
//!
//! Platforms report asynchronous lifecycle events (shown, clicked, closed,
//! failed) as [`NativeEvent`]s; the owner feeds them back into
//! [`super::NotificationGateway::handle_native_event`].

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;

use super::{NotificationId, NotificationOptions, PermissionState};

/// Lifecycle event reported by a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeEvent {
    /// Notification the event belongs to.
    pub id: NotificationId,
    /// What happened.
    pub kind: NativeEventKind,
}

/// Kind of [`NativeEvent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEventKind {
    /// The notification is on screen.
    Shown,
    /// The user clicked it.
    Clicked,
    /// It was dismissed or closed.
    Closed,
    /// The platform failed to display it.
    Failed(String),
}

/// Native notification capability.
pub trait NotificationPlatform: Send + std::fmt::Debug {
    /// Whether this platform can show notifications at all.
    fn is_supported(&self) -> bool;

    /// Current (persisted) permission.
    fn permission(&self) -> PermissionState;

    /// Prompt the user once and return the outcome.
    fn request_permission(&mut self) -> PermissionState;

    /// Whether the application is currently in the foreground.
    fn is_visible(&self) -> bool;

    /// Construct and display a notification.
    fn show(&mut self, id: &NotificationId, title: &str, options: &NotificationOptions)
        -> Result<()>;

    /// Close a displayed notification. Unknown ids are ignored.
    fn close(&mut self, id: &NotificationId);

    /// Re-read persisted permission changed outside this process.
    fn reload(&mut self) {}

    /// Bring the application to the foreground.
    fn focus_window(&mut self);
}

/// A notification constructed by [`RecordingPlatform`].
#[derive(Debug, Clone, PartialEq)]
pub struct ShownNotification {
    /// Id it was shown under.
    pub id: NotificationId,
    /// Title line.
    pub title: String,
    /// Options it was shown with.
    pub options: NotificationOptions,
}

#[derive(Debug)]
struct RecordingState {
    supported: bool,
    permission: PermissionState,
    prompt_answer: PermissionState,
    visible: bool,
    failing_titles: HashSet<String>,
    shown: Vec<ShownNotification>,
    closed: Vec<NotificationId>,
    prompts: usize,
    focus_requests: usize,
}

/// Test double that records every platform call.
///
/// Clones share state, so tests keep one handle for scripting and
/// inspection while the gateway owns another.
#[derive(Debug, Clone)]
pub struct RecordingPlatform {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingPlatform {
    /// Supported platform, permission not yet asked, prompt answers
    /// `Granted`, application hidden.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RecordingState {
                supported: true,
                permission: PermissionState::Default,
                prompt_answer: PermissionState::Granted,
                visible: false,
                failing_titles: HashSet::new(),
                shown: Vec::new(),
                closed: Vec::new(),
                prompts: 0,
                focus_requests: 0,
            })),
        }
    }

    /// Shorthand for a platform whose permission is already granted.
    #[must_use]
    pub fn granted() -> Self {
        let platform = Self::new();
        platform.set_permission(PermissionState::Granted);
        platform
    }

    fn lock(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Toggle platform support.
    pub fn set_supported(&self, supported: bool) {
        self.lock().supported = supported;
    }

    /// Overwrite the persisted permission.
    pub fn set_permission(&self, permission: PermissionState) {
        self.lock().permission = permission;
    }

    /// Choose what the next prompts will answer.
    pub fn set_prompt_answer(&self, answer: PermissionState) {
        self.lock().prompt_answer = answer;
    }

    /// Put the application in the foreground (`true`) or background.
    pub fn set_visible(&self, visible: bool) {
        self.lock().visible = visible;
    }

    /// Make every construction with this title fail.
    pub fn fail_title(&self, title: &str) {
        self.lock().failing_titles.insert(title.to_string());
    }

    /// Notifications constructed so far.
    #[must_use]
    pub fn shown(&self) -> Vec<ShownNotification> {
        self.lock().shown.clone()
    }

    /// Number of notifications constructed so far.
    #[must_use]
    pub fn shown_count(&self) -> usize {
        self.lock().shown.len()
    }

    /// Ids passed to `close`, in order.
    #[must_use]
    pub fn closed(&self) -> Vec<NotificationId> {
        self.lock().closed.clone()
    }

    /// Number of permission prompts issued.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        self.lock().prompts
    }

    /// Number of focus requests.
    #[must_use]
    pub fn focus_count(&self) -> usize {
        self.lock().focus_requests
    }
}

impl Default for RecordingPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationPlatform for RecordingPlatform {
    fn is_supported(&self) -> bool {
        self.lock().supported
    }

    fn permission(&self) -> PermissionState {
        self.lock().permission
    }

    fn request_permission(&mut self) -> PermissionState {
        let mut state = self.lock();
        state.prompts += 1;
        state.permission = state.prompt_answer;
        state.permission
    }

    fn is_visible(&self) -> bool {
        self.lock().visible
    }

    fn show(
        &mut self,
        id: &NotificationId,
        title: &str,
        options: &NotificationOptions,
    ) -> Result<()> {
        let mut state = self.lock();
        if state.failing_titles.contains(title) {
            anyhow::bail!("notification construction failed for '{title}'");
        }
        state.shown.push(ShownNotification {
            id: id.clone(),
            title: title.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    fn close(&mut self, id: &NotificationId) {
        self.lock().closed.push(id.clone());
    }

    fn focus_window(&mut self) {
        self.lock().focus_requests += 1;
    }
}
