//! Terminal notification platform.
//!
//! Emits desktop notifications through terminal escape sequences, which
//! most modern terminals (iTerm2, kitty, WezTerm, foot, Ghostty, urxvt)
//! forward to the OS notification center:
//!
//! - **OSC 777**: `ESC ] 777 ; notify ; title ; body BEL`
//! - **OSC 9**: `ESC ] 9 ; message BEL`
//!
//! Terminal notifications cannot be retracted or clicked back into the
//! process, so every successful write reports `Shown` followed by `Closed`.
//!
//! Permission is asked once on stdin and persisted under
//! [`TERMINAL_PERMISSION_KEY`]. Visibility comes from a shared
//! [`VisibilityHandle`] the embedding application flips when its window
//! gains or loses focus.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use super::platform::{NativeEvent, NativeEventKind, NotificationPlatform};
use super::{NotificationId, NotificationOptions, PermissionState};
use crate::constants::TERMINAL_PERMISSION_KEY;
use crate::storage::KeyValueStore;

/// Escape sequence flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OscStyle {
    /// `OSC 777 ; notify ; title ; body` (title and body).
    #[default]
    Osc777,
    /// `OSC 9 ; message` (single line).
    Osc9,
}

/// Shared foreground/background flag with change notification.
#[derive(Debug, Clone)]
pub struct VisibilityHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl VisibilityHandle {
    /// Create a handle with the given initial visibility.
    #[must_use]
    pub fn new(visible: bool) -> Self {
        let (tx, _rx) = watch::channel(visible);
        Self { tx: Arc::new(tx) }
    }

    /// Whether the application is in the foreground.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update visibility. Subscribers are only woken on an actual change.
    pub fn set_visible(&self, visible: bool) {
        self.tx.send_if_modified(|current| {
            if *current == visible {
                false
            } else {
                *current = visible;
                true
            }
        });
    }

    /// Subscribe to visibility changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Notification platform that writes OSC sequences to the terminal.
pub struct TerminalPlatform {
    store: Box<dyn KeyValueStore>,
    visibility: VisibilityHandle,
    events: Option<mpsc::UnboundedSender<NativeEvent>>,
    out: Box<dyn Write + Send>,
    input: Box<dyn BufRead + Send>,
    style: OscStyle,
    supported: bool,
    interactive: bool,
}

impl std::fmt::Debug for TerminalPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalPlatform")
            .field("style", &self.style)
            .field("supported", &self.supported)
            .field("interactive", &self.interactive)
            .field("visible", &self.visibility.is_visible())
            .finish_non_exhaustive()
    }
}

impl TerminalPlatform {
    /// Create a platform bound to the process's stdout/stdin.
    ///
    /// Supported when stdout is a TTY, or always when `force` is set.
    /// Prompts only when stdin is a TTY and not running under `TMS_ENV=test`.
    pub fn new(
        store: Box<dyn KeyValueStore>,
        visibility: VisibilityHandle,
        style: OscStyle,
        force: bool,
    ) -> Self {
        let supported = force || atty::is(atty::Stream::Stdout);
        let interactive = atty::is(atty::Stream::Stdin) && !crate::env::is_test_mode();

        Self {
            store,
            visibility,
            events: None,
            out: Box::new(std::io::stdout()),
            input: Box::new(std::io::BufReader::new(std::io::stdin())),
            style,
            supported,
            interactive,
        }
    }

    /// Report lifecycle events on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<NativeEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Replace the terminal streams (tests, alternate TTYs).
    pub fn with_io(
        mut self,
        out: Box<dyn Write + Send>,
        input: Box<dyn BufRead + Send>,
        interactive: bool,
    ) -> Self {
        self.out = out;
        self.input = input;
        self.interactive = interactive;
        self.supported = true;
        self
    }

    fn emit(&self, id: &NotificationId, kind: NativeEventKind) {
        if let Some(tx) = &self.events {
            let _ = tx.send(NativeEvent {
                id: id.clone(),
                kind,
            });
        }
    }

    fn prompt(&mut self) -> Result<bool> {
        write!(self.out, "Allow desktop notifications from tms-realtime? [y/N] ")?;
        self.out.flush()?;

        let mut answer = String::new();
        self.input
            .read_line(&mut answer)
            .context("Failed to read permission answer")?;

        Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
    }
}

impl NotificationPlatform for TerminalPlatform {
    fn is_supported(&self) -> bool {
        self.supported
    }

    fn permission(&self) -> PermissionState {
        self.store
            .get(TERMINAL_PERMISSION_KEY)
            .map_or(PermissionState::Default, |raw| PermissionState::parse(&raw))
    }

    fn request_permission(&mut self) -> PermissionState {
        if !self.interactive {
            log::info!("[Notifications] No interactive terminal; permission left undecided");
            return self.permission();
        }

        let outcome = match self.prompt() {
            Ok(true) => PermissionState::Granted,
            Ok(false) => PermissionState::Denied,
            Err(e) => {
                log::warn!("[Notifications] Permission prompt failed: {:#}", e);
                return PermissionState::Default;
            }
        };

        if let Err(e) = self.store.set(TERMINAL_PERMISSION_KEY, outcome.as_str()) {
            log::warn!("[Notifications] Failed to persist terminal permission: {:#}", e);
        }
        outcome
    }

    fn is_visible(&self) -> bool {
        self.visibility.is_visible()
    }

    fn show(
        &mut self,
        id: &NotificationId,
        title: &str,
        options: &NotificationOptions,
    ) -> Result<()> {
        let body = options.body.as_deref().unwrap_or_default();
        let sequence = encode_notification(self.style, title, body);

        self.out
            .write_all(sequence.as_bytes())
            .and_then(|()| self.out.flush())
            .context("Failed to write notification to terminal")?;

        self.emit(id, NativeEventKind::Shown);
        self.emit(id, NativeEventKind::Closed);
        Ok(())
    }

    fn close(&mut self, id: &NotificationId) {
        log::trace!("[Notifications] Terminal notifications cannot be retracted ({})", id);
    }

    fn focus_window(&mut self) {
        // Terminals expose no focus request; ring the bell instead
        let _ = self.out.write_all(b"\x07").and_then(|()| self.out.flush());
    }

    fn reload(&mut self) {
        if let Err(e) = self.store.reload() {
            log::warn!("[Notifications] Failed to reload terminal permission: {:#}", e);
        }
    }
}

/// Build the escape sequence for one notification.
pub fn encode_notification(style: OscStyle, title: &str, body: &str) -> String {
    match style {
        OscStyle::Osc777 => {
            let title = sanitize(title).replace(';', ",");
            let body = sanitize(body);
            format!("\x1b]777;notify;{title};{body}\x07")
        }
        OscStyle::Osc9 => {
            let title = sanitize(title);
            let body = sanitize(body);
            let message = if body.is_empty() {
                title
            } else if title.is_empty() {
                body
            } else {
                format!("{title}: {body}")
            };
            format!("\x1b]9;{message}\x07")
        }
    }
}

/// Drop control characters so the payload cannot terminate the sequence early.
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect()
}
