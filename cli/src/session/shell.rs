//! In-app surface: toasts and navigation.
//!
//! The session shows a toast when a notification cannot be delivered
//! natively (the app is in the foreground, notifications are off) and
//! navigates to the related entity when a notification is clicked.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};

/// Toast severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToastLevel {
    /// Neutral information.
    #[default]
    Info,
    /// Something worth attention.
    Warning,
    /// Something went wrong.
    Error,
}

impl std::fmt::Display for ToastLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Button attached to a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToastAction {
    /// Button label.
    pub label: String,
    /// Application path to navigate to.
    pub path: String,
}

/// Transient in-app message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Toast {
    /// Headline.
    pub title: String,
    /// Secondary text.
    pub description: Option<String>,
    /// Severity.
    pub level: ToastLevel,
    /// Optional action button.
    pub action: Option<ToastAction>,
}

/// Host application surface.
pub trait AppShell: Send + Sync + std::fmt::Debug {
    /// Show a toast.
    fn toast(&self, toast: &Toast);

    /// Bring the user to an application path.
    fn navigate(&self, path: &str);
}

/// Shell for the CLI: toasts go to stderr, navigation opens the browser.
#[derive(Debug, Clone)]
pub struct TerminalShell {
    app_url: String,
    open_browser: bool,
}

impl TerminalShell {
    /// Create a shell that resolves paths against `app_url`.
    ///
    /// When `open_browser` is false, navigation only prints the URL.
    pub fn new(app_url: impl Into<String>, open_browser: bool) -> Self {
        Self {
            app_url: app_url.into().trim_end_matches('/').to_string(),
            open_browser,
        }
    }

    /// Absolute URL for an application path.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.app_url, path)
    }
}

impl AppShell for TerminalShell {
    fn toast(&self, toast: &Toast) {
        let mut line = format!("[{}] {}", toast.level, toast.title);
        if let Some(description) = &toast.description {
            line.push_str(" - ");
            line.push_str(description);
        }
        if let Some(action) = &toast.action {
            line.push_str(&format!(" ({}: {})", action.label, self.url_for(&action.path)));
        }
        eprintln!("{line}");
    }

    fn navigate(&self, path: &str) {
        let url = self.url_for(path);
        eprintln!("Opening {url}");
        if self.open_browser {
            if let Err(e) = open_browser(&url) {
                log::warn!("[Session] {:#}", e);
            }
        }
    }
}

fn open_browser(url: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open")
            .arg(url)
            .spawn()
            .context("Failed to open browser")?;
    }

    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open")
            .arg(url)
            .spawn()
            .context("Failed to open browser")?;
    }

    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .spawn()
            .context("Failed to open browser")?;
    }

    Ok(())
}

#[derive(Debug, Default)]
struct RecordedShell {
    toasts: Vec<Toast>,
    navigations: Vec<String>,
}

/// Shell that records what it was asked to do.
#[derive(Debug, Clone, Default)]
pub struct RecordingShell {
    inner: Arc<Mutex<RecordedShell>>,
}

impl RecordingShell {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toasts shown so far.
    #[must_use]
    pub fn toasts(&self) -> Vec<Toast> {
        self.lock().toasts.clone()
    }

    /// Paths navigated to so far.
    #[must_use]
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RecordedShell> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AppShell for RecordingShell {
    fn toast(&self, toast: &Toast) {
        self.lock().toasts.push(toast.clone());
    }

    fn navigate(&self, path: &str) {
        self.lock().navigations.push(path.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_without_double_slash() {
        let shell = TerminalShell::new("https://app.tms.example.com/", false);
        assert_eq!(
            shell.url_for("/shipments/shp_1"),
            "https://app.tms.example.com/shipments/shp_1"
        );
    }

    #[test]
    fn test_recording_shell_records() {
        let shell = RecordingShell::new();
        let handle: Arc<dyn AppShell> = Arc::new(shell.clone());

        handle.toast(&Toast {
            title: "Hello".into(),
            ..Toast::default()
        });
        handle.navigate("/workers/w1");

        assert_eq!(shell.toasts()[0].title, "Hello");
        assert_eq!(shell.navigations(), vec!["/workers/w1".to_string()]);
    }
}
