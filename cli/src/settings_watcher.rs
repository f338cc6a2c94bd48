//! Change notifications for the settings files.
//!
//! `tms-realtime notifications enable|disable` runs in its own process and
//! rewrites the preference files under the config directory. A running
//! `listen` session learns about that through a [`SettingsWatcher`]: the
//! directory is watched with OS-native events via the `notify` crate, and
//! every mutation of one of the named files sends `()` on a tokio channel.
//!
//! Events carry no payload. The receiver reloads the stores and works out
//! what changed itself, so bursts of events only cost redundant reloads.

use std::ffi::OsString;
use std::path::Path;

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches a directory for changes to a fixed set of file names.
///
/// Dropping the watcher stops delivery.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for SettingsWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsWatcher").finish_non_exhaustive()
    }
}

impl SettingsWatcher {
    /// Watch `dir` (non-recursively) and signal `changes` whenever one of
    /// `file_names` is created, modified, renamed into place or removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS watcher cannot be created or `dir` cannot
    /// be watched (for example because it does not exist).
    pub fn new(dir: &Path, file_names: &[&str], changes: mpsc::UnboundedSender<()>) -> Result<Self> {
        let names: Vec<OsString> = file_names.iter().map(OsString::from).collect();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if touches_settings(&event, &names) {
                    log::debug!("[Settings] Change detected: {:?}", event.paths);
                    let _ = changes.send(());
                }
            }
            Err(e) => log::warn!("[Settings] File watcher error: {e}"),
        })
        .context("Failed to create file watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch: {}", dir.display()))?;

        log::info!("[Settings] Watching for preference changes in {}", dir.display());
        Ok(Self { _watcher: watcher })
    }
}

/// Whether `event` mutates one of `names`.
///
/// Access events are ignored so reading the files does not trigger a reload.
fn touches_settings(event: &Event, names: &[OsString]) -> bool {
    let mutation = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    );
    mutation
        && event
            .paths
            .iter()
            .filter_map(|path| path.file_name())
            .any(|name| names.iter().any(|wanted| wanted == name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, ModifyKind, RenameMode};
    use std::path::PathBuf;
    use std::time::Duration;

    fn names() -> Vec<OsString> {
        vec![OsString::from("preferences.json")]
    }

    #[test]
    fn test_content_change_of_watched_file_matches() {
        let event = Event::new(EventKind::Modify(ModifyKind::Data(DataChange::Content)))
            .add_path(PathBuf::from("/cfg/preferences.json"));
        assert!(touches_settings(&event, &names()));
    }

    #[test]
    fn test_rename_into_place_matches() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/cfg/preferences.json.tmp"))
            .add_path(PathBuf::from("/cfg/preferences.json"));
        assert!(touches_settings(&event, &names()));
    }

    #[test]
    fn test_other_files_are_ignored() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/cfg/preferences.json.tmp"));
        assert!(!touches_settings(&event, &names()));

        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/cfg/token"));
        assert!(!touches_settings(&event, &names()));
    }

    #[test]
    fn test_access_is_ignored() {
        let event = Event::new(EventKind::Access(AccessKind::Read))
            .add_path(PathBuf::from("/cfg/preferences.json"));
        assert!(!touches_settings(&event, &names()));
    }

    #[test]
    fn test_watch_missing_directory_fails() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = SettingsWatcher::new(Path::new("/nonexistent/tms/abc123"), &["x.json"], tx);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_write_to_watched_file_signals() {
        let dir = tempfile::TempDir::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _watcher = SettingsWatcher::new(dir.path(), &["preferences.json"], tx).unwrap();

        std::fs::write(dir.path().join("preferences.json"), "{}").unwrap();

        let signalled = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(signalled, Ok(Some(()))));
    }
}
