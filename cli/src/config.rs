//! Configuration loading and persistence.
//!
//! Handles reading and writing `config.json` in the config directory.
//! The API token is never written to `config.json`; it lives in a separate
//! owner-only `credentials.json` (or comes from `TMS_TOKEN`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants::{
    AUTH_CHECK_INTERVAL, DEDUP_CAPACITY, NOTIFICATION_QUEUE_CAPACITY, NOTIFICATION_RATE_LIMIT,
    NOTIFICATION_RATE_WINDOW, NOTIFICATION_STORE_CAPACITY, RECONNECT_INITIAL_BACKOFF,
    RECONNECT_JITTER, RECONNECT_MAX_ATTEMPTS, RECONNECT_MAX_BACKOFF,
};
use crate::notifications::terminal::OscStyle;
use crate::notifications::GatewayConfig;
use crate::realtime::ReconnectPolicy;
use crate::session::SessionConfig;

const CONFIG_FILE: &str = "config.json";
const CREDENTIALS_FILE: &str = "credentials.json";

/// Desktop notification settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationSettings {
    /// Pending notifications kept before the oldest is dropped.
    pub queue_capacity: usize,
    /// Native notifications allowed per window.
    pub rate_limit_max: usize,
    /// Rate window in seconds.
    pub rate_limit_window_secs: u64,
    /// Recently seen ids kept for duplicate suppression.
    pub dedup_capacity: usize,
    /// Received notifications kept in memory.
    pub store_capacity: usize,
    /// Terminal escape sequence flavor.
    pub style: OscStyle,
    /// Emit escape sequences even when stdout is not a TTY.
    pub force_terminal: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            queue_capacity: NOTIFICATION_QUEUE_CAPACITY,
            rate_limit_max: NOTIFICATION_RATE_LIMIT,
            rate_limit_window_secs: NOTIFICATION_RATE_WINDOW.as_secs(),
            dedup_capacity: DEDUP_CAPACITY,
            store_capacity: NOTIFICATION_STORE_CAPACITY,
            style: OscStyle::default(),
            force_terminal: false,
        }
    }
}

impl NotificationSettings {
    /// Gateway tunables.
    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            queue_capacity: self.queue_capacity.max(1),
            rate_limit_max: self.rate_limit_max,
            rate_limit_window: Duration::from_secs(self.rate_limit_window_secs),
        }
    }
}

/// Reconnect backoff settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ReconnectSettings {
    /// First retry delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Delay cap in milliseconds.
    pub max_backoff_ms: u64,
    /// Consecutive attempts before giving up (0 = forever).
    pub max_attempts: u32,
    /// Upper bound of the random extra delay in milliseconds.
    pub jitter_ms: u64,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: duration_ms(RECONNECT_INITIAL_BACKOFF),
            max_backoff_ms: duration_ms(RECONNECT_MAX_BACKOFF),
            max_attempts: RECONNECT_MAX_ATTEMPTS,
            jitter_ms: duration_ms(RECONNECT_JITTER),
        }
    }
}

impl ReconnectSettings {
    /// Backoff policy for these settings.
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
            self.max_attempts,
            Duration::from_millis(self.jitter_ms),
        )
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration for the tms-realtime client.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    /// Base URL of the TMS REST API.
    pub api_url: String,
    /// Base URL of the WebSocket endpoint (defaults to `api_url`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// Base URL of the web application, used for "View" links.
    pub app_url: String,
    /// API token - NOT serialized to disk (stored in credentials.json).
    #[serde(skip)]
    pub token: String,
    /// Desktop notification settings.
    pub notifications: NotificationSettings,
    /// Reconnect backoff settings.
    pub reconnect: ReconnectSettings,
    /// Seconds between auth re-checks while listening.
    pub auth_check_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let (api_url, app_url) = if crate::env::Environment::current().is_development() {
            ("http://localhost:3001", "http://localhost:5173")
        } else {
            ("https://api.tms.app", "https://app.tms.app")
        };

        Self {
            api_url: api_url.to_string(),
            ws_url: None,
            app_url: app_url.to_string(),
            token: String::new(),
            notifications: NotificationSettings::default(),
            reconnect: ReconnectSettings::default(),
            auth_check_interval_secs: AUTH_CHECK_INTERVAL.as_secs(),
        }
    }
}

impl Config {
    /// Returns the configuration directory path, creating it if necessary.
    ///
    /// Directory selection priority:
    /// 1. `#[cfg(test)]` (unit tests): `tmp/tms-realtime-test`
    /// 2. `TMS_CONFIG_DIR` env var: explicit override
    /// 3. `TMS_ENV=test`: `tmp/tms-realtime-test` (integration tests)
    /// 4. Default: platform config dir (macOS: ~/Library/Application Support/tms-realtime)
    pub fn config_dir() -> Result<PathBuf> {
        let dir = {
            #[cfg(test)]
            {
                PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                    .parent()
                    .context("cli/ has no parent directory")?
                    .join("tmp/tms-realtime-test")
            }

            #[cfg(not(test))]
            {
                if let Ok(dir) = std::env::var("TMS_CONFIG_DIR") {
                    PathBuf::from(dir)
                } else if crate::env::is_test_mode() {
                    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                        .parent()
                        .context("cli/ has no parent directory")?
                        .join("tmp/tms-realtime-test")
                } else {
                    dirs::config_dir()
                        .context("Could not determine config directory")?
                        .join("tms-realtime")
                }
            }
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Loads configuration from the config dir, with environment variable
    /// overrides. Token comes from `TMS_TOKEN`, else `credentials.json`.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir()?;
        let mut config = Self::load_from(&dir)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());

        if config.token.is_empty() {
            if let Some(token) = Credentials::load_from(&dir)?.api_token {
                config.token = token;
            }
        }

        Ok(config)
    }

    /// Read `config.json` from `dir`; a missing file yields the defaults.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", config_path.display()))
    }

    /// Apply `TMS_*` overrides looked up through `var`.
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(api_url) = var("TMS_API_URL") {
            self.api_url = api_url;
        }

        if let Some(ws_url) = var("TMS_WS_URL") {
            self.ws_url = Some(ws_url);
        }

        if let Some(app_url) = var("TMS_APP_URL") {
            self.app_url = app_url;
        }

        // Token from env var (for CI/CD)
        if let Some(token) = var("TMS_TOKEN") {
            self.token = token;
        }

        if let Some(interval) = var("TMS_AUTH_CHECK_INTERVAL") {
            match interval.parse::<u64>() {
                Ok(secs) => self.auth_check_interval_secs = secs,
                Err(_) => log::warn!("Ignoring invalid TMS_AUTH_CHECK_INTERVAL: {}", interval),
            }
        }
    }

    /// Persists the configuration to the config dir.
    /// Note: Token is NOT saved here (use save_token for that).
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_dir()?)
    }

    /// Persists the configuration to `dir`.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let config_path = dir.join(CONFIG_FILE);
        write_private(&config_path, &serde_json::to_string_pretty(self)?)
    }

    /// Base URL for the WebSocket endpoint.
    #[must_use]
    pub fn ws_base(&self) -> &str {
        self.ws_url.as_deref().unwrap_or(&self.api_url)
    }

    /// Token, if one is configured.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        if self.token.is_empty() {
            None
        } else {
            Some(&self.token)
        }
    }

    /// Interval between auth re-checks (at least one second).
    #[must_use]
    pub fn auth_check_interval(&self) -> Duration {
        Duration::from_secs(self.auth_check_interval_secs.max(1))
    }

    /// Session tunables.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            dedup_capacity: self.notifications.dedup_capacity,
            store_capacity: self.notifications.store_capacity,
            reconnect: self.reconnect.policy(),
            enabled: true,
        }
    }

    /// Save a new API token to `credentials.json`.
    pub fn save_token(&mut self, token: &str) -> Result<()> {
        self.token = token.to_string();
        let dir = Self::config_dir()?;
        let mut creds = Credentials::load_from(&dir)?;
        creds.api_token = Some(token.to_string());
        creds.save_to(&dir)
    }

    /// Remove the API token from `credentials.json`.
    pub fn clear_token(&mut self) -> Result<()> {
        self.token.clear();
        let dir = Self::config_dir()?;
        let mut creds = Credentials::load_from(&dir)?;
        creds.api_token = None;
        creds.save_to(&dir)
    }
}

/// Contents of `credentials.json`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    /// TMS API token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

impl Credentials {
    /// Read credentials from `dir`; a missing file yields empty credentials.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CREDENTIALS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid {}", path.display()))
    }

    /// Write credentials to `dir` with owner-only permissions.
    pub fn save_to(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        write_private(&dir.join(CREDENTIALS_FILE), &serde_json::to_string_pretty(self)?)
    }
}

fn write_private(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;

    // Set restrictive permissions (owner read/write only)
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}
