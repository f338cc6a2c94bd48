//! tms-realtime CLI - TMS notifications in the terminal.
//!
//! This is the main binary entry point. See the `tms_realtime` library
//! for the core functionality.

use anyhow::{Context, Result};
use mimalloc::MiMalloc;
use std::sync::Arc;
use tms_realtime::clock::SystemClock;
use tms_realtime::constants::{PREFERENCES_FILE, TERMINAL_PERMISSION_FILE};
use tms_realtime::notifications::terminal::{TerminalPlatform, VisibilityHandle};
use tms_realtime::notifications::NativeEvent;
use tms_realtime::realtime::TungsteniteTransport;
use tms_realtime::session::shell::TerminalShell;
use tms_realtime::settings_watcher::SettingsWatcher;
use tms_realtime::storage::FileStore;
use tms_realtime::{
    ApiClient, AuthState, Config, NotificationGateway, NotificationSession, SessionInputs,
    WebSocketClient,
};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build a gateway backed by the terminal and the config dir.
fn build_gateway(
    config: &Config,
    visibility: VisibilityHandle,
    events: Option<mpsc::UnboundedSender<NativeEvent>>,
) -> Result<NotificationGateway> {
    let dir = Config::config_dir()?;
    let preferences = FileStore::open(dir.join(PREFERENCES_FILE))?;
    let permission = FileStore::open(dir.join(TERMINAL_PERMISSION_FILE))?;

    let mut platform = TerminalPlatform::new(
        Box::new(permission),
        visibility,
        config.notifications.style,
        config.notifications.force_terminal,
    );
    if let Some(tx) = events {
        platform = platform.with_events(tx);
    }

    Ok(NotificationGateway::new(
        Box::new(platform),
        Box::new(preferences),
        Arc::new(SystemClock),
        config.notifications.gateway_config(),
    ))
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")
}

/// Re-resolve auth periodically and publish changes.
async fn recheck_auth(
    api: ApiClient,
    every: std::time::Duration,
    tx: watch::Sender<AuthState>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    // First tick completes immediately; the initial state is already resolved
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => match api.resolve_auth().await {
                Ok(state) => {
                    tx.send_if_modified(|current| {
                        if *current == state {
                            false
                        } else {
                            log::info!("[Session] Auth state changed");
                            *current = state;
                            true
                        }
                    });
                }
                Err(e) => log::warn!("[Session] Auth check failed: {:#}", e),
            },
        }
    }
}

/// Watch the preference files so `notifications enable|disable` run from
/// another shell reaches a running listener.
///
/// Runs without live updates if the directory cannot be watched.
fn watch_settings(changes: mpsc::UnboundedSender<()>) -> Option<SettingsWatcher> {
    let watched = Config::config_dir().and_then(|dir| {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        SettingsWatcher::new(&dir, &[PREFERENCES_FILE, TERMINAL_PERMISSION_FILE], changes)
    });
    match watched {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            log::warn!("[Settings] Preference changes need a restart to apply: {:#}", e);
            None
        }
    }
}

/// Connects and delivers notifications until Ctrl-C.
async fn listen(config: Config, visible: bool) -> Result<()> {
    let token = config.token().map(str::to_string);
    let api = ApiClient::new(&config.api_url, token.clone())?;
    if !api.has_token() {
        anyhow::bail!(
            "No API token. Run `tms-realtime auth set-token <TOKEN>` or set TMS_TOKEN."
        );
    }

    let initial = api
        .resolve_auth()
        .await
        .context("Failed to resolve current user")?;
    if !initial.authenticated {
        anyhow::bail!("Token rejected by {}", config.api_url);
    }
    if initial.subscription().is_none() {
        eprintln!("Waiting for an organization with a business unit before subscribing...");
    }

    let visibility = VisibilityHandle::new(visible);
    let (native_tx, native_rx) = mpsc::unbounded_channel();
    let gateway = build_gateway(&config, visibility.clone(), Some(native_tx))?;
    if !gateway.is_enabled() {
        eprintln!(
            "Desktop notifications are off; showing messages here instead. \
             Run `tms-realtime notifications enable` to turn them on."
        );
    }

    let client = WebSocketClient::new(Arc::new(TungsteniteTransport), config.ws_base(), token);
    let shell = Arc::new(TerminalShell::new(&config.app_url, true));
    let mut session = NotificationSession::new(client, gateway, shell, config.session_config());
    session.set_on_connection_change(|state| eprintln!("Notification channel {state}"));

    let (auth_tx, auth_rx) = watch::channel(initial);
    let (prefs_tx, prefs_rx) = mpsc::unbounded_channel();
    let _settings_watcher = watch_settings(prefs_tx);
    let cancel = CancellationToken::new();

    let checker = tokio::spawn(recheck_auth(
        api,
        config.auth_check_interval(),
        auth_tx,
        cancel.clone(),
    ));

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    log::info!("tms-realtime v{} listening", VERSION);
    let inputs = SessionInputs {
        auth: auth_rx,
        visibility: visibility.subscribe(),
        native_events: native_rx,
        preference_changes: prefs_rx,
    };
    session.run(inputs, cancel.clone()).await;

    cancel.cancel();
    let _ = checker.await;
    eprintln!("Shutting down...");
    Ok(())
}

fn run_notifications(action: NotificationsAction) -> Result<()> {
    let config = Config::load()?;
    let mut gateway = build_gateway(&config, VisibilityHandle::new(false), None)?;

    match action {
        NotificationsAction::Enable => {
            if gateway.enable_notifications() {
                println!("Desktop notifications enabled.");
            } else {
                println!(
                    "Desktop notifications not enabled (supported: {}, permission: {}).",
                    gateway.is_supported(),
                    gateway.permission()
                );
            }
        }
        NotificationsAction::Disable => {
            gateway.disable_notifications();
            println!("Desktop notifications disabled.");
        }
        NotificationsAction::Status => {
            println!("supported:  {}", gateway.is_supported());
            println!("permission: {}", gateway.permission());
            println!("enabled:    {}", gateway.is_enabled());
        }
    }
    Ok(())
}

fn run_auth(action: AuthAction) -> Result<()> {
    let mut config = Config::load()?;

    match action {
        AuthAction::SetToken { token } => {
            config.save_token(token.trim())?;
            println!("Token saved successfully.");
        }
        AuthAction::Clear => {
            config.clear_token()?;
            println!("Token cleared.");
        }
        AuthAction::Status => {
            let api = ApiClient::new(&config.api_url, config.token().map(str::to_string))?;
            if !api.has_token() {
                println!("No token configured.");
                return Ok(());
            }
            let state = build_runtime()?.block_on(api.resolve_auth())?;
            match (&state.user, &state.organization) {
                (Some(user), organization) if state.authenticated => {
                    println!("user:         {}", user.name.as_deref().unwrap_or(&user.id));
                    println!(
                        "organization: {}",
                        organization
                            .as_ref()
                            .map_or("(none)", |o| o.name.as_deref().unwrap_or(&o.id))
                    );
                    match state.subscription() {
                        Some(sub) => println!("room:         {}", sub.room),
                        None => println!("room:         (unresolved)"),
                    }
                }
                _ => println!("Not authenticated (token rejected)."),
            }
        }
    }
    Ok(())
}

// CLI
#[derive(Parser)]
#[command(name = "tms-realtime")]
#[command(version = VERSION)]
#[command(about = "Real-time TMS notifications: desktop alerts for shipments, loads and workers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and deliver notifications until interrupted
    Listen {
        /// Treat the application as in the foreground (toasts only)
        #[arg(long)]
        visible: bool,
    },
    /// Manage desktop notifications
    Notifications {
        #[command(subcommand)]
        action: NotificationsAction,
    },
    /// Manage the API token
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand)]
enum NotificationsAction {
    /// Ask for permission (once) and turn notifications on
    Enable,
    /// Turn notifications off
    Disable,
    /// Show permission and opt-in state
    Status,
}

#[derive(Subcommand)]
enum AuthAction {
    /// Store an API token
    SetToken {
        /// The token
        token: String,
    },
    /// Remove the stored token
    Clear,
    /// Show who the token belongs to
    Status,
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    // TMS_LOG_FILE keeps log lines out of the notification output
    if let Ok(path) = std::env::var("TMS_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen { visible } => {
            let config = Config::load()?;
            build_runtime()?.block_on(listen(config, visible))?;
        }
        Commands::Notifications { action } => run_notifications(action)?,
        Commands::Auth { action } => run_auth(action)?,
        Commands::Config => {
            let config = Config::load()?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
