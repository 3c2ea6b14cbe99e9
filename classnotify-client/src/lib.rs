use tracing::{info, warn};

pub mod app;
pub mod classroom;
pub mod cli;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod fetcher;
pub mod item;
pub mod login;
pub mod platform;
pub mod poller;
pub mod sink;
pub mod watermark;

pub use cli::{Cli, Command};
pub use config::{ClientConfig, load_config, resolve_config_path};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("auth error: {0}")]
    Auth(String),
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    init_tracing();

    let Some(cmd) = cli.command else {
        return app::agent::run(cli.config).await;
    };
    match cmd {
        Command::Login { credentials } => login::login(credentials, cli.config).await,
        Command::Logout => login::logout(cli.config),
        Command::Courses => app::check::courses(cli.config).await,
        Command::Check { since, since_secs } => {
            let since = app::check::resolve_since(since.as_deref(), since_secs)?;
            app::check::run_once(cli.config, since).await
        }
        #[cfg(target_os = "linux")]
        Command::Install { user } => platform::linux::install::install_all(user).await,
        #[cfg(target_os = "linux")]
        Command::Uninstall { user } => platform::linux::install::uninstall_all(user).await,
    }
}

pub(crate) async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => {
                        info!("shutdown: received SIGINT");
                    }
                    _ = sigterm.recv() => {
                        info!("shutdown: received SIGTERM");
                    }
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error=%e, "unable to install unix signal handlers; falling back to Ctrl+C");
            }
        }
    }
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown: received Ctrl+C");
}
