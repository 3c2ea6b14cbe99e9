use std::path::PathBuf;

use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $CLASSNOTIFY_CONFIG
  3) XDG default: ~/.config/classnotify/client.yaml

Client secrets (credentials.json) are read from $CLASSNOTIFY_CREDENTIALS or from
`credentials_file` in the config, relative to the config directory.
"#;

#[derive(Debug, Parser)]
#[command(
    name = "classnotify",
    version,
    about = "Desktop notifications for new Google Classroom announcements and assignments",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Optional subcommand. Without one, runs the poller until interrupted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authorize read-only Classroom access and save the refresh token in the keyring
    Login {
        /// Client secrets JSON downloaded from the Google Cloud console
        #[arg(long)]
        credentials: Option<PathBuf>,
    },
    /// Remove the saved refresh token from the keyring
    Logout,
    /// List the courses that would be watched
    Courses,
    /// Run a single poll cycle and exit
    Check {
        /// Report items modified after this RFC3339 instant
        #[arg(long, conflicts_with = "since_secs")]
        since: Option<String>,
        /// Report items modified in the last N seconds (default: one day)
        #[arg(long)]
        since_secs: Option<u64>,
    },
    /// Install a systemd user service that runs the poller at login
    ///
    /// When run as root, you must provide --user (or you will be prompted).
    #[cfg(target_os = "linux")]
    Install {
        /// Target username for user-level setup (systemd --user, unit location)
        #[arg(long)]
        user: Option<String>,
    },
    /// Remove the systemd user service
    #[cfg(target_os = "linux")]
    Uninstall {
        /// Target username for user-level cleanup
        #[arg(long)]
        user: Option<String>,
    },
}
