use std::path::{Path, PathBuf};
use std::time::Duration;

use classnotify_shared::api::DEFAULT_API_BASE;
use classnotify_shared::domain::Course;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::AppError;
use crate::poller::PollOptions;

pub const ENV_CONFIG: &str = "CLASSNOTIFY_CONFIG";
pub const ENV_CREDENTIALS: &str = "CLASSNOTIFY_CREDENTIALS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Google OAuth client secrets. Relative paths are resolved against the
    /// config file's directory.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_sink_timeout")]
    pub sink_timeout_secs: u64,
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
    #[serde(default = "default_true")]
    pub desktop_notifications: bool,
    #[serde(default = "default_true")]
    pub print_feed: bool,
    /// Only watch these course ids. Unset means every active course.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub courses: Option<Vec<String>>,
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_interval() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    30
}

fn default_fetch_retries() -> u32 {
    1
}

fn default_retry_backoff() -> u64 {
    500
}

fn default_sink_timeout() -> u64 {
    10
}

fn default_feed_capacity() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credentials_file: default_credentials_file(),
            api_base: default_api_base(),
            interval_secs: default_interval(),
            request_timeout_secs: default_request_timeout(),
            fetch_retries: default_fetch_retries(),
            retry_backoff_ms: default_retry_backoff(),
            sink_timeout_secs: default_sink_timeout(),
            feed_capacity: default_feed_capacity(),
            desktop_notifications: true,
            print_feed: true,
            courses: None,
        }
    }
}

impl ClientConfig {
    /// Resolves the config path and loads it. A missing file yields defaults so
    /// a fresh install only needs `credentials.json` next to where the config
    /// would live.
    pub fn find_and_load(cli_value: Option<PathBuf>) -> Result<(PathBuf, ClientConfig), AppError> {
        let path = resolve_config_path(cli_value)?;
        let cfg = if path.exists() {
            load_config(&path)?
        } else {
            tracing::info!(path=?path, "config file not found; using defaults");
            ClientConfig::default()
        };
        cfg.validate()?;
        Ok((path, cfg))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.interval_secs == 0 {
            return Err(AppError::Config("interval_secs must be greater than 0".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.feed_capacity == 0 {
            return Err(AppError::Config("feed_capacity must be greater than 0".into()));
        }
        let url = url::Url::parse(&self.api_base)
            .map_err(|e| AppError::Config(format!("invalid api_base: {e}")))?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(AppError::Config(format!(
                "unsupported scheme for api_base: {other}"
            ))),
        }
    }

    pub fn credentials_path(&self, config_path: &Path) -> PathBuf {
        self.credentials_path_with(config_path, std::env::var_os(ENV_CREDENTIALS).map(PathBuf::from))
    }

    fn credentials_path_with(&self, config_path: &Path, env_override: Option<PathBuf>) -> PathBuf {
        if let Some(p) = env_override {
            return p;
        }
        if self.credentials_file.is_absolute() {
            return self.credentials_file.clone();
        }
        config_path
            .parent()
            .map(|dir| dir.join(&self.credentials_file))
            .unwrap_or_else(|| self.credentials_file.clone())
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_secs(self.interval_secs),
            fetch_retries: self.fetch_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_secs(self.sink_timeout_secs)
    }

    /// Applies the optional allow-list, keeping directory order.
    pub fn select_courses(&self, courses: Vec<Course>) -> Vec<Course> {
        match &self.courses {
            None => courses,
            Some(ids) => courses
                .into_iter()
                .filter(|c| ids.iter().any(|id| id == c.id.as_str()))
                .collect(),
        }
    }
}

pub fn resolve_config_path(cli_value: Option<PathBuf>) -> Result<PathBuf, AppError> {
    if let Some(p) = cli_value {
        return Ok(p);
    }
    if let Ok(p) = std::env::var(ENV_CONFIG) {
        return Ok(PathBuf::from(p));
    }
    default_config_path().ok_or_else(|| AppError::Config("could not determine config dir".into()))
}

pub fn default_config_path() -> Option<PathBuf> {
    let pd = ProjectDirs::from("dev", "classnotify", "classnotify")?;
    Some(pd.config_dir().join("client.yaml"))
}

pub fn load_config(path: &Path) -> Result<ClientConfig, AppError> {
    let data = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("read {} failed: {e}", path.display())))?;
    let cfg: ClientConfig = serde_yaml::from_str(&data)
        .map_err(|e| AppError::Config(format!("parse {} failed: {e}", path.display())))?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &ClientConfig) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let data = serde_yaml::to_string(cfg)
        .map_err(|e| AppError::Config(format!("serialize config failed: {e}")))?;
    std::fs::write(path, data)
        .map_err(|e| AppError::Config(format!("write {} failed: {e}", path.display())))
}

pub fn normalize_api_base(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.trim_end_matches('/').to_string()
    } else {
        format!("https://{}", trimmed.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg: ClientConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.poll_options().interval, Duration::from_secs(60));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_selected_fields() {
        let cfg: ClientConfig =
            serde_yaml::from_str("interval_secs: 120\ncourses: [\"42\"]\nprint_feed: false\n")
                .unwrap();
        assert_eq!(cfg.interval_secs, 120);
        assert!(!cfg.print_feed);
        assert!(cfg.desktop_notifications);

        let picked = cfg.select_courses(vec![Course::new("41", "Art"), Course::new("42", "Math")]);
        assert_eq!(picked, vec![Course::new("42", "Math")]);
    }

    #[test]
    fn validation_rejects_nonsense() {
        let cfg = ClientConfig {
            interval_secs: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(AppError::Config(_))));

        let cfg = ClientConfig {
            api_base: "ftp://example.com".into(),
            ..ClientConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("client.yaml");
        let cfg = ClientConfig {
            feed_capacity: 5,
            courses: Some(vec!["1".into()]),
            ..ClientConfig::default()
        };
        save_config(&path, &cfg).unwrap();
        assert_eq!(load_config(&path).unwrap(), cfg);

        let (found, loaded) = ClientConfig::find_and_load(Some(path.clone())).unwrap();
        assert_eq!(found, path);
        assert_eq!(loaded.feed_capacity, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let (_, cfg) = ClientConfig::find_and_load(Some(path)).unwrap();
        assert_eq!(cfg, ClientConfig::default());
    }

    #[test]
    fn credentials_resolve_next_to_config() {
        let cfg = ClientConfig::default();
        let cfg_path = Path::new("/home/u/.config/classnotify/client.yaml");
        assert_eq!(
            cfg.credentials_path_with(cfg_path, None),
            PathBuf::from("/home/u/.config/classnotify/credentials.json")
        );
        assert_eq!(
            cfg.credentials_path_with(cfg_path, Some(PathBuf::from("/tmp/c.json"))),
            PathBuf::from("/tmp/c.json")
        );
        let abs = ClientConfig {
            credentials_file: PathBuf::from("/etc/classnotify/secrets.json"),
            ..ClientConfig::default()
        };
        assert_eq!(
            abs.credentials_path_with(cfg_path, None),
            PathBuf::from("/etc/classnotify/secrets.json")
        );
    }

    #[test]
    fn api_base_normalization() {
        assert_eq!(normalize_api_base(" http://127.0.0.1:8080/ "), "http://127.0.0.1:8080");
        assert_eq!(normalize_api_base("classroom.googleapis.com"), "https://classroom.googleapis.com");
    }
}
