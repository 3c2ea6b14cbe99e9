use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Sink, SinkError};

const APP_NAME: &str = "Classroom Notifier";
/// Consecutive notify-rust failures before switching to log-only.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;
/// How long to stay log-only before trying the notification daemon again.
const RETRY_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    NotifyRust,
    LogOnly,
}

#[async_trait]
trait Backend: Send + Sync {
    async fn show(&self, title: &str, body: &str) -> Result<(), String>;
}

struct NotifyRustBackend;

#[async_trait]
impl Backend for NotifyRustBackend {
    async fn show(&self, title: &str, body: &str) -> Result<(), String> {
        show(title, body).await
    }
}

/// OS notification sink. After a run of failures it logs instead for a
/// cooldown period, then tries the notification daemon again.
pub struct DesktopSink {
    backend: Option<Box<dyn Backend>>,
    kind: NotifierKind,
    failures: u32,
    retry_at: Option<Instant>,
    cooldown: Duration,
}

impl Default for DesktopSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DesktopSink {
    pub fn new() -> Self {
        crate::platform::prepare_notification_env();
        debug!("desktop sink created: using notify-rust backend initially");
        Self::with_backend(Box::new(NotifyRustBackend), RETRY_COOLDOWN)
    }

    /// Never touches the notification daemon.
    pub fn log_only() -> Self {
        Self {
            backend: None,
            kind: NotifierKind::LogOnly,
            failures: 0,
            retry_at: None,
            cooldown: RETRY_COOLDOWN,
        }
    }

    fn with_backend(backend: Box<dyn Backend>, cooldown: Duration) -> Self {
        Self {
            backend: Some(backend),
            kind: NotifierKind::NotifyRust,
            failures: 0,
            retry_at: None,
            cooldown,
        }
    }

    pub fn kind(&self) -> NotifierKind {
        self.kind
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
async fn show(title: &str, body: &str) -> Result<(), String> {
    let mut n = notify_rust::Notification::new();
    n.appname(APP_NAME)
        .summary(title)
        .body(body)
        .urgency(notify_rust::Urgency::Normal)
        .show_async()
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[cfg(not(all(unix, not(target_os = "macos"))))]
async fn show(title: &str, body: &str) -> Result<(), String> {
    let (title, body) = (title.to_string(), body.to_string());
    tokio::task::spawn_blocking(move || {
        let mut n = notify_rust::Notification::new();
        n.appname(APP_NAME)
            .summary(&title)
            .body(&body)
            .show()
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .await
    .map_err(|e| e.to_string())?
}

#[async_trait]
impl Sink for DesktopSink {
    fn name(&self) -> &'static str {
        "desktop"
    }

    async fn notify(&mut self, title: &str, body: &str) -> Result<(), SinkError> {
        let Some(backend) = &self.backend else {
            info!("[NOTIFY] {title}: {body}");
            return Ok(());
        };

        if self.kind == NotifierKind::LogOnly {
            match self.retry_at {
                Some(at) if Instant::now() >= at => {
                    debug!("cooldown over; retrying notify-rust backend");
                    self.kind = NotifierKind::NotifyRust;
                }
                _ => {
                    info!("[NOTIFY] {title}: {body}");
                    return Err(SinkError::Failed(
                        "desktop notifications unavailable; logged instead".into(),
                    ));
                }
            }
        }

        match backend.show(title, body).await {
            Ok(()) => {
                if self.failures > 0 {
                    info!(failures = self.failures, "desktop notifications working again");
                }
                self.failures = 0;
                self.retry_at = None;
                debug!(%title, "desktop notification shown");
                Ok(())
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                if self.failures >= MAX_CONSECUTIVE_FAILURES {
                    warn!(error=%e, failures = self.failures, cooldown=?self.cooldown, "notify-rust keeps failing; logging notifications until cooldown ends");
                    self.kind = NotifierKind::LogOnly;
                    self.retry_at = Some(Instant::now() + self.cooldown);
                } else {
                    warn!(error=%e, failures = self.failures, "notify-rust failed");
                }
                info!("[NOTIFY] {title}: {body}");
                Err(SinkError::Failed(e))
            }
        }
    }
}
