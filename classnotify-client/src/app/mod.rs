//! Wiring shared by the long-running agent and the one-shot commands.

pub mod agent;
pub mod check;
pub mod presenter;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use classnotify_shared::domain::Course;
use tracing::{info, warn};

use crate::AppError;
use crate::classroom::{ClassroomApi, FetchError, RestClassroom, list_all_courses};
use crate::config::ClientConfig;
use crate::credentials::{OAuthTokens, load_client_secrets};
use crate::dispatch::Dispatcher;
use crate::sink::{DesktopSink, FeedSink, FeedView};

/// How long queued notifications get to drain on exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

pub(crate) fn connect(
    cfg_path: &Path,
    cfg: &ClientConfig,
) -> Result<Arc<dyn ClassroomApi>, AppError> {
    let secrets = load_client_secrets(&cfg.credentials_path(cfg_path))?;
    let tokens = OAuthTokens::from_keyring(secrets)?;
    Ok(Arc::new(RestClassroom::new(
        cfg.api_base.clone(),
        Arc::new(tokens),
        cfg.request_timeout(),
    )))
}

/// Fetches the course directory once. Any failure here is fatal.
pub(crate) async fn load_courses(
    api: &dyn ClassroomApi,
    cfg: &ClientConfig,
) -> Result<Vec<Course>, AppError> {
    let all = list_all_courses(api).await.map_err(|e| match e {
        FetchError::Auth(e) => AppError::Auth(format!("unable to obtain access token: {e}")),
        other => AppError::Http(format!("unable to list courses: {other}")),
    })?;
    let total = all.len();
    let courses = cfg.select_courses(all);
    if courses.is_empty() {
        warn!(active = total, "no courses to watch");
    }
    for c in &courses {
        info!(course_id=%c.id, name=%c.name, "watching course");
    }
    Ok(courses)
}

pub(crate) fn build_dispatcher(cfg: &ClientConfig) -> (Dispatcher, FeedView) {
    let (feed, view) = FeedSink::new(cfg.feed_capacity);
    let mut builder = Dispatcher::builder(cfg.sink_timeout()).sink(feed);
    if cfg.desktop_notifications {
        builder = builder.sink(DesktopSink::new());
    }
    (builder.spawn(), view)
}
