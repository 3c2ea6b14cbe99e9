//! Minimal REST client helpers for the Classroom API.

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    /// Errors worth retrying within the same cycle: transport failures,
    /// throttling and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            RestError::Http(_) => true,
            RestError::Status { status, .. } => *status == 429 || *status >= 500,
            RestError::Serde(_) => false,
        }
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        // Keep TCP connections alive at kernel level
        .tcp_keepalive(Some(Duration::from_secs(180)))
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(180))
        // Bound request duration
        .timeout(Duration::from_secs(120))
        .build()
        .expect("failed to build HTTP client")
});

pub(crate) fn mk_client() -> Result<reqwest::Client, RestError> {
    Ok(HTTP_CLIENT.clone())
}

pub(crate) async fn handle_json<T: for<'de> serde::Deserialize<'de>>(
    res: reqwest::Response,
) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn get_json<T: for<'de> serde::Deserialize<'de>>(
    url: String,
    bearer: &str,
) -> Result<T, RestError> {
    let client = mk_client()?;
    let res = client
        .get(url)
        .bearer_auth(bearer)
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn list_courses(
    base: &str,
    bearer: &str,
    page_token: Option<&str>,
) -> Result<ListCoursesResp, RestError> {
    get_json(ep::courses(base, page_token), bearer).await
}

pub async fn list_announcements(
    base: &str,
    bearer: &str,
    course_id: &str,
    order_by: Option<&str>,
    page_token: Option<&str>,
) -> Result<ListAnnouncementsResp, RestError> {
    get_json(
        ep::course_announcements(base, course_id, order_by, page_token),
        bearer,
    )
    .await
}

pub async fn list_course_work(
    base: &str,
    bearer: &str,
    course_id: &str,
    order_by: Option<&str>,
    page_token: Option<&str>,
) -> Result<ListCourseWorkResp, RestError> {
    get_json(ep::course_work(base, course_id, order_by, page_token), bearer).await
}
