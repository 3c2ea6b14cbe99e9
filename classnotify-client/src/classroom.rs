//! Item provider and course directory backed by the Classroom REST API.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use classnotify_shared::api::rest::{self, RestError};
use classnotify_shared::api::{ListAnnouncementsResp, ListCourseWorkResp, ListCoursesResp};
use classnotify_shared::domain::{Course, CourseId};
use tracing::{debug, warn};

use crate::credentials::{AuthError, TokenSource};

const MAX_COURSE_PAGES: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Rest(#[from] RestError),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout(_) => true,
            FetchError::Rest(e) => e.is_transient(),
            FetchError::Auth(e) => e.is_transient(),
        }
    }
}

/// The slice of the Classroom API the notifier consumes.
#[async_trait]
pub trait ClassroomApi: Send + Sync {
    async fn list_courses(&self, page_token: Option<&str>) -> Result<ListCoursesResp, FetchError>;

    async fn list_announcements(
        &self,
        course_id: &CourseId,
        order_by: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListAnnouncementsResp, FetchError>;

    async fn list_course_work(
        &self,
        course_id: &CourseId,
        order_by: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListCourseWorkResp, FetchError>;
}

/// Course directory: every active course, in the order the API returns them.
pub async fn list_all_courses(api: &dyn ClassroomApi) -> Result<Vec<Course>, FetchError> {
    let mut courses = Vec::new();
    let mut page_token: Option<String> = None;
    for _ in 0..MAX_COURSE_PAGES {
        let page = api.list_courses(page_token.as_deref()).await?;
        courses.extend(page.courses.into_iter().map(Course::from));
        match page.next_page_token {
            Some(t) if !t.is_empty() => page_token = Some(t),
            _ => return Ok(courses),
        }
    }
    warn!(pages = MAX_COURSE_PAGES, "course list truncated");
    Ok(courses)
}

pub struct RestClassroom {
    base: String,
    tokens: Arc<dyn TokenSource>,
    timeout: Duration,
}

impl RestClassroom {
    pub fn new(base: impl Into<String>, tokens: Arc<dyn TokenSource>, timeout: Duration) -> Self {
        Self {
            base: crate::config::normalize_api_base(&base.into()),
            tokens,
            timeout,
        }
    }

    /// Runs one request with a bearer token, both under the per-call timeout. A 401
    /// drops the cached token and retries once with a fresh one.
    async fn call<T, F, Fut>(&self, op: F) -> Result<T, FetchError>
    where
        F: Fn(String) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, RestError>> + Send,
        T: Send,
    {
        let mut reauthorized = false;
        loop {
            let attempt = async {
                let bearer = self.tokens.bearer().await?;
                op(bearer).await.map_err(FetchError::from)
            };
            let res = tokio::time::timeout(self.timeout, attempt)
                .await
                .map_err(|_| FetchError::Timeout(self.timeout))?;
            match res {
                Err(FetchError::Rest(RestError::Status { status: 401, .. })) if !reauthorized => {
                    debug!("unauthorized; refreshing access token and retrying");
                    self.tokens.invalidate().await;
                    reauthorized = true;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl ClassroomApi for RestClassroom {
    async fn list_courses(&self, page_token: Option<&str>) -> Result<ListCoursesResp, FetchError> {
        let base = self.base.as_str();
        self.call(|bearer| async move { rest::list_courses(base, &bearer, page_token).await })
            .await
    }

    async fn list_announcements(
        &self,
        course_id: &CourseId,
        order_by: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListAnnouncementsResp, FetchError> {
        let base = self.base.as_str();
        let id = course_id.as_str();
        self.call(|bearer| async move {
            rest::list_announcements(base, &bearer, id, order_by, page_token).await
        })
        .await
    }

    async fn list_course_work(
        &self,
        course_id: &CourseId,
        order_by: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ListCourseWorkResp, FetchError> {
        let base = self.base.as_str();
        let id = course_id.as_str();
        self.call(|bearer| async move {
            rest::list_course_work(base, &bearer, id, order_by, page_token).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Token source whose refresh never completes.
    struct StalledRefresh;

    #[async_trait]
    impl TokenSource for StalledRefresh {
        async fn bearer(&self) -> Result<String, AuthError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok("late".into())
        }

        async fn invalidate(&self) {}
    }

    #[tokio::test]
    async fn token_refresh_counts_against_the_request_timeout() {
        let api = RestClassroom::new(
            "http://127.0.0.1:9",
            Arc::new(StalledRefresh),
            Duration::from_millis(50),
        );
        let started = std::time::Instant::now();
        let err = api.list_courses(None).await.unwrap_err();
        assert!(matches!(err, FetchError::Timeout(_)), "{err}");
        assert!(err.is_transient());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
