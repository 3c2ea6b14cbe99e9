//! Update fetcher: announcements and coursework for one course, newest first.

use classnotify_shared::api::ORDER_BY_UPDATE_TIME_DESC;
use classnotify_shared::domain::Course;
use tracing::{debug, warn};

pub use crate::classroom::FetchError;
use crate::classroom::ClassroomApi;
use crate::item::{ItemParseError, UpdateItem};
use crate::watermark::Watermark;

/// Upper bound on pages read per item type per course in one cycle.
const MAX_PAGES: usize = 10;

#[derive(Debug, Default)]
pub struct FetchedItems {
    /// Announcements first, then assignments; each newest first as served.
    pub items: Vec<UpdateItem>,
    /// Items dropped because their timestamp could not be parsed.
    pub parse_failures: usize,
    /// Pagination hit the page limit while items were still fresh.
    pub truncated: bool,
}

impl FetchedItems {
    /// Records one parsed record; returns whether pagination may continue.
    fn accept(&mut self, parsed: Result<UpdateItem, ItemParseError>, since: Watermark) -> bool {
        match parsed {
            Ok(item) => {
                let fresh = since.is_new(&item);
                self.items.push(item);
                fresh
            }
            Err(e) => {
                warn!(error=%e, "skipping item with unparseable timestamp");
                self.parse_failures += 1;
                true
            }
        }
    }
}

/// Fetches candidate items for `course`.
///
/// `since_hint` only limits pagination: items come back sorted by update time
/// descending, so once a page contains something not newer than the hint the
/// following pages are older still. Callers must filter the result themselves.
pub async fn fetch(
    api: &dyn ClassroomApi,
    course: &Course,
    since_hint: Watermark,
) -> Result<FetchedItems, FetchError> {
    let mut out = FetchedItems::default();

    let mut page_token: Option<String> = None;
    for _ in 0..MAX_PAGES {
        let page = api
            .list_announcements(
                &course.id,
                Some(ORDER_BY_UPDATE_TIME_DESC),
                page_token.as_deref(),
            )
            .await?;
        let mut all_fresh = true;
        for dto in page.announcements {
            let parsed = UpdateItem::from_announcement(course.id.clone(), dto);
            all_fresh &= out.accept(parsed, since_hint);
        }
        page_token = page.next_page_token.filter(|t| !t.is_empty() && all_fresh);
        if page_token.is_none() {
            break;
        }
    }
    if page_token.is_some() {
        warn!(course_id=%course.id, pages = MAX_PAGES, "announcements truncated");
        out.truncated = true;
    }

    let mut page_token: Option<String> = None;
    for _ in 0..MAX_PAGES {
        let page = api
            .list_course_work(
                &course.id,
                Some(ORDER_BY_UPDATE_TIME_DESC),
                page_token.as_deref(),
            )
            .await?;
        let mut all_fresh = true;
        for dto in page.course_work {
            let parsed = UpdateItem::from_course_work(course.id.clone(), dto);
            all_fresh &= out.accept(parsed, since_hint);
        }
        page_token = page.next_page_token.filter(|t| !t.is_empty() && all_fresh);
        if page_token.is_none() {
            break;
        }
    }
    if page_token.is_some() {
        warn!(course_id=%course.id, pages = MAX_PAGES, "course work truncated");
        out.truncated = true;
    }

    debug!(
        course_id=%course.id,
        items = out.items.len(),
        parse_failures = out.parse_failures,
        "fetched course updates"
    );
    Ok(out)
}
