//! Poll scheduler: one pass over every course, then sleep, until cancelled.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use classnotify_shared::domain::{Course, CourseId};
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classroom::ClassroomApi;
use crate::dispatch::Dispatcher;
use crate::fetcher::{self, FetchError, FetchedItems};
use crate::watermark::{CycleLedger, Watermark, WatermarkState};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Extra attempts for a transient fetch failure within one cycle.
    pub fetch_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            fetch_retries: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle_start: DateTime<Utc>,
    pub dispatched: usize,
    pub duplicates: usize,
    pub parse_failures: usize,
    pub skipped: Vec<CourseId>,
}

impl CycleReport {
    fn new(cycle_start: DateTime<Utc>) -> Self {
        Self {
            cycle_start,
            dispatched: 0,
            duplicates: 0,
            parse_failures: 0,
            skipped: Vec::new(),
        }
    }
}

pub struct Poller {
    api: Arc<dyn ClassroomApi>,
    courses: Vec<Course>,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    opts: PollOptions,
}

impl Poller {
    pub fn new(
        api: Arc<dyn ClassroomApi>,
        courses: Vec<Course>,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        opts: PollOptions,
    ) -> Self {
        Self {
            api,
            courses,
            dispatcher,
            clock,
            opts,
        }
    }

    pub fn courses(&self) -> &[Course] {
        &self.courses
    }

    /// One full pass. Every course is filtered against `state` as it was at the
    /// start of the pass; the returned state has the watermark moved to the
    /// instant captured before the first fetch.
    pub async fn run_cycle(&self, state: WatermarkState) -> (WatermarkState, CycleReport) {
        let cycle_start = self.clock.now();
        let deadline = Instant::now() + self.opts.interval;
        let mut report = CycleReport::new(cycle_start);
        let mut ledger = CycleLedger::default();

        for course in &self.courses {
            let baseline = state.baseline_for(&course.id);
            match self.fetch_with_retry(course, baseline, deadline).await {
                Ok(fetched) => {
                    report.parse_failures += fetched.parse_failures;
                    let straddling =
                        self.dispatch_new(course, &state, fetched, cycle_start, &mut report);
                    ledger.succeeded(course.id.clone(), straddling);
                }
                Err(e) => {
                    warn!(course_id=%course.id, course=%course.name, error=%e, "fetch failed; skipping course this cycle");
                    report.skipped.push(course.id.clone());
                    ledger.skipped(course.id.clone());
                }
            }
        }

        let next = state.commit(cycle_start, ledger);
        info!(
            dispatched = report.dispatched,
            skipped = report.skipped.len(),
            parse_failures = report.parse_failures,
            watermark = %next.global().at(),
            "poll cycle complete"
        );
        (next, report)
    }

    fn dispatch_new(
        &self,
        course: &Course,
        state: &WatermarkState,
        fetched: FetchedItems,
        cycle_start: DateTime<Utc>,
        report: &mut CycleReport,
    ) -> HashSet<crate::item::ItemKey> {
        let mut seen = HashSet::new();
        let mut straddling = HashSet::new();
        // Anything newer than this would pass the filter again next cycle.
        let next_global = state.next_global(cycle_start);
        for item in fetched.items {
            if state.is_carried(&course.id, &item) {
                if next_global.is_new(&item) {
                    straddling.insert(item.key());
                }
                continue;
            }
            if !state.baseline_for(&course.id).is_new(&item) {
                continue;
            }
            let key = item.key();
            if !seen.insert(key.clone()) {
                report.duplicates += 1;
                continue;
            }
            debug!(course_id=%course.id, kind=%item.kind(), id=%item.id(), "new item");
            self.dispatcher.dispatch_item(course, &item);
            report.dispatched += 1;
            if next_global.is_new(&item) {
                straddling.insert(key);
            }
        }
        straddling
    }

    async fn fetch_with_retry(
        &self,
        course: &Course,
        baseline: Watermark,
        deadline: Instant,
    ) -> Result<FetchedItems, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            match fetcher::fetch(self.api.as_ref(), course, baseline).await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.opts.fetch_retries => {
                    let backoff = self.opts.retry_backoff.saturating_mul(1 << attempt.min(16));
                    if Instant::now() + backoff >= deadline {
                        return Err(e);
                    }
                    attempt += 1;
                    debug!(course_id=%course.id, attempt, error=%e, ?backoff, "transient fetch failure; retrying");
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs cycles until `cancel` fires and returns the last committed state.
    /// A cycle interrupted by cancellation is not committed.
    pub async fn run(&self, cancel: CancellationToken, mut state: WatermarkState) -> WatermarkState {
        let interval = self.opts.interval;
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let start = Instant::now();
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("poller cancelled mid-cycle");
                    break;
                }
                (next, _report) = self.run_cycle(state.clone()) => {
                    state = next;
                }
            }

            let elapsed = start.elapsed();
            if elapsed < interval {
                tokio::select! {
                    _ = cancel.cancelled() => { break; }
                    _ = sleep(interval - elapsed) => {}
                }
            }
        }
        state
    }

    /// Stops the sink consumers after letting queued messages drain.
    pub async fn shutdown(self, grace: Duration) {
        self.dispatcher.shutdown(grace).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicI64, Ordering};

    use chrono::Duration as ChronoDuration;
    use tokio::sync::mpsc;

    use super::*;
    use crate::dispatch::NotificationMessage;
    use crate::dispatch::tests::RecordingSink;
    use crate::fetcher::tests::{FakeApi, announcement, course_work, rfc, t0};

    /// Clock that reads from a shared counter of milliseconds past `t0`.
    struct FakeClock(Arc<AtomicI64>);

    impl Clock for FakeClock {
        fn now(&self) -> DateTime<Utc> {
            t0() + ChronoDuration::milliseconds(self.0.load(Ordering::SeqCst))
        }
    }

    fn opts() -> PollOptions {
        PollOptions {
            interval: Duration::from_secs(60),
            fetch_retries: 0,
            retry_backoff: Duration::from_millis(1),
        }
    }

    fn poller(
        api: FakeApi,
        clock_ms: Arc<AtomicI64>,
        opts: PollOptions,
    ) -> (Poller, Arc<FakeApi>, mpsc::UnboundedReceiver<NotificationMessage>) {
        let (sink, rx) = RecordingSink::new();
        let dispatcher = Dispatcher::builder(Duration::from_secs(1)).sink(sink).spawn();
        let courses = api.courses.iter().cloned().map(Course::from).collect();
        let api = Arc::new(api);
        let p = Poller::new(
            api.clone(),
            courses,
            dispatcher,
            Arc::new(FakeClock(clock_ms)),
            opts,
        );
        (p, api, rx)
    }

    async fn drain(p: Poller, mut rx: mpsc::UnboundedReceiver<NotificationMessage>) -> Vec<NotificationMessage> {
        p.shutdown(Duration::from_secs(1)).await;
        let mut got = Vec::new();
        while let Some(m) = rx.recv().await {
            got.push(m);
        }
        got
    }

    fn at(secs: i64) -> String {
        rfc(t0() + ChronoDuration::seconds(secs))
    }

    #[tokio::test]
    async fn new_announcement_is_dispatched_once() {
        let api = FakeApi::default().with_course("c1", "Math");
        api.set_announcements("c1", vec![vec![announcement("c1", "a1", "Quiz Friday", &at(5))]]);
        let clock = Arc::new(AtomicI64::new(60_000));
        let (p, _api, rx) = poller(api, clock.clone(), opts());

        let state = WatermarkState::new(t0());
        let (state, report) = p.run_cycle(state).await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(state.global().at(), t0() + ChronoDuration::seconds(60));

        clock.store(120_000, Ordering::SeqCst);
        let (_, report) = p.run_cycle(state).await;
        assert_eq!(report.dispatched, 0);

        let got = drain(p, rx).await;
        assert_eq!(
            got,
            vec![NotificationMessage {
                title: "New Announcement".into(),
                body: "Course: Math\nAnnouncement: Quiz Friday".into(),
            }]
        );
    }

    #[tokio::test]
    async fn boundary_and_identical_timestamps() {
        let api = FakeApi::default().with_course("c1", "Math");
        let exact = rfc(t0());
        let one_ns = rfc(t0() + ChronoDuration::nanoseconds(1));
        api.set_announcements(
            "c1",
            vec![vec![
                announcement("c1", "a3", "twin one", &at(9)),
                announcement("c1", "a4", "twin two", &at(9)),
                announcement("c1", "a2", "just after", &one_ns),
                announcement("c1", "a1", "exactly at", &exact),
            ]],
        );
        let (p, _api, rx) = poller(api, Arc::new(AtomicI64::new(60_000)), opts());

        let (_, report) = p.run_cycle(WatermarkState::new(t0())).await;
        assert_eq!(report.dispatched, 3);

        let mut bodies: Vec<String> = drain(p, rx).await.into_iter().map(|m| m.body).collect();
        bodies.sort();
        assert_eq!(
            bodies,
            vec![
                "Course: Math\nAnnouncement: just after",
                "Course: Math\nAnnouncement: twin one",
                "Course: Math\nAnnouncement: twin two",
            ]
        );
    }

    #[tokio::test]
    async fn duplicate_items_across_pages_are_sent_once() {
        let api = FakeApi::default().with_course("c1", "Math");
        api.set_course_work(
            "c1",
            vec![
                vec![course_work("c1", "w1", "Essay", &at(20))],
                vec![
                    course_work("c1", "w1", "Essay", &at(20)),
                    course_work("c1", "w0", "Old", &at(-20)),
                ],
            ],
        );
        let (p, _api, rx) = poller(api, Arc::new(AtomicI64::new(60_000)), opts());
        let (_, report) = p.run_cycle(WatermarkState::new(t0())).await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(drain(p, rx).await.len(), 1);
    }

    #[tokio::test]
    async fn failed_course_is_skipped_and_retried_next_cycle() {
        let api = FakeApi::default()
            .with_course("c2", "Physics")
            .with_course("c1", "Math");
        api.set_announcements("c1", vec![vec![announcement("c1", "a1", "Quiz Friday", &at(5))]]);
        api.set_announcements("c2", vec![vec![announcement("c2", "p1", "Lab moved", &at(10))]]);
        api.fail("c2", 500);
        let clock = Arc::new(AtomicI64::new(60_000));
        let (p, api, rx) = poller(api, clock.clone(), opts());

        let (state, report) = p.run_cycle(WatermarkState::new(t0())).await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.skipped, vec![CourseId::from("c2")]);
        // Watermark advances regardless.
        assert_eq!(state.global().at(), t0() + ChronoDuration::seconds(60));

        api.recover("c2");
        clock.store(120_000, Ordering::SeqCst);
        let (state, report) = p.run_cycle(state).await;
        assert_eq!(report.dispatched, 1);
        assert!(report.skipped.is_empty());
        assert_eq!(state.pinned().count(), 0);

        let bodies: Vec<String> = drain(p, rx).await.into_iter().map(|m| m.body).collect();
        assert_eq!(
            bodies,
            vec![
                "Course: Math\nAnnouncement: Quiz Friday",
                "Course: Physics\nAnnouncement: Lab moved",
            ]
        );
    }

    #[tokio::test]
    async fn all_courses_share_the_cycle_start_baseline() {
        // The clock moves forward on every API call; the second course's item
        // is modified after the first course was fetched.
        let clock = Arc::new(AtomicI64::new(60_000));
        let ticking = clock.clone();
        let mut api = FakeApi::default()
            .with_course("c1", "Math")
            .with_course("c2", "Physics");
        api.on_call = Some(Box::new(move || {
            ticking.fetch_add(5_000, Ordering::SeqCst);
        }));
        api.set_announcements("c2", vec![vec![announcement("c2", "p1", "mid-cycle", &at(62))]]);
        let (p, _api, rx) = poller(api, clock.clone(), opts());

        let start = WatermarkState::new(t0() + ChronoDuration::seconds(30));
        let (state, report) = p.run_cycle(start).await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.cycle_start, t0() + ChronoDuration::seconds(60));
        assert_eq!(state.global().at(), t0() + ChronoDuration::seconds(60));

        // Newer than the new watermark, but already delivered.
        let (_, report) = p.run_cycle(state).await;
        assert_eq!(report.dispatched, 0);
        assert_eq!(drain(p, rx).await.len(), 1);
    }

    #[tokio::test]
    async fn watermark_is_monotonic_across_cycles() {
        let api = FakeApi::default().with_course("c1", "Math");
        let clock = Arc::new(AtomicI64::new(60_000));
        let (p, _api, _rx) = poller(api, clock.clone(), opts());

        let mut state = WatermarkState::new(t0());
        let mut last = state.global();
        for ms in [120_000, 90_000, 180_000, 180_000] {
            clock.store(ms, Ordering::SeqCst);
            let (next, _) = p.run_cycle(state).await;
            assert!(next.global() >= last);
            last = next.global();
            state = next;
        }
        assert_eq!(last.at(), t0() + ChronoDuration::seconds(180));
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_the_cycle() {
        let api = FakeApi::default().with_course("c1", "Math");
        api.set_announcements("c1", vec![vec![announcement("c1", "a1", "hi", &at(5))]]);
        api.fail_times("c1", 503, 2);
        let (p, api, rx) = poller(
            api,
            Arc::new(AtomicI64::new(60_000)),
            PollOptions {
                interval: Duration::from_secs(60),
                fetch_retries: 3,
                retry_backoff: Duration::from_millis(5),
            },
        );
        let (_, report) = p.run_cycle(WatermarkState::new(t0())).await;
        assert!(report.skipped.is_empty());
        assert_eq!(report.dispatched, 1);
        // two failed attempts, then announcements + coursework
        assert_eq!(api.calls.load(Ordering::SeqCst), 4);
        assert_eq!(drain(p, rx).await.len(), 1);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let api = FakeApi::default().with_course("c1", "Math");
        api.fail("c1", 403);
        let (p, api, _rx) = poller(
            api,
            Arc::new(AtomicI64::new(60_000)),
            PollOptions {
                fetch_retries: 3,
                ..opts()
            },
        );
        let (_, report) = p.run_cycle(WatermarkState::new(t0())).await;
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_never_outlast_the_interval() {
        let api = FakeApi::default().with_course("c1", "Math");
        api.fail("c1", 503);
        let (p, api, _rx) = poller(
            api,
            Arc::new(AtomicI64::new(60_000)),
            PollOptions {
                interval: Duration::from_millis(1000),
                fetch_retries: 10,
                retry_backoff: Duration::from_millis(400),
            },
        );
        let started = std::time::Instant::now();
        let (_, report) = p.run_cycle(WatermarkState::new(t0())).await;
        assert_eq!(report.skipped.len(), 1);
        assert!(started.elapsed() < Duration::from_millis(900));
        // first attempt + one retry: a 400ms wait fits in the interval, 800ms does not
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_stops_promptly_on_cancel() {
        let api = FakeApi::default().with_course("c1", "Math");
        let (p, _api, _rx) = poller(
            api,
            Arc::new(AtomicI64::new(60_000)),
            PollOptions {
                interval: Duration::from_secs(3600),
                ..opts()
            },
        );
        let cancel = CancellationToken::new();
        let child = cancel.child_token();
        let trigger = tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            cancel.cancel();
        });
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            p.run(child, WatermarkState::new(t0())),
        )
        .await
        .expect("poller did not stop");
        trigger.await.unwrap();
        assert_eq!(state.global().at(), t0() + ChronoDuration::seconds(60));
    }

    #[tokio::test]
    async fn clock_stepping_back_does_not_redeliver() {
        let api = FakeApi::default().with_course("c1", "Math");
        api.set_announcements("c1", vec![vec![announcement("c1", "a1", "ahead", &at(90))]]);
        let clock = Arc::new(AtomicI64::new(60_000));
        let (p, _api, rx) = poller(api, clock.clone(), opts());

        let mut state = WatermarkState::new(t0());
        let mut per_cycle = Vec::new();
        for ms in [60_000, 30_000, 40_000, 50_000] {
            clock.store(ms, Ordering::SeqCst);
            let (next, report) = p.run_cycle(state).await;
            per_cycle.push(report.dispatched);
            state = next;
        }
        assert_eq!(per_cycle, vec![1, 0, 0, 0]);
        assert_eq!(state.global().at(), t0() + ChronoDuration::seconds(60));

        // Once the watermark passes the item, it no longer needs carrying.
        clock.store(120_000, Ordering::SeqCst);
        let (state, report) = p.run_cycle(state).await;
        assert_eq!(report.dispatched, 0);
        let (_, report) = p.run_cycle(state).await;
        assert_eq!(report.dispatched, 0);

        assert_eq!(drain(p, rx).await.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_cycle_is_not_committed() {
        let cancel = CancellationToken::new();
        let trip = cancel.clone();
        let mut api = FakeApi::default().with_course("c1", "Math");
        api.on_call = Some(Box::new(move || trip.cancel()));
        api.set_announcements("c1", vec![vec![announcement("c1", "a1", "hi", &at(5))]]);
        api.fail_times("c1", 503, 1);
        let (p, api, rx) = poller(
            api,
            Arc::new(AtomicI64::new(60_000)),
            PollOptions {
                interval: Duration::from_secs(3600),
                fetch_retries: 1,
                retry_backoff: Duration::from_secs(2),
            },
        );

        // The first fetch fails and the retry backoff is interrupted.
        let state = tokio::time::timeout(
            Duration::from_secs(1),
            p.run(cancel.child_token(), WatermarkState::new(t0())),
        )
        .await
        .expect("poller did not stop");
        assert_eq!(state.global().at(), t0());
        assert_eq!(state.pinned().count(), 0);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert!(drain(p, rx).await.is_empty());
    }
}
