//! "Already seen" bookkeeping for the poll loop.
//!
//! The scheduler owns a [`WatermarkState`] and threads it through each cycle:
//! it is read (never mutated) while courses are fetched, then replaced by
//! [`WatermarkState::commit`] once the pass is over.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use classnotify_shared::domain::CourseId;

use crate::item::{ItemKey, UpdateItem};

/// Instant below which (inclusive) updates count as already seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(DateTime<Utc>);

impl Watermark {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(at)
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.0
    }

    /// Strictly newer than the watermark. Equal timestamps are not new.
    pub fn is_new(&self, item: &UpdateItem) -> bool {
        is_new(item, *self)
    }

    /// Never moves backwards, even if the wall clock does.
    pub fn advance_to(self, at: DateTime<Utc>) -> Self {
        Self(self.0.max(at))
    }
}

pub fn is_new(item: &UpdateItem, watermark: Watermark) -> bool {
    item.modified_at() > watermark.0
}

/// Per-cycle result for each course, collected by the scheduler and applied in
/// one go by [`WatermarkState::commit`].
#[derive(Debug, Default)]
pub struct CycleLedger {
    succeeded: Vec<(CourseId, HashSet<ItemKey>)>,
    skipped: Vec<CourseId>,
}

impl CycleLedger {
    /// `straddling` holds the delivered items still newer than the watermark
    /// this cycle commits; a later cycle would otherwise see them again.
    pub fn succeeded(&mut self, course: CourseId, straddling: HashSet<ItemKey>) {
        self.succeeded.push((course, straddling));
    }

    pub fn skipped(&mut self, course: CourseId) {
        self.skipped.push(course);
    }
}

#[derive(Debug, Clone)]
pub struct WatermarkState {
    global: Watermark,
    // Baselines of courses whose last fetch failed, held at the watermark they
    // would have used so their missed window is rechecked.
    pinned: BTreeMap<CourseId, Watermark>,
    carried: HashMap<CourseId, HashSet<ItemKey>>,
}

impl WatermarkState {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            global: Watermark::new(start),
            pinned: BTreeMap::new(),
            carried: HashMap::new(),
        }
    }

    pub fn global(&self) -> Watermark {
        self.global
    }

    pub fn pinned(&self) -> impl Iterator<Item = (&CourseId, &Watermark)> {
        self.pinned.iter()
    }

    pub fn baseline_for(&self, course: &CourseId) -> Watermark {
        self.pinned.get(course).copied().unwrap_or(self.global)
    }

    /// Newer than the course's baseline and not already delivered by the
    /// previous cycle.
    pub fn should_dispatch(&self, course: &CourseId, item: &UpdateItem) -> bool {
        self.baseline_for(course).is_new(item) && !self.is_carried(course, item)
    }

    /// Delivered in an earlier cycle while newer than that cycle's start.
    pub fn is_carried(&self, course: &CourseId, item: &UpdateItem) -> bool {
        self.carried
            .get(course)
            .is_some_and(|keys| keys.contains(&item.key()))
    }

    /// The global watermark this state will have after committing a cycle
    /// that started at `cycle_start`.
    pub fn next_global(&self, cycle_start: DateTime<Utc>) -> Watermark {
        self.global.advance_to(cycle_start)
    }

    /// Ends a cycle: the global watermark becomes `cycle_start` no matter how
    /// many courses were skipped.
    pub fn commit(mut self, cycle_start: DateTime<Utc>, ledger: CycleLedger) -> Self {
        for course in ledger.skipped {
            let baseline = self.baseline_for(&course);
            self.pinned.entry(course).or_insert(baseline);
        }
        for (course, straddling) in ledger.succeeded {
            self.pinned.remove(&course);
            if straddling.is_empty() {
                self.carried.remove(&course);
            } else {
                self.carried.insert(course, straddling);
            }
        }
        self.global = self.next_global(cycle_start);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use classnotify_shared::domain::ItemId;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn item(course: &str, id: &str, at: DateTime<Utc>) -> UpdateItem {
        UpdateItem::Announcement {
            course_id: course.into(),
            id: ItemId::from(id),
            text: "x".into(),
            modified_at: at,
        }
    }

    #[test]
    fn boundary_is_exclusive() {
        let w = Watermark::new(t0());
        assert!(!w.is_new(&item("c", "a", t0())));
        assert!(w.is_new(&item("c", "a", t0() + Duration::nanoseconds(1))));
        assert!(!w.is_new(&item("c", "a", t0() - Duration::seconds(1))));
    }

    #[test]
    fn global_never_moves_backwards() {
        let state = WatermarkState::new(t0());
        let state = state.commit(t0() - Duration::minutes(5), CycleLedger::default());
        assert_eq!(state.global().at(), t0());
        let state = state.commit(t0() + Duration::minutes(1), CycleLedger::default());
        assert_eq!(state.global().at(), t0() + Duration::minutes(1));
    }

    #[test]
    fn skipped_course_keeps_its_earliest_baseline() {
        let physics = CourseId::from("physics");
        let math = CourseId::from("math");

        let mut ledger = CycleLedger::default();
        ledger.skipped(physics.clone());
        ledger.succeeded(math.clone(), HashSet::new());
        let state = WatermarkState::new(t0()).commit(t0() + Duration::minutes(1), ledger);

        assert_eq!(state.global().at(), t0() + Duration::minutes(1));
        assert_eq!(state.baseline_for(&math).at(), t0() + Duration::minutes(1));
        assert_eq!(state.baseline_for(&physics).at(), t0());

        let mut ledger = CycleLedger::default();
        ledger.skipped(physics.clone());
        let state = state.commit(t0() + Duration::minutes(2), ledger);
        assert_eq!(state.baseline_for(&physics).at(), t0());

        let mut ledger = CycleLedger::default();
        ledger.succeeded(physics.clone(), HashSet::new());
        let state = state.commit(t0() + Duration::minutes(3), ledger);
        assert_eq!(state.baseline_for(&physics).at(), t0() + Duration::minutes(3));
        assert_eq!(state.pinned().count(), 0);
    }

    #[test]
    fn straddling_items_are_not_delivered_twice() {
        let math = CourseId::from("math");
        let late = item("math", "a1", t0() + Duration::seconds(90));

        let mut ledger = CycleLedger::default();
        ledger.succeeded(math.clone(), HashSet::from([late.key()]));
        let state = WatermarkState::new(t0()).commit(t0() + Duration::minutes(1), ledger);
        assert!(!state.should_dispatch(&math, &late));

        // An edit produces a new version and is delivered again.
        let edited = item("math", "a1", t0() + Duration::seconds(95));
        assert!(state.should_dispatch(&math, &edited));

        let mut ledger = CycleLedger::default();
        ledger.succeeded(math.clone(), HashSet::new());
        let state = state.commit(t0() + Duration::minutes(2), ledger);
        assert!(!state.should_dispatch(&math, &late));
    }
}
