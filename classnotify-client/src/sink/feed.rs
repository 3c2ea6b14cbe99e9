//! In-memory UI feed: a bounded, append-only list plus a refresh signal.
//!
//! The feed is mutated only by the dispatcher task that owns the [`FeedSink`].
//! Presentation code holds a [`FeedView`] and reads snapshots published on a
//! `watch` channel whenever an entry is appended.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::{Sink, SinkError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// 1-based, monotonically increasing across the life of the feed.
    pub seq: u64,
    pub received_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    /// Oldest first, at most `capacity` entries.
    pub entries: Vec<FeedEntry>,
    /// Entries appended so far, including evicted ones.
    pub total: u64,
}

pub struct FeedSink {
    capacity: usize,
    entries: VecDeque<FeedEntry>,
    next_seq: u64,
    tx: watch::Sender<FeedSnapshot>,
}

impl FeedSink {
    pub fn new(capacity: usize) -> (Self, FeedView) {
        let capacity = capacity.max(1);
        let (tx, rx) = watch::channel(FeedSnapshot::default());
        let sink = Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            next_seq: 1,
            tx,
        };
        (sink, FeedView { rx })
    }

    fn append(&mut self, title: &str, body: &str) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(FeedEntry {
            seq: self.next_seq,
            received_at: Utc::now(),
            title: title.to_string(),
            body: body.to_string(),
        });
        self.next_seq += 1;
        self.tx.send_replace(FeedSnapshot {
            entries: self.entries.iter().cloned().collect(),
            total: self.next_seq - 1,
        });
    }
}

#[async_trait]
impl Sink for FeedSink {
    fn name(&self) -> &'static str {
        "feed"
    }

    async fn notify(&mut self, title: &str, body: &str) -> Result<(), SinkError> {
        self.append(title, body);
        Ok(())
    }
}

/// Read-only handle on the feed.
#[derive(Clone)]
pub struct FeedView {
    rx: watch::Receiver<FeedSnapshot>,
}

impl FeedView {
    pub fn snapshot(&self) -> FeedSnapshot {
        self.rx.borrow().clone()
    }

    /// Waits for the next refresh. Returns `false` once the feed is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Marks the current snapshot as seen and returns it.
    pub fn latest(&mut self) -> FeedSnapshot {
        self.rx.borrow_and_update().clone()
    }
}
