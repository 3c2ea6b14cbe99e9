//! Terminal view of the UI feed.

use std::io::Write;

use chrono::Local;
use tokio_util::sync::CancellationToken;

use crate::sink::{FeedSnapshot, FeedView};

/// Prints feed entries as they arrive until cancelled or the feed goes away.
pub async fn print_feed(mut view: FeedView, cancel: CancellationToken) {
    let mut printed = 0;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            alive = view.changed() => {
                let snap = view.latest();
                printed = write_new(&snap, printed, &mut std::io::stdout().lock());
                if !alive {
                    return;
                }
            }
        }
    }
    let snap = view.latest();
    write_new(&snap, printed, &mut std::io::stdout().lock());
}

/// Writes entries with `seq > after` and returns the last sequence written.
pub(crate) fn write_new(snap: &FeedSnapshot, after: u64, out: &mut impl Write) -> u64 {
    let mut last = after;
    for e in snap.entries.iter().filter(|e| e.seq > after) {
        let at = e.received_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
        if writeln!(out, "[{at}] {}\n{}\n", e.title, e.body).is_err() {
            break;
        }
        last = e.seq;
    }
    out.flush().ok();
    last
}
