//! Notification dispatcher.
//!
//! Each registered sink gets an unbounded queue and a consumer task. The poll
//! loop only enqueues, so a slow or broken sink can never stall course
//! iteration or starve another sink.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use classnotify_shared::domain::Course;
use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::item::UpdateItem;
use crate::sink::Sink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
}

impl NotificationMessage {
    pub fn for_item(course: &Course, item: &UpdateItem) -> Self {
        let kind = item.kind();
        Self {
            title: format!("New {kind}"),
            body: format!("Course: {}\n{kind}: {}", course.name, item.content()),
        }
    }
}

struct SinkQueue {
    name: &'static str,
    tx: mpsc::UnboundedSender<NotificationMessage>,
}

pub struct Dispatcher {
    queues: Vec<SinkQueue>,
    workers: Vec<JoinHandle<()>>,
}

pub struct DispatcherBuilder {
    sinks: Vec<Box<dyn Sink>>,
    sink_timeout: Duration,
}

impl DispatcherBuilder {
    pub fn sink(mut self, sink: impl Sink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Spawns one consumer task per sink. Must be called inside a runtime.
    pub fn spawn(self) -> Dispatcher {
        let mut queues = Vec::with_capacity(self.sinks.len());
        let mut workers = Vec::with_capacity(self.sinks.len());
        for sink in self.sinks {
            let (tx, rx) = mpsc::unbounded_channel();
            queues.push(SinkQueue {
                name: sink.name(),
                tx,
            });
            workers.push(tokio::spawn(drain(sink, rx, self.sink_timeout)));
        }
        Dispatcher { queues, workers }
    }
}

impl Dispatcher {
    pub fn builder(sink_timeout: Duration) -> DispatcherBuilder {
        DispatcherBuilder {
            sinks: Vec::new(),
            sink_timeout,
        }
    }

    pub fn sink_count(&self) -> usize {
        self.queues.len()
    }

    /// Formats `item` and hands it to every sink.
    pub fn dispatch_item(&self, course: &Course, item: &UpdateItem) -> usize {
        self.dispatch(NotificationMessage::for_item(course, item))
    }

    /// Hands `msg` to every sink. Never blocks. Returns how many sinks
    /// accepted it (a sink whose task has died is skipped).
    pub fn dispatch(&self, msg: NotificationMessage) -> usize {
        let mut accepted = 0;
        for q in &self.queues {
            match q.tx.send(msg.clone()) {
                Ok(()) => accepted += 1,
                Err(_) => warn!(sink = q.name, "sink consumer gone; message dropped"),
            }
        }
        accepted
    }

    /// Closes the queues and waits up to `grace` for sinks to drain.
    pub async fn shutdown(self, grace: Duration) {
        drop(self.queues);
        for mut handle in self.workers {
            if tokio::time::timeout(grace, &mut handle).await.is_err() {
                warn!("sink consumer did not drain in time; aborting");
                handle.abort();
            }
        }
        debug!("dispatcher stopped");
    }
}

async fn drain(
    mut sink: Box<dyn Sink>,
    mut rx: mpsc::UnboundedReceiver<NotificationMessage>,
    timeout: Duration,
) {
    let name = sink.name();
    while let Some(msg) = rx.recv().await {
        let call = tokio::time::timeout(timeout, sink.notify(&msg.title, &msg.body));
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(Ok(()))) => debug!(sink = name, title = %msg.title, "delivered"),
            Ok(Ok(Err(e))) => warn!(sink = name, error=%e, "sink failed; message skipped"),
            Ok(Err(_)) => warn!(sink = name, ?timeout, "sink timed out; message skipped"),
            Err(_) => error!(sink = name, "sink panicked; message skipped"),
        }
    }
    info!(sink = name, "sink consumer exiting");
}
