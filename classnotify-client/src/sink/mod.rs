//! Delivery endpoints for notification messages.

pub mod desktop;
pub mod feed;

use async_trait::async_trait;

pub use desktop::DesktopSink;
pub use feed::{FeedEntry, FeedSink, FeedSnapshot, FeedView};

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{0}")]
    Failed(String),
}

/// A best-effort notification target. Each sink is owned and driven by its
/// own consumer task, so `notify` may take `&mut self`.
#[async_trait]
pub trait Sink: Send {
    fn name(&self) -> &'static str;
    async fn notify(&mut self, title: &str, body: &str) -> Result<(), SinkError>;
}
