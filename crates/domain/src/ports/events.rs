use thiserror::Error;

use super::BoxFuture;
use crate::events::CommentEvent;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("event sink unavailable: {0}")]
    Unavailable(String),
    #[error("event rejected: {0}")]
    Rejected(String),
}

/// At-most-once notification sink; callers never retry a failed publish.
pub trait CommentEventSink: Send + Sync {
    fn publish(&self, event: &CommentEvent) -> BoxFuture<'_, Result<(), SinkError>>;
}
