use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::identity::{CommentId, UserId, VideoId};
use crate::ports::BoxFuture;
use crate::ports::events::{CommentEventSink, SinkError};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommentEvent {
    Created {
        comment_id: CommentId,
        video_id: VideoId,
        user_id: UserId,
        written_at_ms: i64,
    },
    MutationFailed {
        operation: String,
        key: String,
        message: String,
        occurred_at_ms: i64,
    },
}

impl CommentEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::MutationFailed { .. } => "mutation_failed",
        }
    }

    pub fn subject(&self) -> String {
        match self {
            Self::Created { comment_id, .. } => comment_id.to_string(),
            Self::MutationFailed { key, .. } => key.clone(),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCommentEventSink {
    events: Arc<RwLock<Vec<CommentEvent>>>,
    unavailable: Arc<RwLock<bool>>,
}

impl InMemoryCommentEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<CommentEvent> {
        self.events.read().await.clone()
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }
}

impl CommentEventSink for InMemoryCommentEventSink {
    fn publish(&self, event: &CommentEvent) -> BoxFuture<'_, Result<(), SinkError>> {
        let event = event.clone();
        Box::pin(async move {
            if *self.unavailable.read().await {
                return Err(SinkError::Unavailable("in-memory sink disabled".into()));
            }
            self.events.write().await.push(event);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_event_serializes_with_kind_tag() {
        let event = CommentEvent::MutationFailed {
            operation: "write_comment".into(),
            key: "video:x".into(),
            message: "down".into(),
            occurred_at_ms: 5,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "mutation_failed");
        assert_eq!(event.kind(), "mutation_failed");
        assert_eq!(event.subject(), "video:x");
    }
}
