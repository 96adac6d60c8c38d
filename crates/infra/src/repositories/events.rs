use std::sync::Arc;

use reelhub_domain::events::CommentEvent;
use reelhub_domain::ports::BoxFuture;
use reelhub_domain::ports::events::{CommentEventSink, SinkError};
use reelhub_domain::util::{format_ms_rfc3339, now_ms};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;

use crate::db::{DbConfig, connect};
use crate::observability::record_comment_event;

/// Appends comment events to the `comment_event` outbox table.
#[derive(Clone)]
pub struct SurrealCommentEventSink {
    client: Arc<Surreal<Client>>,
}

impl SurrealCommentEventSink {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        Ok(Self::with_client(connect(db_config).await?))
    }
}

impl CommentEventSink for SurrealCommentEventSink {
    fn publish(&self, event: &CommentEvent) -> BoxFuture<'_, Result<(), SinkError>> {
        let kind = event.kind();
        let subject = event.subject();
        let payload = match serde_json::to_value(event) {
            Ok(payload) => payload,
            Err(err) => {
                return Box::pin(async move {
                    Err(SinkError::Rejected(format!("encode comment event: {err}")))
                });
            }
        };
        let client = self.client.clone();
        Box::pin(async move {
            client
                .query(
                    "CREATE comment_event SET \
                        kind = $kind, \
                        subject = $subject, \
                        payload = $payload, \
                        published_at = <datetime>$published_at",
                )
                .bind(("kind", kind))
                .bind(("subject", subject))
                .bind(("payload", payload))
                .bind(("published_at", format_ms_rfc3339(now_ms())))
                .await
                .map_err(|err| SinkError::Unavailable(err.to_string()))?
                .check()
                .map_err(|err| SinkError::Rejected(err.to_string()))?;
            record_comment_event(kind);
            Ok(())
        })
    }
}

/// Emits comment events as structured log lines. Used with the in-process backend.
#[derive(Clone, Debug, Default)]
pub struct TracingCommentEventSink;

impl CommentEventSink for TracingCommentEventSink {
    fn publish(&self, event: &CommentEvent) -> BoxFuture<'_, Result<(), SinkError>> {
        let kind = event.kind();
        let payload = serde_json::to_string(event).unwrap_or_default();
        Box::pin(async move {
            tracing::info!(kind, event = %payload, "comment event");
            record_comment_event(kind);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelhub_domain::identity::{CommentId, UserId, VideoId};
    use uuid::Uuid;

    #[tokio::test]
    async fn tracing_sink_accepts_every_event() {
        let sink = TracingCommentEventSink;
        let event = CommentEvent::Created {
            comment_id: CommentId::from_unix_ms(1),
            video_id: VideoId::from_uuid(Uuid::from_u128(1)),
            user_id: UserId::from_uuid(Uuid::from_u128(2)),
            written_at_ms: 1,
        };
        assert!(sink.publish(&event).await.is_ok());
    }
}
