use std::sync::Arc;
use std::time::Instant;

use reelhub_domain::cursor::ContinuationMarker;
use reelhub_domain::identity::{CommentId, UserId, VideoId};
use reelhub_domain::ports::BoxFuture;
use reelhub_domain::ports::comments::{
    PageRequest, PartitionKey, Projection, ProjectionBatch, ProjectionRecord, ProjectionStore,
    RowPage, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;

use crate::db::{DbConfig, connect, map_surreal_error};
use crate::observability::record_store_call;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurrealCommentRow {
    video_id: String,
    user_id: String,
    comment_id: String,
    comment: String,
    written_at: i64,
}

impl SurrealCommentRow {
    fn from_record(record: &ProjectionRecord, written_at: i64) -> Self {
        Self {
            video_id: record.video_id.to_string(),
            user_id: record.user_id.to_string(),
            comment_id: record.comment_id.to_string(),
            comment: record.text.clone(),
            written_at,
        }
    }

    fn into_record(self) -> Result<ProjectionRecord, StoreError> {
        let invalid = |err: reelhub_domain::error::DomainError| {
            StoreError::Operation(format!("invalid comment row: {err}"))
        };
        Ok(ProjectionRecord {
            comment_id: self.comment_id.parse::<CommentId>().map_err(invalid)?,
            video_id: self.video_id.parse::<VideoId>().map_err(invalid)?,
            user_id: self.user_id.parse::<UserId>().map_err(invalid)?,
            text: self.comment,
        })
    }
}

fn partition_field(projection: Projection) -> &'static str {
    match projection {
        Projection::ByVideo => "video_id",
        Projection::ByUser => "user_id",
    }
}

fn partition_value(partition: &PartitionKey) -> String {
    match partition {
        PartitionKey::Video(video_id) => video_id.to_string(),
        PartitionKey::User(user_id) => user_id.to_string(),
    }
}

fn record_key(record: &ProjectionRecord, projection: Projection) -> String {
    format!(
        "{}_{}",
        partition_value(&record.partition_key(projection)),
        record.comment_id
    )
}

/// Comment projections in SurrealDB. Keys are `<partition>_<comment_id>` and
/// `comment_id` is the hyphenated v7 string, whose lexical order is creation order.
#[derive(Clone)]
pub struct SurrealProjectionStore {
    client: Arc<Surreal<Client>>,
}

impl SurrealProjectionStore {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        Ok(Self::with_client(connect(db_config).await?))
    }

    /// One guarded upsert per projection inside a single transaction. A row only
    /// replaces an existing one whose `written_at` is not newer.
    fn batch_query(batch: &ProjectionBatch) -> String {
        let mut query = String::from("BEGIN TRANSACTION;\n");
        for index in 0..batch.writes.len() {
            query.push_str(&format!(
                "LET $current_{index} = (SELECT VALUE written_at FROM ONLY type::record($table_{index}, $key_{index}));\n\
                 IF ($current_{index} ?? 0) <= $written_at {{ \
                    UPSERT type::record($table_{index}, $key_{index}) CONTENT $row_{index}; \
                 }};\n"
            ));
        }
        query.push_str("COMMIT TRANSACTION;");
        query
    }

    fn page_query(request: &PageRequest) -> String {
        let projection = request.partition.projection();
        let mut query = format!(
            "SELECT video_id, user_id, comment_id, comment, written_at \
             FROM {} WHERE {} = $partition",
            projection.as_str(),
            partition_field(projection)
        );
        if request.resume.is_some() {
            query.push_str(" AND comment_id < $bound");
        } else if request.starting_at.is_some() {
            query.push_str(" AND comment_id <= $bound");
        }
        query.push_str(" ORDER BY comment_id DESC LIMIT $limit");
        query
    }

    fn decode_rows(rows: Vec<Value>) -> Result<Vec<ProjectionRecord>, StoreError> {
        rows.into_iter()
            .map(|row| {
                serde_json::from_value::<SurrealCommentRow>(row)
                    .map_err(|err| StoreError::Operation(format!("invalid comment row: {err}")))
                    .and_then(SurrealCommentRow::into_record)
            })
            .collect()
    }
}

impl ProjectionStore for SurrealProjectionStore {
    fn execute_atomic(&self, batch: &ProjectionBatch) -> BoxFuture<'_, Result<(), StoreError>> {
        let query = Self::batch_query(batch);
        let mut bindings = Vec::with_capacity(batch.writes.len() * 3);
        for (index, write) in batch.writes.iter().enumerate() {
            let row = SurrealCommentRow::from_record(&write.record, batch.written_at_ms);
            let row = match serde_json::to_value(&row) {
                Ok(row) => row,
                Err(err) => {
                    return Box::pin(async move {
                        Err(StoreError::Operation(format!("encode comment row: {err}")))
                    });
                }
            };
            bindings.push((
                format!("table_{index}"),
                Value::String(write.projection.as_str().to_string()),
            ));
            bindings.push((
                format!("key_{index}"),
                Value::String(record_key(&write.record, write.projection)),
            ));
            bindings.push((format!("row_{index}"), row));
        }
        let written_at = batch.written_at_ms;
        let client = self.client.clone();
        Box::pin(async move {
            let started = Instant::now();
            let mut pending = client.query(&query).bind(("written_at", written_at));
            for binding in bindings {
                pending = pending.bind(binding);
            }
            let result = match pending.await {
                Ok(response) => response.check().map(|_| ()).map_err(map_surreal_error),
                Err(err) => Err(map_surreal_error(err)),
            };
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            record_store_call(
                "execute_atomic",
                if result.is_ok() { "ok" } else { "error" },
                elapsed,
            );
            result
        })
    }

    fn fetch_page(&self, request: &PageRequest) -> BoxFuture<'_, Result<RowPage, StoreError>> {
        let query = Self::page_query(request);
        let partition = partition_value(&request.partition);
        let fetch_size = request.fetch_size;
        let bound = match &request.resume {
            Some(marker) => match CommentId::from_bytes(marker.as_bytes()) {
                Ok(comment_id) => Some(comment_id.to_string()),
                Err(err) => {
                    let err = StoreError::InvalidMarker(err.to_string());
                    return Box::pin(async move { Err(err) });
                }
            },
            None => request.starting_at.map(|comment_id| comment_id.to_string()),
        };
        let client = self.client.clone();
        Box::pin(async move {
            let started = Instant::now();
            let mut pending = client
                .query(&query)
                .bind(("partition", partition))
                .bind(("limit", (fetch_size + 1) as i64));
            if let Some(bound) = bound {
                pending = pending.bind(("bound", bound));
            }
            let response = pending.await.map_err(map_surreal_error);
            let rows: Result<Vec<Value>, StoreError> = response.and_then(|mut response| {
                response.take(0).map_err(|err| {
                    StoreError::Operation(format!("invalid query result: {err}"))
                })
            });
            let elapsed = started.elapsed().as_secs_f64() * 1000.0;
            record_store_call(
                "fetch_page",
                if rows.is_ok() { "ok" } else { "error" },
                elapsed,
            );

            let mut rows = Self::decode_rows(rows?)?;
            let continuation = if rows.len() > fetch_size {
                rows.truncate(fetch_size);
                rows.last().map(|row| {
                    ContinuationMarker::new(row.comment_id.as_uuid().as_bytes().to_vec())
                })
            } else {
                None
            };
            Ok(RowPage { rows, continuation })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn request(resume: Option<ContinuationMarker>, starting_at: Option<CommentId>) -> PageRequest {
        PageRequest {
            partition: PartitionKey::User(UserId::from_uuid(Uuid::from_u128(9))),
            starting_at,
            fetch_size: 5,
            resume,
        }
    }

    #[test]
    fn page_query_uses_exclusive_bound_when_resuming() {
        let marker = ContinuationMarker::new(vec![0; 16]);
        let query = SurrealProjectionStore::page_query(&request(Some(marker), None));
        assert!(query.contains("FROM comments_by_user WHERE user_id = $partition"));
        assert!(query.contains("comment_id < $bound"));
    }

    #[test]
    fn page_query_uses_inclusive_starting_point() {
        let query = SurrealProjectionStore::page_query(&request(
            None,
            Some(CommentId::from_unix_ms(10)),
        ));
        assert!(query.contains("comment_id <= $bound"));
        let query = SurrealProjectionStore::page_query(&request(None, None));
        assert!(!query.contains("$bound"));
    }

    #[test]
    fn batch_query_wraps_every_write_in_one_transaction() {
        let record = ProjectionRecord {
            comment_id: CommentId::from_unix_ms(10),
            video_id: VideoId::from_uuid(Uuid::from_u128(1)),
            user_id: UserId::from_uuid(Uuid::from_u128(2)),
            text: "hi".into(),
        };
        let query = SurrealProjectionStore::batch_query(&ProjectionBatch::dual(record, 42));
        assert!(query.starts_with("BEGIN TRANSACTION;"));
        assert!(query.ends_with("COMMIT TRANSACTION;"));
        assert!(query.contains("$row_0") && query.contains("$row_1"));
    }

    #[test]
    fn row_round_trips_into_record() {
        let record = ProjectionRecord {
            comment_id: CommentId::from_unix_ms(10),
            video_id: VideoId::from_uuid(Uuid::from_u128(1)),
            user_id: UserId::from_uuid(Uuid::from_u128(2)),
            text: "hi".into(),
        };
        let row = SurrealCommentRow::from_record(&record, 42);
        assert_eq!(row.written_at, 42);
        assert_eq!(row.into_record().unwrap(), record);
    }
}
