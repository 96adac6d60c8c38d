use std::sync::Arc;
use std::time::Instant;

use reelhub_domain::identity::{UserId, VideoId};
use reelhub_domain::ports::BoxFuture;
use reelhub_domain::ports::comments::StoreError;
use reelhub_domain::ports::videos::VideoCatalog;
use reelhub_domain::related::{SuggestedVideoPreview, VideoRecord};
use serde::Deserialize;
use serde_json::Value;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::db::{DbConfig, connect, map_surreal_error};
use crate::observability::record_store_call;

#[derive(Debug, Deserialize)]
struct SurrealVideoRow {
    video_id: String,
    user_id: String,
    name: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SurrealVideoByTagRow {
    video_id: String,
    user_id: String,
    name: String,
    preview_image_location: String,
    added_date: String,
}

#[derive(Clone)]
pub struct SurrealVideoCatalog {
    client: Arc<Surreal<Client>>,
}

impl SurrealVideoCatalog {
    pub fn with_client(client: Arc<Surreal<Client>>) -> Self {
        Self { client }
    }

    pub async fn new(db_config: &DbConfig) -> anyhow::Result<Self> {
        Ok(Self::with_client(connect(db_config).await?))
    }

    fn parse_rfc3339(value: &str) -> Result<i64, StoreError> {
        let dt = OffsetDateTime::parse(value, &Rfc3339)
            .map_err(|err| StoreError::Operation(format!("invalid added_date: {err}")))?;
        Ok((dt.unix_timestamp_nanos() / 1_000_000) as i64)
    }

    fn decode_video(row: Value) -> Result<VideoRecord, StoreError> {
        let row = serde_json::from_value::<SurrealVideoRow>(row)
            .map_err(|err| StoreError::Operation(format!("invalid video row: {err}")))?;
        Ok(VideoRecord {
            video_id: parse_id::<VideoId>(&row.video_id)?,
            owner_user_id: parse_id::<UserId>(&row.user_id)?,
            name: row.name,
            tags: row.tags,
        })
    }

    fn decode_preview(row: Value) -> Result<SuggestedVideoPreview, StoreError> {
        let row = serde_json::from_value::<SurrealVideoByTagRow>(row)
            .map_err(|err| StoreError::Operation(format!("invalid videos_by_tag row: {err}")))?;
        Ok(SuggestedVideoPreview {
            video_id: parse_id::<VideoId>(&row.video_id)?,
            name: row.name,
            preview_image_location: row.preview_image_location,
            added_date_ms: Self::parse_rfc3339(&row.added_date)?,
            owner_user_id: Some(parse_id::<UserId>(&row.user_id)?),
        })
    }
}

/// Saturates instead of wrapping into a negative `LIMIT`.
fn limit_binding(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn parse_id<T>(value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|err| StoreError::Operation(format!("invalid id '{value}': {err}")))
}

impl VideoCatalog for SurrealVideoCatalog {
    fn get_video(
        &self,
        video_id: VideoId,
    ) -> BoxFuture<'_, Result<Option<VideoRecord>, StoreError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let started = Instant::now();
            let mut response = client
                .query(
                    "SELECT video_id, user_id, name, tags FROM videos \
                     WHERE video_id = $video_id LIMIT 1",
                )
                .bind(("video_id", video_id.to_string()))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| StoreError::Operation(format!("invalid query result: {err}")))?;
            record_store_call(
                "get_video",
                "ok",
                started.elapsed().as_secs_f64() * 1000.0,
            );
            rows.into_iter().next().map(Self::decode_video).transpose()
        })
    }

    fn list_by_tag(
        &self,
        tag: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SuggestedVideoPreview>, StoreError>> {
        let tag = tag.to_string();
        let client = self.client.clone();
        Box::pin(async move {
            let started = Instant::now();
            let mut response = client
                .query(
                    "SELECT video_id, user_id, name, preview_image_location, \
                            <string>added_date AS added_date \
                     FROM videos_by_tag WHERE tag = $tag \
                     ORDER BY added_date DESC LIMIT $limit",
                )
                .bind(("tag", tag))
                .bind(("limit", limit_binding(limit)))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response
                .take(0)
                .map_err(|err| StoreError::Operation(format!("invalid query result: {err}")))?;
            record_store_call(
                "list_by_tag",
                "ok",
                started.elapsed().as_secs_f64() * 1000.0,
            );
            rows.into_iter().map(Self::decode_preview).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tag_row_decodes_into_preview() {
        let row = json!({
            "video_id": "0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0001",
            "user_id": "966a83aa-6d8b-41b6-b4ac-79867de3b4fa",
            "name": "cats",
            "preview_image_location": "/p/cats.jpg",
            "added_date": "2018-01-01T00:00:00Z",
        });
        let preview = SurrealVideoCatalog::decode_preview(row).unwrap();
        assert_eq!(preview.added_date_ms, 1_514_764_800_000);
        assert_eq!(preview.name, "cats");
    }

    #[test]
    fn oversized_limit_saturates() {
        assert_eq!(limit_binding(8), 8);
        assert_eq!(limit_binding(usize::MAX), i64::MAX);
    }

    #[test]
    fn video_row_without_tags_has_empty_tag_list() {
        let row = json!({
            "video_id": "0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0001",
            "user_id": "966a83aa-6d8b-41b6-b4ac-79867de3b4fa",
            "name": "cats",
        });
        assert!(SurrealVideoCatalog::decode_video(row).unwrap().tags.is_empty());
    }

    #[test]
    fn malformed_id_is_an_operation_error() {
        let row = json!({
            "video_id": "not-a-uuid",
            "user_id": "966a83aa-6d8b-41b6-b4ac-79867de3b4fa",
            "name": "cats",
        });
        assert!(matches!(
            SurrealVideoCatalog::decode_video(row),
            Err(StoreError::Operation(_))
        ));
    }
}
