use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::BoxFuture;
use crate::cursor::ContinuationMarker;
use crate::identity::{CommentId, UserId, VideoId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store operation failed: {0}")]
    Operation(String),
    /// The store could not say whether the request was applied (timeouts, dropped links).
    #[error("store outcome unknown: {0}")]
    Indeterminate(String),
    #[error("continuation marker rejected: {0}")]
    InvalidMarker(String),
}

impl StoreError {
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Projection {
    ByVideo,
    ByUser,
}

impl Projection {
    pub const ALL: [Projection; 2] = [Projection::ByVideo, Projection::ByUser];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ByVideo => "comments_by_video",
            Self::ByUser => "comments_by_user",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PartitionKey {
    Video(VideoId),
    User(UserId),
}

impl PartitionKey {
    pub fn projection(&self) -> Projection {
        match self {
            Self::Video(_) => Projection::ByVideo,
            Self::User(_) => Projection::ByUser,
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video(video_id) => write!(f, "video:{video_id}"),
            Self::User(user_id) => write!(f, "user:{user_id}"),
        }
    }
}

/// One materialized copy of a comment. Both projections hold the same fields and
/// differ only in which id partitions them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionRecord {
    pub comment_id: CommentId,
    pub video_id: VideoId,
    pub user_id: UserId,
    pub text: String,
}

impl ProjectionRecord {
    pub fn partition_key(&self, projection: Projection) -> PartitionKey {
        match projection {
            Projection::ByVideo => PartitionKey::Video(self.video_id),
            Projection::ByUser => PartitionKey::User(self.user_id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionWrite {
    pub projection: Projection,
    pub record: ProjectionRecord,
}

/// Statements applied as one unit; every statement carries `written_at_ms` as its
/// write timestamp so conflict resolution agrees across projections.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionBatch {
    pub written_at_ms: i64,
    pub writes: Vec<ProjectionWrite>,
}

impl ProjectionBatch {
    pub fn dual(record: ProjectionRecord, written_at_ms: i64) -> Self {
        let writes = Projection::ALL
            .iter()
            .map(|projection| ProjectionWrite {
                projection: *projection,
                record: record.clone(),
            })
            .collect();
        Self {
            written_at_ms,
            writes,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub partition: PartitionKey,
    /// Inclusive upper bound; rows with `comment_id <= starting_at` are returned.
    pub starting_at: Option<CommentId>,
    pub fetch_size: usize,
    pub resume: Option<ContinuationMarker>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowPage {
    pub rows: Vec<ProjectionRecord>,
    pub continuation: Option<ContinuationMarker>,
}

pub trait ProjectionStore: Send + Sync {
    fn execute_atomic(&self, batch: &ProjectionBatch) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Rows in descending comment-id order, at most `fetch_size` of them. A
    /// continuation is returned only when more rows remain.
    fn fetch_page(&self, request: &PageRequest) -> BoxFuture<'_, Result<RowPage, StoreError>>;
}
