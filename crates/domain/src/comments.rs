use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::DomainResult;
use crate::cursor::{ContinuationMarker, decode_cursor, encode_cursor};
use crate::error::DomainError;
use crate::events::CommentEvent;
use crate::execution::{Completion, ExecutionMode};
use crate::identity::{CommentId, UserId, VideoId};
use crate::ports::BoxFuture;
use crate::ports::comments::{
    PageRequest, PartitionKey, ProjectionBatch, ProjectionRecord, ProjectionStore, RowPage,
    StoreError,
};
use crate::ports::events::CommentEventSink;
use crate::util::{elapsed_ms, now_ms};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

const WRITE_OPERATION: &str = "write_comment";
const LIST_OPERATION: &str = "list_comments";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: CommentId,
    pub video_id: VideoId,
    pub user_id: UserId,
    pub text: String,
}

impl Comment {
    pub fn created_at_ms(&self) -> i64 {
        self.comment_id.created_at_ms()
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.comment_id.created_at()
    }

    fn to_record(&self) -> ProjectionRecord {
        ProjectionRecord {
            comment_id: self.comment_id,
            video_id: self.video_id,
            user_id: self.user_id,
            text: self.text.clone(),
        }
    }
}

impl From<ProjectionRecord> for Comment {
    fn from(record: ProjectionRecord) -> Self {
        Self {
            comment_id: record.comment_id,
            video_id: record.video_id,
            user_id: record.user_id,
            text: record.text,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommentSubmission {
    pub video_id: VideoId,
    pub user_id: UserId,
    pub text: String,
    #[serde(default)]
    pub comment_id: Option<CommentId>,
}

impl CommentSubmission {
    pub fn new(video_id: VideoId, user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            video_id,
            user_id,
            text: text.into(),
            comment_id: None,
        }
    }

    pub fn with_comment_id(mut self, comment_id: CommentId) -> Self {
        self.comment_id = Some(comment_id);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentWritten {
    pub comment: Comment,
    pub written_at_ms: i64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ListOptions {
    #[serde(default)]
    pub starting_at: Option<CommentId>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size),
            ..Self::default()
        }
    }

    pub fn starting_at(mut self, comment_id: CommentId) -> Self {
        self.starting_at = Some(comment_id);
        self
    }

    pub fn with_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Writes comments into both projections as one unit and reads pages back from either.
#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn ProjectionStore>,
    events: Arc<dyn CommentEventSink>,
}

impl CommentService {
    pub fn new(store: Arc<dyn ProjectionStore>, events: Arc<dyn CommentEventSink>) -> Self {
        Self { store, events }
    }

    /// The logical write timestamp is taken here, before dispatch, so every
    /// statement in the batch carries the same value in either mode.
    pub async fn write_comment(
        &self,
        submission: CommentSubmission,
        mode: ExecutionMode,
    ) -> Completion<CommentWritten> {
        let written_at_ms = now_ms();
        let comment = match validate_submission(submission) {
            Ok(comment) => comment,
            Err(err) => return Completion::ready(Err(err)),
        };
        let key = comment.comment_id.to_string();
        let service = self.clone();
        Completion::run(
            mode,
            async move { service.apply_write(comment, written_at_ms).await },
            move |message| DomainError::WriteFailure {
                operation: WRITE_OPERATION,
                key,
                message,
            },
        )
        .await
    }

    pub async fn list_comments(
        &self,
        partition: PartitionKey,
        options: ListOptions,
        mode: ExecutionMode,
    ) -> Completion<Page<Comment>> {
        let request = match page_request(partition, &options) {
            Ok(request) => request,
            Err(err) => return Completion::ready(Err(err)),
        };
        let key = partition.to_string();
        let service = self.clone();
        Completion::run(
            mode,
            async move { service.fetch_comments(request).await },
            move |message| DomainError::QueryFailure {
                operation: LIST_OPERATION,
                key,
                message,
            },
        )
        .await
    }

    pub async fn list_video_comments(
        &self,
        video_id: VideoId,
        options: ListOptions,
        mode: ExecutionMode,
    ) -> Completion<Page<Comment>> {
        self.list_comments(PartitionKey::Video(video_id), options, mode)
            .await
    }

    pub async fn list_user_comments(
        &self,
        user_id: UserId,
        options: ListOptions,
        mode: ExecutionMode,
    ) -> Completion<Page<Comment>> {
        self.list_comments(PartitionKey::User(user_id), options, mode)
            .await
    }

    async fn apply_write(
        &self,
        comment: Comment,
        written_at_ms: i64,
    ) -> DomainResult<CommentWritten> {
        let started = Instant::now();
        let batch = ProjectionBatch::dual(comment.to_record(), written_at_ms);
        match self.store.execute_atomic(&batch).await {
            Ok(()) => {
                self.publish(CommentEvent::Created {
                    comment_id: comment.comment_id,
                    video_id: comment.video_id,
                    user_id: comment.user_id,
                    written_at_ms,
                })
                .await;
                debug!(
                    comment_id = %comment.comment_id,
                    video_id = %comment.video_id,
                    user_id = %comment.user_id,
                    elapsed_ms = elapsed_ms(started),
                    "comment written"
                );
                Ok(CommentWritten {
                    comment,
                    written_at_ms,
                })
            }
            Err(err) => {
                let key = comment.comment_id.to_string();
                if err.is_indeterminate() {
                    warn!(
                        comment_id = %key,
                        elapsed_ms = elapsed_ms(started),
                        error = %err,
                        "comment write outcome unknown"
                    );
                } else {
                    error!(
                        comment_id = %key,
                        elapsed_ms = elapsed_ms(started),
                        error = %err,
                        "comment write failed"
                    );
                    self.publish_failure(WRITE_OPERATION, &key, &err).await;
                }
                Err(DomainError::WriteFailure {
                    operation: WRITE_OPERATION,
                    key,
                    message: err.to_string(),
                })
            }
        }
    }

    async fn fetch_comments(&self, request: PageRequest) -> DomainResult<Page<Comment>> {
        let started = Instant::now();
        let key = request.partition.to_string();
        let page = match self.store.fetch_page(&request).await {
            Ok(page) => page,
            Err(StoreError::InvalidMarker(message)) => {
                warn!(partition = %key, error = %message, "cursor rejected by store");
                return Err(DomainError::InvalidCursor(message));
            }
            Err(err) => {
                error!(
                    partition = %key,
                    elapsed_ms = elapsed_ms(started),
                    error = %err,
                    "comment page read failed"
                );
                self.publish_failure(LIST_OPERATION, &key, &err).await;
                return Err(DomainError::QueryFailure {
                    operation: LIST_OPERATION,
                    key,
                    message: err.to_string(),
                });
            }
        };

        let RowPage { rows, continuation } = page;
        if rows.len() > request.fetch_size {
            let err = StoreError::Operation(format!(
                "store returned {} rows for page size {}",
                rows.len(),
                request.fetch_size
            ));
            self.publish_failure(LIST_OPERATION, &key, &err).await;
            return Err(DomainError::QueryFailure {
                operation: LIST_OPERATION,
                key,
                message: err.to_string(),
            });
        }

        let next_cursor = continuation.as_ref().map(encode_cursor);
        let items: Vec<Comment> = rows.into_iter().map(Comment::from).collect();
        debug!(
            partition = %key,
            rows = items.len(),
            has_more = next_cursor.is_some(),
            elapsed_ms = elapsed_ms(started),
            "comment page read"
        );
        Ok(Page { items, next_cursor })
    }

    async fn publish_failure(&self, operation: &str, key: &str, err: &StoreError) {
        self.publish(CommentEvent::MutationFailed {
            operation: operation.to_string(),
            key: key.to_string(),
            message: err.to_string(),
            occurred_at_ms: now_ms(),
        })
        .await;
    }

    async fn publish(&self, event: CommentEvent) {
        if let Err(err) = self.events.publish(&event).await {
            warn!(
                kind = event.kind(),
                subject = %event.subject(),
                error = %err,
                "comment event dropped"
            );
        }
    }
}

fn validate_submission(submission: CommentSubmission) -> DomainResult<Comment> {
    if submission.text.trim().is_empty() {
        return Err(DomainError::Validation("comment text is required".into()));
    }
    Ok(Comment {
        comment_id: submission.comment_id.unwrap_or_else(CommentId::generate),
        video_id: submission.video_id,
        user_id: submission.user_id,
        text: submission.text,
    })
}

fn page_request(partition: PartitionKey, options: &ListOptions) -> DomainResult<PageRequest> {
    let fetch_size = options.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if fetch_size == 0 || fetch_size > MAX_PAGE_SIZE {
        return Err(DomainError::Validation(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    let resume = decode_cursor(options.cursor.as_deref())?;
    Ok(PageRequest {
        partition,
        starting_at: options.starting_at,
        fetch_size,
        resume,
    })
}

#[derive(Clone, Debug)]
struct StoredRow {
    record: ProjectionRecord,
    written_at_ms: i64,
}

type Partition = BTreeMap<CommentId, StoredRow>;

/// Projection store held in process memory. Both projections live behind one lock,
/// so a batch is visible all at once or not at all.
#[derive(Clone, Default)]
pub struct InMemoryProjectionStore {
    partitions: Arc<RwLock<HashMap<PartitionKey, Partition>>>,
    write_failure: Arc<RwLock<Option<StoreError>>>,
    read_failure: Arc<RwLock<Option<StoreError>>>,
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_writes_with(&self, failure: Option<StoreError>) {
        *self.write_failure.write().await = failure;
    }

    pub async fn fail_reads_with(&self, failure: Option<StoreError>) {
        *self.read_failure.write().await = failure;
    }

    /// Every row in the partition, newest first.
    pub async fn rows(&self, partition: &PartitionKey) -> Vec<ProjectionRecord> {
        self.partitions
            .read()
            .await
            .get(partition)
            .map(|rows| rows.values().rev().map(|row| row.record.clone()).collect())
            .unwrap_or_default()
    }

    pub async fn written_at(&self, partition: &PartitionKey, comment_id: CommentId) -> Option<i64> {
        self.partitions
            .read()
            .await
            .get(partition)
            .and_then(|rows| rows.get(&comment_id))
            .map(|row| row.written_at_ms)
    }
}

fn marker_for(comment_id: CommentId) -> ContinuationMarker {
    ContinuationMarker::new(comment_id.as_uuid().as_bytes().to_vec())
}

impl ProjectionStore for InMemoryProjectionStore {
    fn execute_atomic(&self, batch: &ProjectionBatch) -> BoxFuture<'_, Result<(), StoreError>> {
        let batch = batch.clone();
        Box::pin(async move {
            if let Some(failure) = self.write_failure.read().await.clone() {
                return Err(failure);
            }
            let written_at_ms = batch.written_at_ms;
            let mut partitions = self.partitions.write().await;
            for write in batch.writes {
                let partition = partitions
                    .entry(write.record.partition_key(write.projection))
                    .or_default();
                let comment_id = write.record.comment_id;
                let newer_exists = partition
                    .get(&comment_id)
                    .is_some_and(|existing| existing.written_at_ms > written_at_ms);
                if !newer_exists {
                    partition.insert(
                        comment_id,
                        StoredRow {
                            record: write.record,
                            written_at_ms,
                        },
                    );
                }
            }
            Ok(())
        })
    }

    fn fetch_page(&self, request: &PageRequest) -> BoxFuture<'_, Result<RowPage, StoreError>> {
        let request = request.clone();
        Box::pin(async move {
            if let Some(failure) = self.read_failure.read().await.clone() {
                return Err(failure);
            }
            let upper = match &request.resume {
                Some(marker) => Bound::Excluded(
                    CommentId::from_bytes(marker.as_bytes())
                        .map_err(|err| StoreError::InvalidMarker(err.to_string()))?,
                ),
                None => match request.starting_at {
                    Some(comment_id) => Bound::Included(comment_id),
                    None => Bound::Unbounded,
                },
            };
            let partitions = self.partitions.read().await;
            let Some(partition) = partitions.get(&request.partition) else {
                return Ok(RowPage::default());
            };
            let mut rows: Vec<ProjectionRecord> = partition
                .range((Bound::Unbounded, upper))
                .rev()
                .take(request.fetch_size + 1)
                .map(|(_, row)| row.record.clone())
                .collect();
            let continuation = if rows.len() > request.fetch_size {
                rows.truncate(request.fetch_size);
                rows.last().map(|row| marker_for(row.comment_id))
            } else {
                None
            };
            Ok(RowPage { rows, continuation })
        })
    }
}
