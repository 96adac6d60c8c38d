use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::{UserId, VideoId};
use crate::ports::BoxFuture;
use crate::ports::comments::StoreError;
use crate::ports::videos::VideoCatalog;
use crate::util::elapsed_ms;

pub const DEFAULT_RELATED_COUNT: usize = 4;
pub const DEFAULT_FANOUT_WIDTH: usize = 3;

/// Preview row used by both the tag fan-out and the graph recommendations.
/// Equality and hashing look at `video_id` only. Graph nodes may omit the owner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuggestedVideoPreview {
    pub video_id: VideoId,
    pub name: String,
    pub preview_image_location: String,
    pub added_date_ms: i64,
    pub owner_user_id: Option<UserId>,
}

impl PartialEq for SuggestedVideoPreview {
    fn eq(&self, other: &Self) -> bool {
        self.video_id == other.video_id
    }
}

impl Eq for SuggestedVideoPreview {}

impl Hash for SuggestedVideoPreview {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.video_id.hash(state);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub video_id: VideoId,
    pub owner_user_id: UserId,
    pub name: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanoutOutcome {
    SourceMissing,
    NoTags,
    Satisfied,
    Exhausted,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelatedVideos {
    pub video_id: VideoId,
    pub videos: Vec<SuggestedVideoPreview>,
    pub outcome: FanoutOutcome,
    pub rounds: usize,
    pub lookups: usize,
}

impl RelatedVideos {
    fn empty(video_id: VideoId, outcome: FanoutOutcome) -> Self {
        Self {
            video_id,
            videos: Vec::new(),
            outcome,
            rounds: 0,
            lookups: 0,
        }
    }
}

/// Per-call accumulator for the tag fan-out. Owned by one aggregation and only
/// touched between batches.
#[derive(Debug)]
pub struct TagFanout {
    pending: VecDeque<String>,
    exclude: VideoId,
    target: usize,
    seen: HashSet<VideoId>,
    collected: Vec<SuggestedVideoPreview>,
    rounds: usize,
    lookups: usize,
}

impl TagFanout {
    pub fn new(tags: Vec<String>, exclude: VideoId, target: usize) -> Self {
        Self {
            pending: tags.into(),
            exclude,
            target,
            seen: HashSet::new(),
            collected: Vec::new(),
            rounds: 0,
            lookups: 0,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.collected.len() >= self.target
    }

    /// Next tags to dispatch, or `None` once satisfied or out of tags.
    pub fn next_batch(&mut self, width: usize) -> Option<Vec<String>> {
        if self.is_satisfied() || self.pending.is_empty() {
            return None;
        }
        let take = width.max(1).min(self.pending.len());
        let batch: Vec<String> = self.pending.drain(..take).collect();
        self.rounds += 1;
        self.lookups += batch.len();
        Some(batch)
    }

    /// Merge one batch's results in tag order; first occurrence of a video wins.
    pub fn merge(&mut self, batch: Vec<Vec<SuggestedVideoPreview>>) {
        for rows in batch {
            for row in rows {
                if row.video_id == self.exclude || !self.seen.insert(row.video_id) {
                    continue;
                }
                self.collected.push(row);
            }
        }
    }

    pub fn collected(&self) -> &[SuggestedVideoPreview] {
        &self.collected
    }

    pub fn finish(self, video_id: VideoId) -> RelatedVideos {
        let outcome = if self.is_satisfied() {
            FanoutOutcome::Satisfied
        } else {
            FanoutOutcome::Exhausted
        };
        RelatedVideos {
            video_id,
            videos: self.collected,
            outcome,
            rounds: self.rounds,
            lookups: self.lookups,
        }
    }
}

#[derive(Clone)]
pub struct RelatedVideosService {
    catalog: Arc<dyn VideoCatalog>,
    fanout_width: usize,
}

impl RelatedVideosService {
    pub fn new(catalog: Arc<dyn VideoCatalog>, fanout_width: usize) -> Self {
        Self {
            catalog,
            fanout_width: fanout_width.max(1),
        }
    }

    pub fn fanout_width(&self) -> usize {
        self.fanout_width
    }

    /// Collects at least `count` distinct videos sharing a tag with `video_id` when
    /// enough exist. Each tag is asked for `2 * count` rows to absorb duplicates and
    /// the source video itself; the collected set is returned untruncated.
    pub async fn related_videos(
        &self,
        video_id: VideoId,
        count: usize,
    ) -> DomainResult<RelatedVideos> {
        if count == 0 {
            return Err(DomainError::Validation(
                "related video count must be at least 1".into(),
            ));
        }
        let started = Instant::now();
        let source = self
            .catalog
            .get_video(video_id)
            .await
            .map_err(|err| DomainError::QueryFailure {
                operation: "get_related_videos",
                key: video_id.to_string(),
                message: err.to_string(),
            })?;
        let Some(source) = source else {
            debug!(video_id = %video_id, "source video not found");
            return Ok(RelatedVideos::empty(video_id, FanoutOutcome::SourceMissing));
        };
        if source.tags.is_empty() {
            return Ok(RelatedVideos::empty(video_id, FanoutOutcome::NoTags));
        }

        let per_tag_limit = count.saturating_mul(2);
        let mut fanout = TagFanout::new(source.tags, video_id, count);
        while let Some(batch) = fanout.next_batch(self.fanout_width) {
            let lookups = batch
                .iter()
                .map(|tag| self.catalog.list_by_tag(tag, per_tag_limit));
            let results = join_all(lookups).await;

            let mut merged = Vec::with_capacity(results.len());
            for (tag, result) in batch.iter().zip(results) {
                match result {
                    Ok(rows) => merged.push(rows),
                    Err(err) => {
                        error!(
                            video_id = %video_id,
                            tag = %tag,
                            elapsed_ms = elapsed_ms(started),
                            error = %err,
                            "tag lookup failed"
                        );
                        return Err(DomainError::AggregationFailure {
                            video_id: video_id.to_string(),
                            tag: tag.clone(),
                            message: err.to_string(),
                        });
                    }
                }
            }
            fanout.merge(merged);
            debug!(
                video_id = %video_id,
                round = fanout.rounds,
                collected = fanout.collected().len(),
                "tag batch merged"
            );
        }

        let related = fanout.finish(video_id);
        debug!(
            video_id = %video_id,
            results = related.videos.len(),
            rounds = related.rounds,
            elapsed_ms = elapsed_ms(started),
            "related videos collected"
        );
        Ok(related)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagLookup {
    pub tag: String,
    pub limit: usize,
}

#[derive(Clone, Default)]
pub struct InMemoryVideoCatalog {
    videos: Arc<RwLock<HashMap<VideoId, VideoRecord>>>,
    by_tag: Arc<RwLock<HashMap<String, Vec<SuggestedVideoPreview>>>>,
    failing_tags: Arc<RwLock<HashSet<String>>>,
    lookups: Arc<RwLock<Vec<TagLookup>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl InMemoryVideoCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_video(&self, video: VideoRecord) {
        self.videos.write().await.insert(video.video_id, video);
    }

    /// Rows are served in the order given.
    pub async fn put_tag(&self, tag: impl Into<String>, rows: Vec<SuggestedVideoPreview>) {
        self.by_tag.write().await.insert(tag.into(), rows);
    }

    pub async fn fail_tag(&self, tag: impl Into<String>) {
        self.failing_tags.write().await.insert(tag.into());
    }

    pub async fn lookups(&self) -> Vec<TagLookup> {
        self.lookups.read().await.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn lookup(
        &self,
        tag: &str,
        limit: usize,
    ) -> Result<Vec<SuggestedVideoPreview>, StoreError> {
        self.lookups.write().await.push(TagLookup {
            tag: tag.to_string(),
            limit,
        });
        // let sibling lookups in the same batch start before this one returns
        tokio::task::yield_now().await;
        if self.failing_tags.read().await.contains(tag) {
            return Err(StoreError::Unavailable(format!(
                "partition for tag '{tag}' unavailable"
            )));
        }
        Ok(self
            .by_tag
            .read()
            .await
            .get(tag)
            .map(|rows| rows.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

impl VideoCatalog for InMemoryVideoCatalog {
    fn get_video(
        &self,
        video_id: VideoId,
    ) -> BoxFuture<'_, Result<Option<VideoRecord>, StoreError>> {
        Box::pin(async move { Ok(self.videos.read().await.get(&video_id).cloned()) })
    }

    fn list_by_tag(
        &self,
        tag: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<SuggestedVideoPreview>, StoreError>> {
        let tag = tag.to_string();
        Box::pin(async move {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            let result = self.lookup(&tag, limit).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn preview(n: u128) -> SuggestedVideoPreview {
        SuggestedVideoPreview {
            video_id: VideoId::from_uuid(Uuid::from_u128(n)),
            name: format!("video {n}"),
            preview_image_location: format!("/previews/{n}.jpg"),
            added_date_ms: 0,
            owner_user_id: Some(UserId::from_uuid(Uuid::from_u128(900))),
        }
    }

    #[test]
    fn merge_skips_source_and_duplicates() {
        let source = VideoId::from_uuid(Uuid::from_u128(1));
        let mut fanout = TagFanout::new(vec!["a".into(), "b".into()], source, 10);
        let batch = fanout.next_batch(3).unwrap();
        assert_eq!(batch, vec!["a".to_string(), "b".to_string()]);
        fanout.merge(vec![
            vec![preview(1), preview(2)],
            vec![preview(2), preview(3)],
        ]);
        let ids: Vec<u128> = fanout
            .collected()
            .iter()
            .map(|video| video.video_id.as_uuid().as_u128())
            .collect();
        assert_eq!(ids, vec![2, 3]);
        assert!(fanout.next_batch(3).is_none());
        assert_eq!(fanout.finish(source).outcome, FanoutOutcome::Exhausted);
    }

    #[test]
    fn satisfied_fanout_dispatches_nothing_more() {
        let source = VideoId::from_uuid(Uuid::from_u128(1));
        let mut fanout = TagFanout::new(vec!["a".into(), "b".into()], source, 1);
        fanout.next_batch(1).unwrap();
        fanout.merge(vec![vec![preview(5)]]);
        assert!(fanout.is_satisfied());
        assert!(fanout.next_batch(1).is_none());
    }

    #[test]
    fn preview_equality_is_identity_only() {
        let mut renamed = preview(7);
        renamed.name = "other".into();
        assert_eq!(preview(7), renamed);
    }
}
