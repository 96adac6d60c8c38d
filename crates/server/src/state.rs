use std::sync::Arc;

use reelhub_domain::DomainResult;
use reelhub_domain::comments::{
    Comment, CommentService, CommentSubmission, CommentWritten, InMemoryProjectionStore,
    ListOptions, Page,
};
use reelhub_domain::execution::{Completion, ExecutionMode};
use reelhub_domain::identity::{UserId, VideoId};
use reelhub_domain::ports::comments::PartitionKey;
use reelhub_domain::ports::db::DbAdapter;
use reelhub_domain::recommendations::{
    InMemoryGraphEngine, RecommendationService, SuggestedForUser,
};
use reelhub_domain::related::{InMemoryVideoCatalog, RelatedVideos, RelatedVideosService};
use reelhub_infra::config::AppConfig;
use reelhub_infra::db::{DbConfig, MemoryAdapter, SurrealAdapter, connect};
use reelhub_infra::repositories::{
    SurrealCommentEventSink, SurrealGraphEngine, SurrealProjectionStore, SurrealVideoCatalog,
    TracingCommentEventSink, ranking_query,
};

/// Services wired for one process. Every caller-facing operation goes through here.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Arc<dyn DbAdapter>,
    pub comments: CommentService,
    pub related: RelatedVideosService,
    pub recommendations: RecommendationService,
    execution_mode: ExecutionMode,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        config.validate()?;
        if config.uses_surreal() {
            Self::surreal(config).await
        } else {
            Self::in_memory(config)
        }
    }

    pub async fn surreal(config: AppConfig) -> anyhow::Result<Self> {
        let execution_mode = config.execution_mode()?;
        let db_config = DbConfig::from_app_config(&config);
        let client = connect(&db_config).await?;

        let comments = CommentService::new(
            Arc::new(SurrealProjectionStore::with_client(client.clone())),
            Arc::new(SurrealCommentEventSink::with_client(client.clone())),
        );
        let related = RelatedVideosService::new(
            Arc::new(SurrealVideoCatalog::with_client(client)),
            config.related_fanout_width,
        );
        let graph = SurrealGraphEngine::new(&db_config, &config.recommendation_graph).await?;
        let recommendations = RecommendationService::new(Arc::new(graph), ranking_query(&config));

        Ok(Self {
            db: Arc::new(SurrealAdapter::new(db_config)),
            comments,
            related,
            recommendations,
            execution_mode,
            config,
        })
    }

    pub fn in_memory(config: AppConfig) -> anyhow::Result<Self> {
        let execution_mode = config.execution_mode()?;
        let comments = CommentService::new(
            Arc::new(InMemoryProjectionStore::new()),
            Arc::new(TracingCommentEventSink),
        );
        let related = RelatedVideosService::new(
            Arc::new(InMemoryVideoCatalog::new()),
            config.related_fanout_width,
        );
        let recommendations = RecommendationService::new(
            Arc::new(InMemoryGraphEngine::new()),
            ranking_query(&config),
        );
        Ok(Self {
            config,
            db: Arc::new(MemoryAdapter),
            comments,
            related,
            recommendations,
            execution_mode,
        })
    }

    /// Wires caller-provided services over the in-memory adapter.
    pub fn with_services(
        config: AppConfig,
        comments: CommentService,
        related: RelatedVideosService,
        recommendations: RecommendationService,
    ) -> anyhow::Result<Self> {
        let execution_mode = config.execution_mode()?;
        Ok(Self {
            config,
            db: Arc::new(MemoryAdapter),
            comments,
            related,
            recommendations,
            execution_mode,
        })
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }
}

impl AppState {
    pub async fn write_comment(&self, submission: CommentSubmission) -> Completion<CommentWritten> {
        self.comments
            .write_comment(submission, self.execution_mode)
            .await
    }

    pub async fn list_comments(
        &self,
        partition: PartitionKey,
        options: ListOptions,
    ) -> Completion<Page<Comment>> {
        self.comments
            .list_comments(partition, options, self.execution_mode)
            .await
    }

    /// `count` falls back to `related_videos_count` when absent.
    pub async fn related_videos(
        &self,
        video_id: VideoId,
        count: Option<usize>,
    ) -> DomainResult<RelatedVideos> {
        let count = count.unwrap_or(self.config.related_videos_count);
        self.related.related_videos(video_id, count).await
    }

    pub async fn suggested_for_user(&self, user_id: UserId) -> DomainResult<SuggestedForUser> {
        self.recommendations.suggested_for_user(user_id).await
    }
}
