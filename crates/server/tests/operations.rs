use reelhub_domain::comments::{CommentSubmission, ListOptions};
use reelhub_domain::identity::{UserId, VideoId};
use reelhub_domain::ports::comments::PartitionKey;
use reelhub_domain::related::FanoutOutcome;
use reelhub_infra::config::AppConfig;
use reelhub_server::AppState;
use uuid::Uuid;

fn memory_config(mode: &str) -> AppConfig {
    AppConfig {
        app_env: "test".to_string(),
        log_level: "info".to_string(),
        data_backend: "memory".to_string(),
        surreal_endpoint: "ws://127.0.0.1:8000".to_string(),
        surreal_ns: "reelhub".to_string(),
        surreal_db: "catalog".to_string(),
        surreal_user: "root".to_string(),
        surreal_pass: "root".to_string(),
        comment_execution_mode: mode.to_string(),
        related_videos_count: 4,
        related_fanout_width: 3,
        recommendation_graph: "reelhub_graph".to_string(),
        recommendation_limit: 100,
    }
}

#[tokio::test]
async fn state_serves_every_operation_in_both_modes() {
    for mode in ["inline", "detached"] {
        let state = AppState::new(memory_config(mode)).await.unwrap();
        let video_id = VideoId::from_uuid(Uuid::from_u128(1));
        let user_id = UserId::from_uuid(Uuid::from_u128(2));

        let written = state
            .write_comment(CommentSubmission::new(video_id, user_id, "hello"))
            .await
            .wait()
            .await
            .unwrap();
        let page = state
            .list_comments(PartitionKey::Video(video_id), ListOptions::default())
            .await
            .wait()
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1, "mode {mode}");
        assert_eq!(page.items[0].comment_id, written.comment.comment_id);

        let related = state.related_videos(video_id, None).await.unwrap();
        assert_eq!(related.outcome, FanoutOutcome::SourceMissing);
        assert!(related.videos.is_empty());

        let suggested = state.suggested_for_user(user_id).await.unwrap();
        assert_eq!(suggested.user_id, user_id);
    }
}
