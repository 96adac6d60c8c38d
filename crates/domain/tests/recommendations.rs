use std::sync::Arc;

use reelhub_domain::error::DomainError;
use reelhub_domain::identity::UserId;
use reelhub_domain::recommendations::{
    GraphNode, InMemoryGraphEngine, RankingQuery, RecommendationService,
};
use serde_json::{Value, json};

const USER: &str = "7da8d9b8-60bf-4aa1-906e-713b7603f3c1";
const OWNER: &str = "966a83aa-6d8b-41b6-b4ac-79867de3b4fa";

fn ranking() -> RankingQuery {
    RankingQuery {
        query: "SELECT * FROM recommend($user_id) LIMIT $limit".into(),
        graph: "reelhub_graph".into(),
        limit: 25,
    }
}

fn node(video_id: &str, added_date: &str) -> GraphNode {
    let properties = json!({
        "name": format!("video {video_id}"),
        "preview_image_location": format!("/previews/{video_id}.jpg"),
        "added_date": added_date,
        "userid": OWNER,
    });
    GraphNode {
        id: json!({ "~label": "video", "videoid": video_id }),
        label: "video".into(),
        properties: match properties {
            Value::Object(map) => map,
            _ => unreachable!(),
        },
    }
}

#[tokio::test]
async fn bad_node_is_skipped_and_good_nodes_are_kept() {
    let engine = InMemoryGraphEngine::new();
    let user: UserId = USER.parse().unwrap();
    engine
        .put_nodes(
            user,
            vec![
                node("0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0001", "2017-03-15T10:20:30.123Z"),
                node("0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0002", "not a date"),
                node("0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0003", "2018-01-01T00:00:00.000Z"),
            ],
        )
        .await;
    let service = RecommendationService::new(Arc::new(engine), ranking());

    let suggested = service.suggested_for_user(user).await.unwrap();

    assert_eq!(suggested.user_id, user);
    assert_eq!(suggested.videos.len(), 2);
    assert_eq!(suggested.videos[0].added_date_ms, 1_489_573_230_123);
    assert_eq!(suggested.videos[1].added_date_ms, 1_514_764_800_000);
    assert_eq!(
        suggested.videos[0].owner_user_id.map(|owner| owner.to_string()).as_deref(),
        Some(OWNER)
    );
}

#[tokio::test]
async fn node_without_owner_is_still_suggested() {
    let engine = InMemoryGraphEngine::new();
    let user: UserId = USER.parse().unwrap();
    let mut ownerless = node("0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0004", "2017-03-15T10:20:30.123Z");
    ownerless.properties.remove("userid");
    engine.put_nodes(user, vec![ownerless]).await;
    let service = RecommendationService::new(Arc::new(engine), ranking());

    let suggested = service.suggested_for_user(user).await.unwrap();

    assert_eq!(suggested.videos.len(), 1);
    assert_eq!(
        suggested.videos[0].video_id.to_string(),
        "0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0004"
    );
    assert_eq!(suggested.videos[0].owner_user_id, None);
    assert_eq!(suggested.videos[0].added_date_ms, 1_489_573_230_123);
}

#[tokio::test]
async fn no_nodes_yields_empty_list() {
    let engine = InMemoryGraphEngine::new();
    let service = RecommendationService::new(Arc::new(engine), ranking());

    let suggested = service
        .suggested_for_user(USER.parse().unwrap())
        .await
        .unwrap();
    assert!(suggested.videos.is_empty());
}

#[tokio::test]
async fn user_id_is_bound_as_a_parameter() {
    let engine = InMemoryGraphEngine::new();
    let service = RecommendationService::new(Arc::new(engine.clone()), ranking());

    service
        .suggested_for_user(USER.parse().unwrap())
        .await
        .unwrap();

    let statements = engine.statements().await;
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].graph, "reelhub_graph");
    assert!(!statements[0].query.contains(USER));
    assert_eq!(statements[0].parameter("user_id"), Some(&json!(USER)));
    assert_eq!(statements[0].parameter("limit"), Some(&json!(25)));
}

#[tokio::test]
async fn engine_failure_is_a_query_failure() {
    let engine = InMemoryGraphEngine::new();
    engine.set_unavailable(true).await;
    let service = RecommendationService::new(Arc::new(engine), ranking());

    let result = service.suggested_for_user(USER.parse().unwrap()).await;
    assert!(matches!(
        result,
        Err(DomainError::QueryFailure {
            operation: "get_suggested_for_user",
            ..
        })
    ));
}
