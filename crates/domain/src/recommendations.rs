use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::DomainResult;
use crate::error::DomainError;
use crate::identity::{UserId, VideoId};
use crate::ports::BoxFuture;
use crate::ports::graph::{GraphEngine, GraphError};
use crate::related::SuggestedVideoPreview;
use crate::util::elapsed_ms;

pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 100;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: Value,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphStatement {
    pub query: String,
    pub graph: String,
    pub parameters: Map<String, Value>,
}

impl GraphStatement {
    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.get(name)
    }
}

/// Prebuilt ranking statement. The caller's user id and the row limit are bound
/// as `$user_id` and `$limit`; nothing is spliced into the query text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RankingQuery {
    pub query: String,
    pub graph: String,
    pub limit: usize,
}

impl RankingQuery {
    pub fn statement_for(&self, user_id: UserId) -> GraphStatement {
        let mut parameters = Map::new();
        parameters.insert("user_id".into(), json!(user_id.to_string()));
        parameters.insert("limit".into(), json!(self.limit));
        GraphStatement {
            query: self.query.clone(),
            graph: self.graph.clone(),
            parameters,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuggestedForUser {
    pub user_id: UserId,
    pub videos: Vec<SuggestedVideoPreview>,
}

#[derive(Clone)]
pub struct RecommendationService {
    engine: Arc<dyn GraphEngine>,
    ranking: RankingQuery,
}

impl RecommendationService {
    pub fn new(engine: Arc<dyn GraphEngine>, ranking: RankingQuery) -> Self {
        Self { engine, ranking }
    }

    pub async fn suggested_for_user(&self, user_id: UserId) -> DomainResult<SuggestedForUser> {
        let started = Instant::now();
        let statement = self.ranking.statement_for(user_id);
        let nodes = self.engine.execute_graph(&statement).await.map_err(|err| {
            error!(
                user_id = %user_id,
                elapsed_ms = elapsed_ms(started),
                error = %err,
                "ranking query failed"
            );
            DomainError::QueryFailure {
                operation: "get_suggested_for_user",
                key: user_id.to_string(),
                message: err.to_string(),
            }
        })?;

        let mut videos = Vec::with_capacity(nodes.len());
        for node in &nodes {
            match parse_preview(node) {
                Ok(preview) => videos.push(preview),
                Err(err) => {
                    warn!(
                        user_id = %user_id,
                        node_id = %node.id,
                        error = %err,
                        "skipping graph node"
                    );
                }
            }
        }
        debug!(
            user_id = %user_id,
            nodes = nodes.len(),
            results = videos.len(),
            elapsed_ms = elapsed_ms(started),
            "suggested videos ranked"
        );
        Ok(SuggestedForUser { user_id, videos })
    }
}

pub fn parse_preview(node: &GraphNode) -> DomainResult<SuggestedVideoPreview> {
    let video_id = node_video_id(&node.id)?;
    let owner_user_id = node_owner(node)?;
    Ok(SuggestedVideoPreview {
        video_id,
        name: string_property(node, "name")?.to_string(),
        preview_image_location: string_property(node, "preview_image_location")?.to_string(),
        added_date_ms: parse_added_date(string_property(node, "added_date")?)?,
        owner_user_id,
    })
}

/// Accepts `2024-05-01T10:11:12.345Z` style values; the `Z` is rewritten to
/// `+0000` before parsing.
pub fn parse_added_date(raw: &str) -> DomainResult<i64> {
    let raw = raw.trim();
    let normalized = match raw.strip_suffix('Z') {
        Some(prefix) => format!("{prefix}+0000"),
        None => raw.to_string(),
    };
    let format = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3][offset_hour sign:mandatory][offset_minute]"
    );
    let parsed = OffsetDateTime::parse(&normalized, format)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
        .map_err(|err| DomainError::Parse(format!("invalid added_date '{raw}': {err}")))?;
    Ok((parsed.unix_timestamp_nanos() / 1_000_000) as i64)
}

fn node_video_id(id: &Value) -> DomainResult<VideoId> {
    let decoded;
    let id = match id {
        Value::String(raw) => {
            decoded = serde_json::from_str::<Value>(raw)
                .map_err(|err| DomainError::Parse(format!("node id is not json: {err}")))?;
            &decoded
        }
        other => other,
    };
    let raw = id
        .get("videoid")
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Parse("node id has no videoid".into()))?;
    raw.parse::<VideoId>()
        .map_err(|err| DomainError::Parse(err.to_string()))
}

/// Absent owner is fine; a present one must be a string holding a valid id.
fn node_owner(node: &GraphNode) -> DomainResult<Option<UserId>> {
    let Some(value) = node
        .properties
        .get("userid")
        .or_else(|| node.properties.get("user_id"))
        .filter(|value| !value.is_null())
    else {
        return Ok(None);
    };
    let raw = value
        .as_str()
        .ok_or_else(|| DomainError::Parse("node owner is not a string".into()))?;
    raw.parse::<UserId>()
        .map(Some)
        .map_err(|err| DomainError::Parse(err.to_string()))
}

fn string_property<'a>(node: &'a GraphNode, name: &str) -> DomainResult<&'a str> {
    node.properties
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| DomainError::Parse(format!("node property '{name}' missing")))
}

#[derive(Clone, Default)]
pub struct InMemoryGraphEngine {
    nodes_by_user: Arc<RwLock<HashMap<String, Vec<GraphNode>>>>,
    statements: Arc<RwLock<Vec<GraphStatement>>>,
    unavailable: Arc<RwLock<bool>>,
}

impl InMemoryGraphEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_nodes(&self, user_id: UserId, nodes: Vec<GraphNode>) {
        self.nodes_by_user
            .write()
            .await
            .insert(user_id.to_string(), nodes);
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    pub async fn statements(&self) -> Vec<GraphStatement> {
        self.statements.read().await.clone()
    }
}

impl GraphEngine for InMemoryGraphEngine {
    fn execute_graph(
        &self,
        statement: &GraphStatement,
    ) -> BoxFuture<'_, Result<Vec<GraphNode>, GraphError>> {
        let statement = statement.clone();
        Box::pin(async move {
            if *self.unavailable.read().await {
                return Err(GraphError::Unavailable("in-memory graph disabled".into()));
            }
            let user_id = statement
                .parameter("user_id")
                .and_then(Value::as_str)
                .ok_or_else(|| GraphError::Query("missing $user_id binding".into()))?
                .to_string();
            let limit = statement
                .parameter("limit")
                .and_then(Value::as_u64)
                .map_or(usize::MAX, |limit| limit as usize);
            self.statements.write().await.push(statement);
            Ok(self
                .nodes_by_user
                .read()
                .await
                .get(&user_id)
                .map(|nodes| nodes.iter().take(limit).cloned().collect())
                .unwrap_or_default())
        })
    }
}
