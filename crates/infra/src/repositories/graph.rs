use std::sync::Arc;
use std::time::Instant;

use reelhub_domain::ports::BoxFuture;
use reelhub_domain::ports::graph::{GraphEngine, GraphError};
use reelhub_domain::recommendations::{GraphNode, GraphStatement, RankingQuery};
use serde_json::{Map, Value};
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::Client;

use crate::config::AppConfig;
use crate::db::{DbConfig, connect};
use crate::observability::{record_graph_nodes, record_store_call};

/// Videos rated by users who rated what `$user_id` rated, minus those already
/// seen. Video records are keyed `video:{ videoid: '<uuid>' }`.
pub const RANKING_QUERY: &str = "\
LET $rated = type::record('user', $user_id)->rated->video;
LET $peers = array::distinct($rated<-rated<-user);
SELECT record::id(id) AS id, 'video' AS label, name, preview_image_location, \
       <string>added_date AS added_date, <string>userid AS userid \
FROM array::distinct($peers->rated->video) \
WHERE id NOTINSIDE $rated \
LIMIT $limit;";

pub fn ranking_query(config: &AppConfig) -> RankingQuery {
    RankingQuery {
        query: RANKING_QUERY.to_string(),
        graph: config.recommendation_graph.clone(),
        limit: config.recommendation_limit,
    }
}

/// Graph engine over a SurrealDB database; the graph name is the database name.
#[derive(Clone)]
pub struct SurrealGraphEngine {
    client: Arc<Surreal<Client>>,
    graph: String,
}

impl SurrealGraphEngine {
    pub fn with_client(client: Arc<Surreal<Client>>, graph: impl Into<String>) -> Self {
        Self {
            client,
            graph: graph.into(),
        }
    }

    pub async fn new(db_config: &DbConfig, graph: &str) -> anyhow::Result<Self> {
        let graph_config = DbConfig {
            database: graph.to_string(),
            ..db_config.clone()
        };
        Ok(Self::with_client(connect(&graph_config).await?, graph))
    }

    fn decode_node(row: Value) -> Result<GraphNode, GraphError> {
        let Value::Object(mut properties) = row else {
            return Err(GraphError::Query("graph row is not an object".into()));
        };
        let id = properties.remove("id").unwrap_or(Value::Null);
        let label = match properties.remove("label") {
            Some(Value::String(label)) => label,
            _ => String::new(),
        };
        Ok(GraphNode {
            id,
            label,
            properties,
        })
    }
}

impl GraphEngine for SurrealGraphEngine {
    fn execute_graph(
        &self,
        statement: &GraphStatement,
    ) -> BoxFuture<'_, Result<Vec<GraphNode>, GraphError>> {
        if statement.graph != self.graph {
            let err = GraphError::Query(format!(
                "graph '{}' is not served here (connected to '{}')",
                statement.graph, self.graph
            ));
            return Box::pin(async move { Err(err) });
        }
        let query = statement.query.clone();
        let parameters: Map<String, Value> = statement.parameters.clone();
        let client = self.client.clone();
        Box::pin(async move {
            let started = Instant::now();
            let mut pending = client.query(&query);
            for (name, value) in parameters {
                pending = pending.bind((name, value));
            }
            let mut response = pending
                .await
                .map_err(|err| GraphError::Unavailable(err.to_string()))?;
            let last = response.num_statements().saturating_sub(1);
            let rows: Vec<Value> = response
                .take(last)
                .map_err(|err| GraphError::Query(format!("ranking query failed: {err}")))?;
            record_store_call(
                "execute_graph",
                "ok",
                started.elapsed().as_secs_f64() * 1000.0,
            );
            record_graph_nodes(rows.len());
            rows.into_iter().map(Self::decode_node).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn row_splits_into_identity_and_properties() {
        let node = SurrealGraphEngine::decode_node(json!({
            "id": { "videoid": "0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0001" },
            "label": "video",
            "name": "cats",
        }))
        .unwrap();
        assert_eq!(node.label, "video");
        assert_eq!(node.id["videoid"], "0c4c5a43-3d5c-4e4e-9d4e-7a8f2a1b0001");
        assert_eq!(node.properties.len(), 1);
        assert!(!node.properties.contains_key("id"));
    }

    #[test]
    fn ranking_query_binds_instead_of_splicing() {
        assert!(RANKING_QUERY.contains("$user_id"));
        assert!(RANKING_QUERY.contains("$limit"));
    }
}
