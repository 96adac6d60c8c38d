use thiserror::Error;

use super::BoxFuture;
use crate::recommendations::{GraphNode, GraphStatement};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph engine unavailable: {0}")]
    Unavailable(String),
    #[error("graph query failed: {0}")]
    Query(String),
}

pub trait GraphEngine: Send + Sync {
    fn execute_graph(
        &self,
        statement: &GraphStatement,
    ) -> BoxFuture<'_, Result<Vec<GraphNode>, GraphError>>;
}
