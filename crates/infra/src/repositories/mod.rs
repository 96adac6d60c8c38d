mod comments;
mod events;
mod graph;
mod videos;

pub use comments::SurrealProjectionStore;
pub use events::{SurrealCommentEventSink, TracingCommentEventSink};
pub use graph::{RANKING_QUERY, SurrealGraphEngine, ranking_query};
pub use videos::SurrealVideoCatalog;
