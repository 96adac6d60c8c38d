use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    #[error("{operation} could not write {key}: {message}")]
    WriteFailure {
        operation: &'static str,
        key: String,
        message: String,
    },
    #[error("{operation} could not read {key}: {message}")]
    QueryFailure {
        operation: &'static str,
        key: String,
        message: String,
    },
    #[error("related videos for {video_id} failed on tag '{tag}': {message}")]
    AggregationFailure {
        video_id: String,
        tag: String,
        message: String,
    },
    #[error("parse failed: {0}")]
    Parse(String),
}
