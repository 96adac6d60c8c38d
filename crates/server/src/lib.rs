//! Process wiring for reelhub: builds the comment, related-video and
//! recommendation services from config and exposes the caller-facing operations.

pub mod state;

pub use state::AppState;
