pub mod comments;
pub mod cursor;
pub mod error;
pub mod events;
pub mod execution;
pub mod identity;
pub mod ports;
pub mod recommendations;
pub mod related;
pub mod util;

pub type DomainResult<T> = Result<T, error::DomainError>;
