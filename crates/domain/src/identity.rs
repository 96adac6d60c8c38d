use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::{Builder, Uuid};

use crate::{DomainResult, error::DomainError};

macro_rules! uuid_identifier {
    ($name:ident, $label:literal) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            pub fn from_uuid(value: Uuid) -> Self {
                Self(value)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0.hyphenated(), f)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let trimmed = value.trim();
                if trimmed.is_empty() {
                    return Err(DomainError::Validation(concat!($label, " is required").into()));
                }
                Uuid::parse_str(trimmed).map(Self).map_err(|err| {
                    DomainError::Validation(format!(concat!("invalid ", $label, ": {}"), err))
                })
            }
        }
    };
}

uuid_identifier!(VideoId, "video_id");
uuid_identifier!(UserId, "user_id");

/// Time-ordered comment identifier (UUID v7). Byte order equals creation order,
/// and the creation instant is read back from the leading 48-bit millisecond field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Uuid", into = "Uuid")]
pub struct CommentId(Uuid);

impl CommentId {
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_unix_ms(epoch_ms: u64) -> Self {
        let entropy = Uuid::now_v7();
        let mut tail = [0u8; 10];
        tail.copy_from_slice(&entropy.as_bytes()[6..]);
        Self(Builder::from_unix_timestamp_millis(epoch_ms, &tail).into_uuid())
    }

    pub fn from_uuid(value: Uuid) -> DomainResult<Self> {
        if value.get_version_num() != 7 {
            return Err(DomainError::Validation(format!(
                "comment_id must be a time-ordered (v7) uuid, got version {}",
                value.get_version_num()
            )));
        }
        Ok(Self(value))
    }

    pub fn from_bytes(bytes: &[u8]) -> DomainResult<Self> {
        let value = Uuid::from_slice(bytes)
            .map_err(|err| DomainError::Validation(format!("invalid comment_id bytes: {err}")))?;
        Self::from_uuid(value)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    pub fn created_at_ms(&self) -> i64 {
        self.0.as_bytes()[..6]
            .iter()
            .fold(0i64, |acc, byte| (acc << 8) | i64::from(*byte))
    }

    pub fn created_at(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.created_at_ms()) * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

impl TryFrom<Uuid> for CommentId {
    type Error = DomainError;

    fn try_from(value: Uuid) -> Result<Self, Self::Error> {
        Self::from_uuid(value)
    }
}

impl From<CommentId> for Uuid {
    fn from(value: CommentId) -> Self {
        value.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for CommentId {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(DomainError::Validation("comment_id is required".into()));
        }
        let parsed = Uuid::parse_str(trimmed)
            .map_err(|err| DomainError::Validation(format!("invalid comment_id: {err}")))?;
        Self::from_uuid(parsed)
    }
}
