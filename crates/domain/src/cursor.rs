use crate::DomainResult;
use crate::error::DomainError;

const CURSOR_VERSION: u8 = 1;

/// Store-level resume position. Content is owned by the store that produced it;
/// the codec only moves the bytes in and out of a token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContinuationMarker(Vec<u8>);

impl ContinuationMarker {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

pub fn encode_cursor(marker: &ContinuationMarker) -> String {
    let mut raw = Vec::with_capacity(marker.0.len() + 1);
    raw.push(CURSOR_VERSION);
    raw.extend_from_slice(&marker.0);
    hex::encode(raw)
}

/// `None` and `""` mean "start of the result set".
pub fn decode_cursor(value: Option<&str>) -> DomainResult<Option<ContinuationMarker>> {
    let Some(value) = value.filter(|value| !value.is_empty()) else {
        return Ok(None);
    };
    let raw = hex::decode(value)
        .map_err(|_| DomainError::InvalidCursor("cursor is not a valid page token".into()))?;
    let Some((version, marker)) = raw.split_first() else {
        return Err(DomainError::InvalidCursor("cursor is empty".into()));
    };
    if *version != CURSOR_VERSION {
        return Err(DomainError::InvalidCursor(format!(
            "unsupported cursor version {version}"
        )));
    }
    Ok(Some(ContinuationMarker(marker.to_vec())))
}
