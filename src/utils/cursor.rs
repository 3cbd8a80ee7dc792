use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ports::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    #[error("base64 decode error: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("utf8 error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("missing {0} in cursor")]
    Missing(&'static str),
    #[error("timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),
    #[error("uuid parse error: {0}")]
    Id(#[from] uuid::Error),
}

/// Opaque keyset cursor over `(created_at, id)`: `"{rfc3339}|{uuid}"`, URL-safe base64.
pub fn encode(created_at: DateTime<Utc>, id: Uuid) -> String {
    URL_SAFE_NO_PAD.encode(format!("{}|{}", created_at.to_rfc3339(), id))
}

pub fn decode(cursor: &str) -> Result<Cursor, CursorError> {
    let s = String::from_utf8(URL_SAFE_NO_PAD.decode(cursor)?)?;
    let (ts, id) = s.split_once('|').ok_or(CursorError::Missing("id"))?;
    if ts.is_empty() {
        return Err(CursorError::Missing("timestamp"));
    }
    let ts = DateTime::parse_from_rfc3339(ts)?.with_timezone(&Utc);
    Ok((ts, Uuid::parse_str(id)?))
}
