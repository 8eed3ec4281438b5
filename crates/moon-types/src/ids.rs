use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Prefix carried by comments that have not been confirmed by the server.
pub const OPTIMISTIC_ID_PREFIX: &str = "optimistic_";

/// Prefix for short-lived placeholders (favorites, timeline events).
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("empty identifier")]
    Empty,
    #[error("malformed provisional id: {0}")]
    MalformedProvisional(String),
}

/// Identity of a comment: client-generated until the server confirms it.
///
/// On the wire both variants are plain strings; the provisional form is
/// `optimistic_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CommentId {
    Provisional(Uuid),
    Confirmed(String),
}

impl CommentId {
    pub fn provisional() -> Self {
        CommentId::Provisional(Uuid::new_v4())
    }

    pub fn confirmed(id: impl Into<String>) -> Self {
        CommentId::Confirmed(id.into())
    }

    pub fn is_provisional(&self) -> bool {
        matches!(self, CommentId::Provisional(_))
    }

    pub fn server_id(&self) -> Option<&str> {
        match self {
            CommentId::Confirmed(id) => Some(id.as_str()),
            CommentId::Provisional(_) => None,
        }
    }

    /// Compare against a raw id as it appears in cached JSON.
    pub fn matches(&self, raw: &str) -> bool {
        match self {
            CommentId::Confirmed(id) => id == raw,
            CommentId::Provisional(uuid) => raw
                .strip_prefix(OPTIMISTIC_ID_PREFIX)
                .and_then(|rest| Uuid::parse_str(rest).ok())
                .is_some_and(|parsed| parsed == *uuid),
        }
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentId::Provisional(uuid) => write!(f, "{OPTIMISTIC_ID_PREFIX}{uuid}"),
            CommentId::Confirmed(id) => f.write_str(id),
        }
    }
}

impl FromStr for CommentId {
    type Err = IdError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(IdError::Empty);
        }
        match raw.strip_prefix(OPTIMISTIC_ID_PREFIX) {
            Some(rest) => Uuid::parse_str(rest)
                .map(CommentId::Provisional)
                .map_err(|_| IdError::MalformedProvisional(raw.to_string())),
            None => Ok(CommentId::Confirmed(raw.to_string())),
        }
    }
}

impl TryFrom<String> for CommentId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommentId> for String {
    fn from(value: CommentId) -> Self {
        value.to_string()
    }
}

pub fn temp_id(resource_id: &str) -> String {
    format!("{TEMP_ID_PREFIX}{resource_id}")
}

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}
