use thiserror::Error;

use moon_cache::CacheError;
use moon_client::ApiError;
use moon_types::ValidationError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("no pending mutation with id {0}")]
    UnknownMutation(String),
    #[error("comment {0} has not been confirmed by the server")]
    Unconfirmed(String),
}

impl SyncError {
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "validation",
            SyncError::Api(err) => err.code(),
            SyncError::Cache(_) => "cache",
            SyncError::UnknownMutation(_) => "unknown_mutation",
            SyncError::Unconfirmed(_) => "unconfirmed",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
