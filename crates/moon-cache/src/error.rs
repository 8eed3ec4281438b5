use thiserror::Error;

use crate::key::QueryKey;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cached value at {key} does not match the query shape: {source}")]
    Decode {
        key: QueryKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode value for the cache: {0}")]
    Encode(#[source] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
