//! Normalized query cache shared by the sync layer.

pub mod cache;
pub mod error;
pub mod key;
mod normalize;
pub mod queries;

pub use cache::{CacheEvent, CacheEventKind, QueryCache, Removal};
pub use error::{CacheError, CacheResult};
pub use key::QueryKey;
pub use queries::*;
