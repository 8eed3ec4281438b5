//! Network access for the moon sync crates: REST endpoints of the review
//! API, task and log endpoints of the build orchestrator, and the live log
//! stream hub.

pub mod api;
pub mod config;
pub mod error;
pub mod logs;
pub mod sse;

pub use api::{ApiClient, CommentApi, FavoriteApi};
pub use config::{ClientConfig, CommentLimits};
pub use error::{ApiError, ApiResult};
pub use logs::{
    CloseReason, ConnectionState, LogBuffer, LogEvent, LogEventKind, LogStreamHub,
    BUILD_RESULT_EVENT,
};
pub use sse::{sse_frames, SseDecoder, SseFrame};
