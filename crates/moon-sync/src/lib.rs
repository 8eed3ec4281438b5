pub mod comments;
pub mod error;
pub mod favorites;
pub mod retry;
pub mod timeline;
pub mod validation;

pub use comments::{CommentMutation, CommentSync};
pub use error::{SyncError, SyncResult};
pub use favorites::FavoriteSync;
pub use retry::{RetryRecord, RetryStatus, RetryStore};
pub use timeline::{
    insert_post_timeline_event, is_within_rollup_window, optimistic_event, roll_up,
    TimelineChange, ROLLUP_WINDOW_SECS,
};
pub use validation::{validate_comment, TIMESTAMP_LIMIT};
