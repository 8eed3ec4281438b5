use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ApiError {
    /// Short code for structured log events.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Transport(_) => "transport",
            ApiError::Rejected { .. } => "rejected",
            ApiError::Decode(_) => "decode",
            ApiError::InvalidConfig(_) => "invalid_config",
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. } => Some(*status),
            ApiError::Transport(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
