//! Client configuration.
//!
//! Values come from `MOON_*` environment variables with local-development
//! defaults. Malformed numbers fall back to the default with a warning; a
//! malformed base URL is an error.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::error::ApiError;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_ORCHESTRATOR_URL: &str = "http://127.0.0.1:8004";
pub const DEFAULT_ORG: &str = "mega";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_BODY_CHARS: usize = 65_536;
pub const DEFAULT_MAX_ATTACHMENTS: usize = 10;
pub const DEFAULT_LOG_RETENTION_DAYS: u64 = 14;

/// Limits enforced on the comment composer before anything is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommentLimits {
    pub max_body_chars: usize,
    pub max_attachments: usize,
}

impl Default for CommentLimits {
    fn default() -> Self {
        Self {
            max_body_chars: DEFAULT_MAX_BODY_CHARS,
            max_attachments: DEFAULT_MAX_ATTACHMENTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the review API, e.g. `http://127.0.0.1:8000`.
    pub api_url: String,
    /// Base URL of the build orchestrator serving tasks and logs.
    pub orchestrator_url: String,
    /// Sent as `Authorization: Bearer <token>` and `x-moon-token`.
    pub api_token: Option<String>,
    /// Organization slug used in every org-scoped path.
    pub org: String,
    pub request_timeout: Duration,
    pub comment_limits: CommentLimits,
    pub log_dir: Option<PathBuf>,
    pub log_retention_days: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            orchestrator_url: DEFAULT_ORCHESTRATOR_URL.to_string(),
            api_token: None,
            org: DEFAULT_ORG.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            comment_limits: CommentLimits::default(),
            log_dir: None,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ApiError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ApiError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let text = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = normalize_base_url(
            "MOON_API_URL",
            text("MOON_API_URL").unwrap_or(defaults.api_url),
        )?;
        let orchestrator_url = normalize_base_url(
            "MOON_ORCHESTRATOR_URL",
            text("MOON_ORCHESTRATOR_URL").unwrap_or(defaults.orchestrator_url),
        )?;

        Ok(Self {
            api_url,
            orchestrator_url,
            api_token: text("MOON_API_TOKEN"),
            org: text("MOON_ORG").unwrap_or(defaults.org),
            request_timeout: Duration::from_secs(parse_number(
                "MOON_REQUEST_TIMEOUT_SECS",
                text("MOON_REQUEST_TIMEOUT_SECS"),
                DEFAULT_TIMEOUT_SECS,
            )),
            comment_limits: CommentLimits {
                max_body_chars: parse_number(
                    "MOON_COMMENT_MAX_BODY_CHARS",
                    text("MOON_COMMENT_MAX_BODY_CHARS"),
                    DEFAULT_MAX_BODY_CHARS,
                ),
                max_attachments: parse_number(
                    "MOON_COMMENT_MAX_ATTACHMENTS",
                    text("MOON_COMMENT_MAX_ATTACHMENTS"),
                    DEFAULT_MAX_ATTACHMENTS,
                ),
            },
            log_dir: text("MOON_LOG_DIR").map(PathBuf::from),
            log_retention_days: parse_number(
                "MOON_LOG_RETENTION_DAYS",
                text("MOON_LOG_RETENTION_DAYS"),
                DEFAULT_LOG_RETENTION_DAYS,
            ),
        })
    }
}

fn normalize_base_url(name: &str, raw: String) -> Result<String, ApiError> {
    let parsed = reqwest::Url::parse(&raw)
        .map_err(|e| ApiError::InvalidConfig(format!("{name}={raw}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::InvalidConfig(format!(
            "{name}={raw}: expected an http(s) URL"
        )));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn parse_number<T>(name: &str, raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    let Some(raw) = raw else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!("{name}={raw} is not a valid number; using {default}");
            default
        }
    }
}
