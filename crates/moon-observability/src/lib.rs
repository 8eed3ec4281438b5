use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Target shared by every structured event, so sinks can filter on it.
pub const EVENT_TARGET: &str = "moon.obs";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    /// The `moon-watch` command line tool.
    Watch,
    /// A host application embedding the sync crates.
    Embedded,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Watch => "watch",
            ProcessKind::Embedded => "embedded",
        }
    }

    pub fn file_prefix(self) -> String {
        format!("moon.{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// One lifecycle step of a mutation or stream.
///
/// `optimistic_id` and `server_id` tie a provisional comment to its
/// confirmed record; `build_id` names a log stream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ObservabilityEvent<'a> {
    pub event: &'a str,
    pub component: &'a str,
    pub correlation_id: Option<&'a str>,
    pub optimistic_id: Option<&'a str>,
    pub server_id: Option<&'a str>,
    pub build_id: Option<&'a str>,
    pub status: Option<&'a str>,
    pub error_code: Option<&'a str>,
    pub detail: Option<&'a str>,
}

impl<'a> ObservabilityEvent<'a> {
    pub fn new(component: &'a str, event: &'a str) -> Self {
        Self {
            event,
            component,
            ..Self::default()
        }
    }
}

/// Comment bodies and tokens never reach the log files verbatim.
pub fn redact_text(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!(
        "[redacted len={} hash={}]",
        trimmed.chars().count(),
        short_hash(trimmed)
    )
}

pub fn short_hash(input: &str) -> String {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    input.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

macro_rules! emit_at {
    ($macro:ident, $process:expr, $event:expr) => {
        tracing::$macro!(
            target: EVENT_TARGET,
            process = $process.as_str(),
            component = $event.component,
            event = $event.event,
            correlation_id = $event.correlation_id.unwrap_or(""),
            optimistic_id = $event.optimistic_id.unwrap_or(""),
            server_id = $event.server_id.unwrap_or(""),
            build_id = $event.build_id.unwrap_or(""),
            status = $event.status.unwrap_or(""),
            error_code = $event.error_code.unwrap_or(""),
            detail = $event.detail.unwrap_or(""),
            "observability_event"
        )
    };
}

pub fn emit_event(level: Level, process: ProcessKind, event: ObservabilityEvent<'_>) {
    match level {
        Level::ERROR => emit_at!(error, process, event),
        Level::WARN => emit_at!(warn, process, event),
        Level::DEBUG | Level::TRACE => emit_at!(debug, process, event),
        _ => emit_at!(info, process, event),
    }
}

/// Installs a compact console layer and a daily-rotated JSONL file layer.
///
/// Files older than `retention_days` are removed first. The returned guard
/// must be held for the life of the process or buffered lines are lost. A
/// second call in the same process keeps the first subscriber.
pub fn init_process_logging(
    process: ProcessKind,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    fs::create_dir_all(logs_dir)?;
    cleanup_old_jsonl(logs_dir, process, retention_days)?;

    let prefix = process.file_prefix();
    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(prefix.clone())
        .filename_suffix("jsonl")
        .build(logs_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_current_span(false)
        .with_span_list(false);

    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(true);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .ok();

    let info = LoggingInitInfo {
        process: process.as_str().to_string(),
        logs_dir: logs_dir.display().to_string(),
        prefix,
        retention_days,
        initialized_at: Utc::now(),
    };

    Ok((guard, info))
}

/// Deletes `moon.<process>.YYYY-MM-DD.jsonl` files dated before the cutoff.
/// Returns how many were removed.
pub fn cleanup_old_jsonl(
    logs_dir: &Path,
    process: ProcessKind,
    retention_days: u64,
) -> anyhow::Result<usize> {
    let cutoff = Utc::now().date_naive() - chrono::Duration::days(retention_days as i64);
    let prefix = format!("{}.", process.file_prefix());
    let mut removed = 0;

    for entry in fs::read_dir(logs_dir)? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        let Some(date_part) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".jsonl"))
        else {
            continue;
        };

        let Ok(date) = chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d") else {
            continue;
        };

        if date < cutoff && fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }

    Ok(removed)
}

pub fn canonical_logs_dir_from_root(root: &Path) -> PathBuf {
    root.join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_text_masks_content() {
        let raw = "<p>quarterly numbers attached</p>";
        let redacted = redact_text(raw);
        assert!(redacted.starts_with("[redacted len="));
        assert!(!redacted.contains("quarterly"));
        assert_eq!(redact_text("   "), "");
    }

    #[test]
    fn short_hash_is_stable() {
        assert_eq!(short_hash("c_123"), short_hash("c_123"));
        assert_ne!(short_hash("c_123"), short_hash("c_124"));
        assert_eq!(short_hash("x").len(), 16);
    }

    #[test]
    fn cleanup_removes_only_expired_files_of_this_process() {
        let dir = tempfile::tempdir().unwrap();
        let today = Utc::now().date_naive();
        let old = today - chrono::Duration::days(30);
        let fresh = today - chrono::Duration::days(1);

        let expired = dir.path().join(format!("moon.watch.{}.jsonl", old.format("%Y-%m-%d")));
        let kept = dir.path().join(format!("moon.watch.{}.jsonl", fresh.format("%Y-%m-%d")));
        let other = dir.path().join(format!("moon.embedded.{}.jsonl", old.format("%Y-%m-%d")));
        let unrelated = dir.path().join("notes.txt");
        for path in [&expired, &kept, &other, &unrelated] {
            fs::write(path, "{}\n").unwrap();
        }

        let removed = cleanup_old_jsonl(dir.path(), ProcessKind::Watch, 7).unwrap();
        assert_eq!(removed, 1);
        assert!(!expired.exists());
        assert!(kept.exists());
        assert!(other.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn canonical_logs_dir_joins_logs_folder() {
        let root = PathBuf::from("/var/lib/moon");
        assert_eq!(
            canonical_logs_dir_from_root(&root),
            PathBuf::from("/var/lib/moon/logs")
        );
    }

    #[test]
    fn event_builder_defaults_optional_fields() {
        let event = ObservabilityEvent {
            optimistic_id: Some("optimistic_1"),
            ..ObservabilityEvent::new("comments", "create.begin")
        };
        assert_eq!(event.component, "comments");
        assert!(event.server_id.is_none());
        emit_event(Level::INFO, ProcessKind::Embedded, event);
    }
}
