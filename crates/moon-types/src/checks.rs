//! Change-list checks: tasks, their builds, and build log payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetState {
    Pending,
    Building,
    Completed,
    Failed,
    Interrupted,
    #[serde(other)]
    Unknown,
}

impl TargetState {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetState::Pending => "Pending",
            TargetState::Building => "Building",
            TargetState::Completed => "Completed",
            TargetState::Failed => "Failed",
            TargetState::Interrupted => "Interrupted",
            TargetState::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for TargetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetBuild {
    pub id: Option<String>,
    pub output_file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default)]
    pub id: Option<String>,
    pub state: TargetState,
    #[serde(default)]
    pub builds: Vec<TargetBuild>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildRef {
    pub id: String,
    pub task_id: Option<String>,
    pub repo: Option<String>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskInfo {
    pub task_id: String,
    pub task_name: Option<String>,
    pub cl: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub build_list: Vec<BuildRef>,
    pub targets: Vec<Target>,
}

/// Everything needed to address one build's logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogTarget {
    pub build_id: String,
    pub task_id: String,
    pub repo: String,
}

impl TaskInfo {
    /// Worst state across targets: Failed, Interrupted, Building, Pending,
    /// then Completed only when every target completed.
    pub fn aggregate_status(&self) -> Option<TargetState> {
        if self.targets.is_empty() {
            return None;
        }
        let has = |state: TargetState| self.targets.iter().any(|t| t.state == state);
        for state in [
            TargetState::Failed,
            TargetState::Interrupted,
            TargetState::Building,
            TargetState::Pending,
        ] {
            if has(state) {
                return Some(state);
            }
        }
        if self
            .targets
            .iter()
            .all(|t| t.state == TargetState::Completed)
        {
            return Some(TargetState::Completed);
        }
        None
    }

    pub fn display_name(&self) -> String {
        let fallback = || {
            self.task_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Unnamed Task".to_string())
        };
        let Some(output_file) = self
            .targets
            .first()
            .and_then(|t| t.builds.first())
            .and_then(|b| b.output_file.as_deref())
        else {
            return fallback();
        };
        match output_file.rsplit('/').next() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => fallback(),
        }
    }

    /// Builds that carry a build id, task id and repo.
    pub fn log_targets(&self) -> Vec<LogTarget> {
        self.build_list
            .iter()
            .filter_map(|build| {
                let task_id = build
                    .task_id
                    .clone()
                    .unwrap_or_else(|| self.task_id.clone());
                let repo = build.repo.clone()?;
                if build.id.is_empty() || task_id.is_empty() || repo.is_empty() {
                    return None;
                }
                Some(LogTarget {
                    build_id: build.id.clone(),
                    task_id,
                    repo,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LogData {
    Lines(Vec<String>),
    Text(String),
}

/// Response of the HTTP log history endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpLogResponse {
    pub data: Option<LogData>,
    pub len: Option<u64>,
}

impl HttpLogResponse {
    /// Log text, or `None` when the server has no output yet.
    pub fn into_text(self) -> Option<String> {
        if self.len == Some(0) {
            return None;
        }
        match self.data? {
            LogData::Lines(lines) if lines.is_empty() => None,
            LogData::Lines(lines) => Some(lines.join("\n")),
            LogData::Text(text) if text.is_empty() => None,
            LogData::Text(text) => Some(text),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Empty,
    Error,
}

impl LogStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, LogStatus::Success | LogStatus::Empty | LogStatus::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogStatus::Idle => "idle",
            LogStatus::Loading => "loading",
            LogStatus::Success => "success",
            LogStatus::Empty => "empty",
            LogStatus::Error => "error",
        }
    }
}

/// Payload of the `buildResult` stream event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResult {
    pub status: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}
