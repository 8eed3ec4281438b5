//! Build log streaming.
//!
//! [`LogStreamHub`] owns one SSE connection per build id plus the text
//! buffer and display status for that build. Stored output fetched over
//! HTTP and live output from the stream land in the same buffer.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use futures::StreamExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Level};

use moon_observability::{emit_event, ObservabilityEvent, ProcessKind};
use moon_types::{BuildResult, LogStatus, LogTarget};

use crate::api::ApiClient;

/// Named SSE event that ends a build's stream.
pub const BUILD_RESULT_EVENT: &str = "buildResult";

const COMPONENT: &str = "log_stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CloseReason {
    Completed { status: String },
    StreamError { message: String },
    EndOfStream,
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Streaming,
    Closed { reason: CloseReason },
}

impl ConnectionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed { .. })
    }
}

/// Accumulated log text for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogBuffer {
    text: String,
}

impl LogBuffer {
    /// Appends a chunk, newline-terminated.
    ///
    /// A chunk equal to the whole last line is dropped, since servers replay
    /// it on reconnect. A line that genuinely repeats is dropped too.
    /// Returns whether the buffer changed.
    pub fn append(&mut self, chunk: &str) -> bool {
        if chunk.is_empty() {
            return false;
        }
        let mut line = chunk.to_string();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        if self.text == line || self.text.ends_with(&format!("\n{line}")) {
            return false;
        }
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.text.push('\n');
        }
        self.text.push_str(&line);
        true
    }

    pub fn replace(&mut self, text: String) {
        self.text = text;
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn clear(&mut self) {
        self.text.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEventKind {
    Appended { chunk: String },
    Replaced,
    Status(LogStatus),
    Connection(ConnectionState),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub build_id: String,
    pub kind: LogEventKind,
}

struct Connection {
    generation: u64,
    state: ConnectionState,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct HubState {
    next_generation: u64,
    buffers: HashMap<String, LogBuffer>,
    statuses: HashMap<String, LogStatus>,
    connections: HashMap<String, Connection>,
}

/// Shared state plus the event channel; cloned into every connection task.
#[derive(Clone)]
struct HubShared {
    state: Arc<Mutex<HubState>>,
    tx: broadcast::Sender<LogEvent>,
}

impl HubShared {
    fn publish(&self, build_id: &str, kind: LogEventKind) {
        let _ = self.tx.send(LogEvent {
            build_id: build_id.to_string(),
            kind,
        });
    }

    /// Moves the status forward. Terminal statuses are final, except that
    /// streamed output upgrades `Empty` to `Success`.
    fn set_status(&self, state: &mut HubState, build_id: &str, next: LogStatus) -> bool {
        let current = state
            .statuses
            .get(build_id)
            .copied()
            .unwrap_or_default();
        let allowed = match (current, next) {
            (a, b) if a == b => false,
            (LogStatus::Empty, LogStatus::Success) => true,
            (a, _) if a.is_terminal() => false,
            (_, LogStatus::Idle) => false,
            _ => true,
        };
        if allowed {
            state.statuses.insert(build_id.to_string(), next);
            self.publish(build_id, LogEventKind::Status(next));
        }
        allowed
    }

    /// Applies a transition only while the connection still belongs to
    /// `generation`; a teardown or reopen invalidates older tasks.
    fn transition(&self, build_id: &str, generation: u64, next: ConnectionState) -> bool {
        let mut state = self.state.lock();
        let Some(conn) = state.connections.get_mut(build_id) else {
            return false;
        };
        if conn.generation != generation || conn.state.is_closed() {
            return false;
        }
        conn.state = next.clone();
        self.publish(build_id, LogEventKind::Connection(next));
        true
    }

    fn append(&self, build_id: &str, generation: u64, chunk: &str) {
        let mut state = self.state.lock();
        let live = state
            .connections
            .get(build_id)
            .is_some_and(|conn| conn.generation == generation);
        if !live {
            return;
        }
        let mut chunk = chunk.to_string();
        if !chunk.ends_with('\n') {
            chunk.push('\n');
        }
        let changed = state
            .buffers
            .entry(build_id.to_string())
            .or_default()
            .append(&chunk);
        if changed {
            self.publish(build_id, LogEventKind::Appended { chunk });
            if state.statuses.get(build_id) == Some(&LogStatus::Empty) {
                self.set_status(&mut state, build_id, LogStatus::Success);
            }
        }
    }

    fn close(&self, build_id: &str, generation: u64, reason: CloseReason) {
        let mut state = self.state.lock();
        let Some(conn) = state.connections.get_mut(build_id) else {
            return;
        };
        if conn.generation != generation || conn.state.is_closed() {
            return;
        }
        conn.state = ConnectionState::Closed {
            reason: reason.clone(),
        };
        conn.stop_tx = None;
        self.publish(
            build_id,
            LogEventKind::Connection(conn.state.clone()),
        );

        let loading = state.statuses.get(build_id) == Some(&LogStatus::Loading);
        if !loading {
            return;
        }
        let has_text = state.buffers.get(build_id).is_some_and(|b| !b.is_empty());
        let next = match &reason {
            CloseReason::StreamError { .. } => LogStatus::Error,
            CloseReason::Completed { .. } | CloseReason::EndOfStream if has_text => {
                LogStatus::Success
            }
            CloseReason::Completed { .. } | CloseReason::EndOfStream => LogStatus::Empty,
            CloseReason::Teardown => return,
        };
        self.set_status(&mut state, build_id, next);
    }
}

/// Per-build live log connections and buffers.
///
/// Dropping the hub stops every connection.
pub struct LogStreamHub {
    client: ApiClient,
    shared: HubShared,
}

impl LogStreamHub {
    pub fn new(client: ApiClient) -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self {
            client,
            shared: HubShared {
                state: Arc::new(Mutex::new(HubState::default())),
                tx,
            },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.shared.tx.subscribe()
    }

    /// Starts streaming a build's output. A build that already has a
    /// connection, open or closed, is left alone. Must be called inside a
    /// tokio runtime.
    pub fn open(&self, build_id: &str) {
        let mut state = self.shared.state.lock();
        if state.connections.contains_key(build_id) {
            return;
        }
        state.next_generation += 1;
        let generation = state.next_generation;
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        state.connections.insert(
            build_id.to_string(),
            Connection {
                generation,
                state: ConnectionState::Idle,
                stop_tx: Some(stop_tx),
                task: None,
            },
        );
        state.buffers.entry(build_id.to_string()).or_default();
        self.shared
            .set_status(&mut state, build_id, LogStatus::Loading);

        let task = tokio::spawn(run_connection(
            self.client.clone(),
            self.shared.clone(),
            build_id.to_string(),
            generation,
            stop_rx,
        ));
        if let Some(conn) = state.connections.get_mut(build_id) {
            conn.task = Some(task);
        }
    }

    /// Opens a stream for every target and loads its stored output.
    pub async fn track(&self, targets: &[LogTarget]) -> Vec<(String, LogStatus)> {
        for target in targets {
            self.open(&target.build_id);
        }
        self.load_history(targets).await
    }

    /// Fetches stored output for all targets concurrently.
    ///
    /// A request error marks the build `Error`, a response without text
    /// marks it `Empty`, and text replaces the buffer and marks it
    /// `Success`. Returns the resulting status per build.
    pub async fn load_history(&self, targets: &[LogTarget]) -> Vec<(String, LogStatus)> {
        let fetches = targets.iter().map(|target| async move {
            let result = self.client.task_history_output(target).await;
            (target.build_id.clone(), result)
        });
        let results = join_all(fetches).await;

        let mut outcome = Vec::with_capacity(results.len());
        let mut state = self.shared.state.lock();
        for (build_id, result) in results {
            let next = match result {
                Ok(response) => match response.into_text() {
                    Some(text) => {
                        state
                            .buffers
                            .entry(build_id.clone())
                            .or_default()
                            .replace(text);
                        self.shared.publish(&build_id, LogEventKind::Replaced);
                        LogStatus::Success
                    }
                    None => LogStatus::Empty,
                },
                Err(e) => {
                    warn!(build_id = %build_id, "log history request failed: {}", e);
                    emit_event(
                        Level::WARN,
                        ProcessKind::Embedded,
                        ObservabilityEvent {
                            build_id: Some(&build_id),
                            error_code: Some(e.code()),
                            ..ObservabilityEvent::new(COMPONENT, "history.failed")
                        },
                    );
                    LogStatus::Error
                }
            };
            self.shared.set_status(&mut state, &build_id, next);
            let status = state.statuses.get(&build_id).copied().unwrap_or_default();
            outcome.push((build_id, status));
        }
        outcome
    }

    pub fn status(&self, build_id: &str) -> LogStatus {
        self.shared
            .state
            .lock()
            .statuses
            .get(build_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn connection_state(&self, build_id: &str) -> ConnectionState {
        self.shared
            .state
            .lock()
            .connections
            .get(build_id)
            .map(|conn| conn.state.clone())
            .unwrap_or(ConnectionState::Idle)
    }

    pub fn text(&self, build_id: &str) -> String {
        self.shared
            .state
            .lock()
            .buffers
            .get(build_id)
            .map(|b| b.as_str().to_string())
            .unwrap_or_default()
    }

    /// Text to display, present only for a successful, non-empty build
    /// whose stream was opened.
    pub fn view(&self, build_id: &str) -> Option<String> {
        let state = self.shared.state.lock();
        let success = state.statuses.get(build_id) == Some(&LogStatus::Success);
        let opened = state.connections.contains_key(build_id);
        let buffer = state.buffers.get(build_id)?;
        (success && opened && !buffer.is_empty()).then(|| buffer.as_str().to_string())
    }

    /// Waits until the build's connection is closed and returns why.
    pub async fn wait_closed(&self, build_id: &str) -> Option<CloseReason> {
        let mut rx = self.subscribe();
        loop {
            if let ConnectionState::Closed { reason } = self.connection_state(build_id) {
                return Some(reason);
            }
            if !self.shared.state.lock().connections.contains_key(build_id) {
                return None;
            }
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Closes every connection and clears all buffers and statuses.
    pub fn teardown(&self) {
        let connections = {
            let mut state = self.shared.state.lock();
            state.buffers.clear();
            state.statuses.clear();
            std::mem::take(&mut state.connections)
        };
        let count = connections.len();
        for (build_id, mut conn) in connections {
            if let Some(stop_tx) = conn.stop_tx.take() {
                let _ = stop_tx.send(());
            }
            if !conn.state.is_closed() {
                self.shared.publish(
                    &build_id,
                    LogEventKind::Connection(ConnectionState::Closed {
                        reason: CloseReason::Teardown,
                    }),
                );
            }
        }
        if count > 0 {
            info!("log stream hub torn down ({} connections)", count);
        }
    }

    /// Like [`LogStreamHub::teardown`], then waits for the connection tasks
    /// to exit.
    pub async fn shutdown(&self) {
        let tasks: Vec<JoinHandle<()>> = {
            let mut state = self.shared.state.lock();
            state
                .connections
                .values_mut()
                .filter_map(|conn| conn.task.take())
                .collect()
        };
        self.teardown();
        for task in tasks {
            let _ = task.await;
        }
    }
}

impl Drop for LogStreamHub {
    fn drop(&mut self) {
        self.teardown();
    }
}

async fn run_connection(
    client: ApiClient,
    shared: HubShared,
    build_id: String,
    generation: u64,
    mut stop_rx: oneshot::Receiver<()>,
) {
    if !shared.transition(&build_id, generation, ConnectionState::Connecting) {
        return;
    }

    let stream = tokio::select! {
        res = client.task_output_stream(&build_id) => res,
        _ = &mut stop_rx => return,
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            warn!(build_id = %build_id, "log stream failed to connect: {}", e);
            emit_event(
                Level::WARN,
                ProcessKind::Embedded,
                ObservabilityEvent {
                    build_id: Some(&build_id),
                    error_code: Some(e.code()),
                    ..ObservabilityEvent::new(COMPONENT, "stream.connect_failed")
                },
            );
            shared.close(
                &build_id,
                generation,
                CloseReason::StreamError {
                    message: e.to_string(),
                },
            );
            return;
        }
    };

    if !shared.transition(&build_id, generation, ConnectionState::Streaming) {
        return;
    }
    futures::pin_mut!(stream);

    let reason = loop {
        tokio::select! {
            _ = &mut stop_rx => return,
            next = stream.next() => {
                let Some(item) = next else {
                    break CloseReason::EndOfStream;
                };
                let frame = match item {
                    Ok(frame) => frame,
                    Err(e) => break CloseReason::StreamError { message: e.to_string() },
                };
                match frame.event_name() {
                    BUILD_RESULT_EVENT => {
                        let status = match serde_json::from_str::<BuildResult>(&frame.data) {
                            Ok(result) => result.status,
                            Err(e) => {
                                debug!("unparseable build result {:?}: {}", frame.data, e);
                                "unknown".to_string()
                            }
                        };
                        break CloseReason::Completed { status };
                    }
                    "message" => shared.append(&build_id, generation, &frame.data),
                    other => debug!(build_id = %build_id, "ignoring log stream event {}", other),
                }
            }
        }
    };

    let status = match &reason {
        CloseReason::Completed { status } => status.as_str(),
        CloseReason::StreamError { .. } => "stream_error",
        CloseReason::EndOfStream => "end_of_stream",
        CloseReason::Teardown => "teardown",
    };
    emit_event(
        Level::INFO,
        ProcessKind::Embedded,
        ObservabilityEvent {
            build_id: Some(&build_id),
            status: Some(status),
            ..ObservabilityEvent::new(COMPONENT, "stream.closed")
        },
    );
    shared.close(&build_id, generation, reason);
}
