use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use moon_cache::{ClTasksQuery, CurrentUserQuery, ProjectMembershipsQuery, QueryCache};
use moon_client::{ApiClient, ClientConfig, ConnectionState, LogEventKind, LogStreamHub};
use moon_observability::{
    canonical_logs_dir_from_root, emit_event, init_process_logging, ObservabilityEvent, ProcessKind,
};
use moon_sync::CommentSync;
use moon_types::{
    CommentSubject, CreateCommentData, CreateProjectMembershipRequest, Invitation,
    InviteMembersRequest, LogTarget, TaskInfo,
};

#[derive(Parser, Debug)]
#[command(name = "moon-watch")]
#[command(about = "Follow Moon CI builds and comment on posts from a terminal")]
struct Cli {
    /// Directory for JSONL logs. Defaults to the platform data dir.
    #[arg(long, env = "MOON_LOG_DIR")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the tasks of a change list with their aggregate status.
    Checks {
        #[arg(long)]
        cl: String,
        /// Poll every N seconds and print only when something changed.
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Print stored build output, then follow the live stream.
    Logs {
        #[arg(long)]
        cl: String,
        #[arg(long)]
        build: Option<String>,
    },
    /// Post a comment (or a reply) through the optimistic pipeline.
    Comment {
        #[arg(long)]
        post: String,
        #[arg(long)]
        body: String,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long, default_value_t = 0)]
        retries: u32,
    },
    /// List project members, optionally adding one first.
    Members {
        #[arg(long)]
        project: String,
        #[arg(long)]
        add: Option<String>,
    },
    /// Invite people to the organization.
    Invite {
        #[arg(long, required = true)]
        email: Vec<String>,
        #[arg(long, default_value = "member")]
        role: String,
        #[arg(long)]
        project: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ClientConfig::from_env().context("invalid MOON_* configuration")?;

    let logs_dir = cli
        .log_dir
        .clone()
        .or_else(|| config.log_dir.clone())
        .unwrap_or_else(default_logs_dir);
    let (_log_guard, log_info) =
        init_process_logging(ProcessKind::Watch, &logs_dir, config.log_retention_days)?;
    emit_event(
        tracing::Level::INFO,
        ProcessKind::Watch,
        ObservabilityEvent {
            status: Some("ok"),
            detail: Some("watch jsonl logging initialized"),
            ..ObservabilityEvent::new("watch.main", "logging.initialized")
        },
    );
    info!("watch logging initialized: {:?}", log_info);

    let client = ApiClient::new(config.clone()).context("failed to build API client")?;
    let result = match cli.command {
        Command::Checks { cl, interval } => run_checks(&client, &cl, interval).await,
        Command::Logs { cl, build } => run_logs(&client, &cl, build.as_deref()).await,
        Command::Comment {
            post,
            body,
            parent,
            retries,
        } => run_comment(&client, &config, post, body, parent, retries).await,
        Command::Members { project, add } => run_members(&client, &config, &project, add).await,
        Command::Invite {
            email,
            role,
            project,
        } => run_invite(&client, email, role, project).await,
    };
    if let Err(err) = &result {
        let detail = format!("{err:#}");
        emit_event(
            tracing::Level::ERROR,
            ProcessKind::Watch,
            ObservabilityEvent {
                status: Some("failed"),
                detail: Some(detail.as_str()),
                ..ObservabilityEvent::new("watch.main", "command.failed")
            },
        );
    }
    result
}

fn default_logs_dir() -> PathBuf {
    let root = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("moon");
    canonical_logs_dir_from_root(&root)
}

fn print_tasks(tasks: &[TaskInfo]) {
    for task in tasks {
        let status = task
            .aggregate_status()
            .map(|s| s.as_str())
            .unwrap_or("Unknown");
        println!(
            "{status:<12} {}  ({} builds)",
            task.display_name(),
            task.build_list.len()
        );
    }
}

async fn run_checks(client: &ApiClient, cl: &str, interval: Option<u64>) -> anyhow::Result<()> {
    let cache = QueryCache::new();
    let query = ClTasksQuery { cl: cl.to_string() };
    loop {
        let tasks = client
            .cl_tasks(cl)
            .await
            .with_context(|| format!("failed to load tasks for CL {cl}"))?;
        let previous = cache.get(&query)?;
        if previous.as_ref() != Some(&tasks) {
            cache.set(&query, &tasks)?;
            print_tasks(&tasks);
        }
        let Some(secs) = interval else {
            return Ok(());
        };
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs.max(1))) => {}
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
        println!();
    }
}

async fn run_logs(client: &ApiClient, cl: &str, build: Option<&str>) -> anyhow::Result<()> {
    let tasks = client
        .cl_tasks(cl)
        .await
        .with_context(|| format!("failed to load tasks for CL {cl}"))?;
    let targets: Vec<LogTarget> = tasks
        .iter()
        .flat_map(TaskInfo::log_targets)
        .filter(|target| build.map_or(true, |id| target.build_id == id))
        .collect();
    if targets.is_empty() {
        bail!("no builds with logs found for CL {cl}");
    }

    let hub = LogStreamHub::new(client.clone());
    let mut events = hub.subscribe();
    for (build_id, status) in hub.track(&targets).await {
        println!("== {build_id} [{}]", status.as_str());
        let text = hub.text(&build_id);
        if !text.is_empty() {
            print!("{text}");
            if !text.ends_with('\n') {
                println!();
            }
        }
    }

    let mut open: HashSet<String> = targets
        .iter()
        .map(|t| t.build_id.clone())
        .filter(|id| !hub.connection_state(id).is_closed())
        .collect();
    while !open.is_empty() {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => break,
        };
        match event {
            Ok(event) => match event.kind {
                LogEventKind::Appended { chunk } => {
                    print!("[{}] {}", event.build_id, chunk);
                    if !chunk.ends_with('\n') {
                        println!();
                    }
                }
                LogEventKind::Connection(ConnectionState::Closed { reason }) => {
                    println!("== {} closed: {:?}", event.build_id, reason);
                    open.remove(&event.build_id);
                }
                _ => {}
            },
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "log events dropped"),
            Err(RecvError::Closed) => break,
        }
    }
    hub.shutdown().await;
    Ok(())
}

async fn run_comment(
    client: &ApiClient,
    config: &ClientConfig,
    post: String,
    body: String,
    parent: Option<String>,
    retries: u32,
) -> anyhow::Result<()> {
    let cache = QueryCache::new();
    match client.current_user().await {
        Ok(user) => cache.set(&CurrentUserQuery, &user)?,
        Err(err) => warn!(error = %err, "could not load current user"),
    }
    let sync = CommentSync::new(cache, Arc::new(client.clone()), config.org.clone())
        .with_limits(config.comment_limits)
        .with_process(ProcessKind::Watch);

    let data = CreateCommentData {
        body_html: body,
        parent_comment_id: parent,
        ..CreateCommentData::default()
    };
    let mutation = sync.begin(CommentSubject::post(post), data)?;
    println!("pending {}", mutation.id);

    let mut outcome = sync.send(&mutation).await;
    let mut attempts_left = retries;
    while outcome.is_err() && attempts_left > 0 {
        attempts_left -= 1;
        if let Err(err) = &outcome {
            warn!(error = %err, "comment failed, retrying");
        }
        outcome = sync.retry(&mutation.id).await;
    }
    let comment = outcome.with_context(|| format!("comment {} was not delivered", mutation.id))?;
    println!("{}", serde_json::to_string_pretty(&comment)?);
    Ok(())
}

async fn run_members(
    client: &ApiClient,
    config: &ClientConfig,
    project: &str,
    add: Option<String>,
) -> anyhow::Result<()> {
    let cache = QueryCache::new();
    let query = ProjectMembershipsQuery {
        org: config.org.clone(),
        project_id: project.to_string(),
    };
    let memberships = client.project_memberships(project).await?;
    cache.set(&query, &memberships)?;

    if let Some(user_id) = add {
        let created = client
            .add_project_member(project, &CreateProjectMembershipRequest { user_id })
            .await?;
        cache.update(&query, |old| {
            let mut list = old.unwrap_or_default();
            list.retain(|m| m.id != created.id);
            list.push(created.clone());
            Some(list)
        })?;
    }

    for membership in cache.get(&query)?.unwrap_or_default() {
        let user = &membership.member.user;
        println!("{:<20} {}", user.username, user.display_name);
    }
    Ok(())
}

async fn run_invite(
    client: &ApiClient,
    emails: Vec<String>,
    role: String,
    projects: Vec<String>,
) -> anyhow::Result<()> {
    let invitations = emails
        .into_iter()
        .map(|email| Invitation {
            email,
            role: role.clone(),
            project_ids: projects.clone(),
        })
        .collect();
    let sent = client
        .invite_members(&InviteMembersRequest { invitations })
        .await?;
    for invitation in sent {
        println!("invited {} as {}", invitation.email, invitation.role);
    }
    Ok(())
}
