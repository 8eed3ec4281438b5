use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use moon_types::{
    Comment, CommentSubject, CreateCommentRequest, CreateCommentResponse,
    CreateProjectMembershipRequest, FavoritableType, Favorite, HttpLogResponse,
    InviteMembersRequest, LogTarget, ProjectMembership, SentInvitation, TaskInfo,
    UpdateCommentRequest, User,
};

use crate::config::ClientConfig;
use crate::error::{ApiError, ApiResult};
use crate::sse::{sse_frames, SseFrame};

/// Comment endpoints the optimistic pipeline depends on.
#[async_trait]
pub trait CommentApi: Send + Sync {
    async fn create_comment(
        &self,
        subject: &CommentSubject,
        request: &CreateCommentRequest,
    ) -> ApiResult<CreateCommentResponse>;

    async fn create_reply(
        &self,
        parent_id: &str,
        request: &CreateCommentRequest,
    ) -> ApiResult<CreateCommentResponse>;

    async fn update_comment(&self, id: &str, request: &UpdateCommentRequest)
        -> ApiResult<Comment>;

    async fn delete_comment(&self, id: &str) -> ApiResult<()>;

    async fn resolve_comment(&self, id: &str) -> ApiResult<Comment>;

    async fn unresolve_comment(&self, id: &str) -> ApiResult<Comment>;
}

#[async_trait]
pub trait FavoriteApi: Send + Sync {
    async fn create_favorite(&self, kind: FavoritableType, id: &str) -> ApiResult<Favorite>;

    async fn delete_favorite(&self, kind: FavoritableType, id: &str) -> ApiResult<()>;
}

/// Appends path segments to a base URL. Each segment is percent-encoded, so
/// an id cannot add path levels or start a query.
fn join_segments(base: &str, segments: &[&str]) -> ApiResult<Url> {
    let mut url =
        Url::parse(base).map_err(|e| ApiError::InvalidConfig(format!("{base}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::InvalidConfig(format!("{base}: not a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Attach both auth schemes; the API accepts either.
fn add_auth(rb: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
    match token {
        Some(token) => rb.header("x-moon-token", token).bearer_auth(token),
        None => rb,
    }
}

/// HTTP client for the review API and the build orchestrator.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    /// Separate client without a total timeout for long-lived streams.
    stream_http: reqwest::Client,
    config: Arc<ClientConfig>,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let stream_http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            stream_http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn api_url(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut all = vec!["v1"];
        all.extend_from_slice(segments);
        join_segments(&self.config.api_url, &all)
    }

    fn org_url(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut all = vec!["v1", "organizations", self.config.org.as_str()];
        all.extend_from_slice(segments);
        join_segments(&self.config.api_url, &all)
    }

    fn orchestrator_url(&self, segments: &[&str]) -> ApiResult<Url> {
        join_segments(&self.config.orchestrator_url, segments)
    }

    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        add_auth(rb, self.config.api_token.as_deref())
    }

    async fn send(&self, rb: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = self.authed(rb).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(&self, rb: reqwest::RequestBuilder) -> ApiResult<T> {
        let response = self.send(rb).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        debug!("POST {}", url);
        self.send_json(self.http.post(url).json(body)).await
    }

    pub async fn current_user(&self) -> ApiResult<User> {
        self.send_json(self.http.get(self.api_url(&["users", "me"])?))
            .await
    }

    pub async fn project_memberships(&self, project_id: &str) -> ApiResult<Vec<ProjectMembership>> {
        let url = self.org_url(&["projects", project_id, "memberships"])?;
        self.send_json(self.http.get(url)).await
    }

    pub async fn add_project_member(
        &self,
        project_id: &str,
        request: &CreateProjectMembershipRequest,
    ) -> ApiResult<ProjectMembership> {
        let url = self.org_url(&["projects", project_id, "memberships"])?;
        self.post_json(url, request).await
    }

    pub async fn invite_members(
        &self,
        request: &InviteMembersRequest,
    ) -> ApiResult<Vec<SentInvitation>> {
        self.post_json(self.org_url(&["invitations"])?, request)
            .await
    }

    pub async fn cl_tasks(&self, cl: &str) -> ApiResult<Vec<TaskInfo>> {
        let url = self.orchestrator_url(&["cl", cl, "tasks"])?;
        self.send_json(self.http.get(url)).await
    }

    /// Stored log output of a build.
    pub async fn task_history_output(&self, target: &LogTarget) -> ApiResult<HttpLogResponse> {
        let rb = self
            .http
            .get(self.orchestrator_url(&["task-history-output"])?)
            .query(&[
                ("task_id", target.task_id.as_str()),
                ("build_id", target.build_id.as_str()),
                ("repo", target.repo.as_str()),
            ]);
        self.send_json(rb).await
    }

    /// Live log output of a build as SSE frames.
    pub async fn task_output_stream(
        &self,
        build_id: &str,
    ) -> ApiResult<impl Stream<Item = ApiResult<SseFrame>>> {
        let url = self.orchestrator_url(&["task-output", build_id])?;
        debug!("Subscribing to log stream at: {}", url);
        let rb = self
            .stream_http
            .get(url)
            .header("Accept", "text/event-stream");
        let response = self.send(rb).await?;
        Ok(sse_frames(response.bytes_stream()))
    }
}

#[async_trait]
impl CommentApi for ApiClient {
    async fn create_comment(
        &self,
        subject: &CommentSubject,
        request: &CreateCommentRequest,
    ) -> ApiResult<CreateCommentResponse> {
        let collection = match subject.kind {
            moon_types::SubjectType::Post => "posts",
            moon_types::SubjectType::Note => "notes",
        };
        let url = self.org_url(&[collection, subject.id.as_str(), "comments"])?;
        self.post_json(url, request).await
    }

    async fn create_reply(
        &self,
        parent_id: &str,
        request: &CreateCommentRequest,
    ) -> ApiResult<CreateCommentResponse> {
        let url = self.org_url(&["comments", parent_id, "replies"])?;
        self.post_json(url, request).await
    }

    async fn update_comment(
        &self,
        id: &str,
        request: &UpdateCommentRequest,
    ) -> ApiResult<Comment> {
        let url = self.org_url(&["comments", id])?;
        self.send_json(self.http.put(url).json(request)).await
    }

    async fn delete_comment(&self, id: &str) -> ApiResult<()> {
        let url = self.org_url(&["comments", id])?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }

    async fn resolve_comment(&self, id: &str) -> ApiResult<Comment> {
        let url = self.org_url(&["comments", id, "resolution"])?;
        self.send_json(self.http.post(url)).await
    }

    async fn unresolve_comment(&self, id: &str) -> ApiResult<Comment> {
        let url = self.org_url(&["comments", id, "resolution"])?;
        self.send_json(self.http.delete(url)).await
    }
}

#[async_trait]
impl FavoriteApi for ApiClient {
    async fn create_favorite(&self, kind: FavoritableType, id: &str) -> ApiResult<Favorite> {
        let url = self.org_url(&[kind.path_segment(), id, "favorite"])?;
        self.send_json(self.http.post(url)).await
    }

    async fn delete_favorite(&self, kind: FavoritableType, id: &str) -> ApiResult<()> {
        let url = self.org_url(&[kind.path_segment(), id, "favorite"])?;
        self.send(self.http.delete(url)).await?;
        Ok(())
    }
}
