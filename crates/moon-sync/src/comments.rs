//! Optimistic comment pipeline.
//!
//! A comment is cached under a provisional `optimistic_<uuid>` id before the
//! create request is sent. When the server answers, every cached occurrence
//! is swapped for the confirmed comment in place, keeping the provisional
//! `created_at` so lists do not reorder. A failed request leaves the
//! provisional comment visible and its retry record in `Error`; retrying
//! resends the same payload under the same id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::json;
use tracing::{debug, warn, Level};
use uuid::Uuid;

use moon_cache::{
    AttachmentCommentersQuery, AttachmentCommentsQuery, CanvasCommentsQuery, CurrentUserQuery,
    ProjectPostsQuery, QueryCache, SubjectCommentsQuery,
};
use moon_client::{ApiError, CommentApi, CommentLimits};
use moon_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use moon_types::{
    is_empty_html, merge_commenters, strip_html, temp_id, Attachment, Comment, CommentId,
    CommentSubject, CreateCommentData, CreateCommentRequest, CreateCommentResponse,
    FeedbackStatus, InfiniteData, Normalized, Note, OrganizationMember, Post, SubjectType,
    TransformedFile, UpdateCommentRequest, User, ValidationError, EMPTY_HTML,
};

use crate::error::{SyncError, SyncResult};
use crate::retry::{RetryStatus, RetryStore};
use crate::validation::validate_comment;

const COMPONENT: &str = "comment_sync";

/// A create request together with the provisional id it travels under.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentMutation {
    pub id: CommentId,
    pub subject: CommentSubject,
    pub data: CreateCommentData,
    /// Set when `begin` cached the provisional comment and counted it on
    /// its subject.
    pub inserted: bool,
}

impl CommentMutation {
    /// The wire request. The provisional id doubles as the idempotency key,
    /// so a retry cannot create a second comment.
    pub fn request(&self) -> CreateCommentRequest {
        CreateCommentRequest::from_data(&self.data, &self.id)
    }

    pub fn is_reply(&self) -> bool {
        self.data.parent_comment_id.is_some()
    }
}

#[derive(Clone)]
pub struct CommentSync {
    cache: QueryCache,
    api: Arc<dyn CommentApi>,
    retries: RetryStore<CommentMutation>,
    /// server id -> provisional id
    server_ids: Arc<RwLock<HashMap<String, String>>>,
    org: String,
    limits: CommentLimits,
    process: ProcessKind,
}

impl CommentSync {
    pub fn new(cache: QueryCache, api: Arc<dyn CommentApi>, org: impl Into<String>) -> Self {
        Self {
            cache,
            api,
            retries: RetryStore::new(),
            server_ids: Arc::new(RwLock::new(HashMap::new())),
            org: org.into(),
            limits: CommentLimits::default(),
            process: ProcessKind::Embedded,
        }
    }

    pub fn with_limits(mut self, limits: CommentLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_process(mut self, process: ProcessKind) -> Self {
        self.process = process;
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn retries(&self) -> &RetryStore<CommentMutation> {
        &self.retries
    }

    pub fn retry_status(&self, id: &CommentId) -> Option<RetryStatus> {
        self.retries.status(&id.to_string())
    }

    /// Provisional id a confirmed comment was created under.
    pub fn optimistic_id_for(&self, server_id: &str) -> Option<String> {
        self.server_ids.read().get(server_id).cloned()
    }

    /// Server id assigned to a provisional comment, once confirmed.
    pub fn server_id_for(&self, optimistic_id: &str) -> Option<String> {
        self.server_ids
            .read()
            .iter()
            .find(|(_, provisional)| provisional.as_str() == optimistic_id)
            .map(|(server, _)| server.clone())
    }

    /// Validates, caches the provisional comment and records a pending retry
    /// record. Nothing is sent.
    ///
    /// When the viewer is not cached yet there is no author to show, so the
    /// comment only appears once the server confirms it.
    pub fn begin(
        &self,
        subject: CommentSubject,
        data: CreateCommentData,
    ) -> SyncResult<CommentMutation> {
        validate_comment(&data, &self.limits)?;
        let mut mutation = CommentMutation {
            id: CommentId::provisional(),
            subject,
            data,
            inserted: false,
        };
        let optimistic_id = mutation.id.to_string();

        match self.cache.get(&CurrentUserQuery)? {
            Some(viewer) => {
                let comment = provisional_comment(&mutation, viewer);
                self.insert_comment(&mutation.subject, &comment)?;
                mutation.inserted = true;
            }
            None => debug!(
                optimistic_id = %optimistic_id,
                "viewer not cached, skipping optimistic insert"
            ),
        }
        self.retries
            .set(&optimistic_id, RetryStatus::Pending, mutation.clone());

        let body = redact_text(&mutation.data.body_html);
        emit_event(
            Level::INFO,
            self.process,
            ObservabilityEvent {
                optimistic_id: Some(optimistic_id.as_str()),
                correlation_id: Some(mutation.subject.id.as_str()),
                status: Some("pending"),
                detail: Some(body.as_str()),
                ..ObservabilityEvent::new(COMPONENT, "comment_optimistic_created")
            },
        );
        Ok(mutation)
    }

    /// Sends a mutation and reconciles or fails it depending on the answer.
    pub async fn send(&self, mutation: &CommentMutation) -> SyncResult<Comment> {
        let request = mutation.request();
        let result = match mutation.data.parent_comment_id.as_deref() {
            Some(parent_id) => self.api.create_reply(parent_id, &request).await,
            None => self.api.create_comment(&mutation.subject, &request).await,
        };
        match result {
            Ok(response) => self.complete(mutation, response),
            Err(err) => {
                self.fail(&mutation.id, &err);
                Err(err.into())
            }
        }
    }

    pub async fn create(
        &self,
        subject: CommentSubject,
        data: CreateCommentData,
    ) -> SyncResult<Comment> {
        let mutation = self.begin(subject, data)?;
        self.send(&mutation).await
    }

    /// Resends the stored payload under its original provisional id.
    pub async fn retry(&self, id: &CommentId) -> SyncResult<Comment> {
        let key = id.to_string();
        let Some(record) = self.retries.get(&key) else {
            return Err(SyncError::UnknownMutation(key));
        };
        self.retries.update(&key, RetryStatus::Pending);

        let attempts = (record.attempts + 1).to_string();
        emit_event(
            Level::INFO,
            self.process,
            ObservabilityEvent {
                optimistic_id: Some(key.as_str()),
                status: Some("pending"),
                detail: Some(attempts.as_str()),
                ..ObservabilityEvent::new(COMPONENT, "comment_retry")
            },
        );
        self.send(&record.payload).await
    }

    /// Marks the mutation failed. The provisional comment stays cached.
    pub fn fail(&self, id: &CommentId, error: &ApiError) {
        let key = id.to_string();
        if !self.retries.mark_error(&key, error.to_string()) {
            warn!(optimistic_id = %key, "failure reported for an untracked comment");
        }
        emit_event(
            Level::WARN,
            self.process,
            ObservabilityEvent {
                optimistic_id: Some(key.as_str()),
                status: Some("error"),
                error_code: Some(error.code()),
                ..ObservabilityEvent::new(COMPONENT, "comment_create_failed")
            },
        );
    }

    /// Applies a successful create response and returns the comment as it
    /// is now cached.
    pub fn complete(
        &self,
        mutation: &CommentMutation,
        response: CreateCommentResponse,
    ) -> SyncResult<Comment> {
        let optimistic_id = mutation.id.to_string();
        let tracked = self.retries.remove(&optimistic_id).is_some();
        let CreateCommentResponse {
            comment,
            preview_commenters,
            attachment,
            attachment_commenters,
        } = response;
        let server_id = comment.id.to_string();
        self.server_ids
            .write()
            .insert(server_id.clone(), optimistic_id.clone());

        self.refresh_subject(&mutation.subject, &preview_commenters.latest_commenters)?;
        if let (Some(attachment_id), Some(commenters)) =
            (comment.attachment_id.as_ref(), attachment_commenters.as_ref())
        {
            self.cache.set(
                &AttachmentCommentersQuery {
                    org: self.org.clone(),
                    attachment_id: attachment_id.clone(),
                },
                commenters,
            )?;
        }
        if let Some(attachment) = attachment.as_ref() {
            self.cache
                .set_normalized::<Attachment, _>(&attachment.id, |mut cached| {
                    cached.comments_count = attachment.comments_count;
                    cached
                })?;
        }

        let confirmed = self.reconcile(mutation, comment, tracked)?;
        emit_event(
            Level::INFO,
            self.process,
            ObservabilityEvent {
                optimistic_id: Some(optimistic_id.as_str()),
                server_id: Some(server_id.as_str()),
                correlation_id: Some(mutation.subject.id.as_str()),
                status: Some("confirmed"),
                ..ObservabilityEvent::new(COMPONENT, "comment_confirmed")
            },
        );
        Ok(confirmed)
    }

    fn reconcile(
        &self,
        mutation: &CommentMutation,
        server_comment: Comment,
        tracked: bool,
    ) -> SyncResult<Comment> {
        let optimistic_id = mutation.id.to_string();
        let server_id = server_comment.id.to_string();

        let mut confirmed = server_comment;
        confirmed.optimistic_id = Some(optimistic_id.clone());
        let provisional = self.cache.get_normalized::<Comment>(&optimistic_id)?;
        if let Some(provisional) = &provisional {
            confirmed.created_at = provisional.created_at;
        }
        keep_local_sources(&mut confirmed.attachments, &mutation.data.transformed_files);

        let already_cached = self.cache.get_normalized::<Comment>(&server_id)?.is_some();
        if already_cached {
            if provisional.is_some() {
                let removed = self.cache.remove_normalized::<Comment>(&optimistic_id);
                debug!(
                    optimistic_id = %optimistic_id,
                    server_id = %server_id,
                    removed = removed.len(),
                    "confirmed comment already cached, dropping provisional copy"
                );
            }
            return Ok(confirmed);
        }

        let replaced = self.cache.replace_normalized(&optimistic_id, &confirmed)?;
        if replaced == 0 && tracked {
            self.place_comment(&mutation.subject, &confirmed)?;
            if !mutation.inserted {
                self.count_new_comment(&mutation.subject, &confirmed)?;
            }
        }
        Ok(confirmed)
    }

    /// Deletes a comment, putting it back where it was when the server
    /// refuses. A provisional comment that never reached the server is
    /// dropped locally.
    pub async fn delete(&self, id: &str) -> SyncResult<()> {
        let target = self.confirmed_id(id);
        let cache_id = target.as_deref().unwrap_or(id);

        let existing = self.cache.get_normalized::<Comment>(cache_id)?;
        let removals = self.cache.remove_normalized::<Comment>(cache_id);
        if let Some(comment) = &existing {
            self.shift_counts(comment, -1)?;
        }

        let Some(server_id) = target else {
            self.retries.remove(id);
            debug!(optimistic_id = %id, "discarded unconfirmed comment");
            return Ok(());
        };

        match self.api.delete_comment(&server_id).await {
            Ok(()) => {
                emit_event(
                    Level::INFO,
                    self.process,
                    ObservabilityEvent {
                        server_id: Some(server_id.as_str()),
                        status: Some("deleted"),
                        ..ObservabilityEvent::new(COMPONENT, "comment_deleted")
                    },
                );
                Ok(())
            }
            Err(err) => {
                let restored = self.cache.restore_removals(&removals);
                if let Some(comment) = &existing {
                    self.shift_counts(comment, 1)?;
                }
                emit_event(
                    Level::WARN,
                    self.process,
                    ObservabilityEvent {
                        server_id: Some(server_id.as_str()),
                        status: Some("rolled_back"),
                        error_code: Some(err.code()),
                        ..ObservabilityEvent::new(COMPONENT, "comment_delete_failed")
                    },
                );
                debug!(server_id = %server_id, restored, "delete rolled back");
                Err(err.into())
            }
        }
    }

    pub async fn update_body(&self, id: &str, body_html: &str) -> SyncResult<Comment> {
        if is_empty_html(body_html) {
            return Err(ValidationError::Empty("body_html").into());
        }
        if body_html.chars().count() > self.limits.max_body_chars {
            return Err(ValidationError::TooLong {
                field: "body_html",
                max: self.limits.max_body_chars,
            }
            .into());
        }
        let id = self.require_confirmed(id)?;
        let previous = self.cache.get_normalized::<Comment>(&id)?;
        self.cache
            .patch_normalized(Comment::TYPE_NAME, &id, &json!({ "body_html": body_html }));

        let request = UpdateCommentRequest {
            body_html: body_html.to_string(),
        };
        match self.api.update_comment(&id, &request).await {
            Ok(server) => {
                self.cache.patch_normalized(
                    Comment::TYPE_NAME,
                    &id,
                    &json!({ "body_html": server.body_html }),
                );
                Ok(server)
            }
            Err(err) => {
                if let Some(previous) = previous {
                    self.cache.patch_normalized(
                        Comment::TYPE_NAME,
                        &id,
                        &json!({ "body_html": previous.body_html }),
                    );
                }
                warn!(server_id = %id, error = %err, "comment edit rolled back");
                Err(err.into())
            }
        }
    }

    pub async fn resolve(&self, id: &str) -> SyncResult<Comment> {
        self.set_resolution(id, true).await
    }

    pub async fn unresolve(&self, id: &str) -> SyncResult<Comment> {
        self.set_resolution(id, false).await
    }

    async fn set_resolution(&self, id: &str, resolved: bool) -> SyncResult<Comment> {
        let id = self.require_confirmed(id)?;
        let previous = self.cache.get_normalized::<Comment>(&id)?;
        let optimistic = if resolved {
            let resolver = self.cache.get(&CurrentUserQuery)?.map(|user| OrganizationMember {
                user,
                ..OrganizationMember::default()
            });
            json!({ "resolved_at": Utc::now(), "resolved_by": resolver })
        } else {
            json!({ "resolved_at": null, "resolved_by": null })
        };
        self.cache
            .patch_normalized(Comment::TYPE_NAME, &id, &optimistic);

        let result = if resolved {
            self.api.resolve_comment(&id).await
        } else {
            self.api.unresolve_comment(&id).await
        };
        match result {
            Ok(server) => {
                self.cache.patch_normalized(
                    Comment::TYPE_NAME,
                    &id,
                    &json!({
                        "resolved_at": server.resolved_at,
                        "resolved_by": server.resolved_by,
                    }),
                );
                Ok(server)
            }
            Err(err) => {
                if let Some(previous) = previous {
                    self.cache.patch_normalized(
                        Comment::TYPE_NAME,
                        &id,
                        &json!({
                            "resolved_at": previous.resolved_at,
                            "resolved_by": previous.resolved_by,
                        }),
                    );
                }
                warn!(server_id = %id, resolved, error = %err, "resolution rolled back");
                Err(err.into())
            }
        }
    }

    /// Server id for `id`, or `None` for a provisional id with no
    /// confirmation yet.
    fn confirmed_id(&self, id: &str) -> Option<String> {
        match id.parse::<CommentId>() {
            Ok(CommentId::Provisional(_)) => self.server_id_for(id),
            _ => Some(id.to_string()),
        }
    }

    fn require_confirmed(&self, id: &str) -> SyncResult<String> {
        self.confirmed_id(id)
            .ok_or_else(|| SyncError::Unconfirmed(id.to_string()))
    }

    fn insert_comment(&self, subject: &CommentSubject, comment: &Comment) -> SyncResult<()> {
        self.place_comment(subject, comment)?;
        self.count_new_comment(subject, comment)
    }

    fn place_comment(&self, subject: &CommentSubject, comment: &Comment) -> SyncResult<()> {
        match comment.parent_id.as_deref() {
            Some(parent_id) => {
                let touched = self
                    .cache
                    .set_normalized::<Comment, _>(parent_id, |mut parent| {
                        parent.replies.push(comment.clone());
                        parent
                    })?;
                if touched == 0 {
                    debug!(parent_id, "parent comment not cached, reply not inserted");
                }
            }
            None => {
                self.cache
                    .update(&SubjectCommentsQuery::new(&self.org, subject.clone()), |old| {
                        Some(prepend_comment(old, comment))
                    })?;
                if let Some(attachment_id) = &comment.attachment_id {
                    let query = AttachmentCommentsQuery {
                        org: self.org.clone(),
                        subject: subject.clone(),
                        attachment_id: attachment_id.clone(),
                    };
                    self.cache
                        .update(&query, |old| Some(prepend_comment(old, comment)))?;
                }
                if subject.kind == SubjectType::Post {
                    let query = CanvasCommentsQuery {
                        org: self.org.clone(),
                        post_id: subject.id.clone(),
                    };
                    self.cache.update(&query, |old| match old {
                        None => Some(vec![comment.clone()]),
                        Some(mut list) => {
                            list.push(comment.clone());
                            Some(list)
                        }
                    })?;
                }
            }
        }
        Ok(())
    }

    fn count_new_comment(&self, subject: &CommentSubject, comment: &Comment) -> SyncResult<()> {
        if let Some(attachment_id) = comment.attachment_id.as_deref() {
            self.cache
                .set_normalized::<Attachment, _>(attachment_id, |mut attachment| {
                    attachment.comments_count += 1;
                    attachment
                })?;
        }

        let member = &comment.member;
        match subject.kind {
            SubjectType::Post => {
                let preview = format!(
                    "{}: {}",
                    member.user.display_name,
                    strip_html(&comment.body_html)
                );
                self.cache.set_normalized::<Post, _>(&subject.id, |mut post| {
                    post.preview_commenters.latest_commenters =
                        merge_commenters(member, &post.preview_commenters.latest_commenters);
                    post.comments_count += 1;
                    post.viewer_is_commenter = true;
                    post.comments_are_blurred = false;
                    post.viewer_has_commented = true;
                    post.viewer_has_subscribed = true;
                    if post.viewer_feedback_status == FeedbackStatus::ViewerRequested {
                        post.viewer_feedback_status = FeedbackStatus::None;
                    }
                    if let Some(requests) = post.feedback_requests.as_mut() {
                        for request in requests
                            .iter_mut()
                            .filter(|request| request.member.user.id == member.user.id)
                        {
                            request.has_replied = true;
                        }
                    }
                    post.latest_comment_preview = Some(preview);
                    post
                })?;
            }
            SubjectType::Note => {
                self.cache.set_normalized::<Note, _>(&subject.id, |mut note| {
                    note.comments_count += 1;
                    note.latest_commenters = merge_commenters(member, &note.latest_commenters);
                    note
                })?;
            }
        }
        Ok(())
    }

    /// Adds `delta` to the counters a comment contributes to.
    fn shift_counts(&self, comment: &Comment, delta: i32) -> SyncResult<()> {
        if let Some(attachment_id) = comment.attachment_id.as_deref() {
            self.cache
                .set_normalized::<Attachment, _>(attachment_id, |mut attachment| {
                    attachment.comments_count =
                        attachment.comments_count.saturating_add_signed(delta);
                    attachment
                })?;
        }
        match comment.subject_type {
            SubjectType::Post => {
                self.cache
                    .set_normalized::<Post, _>(&comment.subject_id, |mut post| {
                        post.comments_count = post.comments_count.saturating_add_signed(delta);
                        post
                    })?;
            }
            SubjectType::Note => {
                self.cache
                    .set_normalized::<Note, _>(&comment.subject_id, |mut note| {
                        note.comments_count = note.comments_count.saturating_add_signed(delta);
                        note
                    })?;
            }
        }
        Ok(())
    }

    /// Applies the server's commenter list and moves the post to the top of
    /// its project feed.
    fn refresh_subject(
        &self,
        subject: &CommentSubject,
        commenters: &[OrganizationMember],
    ) -> SyncResult<()> {
        match subject.kind {
            SubjectType::Post => {
                self.cache.set_normalized::<Post, _>(&subject.id, |mut post| {
                    post.latest_commenters = commenters.to_vec();
                    post
                })?;
                if let Some(post) = self.cache.get_normalized::<Post>(&subject.id)? {
                    self.bump_post(&post)?;
                }
            }
            SubjectType::Note => {
                self.cache.set_normalized::<Note, _>(&subject.id, |mut note| {
                    note.latest_commenters = commenters.to_vec();
                    note.last_activity_at = Some(Utc::now());
                    note
                })?;
            }
        }
        Ok(())
    }

    fn bump_post(&self, post: &Post) -> SyncResult<()> {
        let Some(project) = post.project.as_ref() else {
            return Ok(());
        };
        let query = ProjectPostsQuery {
            org: self.org.clone(),
            project_id: project.id.clone(),
        };
        self.cache.update(&query, |old| {
            let mut posts = old?;
            posts.retain(|candidate| candidate.id != post.id);
            posts.prepend(post.clone());
            Some(posts)
        })?;
        Ok(())
    }
}

impl std::fmt::Debug for CommentSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommentSync")
            .field("org", &self.org)
            .field("pending", &self.retries.len())
            .finish_non_exhaustive()
    }
}

fn prepend_comment(old: Option<InfiniteData<Comment>>, comment: &Comment) -> InfiniteData<Comment> {
    match old {
        None => InfiniteData::single(comment.clone()),
        Some(mut pages) => {
            pages.prepend(comment.clone());
            pages
        }
    }
}

fn provisional_comment(mutation: &CommentMutation, viewer: User) -> Comment {
    let now = Utc::now();
    let data = &mutation.data;
    let optimistic_id = mutation.id.to_string();
    let body_html = if data.body_html.trim().is_empty() {
        EMPTY_HTML.to_string()
    } else {
        data.body_html.clone()
    };
    let attachments = data
        .transformed_files
        .iter()
        .map(|file| provisional_attachment(file, &optimistic_id))
        .collect();

    Comment {
        id: mutation.id.clone(),
        type_name: Comment::TYPE_NAME.to_string(),
        body_html,
        created_at: now,
        url: String::new(),
        member: OrganizationMember {
            id: temp_id(&Uuid::new_v4().to_string()),
            role: "member".to_string(),
            created_at: Some(now),
            deactivated: false,
            is_organization_member: true,
            user: viewer,
        },
        subject_type: mutation.subject.kind,
        subject_id: mutation.subject.id.clone(),
        parent_id: data.parent_comment_id.clone(),
        attachment_id: data.attachment_id.clone(),
        attachments,
        grouped_reactions: Vec::new(),
        replies: Vec::new(),
        timestamp: data.timestamp,
        x: data.x,
        y: data.y,
        note_highlight: data.note_highlight.clone(),
        resolved_at: None,
        resolved_by: None,
        viewer_is_author: true,
        viewer_can_resolve: data.parent_comment_id.is_none(),
        viewer_can_edit: true,
        viewer_can_delete: true,
        viewer_can_react: true,
        optimistic_id: Some(optimistic_id),
    }
}

fn provisional_attachment(file: &TransformedFile, optimistic_id: &str) -> Attachment {
    Attachment {
        id: file.id.clone(),
        file_type: file.file_type.clone(),
        url: file.url.clone(),
        relative_url: file.key.clone().unwrap_or_default(),
        optimistic_src: file.optimistic_src.clone(),
        width: file.width.unwrap_or(0),
        height: file.height.unwrap_or(0),
        duration: file.duration.unwrap_or(0.0),
        subject_type: Some("Comment".to_string()),
        subject_id: Some(optimistic_id.to_string()),
        ..Attachment::default()
    }
}

/// Points confirmed attachments at the local blob the composer uploaded,
/// matched by upload key, so the image is not fetched again.
fn keep_local_sources(attachments: &mut [Attachment], files: &[TransformedFile]) {
    for attachment in attachments.iter_mut() {
        let local = files.iter().find(|file| {
            file.key
                .as_deref()
                .is_some_and(|key| !key.is_empty() && attachment.url.contains(key))
        });
        if let Some(file) = local {
            attachment.optimistic_src = file.optimistic_src.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mutation(data: CreateCommentData) -> CommentMutation {
        CommentMutation {
            id: CommentId::provisional(),
            subject: CommentSubject::post("p1"),
            data,
            inserted: false,
        }
    }

    #[test]
    fn provisional_comment_carries_viewer_and_files() {
        let m = mutation(CreateCommentData {
            body_html: "<p>hi</p>".to_string(),
            transformed_files: vec![TransformedFile {
                id: "f1".to_string(),
                key: Some("uploads/f1.png".to_string()),
                file_type: "image/png".to_string(),
                optimistic_src: Some("blob:local/1".to_string()),
                ..TransformedFile::default()
            }],
            ..CreateCommentData::default()
        });
        let viewer = User {
            id: "u1".to_string(),
            display_name: "Ada".to_string(),
            ..User::default()
        };
        let comment = provisional_comment(&m, viewer);

        assert!(comment.is_optimistic());
        assert_eq!(comment.optimistic_id, Some(m.id.to_string()));
        assert_eq!(comment.member.user.id, "u1");
        assert!(comment.member.id.starts_with("temp-"));
        assert!(comment.viewer_can_resolve);
        assert_eq!(comment.attachments[0].relative_url, "uploads/f1.png");
        assert_eq!(
            comment.attachments[0].subject_id.as_deref(),
            Some(m.id.to_string().as_str())
        );
    }

    #[test]
    fn replies_cannot_be_resolved_and_blank_bodies_become_empty_html() {
        let m = mutation(CreateCommentData {
            body_html: "  ".to_string(),
            parent_comment_id: Some("c_1".to_string()),
            ..CreateCommentData::default()
        });
        let comment = provisional_comment(&m, User::default());
        assert!(!comment.viewer_can_resolve);
        assert_eq!(comment.body_html, EMPTY_HTML);
        assert_eq!(comment.parent_id.as_deref(), Some("c_1"));
        assert!(m.is_reply());
    }

    #[test]
    fn local_sources_match_by_upload_key() {
        let mut attachments = vec![
            Attachment {
                url: "https://cdn.example/uploads/f1.png?w=800".to_string(),
                ..Attachment::default()
            },
            Attachment {
                url: "https://cdn.example/uploads/other.png".to_string(),
                ..Attachment::default()
            },
        ];
        let files = vec![
            TransformedFile {
                key: Some("uploads/f1.png".to_string()),
                optimistic_src: Some("blob:1".to_string()),
                ..TransformedFile::default()
            },
            TransformedFile {
                key: Some(String::new()),
                optimistic_src: Some("blob:2".to_string()),
                ..TransformedFile::default()
            },
        ];
        keep_local_sources(&mut attachments, &files);
        assert_eq!(attachments[0].optimistic_src.as_deref(), Some("blob:1"));
        assert_eq!(attachments[1].optimistic_src, None);
    }

    #[test]
    fn request_reuses_the_provisional_id() {
        let m = mutation(CreateCommentData {
            body_html: "<p>hi</p>".to_string(),
            ..CreateCommentData::default()
        });
        assert_eq!(m.request().client_request_id, m.id.to_string());
        assert_eq!(m.request(), m.request());
    }
}
