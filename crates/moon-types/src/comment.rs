use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::CommentId;
use crate::Normalized;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    Post,
    Note,
}

impl SubjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubjectType::Post => "post",
            SubjectType::Note => "note",
        }
    }
}

impl std::fmt::Display for SubjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The post or note a comment thread hangs off.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentSubject {
    pub kind: SubjectType,
    pub id: String,
}

impl CommentSubject {
    pub fn post(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectType::Post,
            id: id.into(),
        }
    }

    pub fn note(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectType::Note,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationMember {
    pub id: String,
    pub role: String,
    pub created_at: Option<DateTime<Utc>>,
    pub deactivated: bool,
    pub is_organization_member: bool,
    pub user: User,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupedReaction {
    pub emoji: Option<String>,
    pub reactions_count: u32,
    pub viewer_reaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub id: String,
    pub type_name: String,
    pub file_type: String,
    pub url: String,
    pub relative_url: String,
    pub preview_url: Option<String>,
    /// Local blob URL kept so an uploaded image is not refetched.
    pub optimistic_src: Option<String>,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub name: Option<String>,
    pub size: Option<u64>,
    pub comments_count: u32,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
}

impl Default for Attachment {
    fn default() -> Self {
        Self {
            id: String::new(),
            type_name: Attachment::TYPE_NAME.to_string(),
            file_type: String::new(),
            url: String::new(),
            relative_url: String::new(),
            preview_url: None,
            optimistic_src: None,
            width: 0,
            height: 0,
            duration: 0.0,
            name: None,
            size: None,
            comments_count: 0,
            subject_type: None,
            subject_id: None,
        }
    }
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.file_type.starts_with("image/")
    }

    pub fn is_gif(&self) -> bool {
        self.file_type == "image/gif"
    }

    pub fn is_video(&self) -> bool {
        self.file_type.starts_with("video/")
    }

    pub fn is_audio(&self) -> bool {
        self.file_type.starts_with("audio/")
    }
}

impl Normalized for Attachment {
    const TYPE_NAME: &'static str = "attachment";
}

/// A file the composer has already uploaded (or is uploading) locally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformedFile {
    pub id: String,
    pub key: Option<String>,
    pub url: String,
    pub file_type: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub optimistic_src: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    #[serde(default = "comment_type_name")]
    pub type_name: String,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub url: String,
    pub member: OrganizationMember,
    pub subject_type: SubjectType,
    pub subject_id: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub grouped_reactions: Vec<GroupedReaction>,
    #[serde(default)]
    pub replies: Vec<Comment>,
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub note_highlight: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<OrganizationMember>,
    #[serde(default)]
    pub viewer_is_author: bool,
    #[serde(default)]
    pub viewer_can_resolve: bool,
    #[serde(default)]
    pub viewer_can_edit: bool,
    #[serde(default)]
    pub viewer_can_delete: bool,
    #[serde(default)]
    pub viewer_can_react: bool,
    /// Provisional id this comment was created under, kept after confirmation.
    #[serde(default)]
    pub optimistic_id: Option<String>,
}

fn comment_type_name() -> String {
    Comment::TYPE_NAME.to_string()
}

impl Comment {
    pub fn is_optimistic(&self) -> bool {
        self.id.is_provisional()
    }

    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }
}

impl Normalized for Comment {
    const TYPE_NAME: &'static str = "comment";
}

/// Input collected by the comment composer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateCommentData {
    pub body_html: String,
    /// Attachment the comment is pinned to (`file_id` on the wire).
    pub attachment_id: Option<String>,
    pub parent_comment_id: Option<String>,
    pub timestamp: Option<f64>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub note_highlight: Option<String>,
    pub transformed_files: Vec<TransformedFile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentUpload {
    pub file_path: String,
    pub file_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Body of the create-comment and reply endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCommentRequest {
    pub body_html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_highlight: Option<String>,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
    /// Provisional id, resent unchanged on retry.
    pub client_request_id: String,
}

impl CreateCommentRequest {
    pub fn from_data(data: &CreateCommentData, client_request_id: &CommentId) -> Self {
        Self {
            body_html: data.body_html.clone(),
            file_id: data.attachment_id.clone(),
            timestamp: data.timestamp,
            x: data.x,
            y: data.y,
            note_highlight: data.note_highlight.clone(),
            attachments: data
                .transformed_files
                .iter()
                .map(|file| AttachmentUpload {
                    file_path: file.key.clone().unwrap_or_default(),
                    file_type: file.file_type.clone(),
                    width: file.width,
                    height: file.height,
                    duration: file.duration,
                })
                .collect(),
            client_request_id: client_request_id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewCommenters {
    pub latest_commenters: Vec<OrganizationMember>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCommentResponse {
    #[serde(alias = "post_comment")]
    pub comment: Comment,
    #[serde(default)]
    pub preview_commenters: PreviewCommenters,
    #[serde(default)]
    pub attachment: Option<Attachment>,
    #[serde(default)]
    pub attachment_commenters: Option<Vec<OrganizationMember>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateCommentRequest {
    pub body_html: String,
}

/// Prepend `member` to `members`, keeping only the first entry per user.
pub fn merge_commenters(
    member: &OrganizationMember,
    members: &[OrganizationMember],
) -> Vec<OrganizationMember> {
    let mut merged: Vec<OrganizationMember> = Vec::with_capacity(members.len() + 1);
    for candidate in std::iter::once(member).chain(members.iter()) {
        if merged.iter().any(|m| m.user.id == candidate.user.id) {
            continue;
        }
        merged.push(candidate.clone());
    }
    merged
}
