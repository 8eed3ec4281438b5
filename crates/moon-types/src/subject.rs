use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::comment::{OrganizationMember, PreviewCommenters};
use crate::Normalized;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    #[default]
    None,
    ViewerRequested,
    Open,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackRequest {
    pub id: String,
    pub member: OrganizationMember,
    pub has_replied: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationRef {
    pub id: String,
    pub slug: String,
}

/// Post fields the comment pipeline keeps in sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Post {
    pub id: String,
    pub type_name: String,
    pub title: String,
    pub comments_count: u32,
    pub viewer_is_commenter: bool,
    pub viewer_has_commented: bool,
    pub viewer_has_subscribed: bool,
    pub viewer_has_favorited: bool,
    pub comments_are_blurred: bool,
    pub viewer_feedback_status: FeedbackStatus,
    pub feedback_requests: Option<Vec<FeedbackRequest>>,
    pub preview_commenters: PreviewCommenters,
    pub latest_commenters: Vec<OrganizationMember>,
    pub latest_comment_preview: Option<String>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub project: Option<ProjectRef>,
    pub organization: Option<OrganizationRef>,
}

impl Default for Post {
    fn default() -> Self {
        Self {
            id: String::new(),
            type_name: Post::TYPE_NAME.to_string(),
            title: String::new(),
            comments_count: 0,
            viewer_is_commenter: false,
            viewer_has_commented: false,
            viewer_has_subscribed: false,
            viewer_has_favorited: false,
            comments_are_blurred: false,
            viewer_feedback_status: FeedbackStatus::None,
            feedback_requests: None,
            preview_commenters: PreviewCommenters::default(),
            latest_commenters: Vec::new(),
            latest_comment_preview: None,
            last_activity_at: None,
            resolved_at: None,
            project: None,
            organization: None,
        }
    }
}

impl Normalized for Post {
    const TYPE_NAME: &'static str = "post";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Note {
    pub id: String,
    pub type_name: String,
    pub title: String,
    pub comments_count: u32,
    pub viewer_has_favorited: bool,
    pub latest_commenters: Vec<OrganizationMember>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub project: Option<ProjectRef>,
}

impl Default for Note {
    fn default() -> Self {
        Self {
            id: String::new(),
            type_name: Note::TYPE_NAME.to_string(),
            title: String::new(),
            comments_count: 0,
            viewer_has_favorited: false,
            latest_commenters: Vec::new(),
            last_activity_at: None,
            project: None,
        }
    }
}

impl Normalized for Note {
    const TYPE_NAME: &'static str = "note";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    pub id: String,
    pub type_name: String,
    pub name: String,
    pub description: Option<String>,
    pub private: bool,
    pub archived: bool,
    pub members_count: u32,
    pub viewer_is_member: bool,
    pub viewer_has_favorited: bool,
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            id: String::new(),
            type_name: Project::TYPE_NAME.to_string(),
            name: String::new(),
            description: None,
            private: false,
            archived: false,
            members_count: 0,
            viewer_is_member: false,
            viewer_has_favorited: false,
            last_activity_at: None,
        }
    }
}

impl Normalized for Project {
    const TYPE_NAME: &'static str = "project";
}

/// Chat thread; only the favorite flag is tracked here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageThread {
    pub id: String,
    pub type_name: String,
    pub title: String,
    pub viewer_has_favorited: bool,
}

impl Default for MessageThread {
    fn default() -> Self {
        Self {
            id: String::new(),
            type_name: MessageThread::TYPE_NAME.to_string(),
            title: String::new(),
            viewer_has_favorited: false,
        }
    }
}

impl Normalized for MessageThread {
    const TYPE_NAME: &'static str = "thread";
}
