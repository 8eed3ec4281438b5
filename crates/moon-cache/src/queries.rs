//! Typed descriptors for the queries the sync layer reads and writes.
//!
//! Each descriptor names its key and the shape of the cached data, so callers
//! never handle raw JSON.

use serde::de::DeserializeOwned;
use serde::Serialize;

use moon_types::{
    Comment, CommentSubject, Favorite, InfiniteData, Note, OrganizationMember, Post, Project,
    ProjectMembership, SubjectType, TaskInfo, TimelineEvent, User,
};

use crate::key::QueryKey;

pub trait Query {
    type Data: Serialize + DeserializeOwned;

    fn key(&self) -> QueryKey;
}

fn org_key(org: &str) -> QueryKey {
    QueryKey::new(["organizations", org])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentUserQuery;

impl Query for CurrentUserQuery {
    type Data = User;

    fn key(&self) -> QueryKey {
        QueryKey::new(["users", "me"])
    }
}

/// Top-level comments of a post or note.
#[derive(Debug, Clone)]
pub struct SubjectCommentsQuery {
    pub org: String,
    pub subject: CommentSubject,
}

impl SubjectCommentsQuery {
    pub fn new(org: impl Into<String>, subject: CommentSubject) -> Self {
        Self {
            org: org.into(),
            subject,
        }
    }
}

impl Query for SubjectCommentsQuery {
    type Data = InfiniteData<Comment>;

    fn key(&self) -> QueryKey {
        subject_key(&self.org, &self.subject).child("comments")
    }
}

/// Comments pinned to one attachment of a post or note.
#[derive(Debug, Clone)]
pub struct AttachmentCommentsQuery {
    pub org: String,
    pub subject: CommentSubject,
    pub attachment_id: String,
}

impl Query for AttachmentCommentsQuery {
    type Data = InfiniteData<Comment>;

    fn key(&self) -> QueryKey {
        subject_key(&self.org, &self.subject)
            .child("attachments")
            .child(self.attachment_id.as_str())
            .child("comments")
    }
}

/// Canvas comments are a flat list ordered oldest first.
#[derive(Debug, Clone)]
pub struct CanvasCommentsQuery {
    pub org: String,
    pub post_id: String,
}

impl Query for CanvasCommentsQuery {
    type Data = Vec<Comment>;

    fn key(&self) -> QueryKey {
        subject_key(&self.org, &CommentSubject::post(self.post_id.as_str())).child("canvas_comments")
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentCommentersQuery {
    pub org: String,
    pub attachment_id: String,
}

impl Query for AttachmentCommentersQuery {
    type Data = Vec<OrganizationMember>;

    fn key(&self) -> QueryKey {
        org_key(&self.org)
            .child("attachments")
            .child(self.attachment_id.as_str())
            .child("commenters")
    }
}

#[derive(Debug, Clone)]
pub struct PostQuery {
    pub org: String,
    pub post_id: String,
}

impl Query for PostQuery {
    type Data = Post;

    fn key(&self) -> QueryKey {
        subject_key(&self.org, &CommentSubject::post(self.post_id.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct NoteQuery {
    pub org: String,
    pub note_id: String,
}

impl Query for NoteQuery {
    type Data = Note;

    fn key(&self) -> QueryKey {
        subject_key(&self.org, &CommentSubject::note(self.note_id.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct ProjectQuery {
    pub org: String,
    pub project_id: String,
}

impl Query for ProjectQuery {
    type Data = Project;

    fn key(&self) -> QueryKey {
        org_key(&self.org)
            .child("projects")
            .child(self.project_id.as_str())
    }
}

/// A project's posts ordered by last activity, newest first.
#[derive(Debug, Clone)]
pub struct ProjectPostsQuery {
    pub org: String,
    pub project_id: String,
}

impl Query for ProjectPostsQuery {
    type Data = InfiniteData<Post>;

    fn key(&self) -> QueryKey {
        org_key(&self.org)
            .child("projects")
            .child(self.project_id.as_str())
            .child("posts")
    }
}

#[derive(Debug, Clone)]
pub struct ProjectMembershipsQuery {
    pub org: String,
    pub project_id: String,
}

impl Query for ProjectMembershipsQuery {
    type Data = Vec<ProjectMembership>;

    fn key(&self) -> QueryKey {
        org_key(&self.org)
            .child("projects")
            .child(self.project_id.as_str())
            .child("memberships")
    }
}

#[derive(Debug, Clone)]
pub struct FavoritesQuery {
    pub org: String,
}

impl Query for FavoritesQuery {
    type Data = Vec<Favorite>;

    fn key(&self) -> QueryKey {
        org_key(&self.org).child("favorites")
    }
}

#[derive(Debug, Clone)]
pub struct PostTimelineEventsQuery {
    pub org: String,
    pub post_id: String,
}

impl Query for PostTimelineEventsQuery {
    type Data = InfiniteData<TimelineEvent>;

    fn key(&self) -> QueryKey {
        subject_key(&self.org, &CommentSubject::post(self.post_id.as_str())).child("timeline_events")
    }
}

#[derive(Debug, Clone)]
pub struct ClTasksQuery {
    pub cl: String,
}

impl Query for ClTasksQuery {
    type Data = Vec<TaskInfo>;

    fn key(&self) -> QueryKey {
        QueryKey::new(["cl", self.cl.as_str(), "tasks"])
    }
}

fn subject_key(org: &str, subject: &CommentSubject) -> QueryKey {
    let collection = match subject.kind {
        SubjectType::Post => "posts",
        SubjectType::Note => "notes",
    };
    org_key(org).child(collection).child(subject.id.as_str())
}
