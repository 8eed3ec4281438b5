use serde::{Deserialize, Serialize};

use crate::comment::OrganizationMember;
use crate::subject::ProjectRef;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMembership {
    pub id: String,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub project: ProjectRef,
    #[serde(default)]
    pub member: OrganizationMember,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProjectMembershipRequest {
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub project_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteMembersRequest {
    pub invitations: Vec<Invitation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentInvitation {
    pub id: String,
    pub email: String,
    pub role: String,
    #[serde(default)]
    pub expired: bool,
}
