use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::comment::OrganizationMember;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineAction {
    SubjectTitleUpdated,
    PostResolved,
    PostUnresolved,
    SubjectPinned,
    SubjectUnpinned,
    #[serde(other)]
    Other,
}

impl TimelineAction {
    /// The action an optimistic event rolls up against, if any.
    pub fn rollup_partner(self) -> Option<TimelineAction> {
        match self {
            TimelineAction::SubjectTitleUpdated => Some(TimelineAction::SubjectTitleUpdated),
            TimelineAction::PostResolved => Some(TimelineAction::PostUnresolved),
            TimelineAction::PostUnresolved => Some(TimelineAction::PostResolved),
            TimelineAction::SubjectPinned => Some(TimelineAction::SubjectUnpinned),
            TimelineAction::SubjectUnpinned => Some(TimelineAction::SubjectPinned),
            TimelineAction::Other => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: String,
    pub action: TimelineAction,
    #[serde(default)]
    pub member_actor: Option<OrganizationMember>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub subject_updated_from_title: Option<String>,
    #[serde(default)]
    pub subject_updated_to_title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_pair_with_their_opposite() {
        assert_eq!(
            TimelineAction::PostResolved.rollup_partner(),
            Some(TimelineAction::PostUnresolved)
        );
        assert_eq!(
            TimelineAction::SubjectUnpinned.rollup_partner(),
            Some(TimelineAction::SubjectPinned)
        );
        assert_eq!(TimelineAction::Other.rollup_partner(), None);
    }

    #[test]
    fn unknown_actions_deserialize_as_other() {
        let action: TimelineAction = serde_json::from_str("\"post_shared\"").unwrap();
        assert_eq!(action, TimelineAction::Other);
    }
}
