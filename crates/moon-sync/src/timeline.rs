//! Optimistic rows in a post's activity timeline.
//!
//! Repeated changes by the same member within [`ROLLUP_WINDOW_SECS`] collapse
//! into one row: consecutive title edits merge, and a toggle followed by its
//! opposite (resolve then reopen, pin then unpin) cancels out.

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use moon_cache::{PostTimelineEventsQuery, QueryCache};
use moon_types::{temp_id, InfiniteData, OrganizationMember, TimelineAction, TimelineEvent};

use crate::error::SyncResult;

pub const ROLLUP_WINDOW_SECS: i64 = 60;

fn rollup_window() -> TimeDelta {
    TimeDelta::seconds(ROLLUP_WINDOW_SECS)
}

/// A change the viewer just made to a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineChange {
    TitleUpdated {
        from: Option<String>,
        to: Option<String>,
    },
    Resolved,
    Unresolved,
    Pinned,
    Unpinned,
}

impl TimelineChange {
    pub fn action(&self) -> TimelineAction {
        match self {
            TimelineChange::TitleUpdated { .. } => TimelineAction::SubjectTitleUpdated,
            TimelineChange::Resolved => TimelineAction::PostResolved,
            TimelineChange::Unresolved => TimelineAction::PostUnresolved,
            TimelineChange::Pinned => TimelineAction::SubjectPinned,
            TimelineChange::Unpinned => TimelineAction::SubjectUnpinned,
        }
    }
}

/// Builds the placeholder row, id `temp-<uuid>`.
pub fn optimistic_event(
    change: &TimelineChange,
    member: OrganizationMember,
    now: DateTime<Utc>,
) -> TimelineEvent {
    let (from, to) = match change {
        TimelineChange::TitleUpdated { from, to } => (from.clone(), to.clone()),
        _ => (None, None),
    };
    TimelineEvent {
        id: temp_id(&Uuid::new_v4().to_string()),
        action: change.action(),
        member_actor: Some(member),
        created_at: now,
        subject_updated_from_title: from,
        subject_updated_to_title: to,
    }
}

pub fn is_within_rollup_window(at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - at < rollup_window()
}

/// Adds `event` to the timeline pages, folding it into a recent matching
/// row when there is one.
pub fn roll_up(pages: &mut InfiniteData<TimelineEvent>, event: TimelineEvent) {
    let Some(partner) = event.action.rollup_partner() else {
        pages.append(event);
        return;
    };
    let actor = event.member_actor.as_ref().map(|member| member.id.as_str());
    let matched = pages
        .iter()
        .filter(|candidate| is_within_rollup_window(candidate.created_at, event.created_at))
        .filter(|candidate| candidate.member_actor.as_ref().map(|m| m.id.as_str()) == actor)
        .filter(|candidate| candidate.action == partner)
        .max_by_key(|candidate| candidate.created_at)
        .cloned();

    let Some(matched) = matched else {
        pages.append(event);
        return;
    };

    pages.retain(|candidate| candidate.id != matched.id);
    if event.action == TimelineAction::SubjectTitleUpdated {
        pages.append(TimelineEvent {
            subject_updated_from_title: matched.subject_updated_from_title,
            created_at: matched.created_at,
            ..event
        });
    }
}

/// Inserts an optimistic row into a cached post timeline. Timelines that
/// were never loaded are left alone. Returns whether the cache changed.
pub fn insert_post_timeline_event(
    cache: &QueryCache,
    org: &str,
    post_id: &str,
    event: TimelineEvent,
) -> SyncResult<bool> {
    let query = PostTimelineEventsQuery {
        org: org.to_string(),
        post_id: post_id.to_string(),
    };
    let written = cache.update(&query, |old| {
        let mut pages = old?;
        roll_up(&mut pages, event);
        Some(pages)
    })?;
    Ok(written)
}
