use chrono::{TimeZone, Utc};
use serde_json::json;

use moon_cache::{
    CacheError, CacheEventKind, CanvasCommentsQuery, PostQuery, ProjectPostsQuery, Query,
    QueryCache, QueryKey, SubjectCommentsQuery,
};
use moon_types::{
    Comment, CommentId, CommentSubject, InfiniteData, OrganizationMember, Page, Post, SubjectType,
};

fn comment(id: &str, body: &str) -> Comment {
    Comment {
        id: CommentId::confirmed(id),
        type_name: "comment".to_string(),
        body_html: body.to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        url: String::new(),
        member: OrganizationMember::default(),
        subject_type: SubjectType::Post,
        subject_id: "p1".to_string(),
        parent_id: None,
        attachment_id: None,
        attachments: Vec::new(),
        grouped_reactions: Vec::new(),
        replies: Vec::new(),
        timestamp: None,
        x: None,
        y: None,
        note_highlight: None,
        resolved_at: None,
        resolved_by: None,
        viewer_is_author: false,
        viewer_can_resolve: false,
        viewer_can_edit: false,
        viewer_can_delete: false,
        viewer_can_react: false,
        optimistic_id: None,
    }
}

fn post_comments() -> SubjectCommentsQuery {
    SubjectCommentsQuery::new("acme", CommentSubject::post("p1"))
}

fn canvas_comments() -> CanvasCommentsQuery {
    CanvasCommentsQuery {
        org: "acme".into(),
        post_id: "p1".into(),
    }
}

fn seed(cache: &QueryCache) {
    let mut parent = comment("c1", "<p>parent</p>");
    parent.replies.push(comment("c2", "<p>reply</p>"));
    cache
        .set(
            &post_comments(),
            &InfiniteData {
                pages: vec![Page::new(vec![parent, comment("c3", "<p>other</p>")])],
                page_params: Vec::new(),
            },
        )
        .unwrap();
    cache
        .set(&canvas_comments(), &vec![comment("c2", "<p>reply</p>")])
        .unwrap();
}

// ---------------------------------------------------------------------------
// Typed access
// ---------------------------------------------------------------------------

#[test]
fn update_creates_absent_entries_only_when_asked() {
    let cache = QueryCache::new();
    let query = canvas_comments();

    let written = cache.update(&query, |current| current).unwrap();
    assert!(!written);
    assert!(cache.get(&query).unwrap().is_none());

    let written = cache
        .update(&query, |current| {
            let mut list = current.unwrap_or_default();
            list.push(comment("c9", "<p>x</p>"));
            Some(list)
        })
        .unwrap();
    assert!(written);
    assert_eq!(cache.get(&query).unwrap().unwrap().len(), 1);
}

#[test]
fn decode_mismatch_is_reported_with_key() {
    let cache = QueryCache::new();
    let post = PostQuery {
        org: "acme".into(),
        post_id: "p1".into(),
    };
    cache
        .set(&RawQuery(post.key()), &json!("not a post"))
        .unwrap();

    let err = cache.get(&post).unwrap_err();
    match err {
        CacheError::Decode { key, .. } => assert_eq!(key, post.key()),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn update_matching_skips_entries_of_another_shape() {
    let cache = QueryCache::new();
    seed(&cache);
    cache
        .set(
            &PostQuery {
                org: "acme".into(),
                post_id: "p1".into(),
            },
            &Post {
                id: "p1".into(),
                comments_count: 3,
                ..Post::default()
            },
        )
        .unwrap();

    let prefix = QueryKey::new(["organizations", "acme", "posts", "p1"]);
    let written = cache
        .update_matching::<InfiniteData<Comment>, _>(&prefix, |_, mut data| {
            data.retain(|c| c.id != CommentId::confirmed("c3"));
            Some(data)
        })
        .unwrap();
    // Only the paginated list decodes; the post and canvas entries are skipped.
    assert_eq!(written, 1);
    assert_eq!(cache.get(&post_comments()).unwrap().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Normalized updates
// ---------------------------------------------------------------------------

#[test]
fn set_normalized_reaches_every_occurrence() {
    let cache = QueryCache::new();
    seed(&cache);

    let patched = cache
        .set_normalized::<Comment, _>("c2", |mut c| {
            c.body_html = "<p>edited</p>".to_string();
            c
        })
        .unwrap();
    assert_eq!(patched, 2);

    let list = cache.get(&post_comments()).unwrap().unwrap();
    let first = list.iter().next().unwrap();
    assert_eq!(first.replies[0].body_html, "<p>edited</p>");
    let canvas = cache.get(&canvas_comments()).unwrap().unwrap();
    assert_eq!(canvas[0].body_html, "<p>edited</p>");

    let found: Comment = cache.get_normalized("c2").unwrap().unwrap();
    assert_eq!(found.body_html, "<p>edited</p>");
}

#[test]
fn set_normalized_keeps_fields_other_occurrences_lack() {
    let cache = QueryCache::new();
    let key = QueryKey::new(["summaries"]);
    cache.set(&canvas_comments(), &vec![comment("c1", "<p>a</p>")]).unwrap();
    // A second response that only carries a summary of the same comment.
    cache
        .set(&RawQuery(key.clone()), &json!([{ "type_name": "comment", "id": "c1", "body_html": "<p>a</p>" }]))
        .unwrap();

    cache
        .set_normalized::<Comment, _>("c1", |mut c| {
            c.body_html = "<p>b</p>".to_string();
            c
        })
        .unwrap();

    let summary = cache.get_raw(&key).unwrap();
    assert_eq!(
        *summary,
        json!([{ "type_name": "comment", "id": "c1", "body_html": "<p>b</p>" }])
    );
}

#[test]
fn untouched_entries_keep_their_revision() {
    let cache = QueryCache::new();
    seed(&cache);
    let list_key = post_comments().key();
    let canvas_key = canvas_comments().key();
    let list_before = cache.entry_revision(&list_key).unwrap();
    let canvas_before = cache.entry_revision(&canvas_key).unwrap();

    cache
        .set_normalized::<Comment, _>("c3", |mut c| {
            c.body_html = "<p>changed</p>".to_string();
            c
        })
        .unwrap();

    assert!(cache.entry_revision(&list_key).unwrap() > list_before);
    assert_eq!(cache.entry_revision(&canvas_key).unwrap(), canvas_before);
}

#[test]
fn replace_normalized_swaps_identity() {
    let cache = QueryCache::new();
    seed(&cache);
    let confirmed = comment("c_123", "<p>hello</p>");
    let replaced = cache.replace_normalized("c2", &confirmed).unwrap();
    assert_eq!(replaced, 2);
    assert!(cache.get_normalized::<Comment>("c2").unwrap().is_none());
    let canvas = cache.get(&canvas_comments()).unwrap().unwrap();
    assert_eq!(canvas[0].id, CommentId::confirmed("c_123"));
}

#[test]
fn remove_and_restore_round_trip() {
    let cache = QueryCache::new();
    seed(&cache);
    let before_list = cache.get(&post_comments()).unwrap();
    let before_canvas = cache.get(&canvas_comments()).unwrap();

    let removals = cache.remove_normalized::<Comment>("c2");
    assert_eq!(removals.len(), 2);
    assert!(cache.get_normalized::<Comment>("c2").unwrap().is_none());

    let restored = cache.restore_removals(&removals);
    assert_eq!(restored, 2);
    assert_eq!(cache.get(&post_comments()).unwrap(), before_list);
    assert_eq!(cache.get(&canvas_comments()).unwrap(), before_canvas);
}

#[test]
fn restore_clamps_index_when_list_shrank() {
    let cache = QueryCache::new();
    seed(&cache);
    let removals = cache.remove_normalized::<Comment>("c3");
    cache
        .update(&post_comments(), |current| {
            let mut data = current?;
            data.retain(|_| false);
            Some(data)
        })
        .unwrap();
    assert_eq!(cache.restore_removals(&removals), 1);
    let list = cache.get(&post_comments()).unwrap().unwrap();
    assert_eq!(list.len(), 1);
}

// ---------------------------------------------------------------------------
// Bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribers_see_committed_writes() {
    let cache = QueryCache::new();
    let mut events = cache.subscribe();
    seed(&cache);

    let first = events.recv().await.unwrap();
    assert_eq!(first.kind, CacheEventKind::Updated);
    let second = events.recv().await.unwrap();
    assert!(second.revision > first.revision);

    let posts = ProjectPostsQuery {
        org: "acme".into(),
        project_id: "pr1".into(),
    };
    cache.set(&posts, &InfiniteData::single(Post::default())).unwrap();
    let _ = events.recv().await.unwrap();

    assert_eq!(cache.remove_matching(&QueryKey::new(["organizations", "acme"])), 3);
    let removed = events.recv().await.unwrap();
    assert_eq!(removed.kind, CacheEventKind::Removed);
    assert!(cache.keys().is_empty());
}

struct RawQuery(QueryKey);

impl Query for RawQuery {
    type Data = serde_json::Value;

    fn key(&self) -> QueryKey {
        self.0.clone()
    }
}
