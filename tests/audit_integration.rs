//! Integration tests for audit recording and querying through the blog entities.

use std::collections::HashSet;
use std::path::PathBuf;

use audit_trail::audit::{
    ActorContext, AuditAction, AuditError, AuditFilter, AuditHooks, AuditLog, EntityRegistry,
};
use audit_trail::blog::{
    register_loaders, Blog, BlogError, NewComment, NewPost, PostPatch, POST_TYPE_TAG,
};
use tempfile::TempDir;
use uuid::Uuid;

/// Makes every audit insert on the connection fail.
const BREAK_AUDIT_WRITES: &str = "
CREATE TEMP TRIGGER fail_audit_insert BEFORE INSERT ON audits
BEGIN
    SELECT RAISE(ABORT, 'audit store unavailable');
END;
";

async fn blog() -> Blog {
    let log = AuditLog::open_in_memory()
        .await
        .expect("Failed to open audit log");
    Blog::new(log, AuditHooks::default())
        .await
        .expect("Failed to create blog")
}

fn u1() -> ActorContext {
    ActorContext::actor("u1")
        .with_client_address("10.0.0.1")
        .with_client_agent("integration-test")
}

fn title_of(values: Option<&audit_trail::audit::Snapshot>) -> Option<String> {
    values
        .and_then(|s| s.get("title"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Create, update and soft-delete one post as `u1`.
async fn create_update_delete(blog: &Blog) -> Uuid {
    let post = blog
        .create_post(u1(), NewPost::new("u1", "A", "Body"))
        .await
        .expect("create");
    blog.update_post(u1(), post.id, PostPatch::default().title("B"))
        .await
        .expect("update");
    blog.delete_post(u1(), post.id).await.expect("delete");
    post.id
}

#[tokio::test]
async fn test_create_update_delete_scenario() {
    let blog = blog().await;
    let log = blog.audit_log();
    let id = create_update_delete(&blog).await;

    let history = log
        .get_for_entity(POST_TYPE_TAG, id.to_string())
        .await
        .unwrap();
    let actions: Vec<_> = history.iter().map(|r| r.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::Created,
            AuditAction::Updated,
            AuditAction::Deleted
        ]
    );

    let created = &history[0];
    assert!(created.before_values.is_none());
    assert_eq!(
        title_of(created.after_values.as_ref()).as_deref(),
        Some("A")
    );
    assert_eq!(created.actor_id.as_deref(), Some("u1"));
    assert_eq!(created.client_address.as_deref(), Some("10.0.0.1"));
    assert_eq!(created.client_agent.as_deref(), Some("integration-test"));

    let updated = &history[1];
    assert_eq!(title_of(updated.before_values.as_ref()).as_deref(), Some("A"));
    assert_eq!(title_of(updated.after_values.as_ref()).as_deref(), Some("B"));

    let deleted = &history[2];
    assert_eq!(title_of(deleted.before_values.as_ref()).as_deref(), Some("B"));
    assert!(deleted.after_values.is_none());

    // Reads are idempotent.
    let again = log
        .get_for_entity(POST_TYPE_TAG, id.to_string())
        .await
        .unwrap();
    assert_eq!(history, again);
}

#[tokio::test]
async fn test_actor_and_action_queries() {
    let blog = blog().await;
    let log = blog.audit_log();
    create_update_delete(&blog).await;

    let mine = log.get_by_actor("u1").await.unwrap();
    assert_eq!(mine.len(), 3);
    assert_eq!(mine[0].action, AuditAction::Deleted);
    assert!(log.get_by_actor("u2").await.unwrap().is_empty());

    let page = log
        .get_paged(AuditFilter::default().with_action(AuditAction::Updated), 1, 10)
        .await
        .unwrap();
    assert_eq!(page.meta.total, 1);
    assert_eq!(page.meta.last_page, 1);
    assert_eq!(page.data.len(), 1);
    assert_eq!(page.data[0].action, AuditAction::Updated);
}

#[tokio::test]
async fn test_invalid_action_filter_rejected() {
    let err = AuditFilter::parse(Some("archived"), None).unwrap_err();
    assert!(err.is_invalid_filter());

    let filter = AuditFilter::parse(Some(""), Some("")).unwrap();
    assert_eq!(filter, AuditFilter::default());
}

#[tokio::test]
async fn test_pagination_covers_full_scan() {
    let blog = blog().await;
    let log = blog.audit_log();
    for i in 0..4 {
        let post = blog
            .create_post(u1(), NewPost::new("u1", format!("Post {i}"), "Body"))
            .await
            .unwrap();
        blog.update_post(u1(), post.id, PostPatch::default().content("Edited"))
            .await
            .unwrap();
    }

    let full = log.get_recent(100).await.unwrap();
    assert_eq!(full.len(), 8);

    let first = log.get_paged(AuditFilter::default(), 1, 3).await.unwrap();
    assert_eq!(first.meta.total, 8);
    assert_eq!(first.meta.last_page, 3);

    let mut paged = Vec::new();
    for page in 1..=u32::try_from(first.meta.last_page).unwrap() {
        paged.extend(
            log.get_paged(AuditFilter::default(), page, 3)
                .await
                .unwrap()
                .data,
        );
    }
    assert_eq!(paged, full);

    let ids: HashSet<i64> = paged.iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), paged.len());

    let beyond = log.get_paged(AuditFilter::default(), 9, 3).await.unwrap();
    assert!(beyond.data.is_empty());
    assert_eq!(beyond.meta.total, 8);
}

#[tokio::test]
async fn test_empty_store_pages_and_stats() {
    let blog = blog().await;
    let log = blog.audit_log();

    let page = log.get_paged(AuditFilter::default(), 1, 20).await.unwrap();
    assert!(page.data.is_empty());
    assert_eq!(page.meta.total, 0);
    assert_eq!(page.meta.last_page, 1);

    let stats = log.get_stats().await.unwrap();
    assert_eq!(stats.total, 0);
    assert!(stats.by_action.is_empty());
    assert!(stats.by_entity_type.is_empty());
}

#[tokio::test]
async fn test_stats_sum_to_total() {
    let blog = blog().await;
    let log = blog.audit_log();
    let id = create_update_delete(&blog).await;
    blog.restore_post(u1(), id).await.unwrap();
    blog.force_delete_post(ActorContext::system(), id)
        .await
        .unwrap();

    let stats = log.get_stats().await.unwrap();
    assert_eq!(stats.total, log.count().await.unwrap());
    assert_eq!(stats.total, 5);
    assert_eq!(stats.by_action.values().sum::<u64>(), stats.total);
    assert_eq!(stats.by_entity_type.values().sum::<u64>(), stats.total);
    for action in AuditAction::ALL {
        assert_eq!(stats.by_action.get(action.as_str()), Some(&1));
    }
    assert!(stats.this_month <= stats.total);
}

#[tokio::test]
async fn test_restore_and_force_delete_values() {
    let blog = blog().await;
    let log = blog.audit_log();
    let id = create_update_delete(&blog).await;
    blog.restore_post(u1(), id).await.unwrap();
    blog.force_delete_post(ActorContext::system(), id)
        .await
        .unwrap();

    let history = log
        .get_for_entity(POST_TYPE_TAG, id.to_string())
        .await
        .unwrap();
    let restored = &history[3];
    assert_eq!(restored.action, AuditAction::Restored);
    assert!(restored.before_values.is_none());
    assert!(restored.after_values.is_none());

    let purged = &history[4];
    assert_eq!(purged.action, AuditAction::ForceDeleted);
    assert!(purged.actor_id.is_none());
    assert!(purged.before_values.is_some());
    assert!(purged.after_values.is_none());

    assert!(blog.find_post_with_trashed(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_audit_write_rolls_back_mutation() {
    let blog = blog().await;
    let log = blog.audit_log();
    let post = blog
        .create_post(u1(), NewPost::new("u1", "A", "Body"))
        .await
        .unwrap();

    log.execute_batch(BREAK_AUDIT_WRITES).await.unwrap();

    let err = blog
        .update_post(u1(), post.id, PostPatch::default().title("B"))
        .await
        .unwrap_err();
    assert!(matches!(&err, BlogError::Audit(e) if e.is_storage_write()));

    let current = blog.find_post(post.id).await.unwrap().unwrap();
    assert_eq!(current.title, "A");

    let err = blog
        .create_post(u1(), NewPost::new("u1", "Lost", "Body"))
        .await
        .unwrap_err();
    assert!(matches!(err, BlogError::Audit(AuditError::StorageWrite { .. })));

    let posts: i64 = log
        .read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?))
        .await
        .unwrap();
    assert_eq!(posts, 1);
    assert_eq!(log.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unchanged_update_skip_policy() {
    let skipping = blog().await;
    let post = skipping
        .create_post(u1(), NewPost::new("u1", "A", "Body"))
        .await
        .unwrap();
    skipping
        .update_post(u1(), post.id, PostPatch::default().title("A"))
        .await
        .unwrap();
    assert_eq!(skipping.audit_log().count().await.unwrap(), 1);

    let log = AuditLog::open_in_memory().await.unwrap();
    let recording = Blog::new(log, AuditHooks::new(false)).await.unwrap();
    let post = recording
        .create_post(u1(), NewPost::new("u1", "A", "Body"))
        .await
        .unwrap();
    recording
        .update_post(u1(), post.id, PostPatch::default().title("A"))
        .await
        .unwrap();

    let history = recording
        .audit_log()
        .get_for_entity(POST_TYPE_TAG, post.id.to_string())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].action, AuditAction::Updated);
    assert_eq!(history[1].before_values, history[1].after_values);
}

#[tokio::test]
async fn test_comment_reply_cascade() {
    let blog = blog().await;
    let log = blog.audit_log();
    let post = blog
        .create_post(u1(), NewPost::new("u1", "A", "Body"))
        .await
        .unwrap();
    let top = blog
        .add_comment(u1(), NewComment::new(post.id, "u2", "First"))
        .await
        .unwrap();
    let reply = blog
        .add_comment(
            u1(),
            NewComment::new(post.id, "u3", "Reply").in_reply_to(top.id),
        )
        .await
        .unwrap();

    let removed = blog.delete_comment(u1(), top.id).await.unwrap();
    assert_eq!(removed, 2);
    assert!(blog.find_comment(reply.id).await.unwrap().is_none());

    let deletions = log
        .get_paged(
            AuditFilter::default()
                .with_action(AuditAction::Deleted)
                .with_entity_type("blog.comment"),
            1,
            10,
        )
        .await
        .unwrap();
    assert_eq!(deletions.meta.total, 2);

    let post = blog.find_post(post.id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 0);
}

#[tokio::test]
async fn test_records_are_append_only() {
    let blog = blog().await;
    let log = blog.audit_log();
    create_update_delete(&blog).await;

    let update = log
        .read(|conn| Ok(conn.execute("UPDATE audits SET actor_id = 'u9'", [])?))
        .await;
    assert!(update.is_err());

    let delete = log
        .read(|conn| Ok(conn.execute("DELETE FROM audits", [])?))
        .await;
    assert!(delete.is_err());

    assert_eq!(log.count().await.unwrap(), 3);
    assert!(log.get_by_actor("u9").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_live_entity_lookup() {
    let blog = blog().await;
    let log = blog.audit_log().clone();
    let post = blog
        .create_post(u1(), NewPost::new("u1", "A", "Body"))
        .await
        .unwrap();
    let record = log.find(1).await.unwrap().unwrap();

    let mut registry = EntityRegistry::new();
    register_loaders(&mut registry);

    let lookup = record.clone();
    let reg = registry.clone();
    let live = log
        .read(move |conn| reg.load_audited(conn, &lookup))
        .await
        .unwrap();
    assert_eq!(title_of(live.as_ref()).as_deref(), Some("A"));

    blog.delete_post(u1(), post.id).await.unwrap();
    let live = log
        .read(move |conn| registry.load_audited(conn, &record))
        .await
        .unwrap();
    assert!(live.is_none());
}

#[tokio::test]
async fn test_history_persists_across_reopen() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path: PathBuf = temp_dir.path().join("nested").join("audit.db");

    let id = {
        let log = AuditLog::open(&db_path).await.unwrap();
        let blog = Blog::new(log, AuditHooks::default()).await.unwrap();
        create_update_delete(&blog).await
    };
    assert!(db_path.exists());

    let log = AuditLog::open(&db_path).await.unwrap();
    assert_eq!(log.path(), Some(db_path.as_path()));
    let history = log
        .get_for_entity(POST_TYPE_TAG, id.to_string())
        .await
        .unwrap();
    assert_eq!(history.len(), 3);

    let recent = log.get_recent(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].action, AuditAction::Deleted);
}
