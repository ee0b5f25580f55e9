//! Threaded comments on posts.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::post::PostStore;
use super::BlogError;
use crate::audit::{ActorContext, AuditError, AuditHooks, EntityLoader, Snapshot, Trackable};

/// Type tag recorded for comments.
pub const TYPE_TAG: &str = "blog.comment";

const COMMENT_COLUMNS: &str =
    "id, post_id, parent_id, author_id, body, replies_count, created_at, updated_at";

/// A comment, or a reply when `parent_id` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: Uuid,
    pub parent_id: Option<i64>,
    pub author_id: String,
    pub body: String,
    pub replies_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trackable for Comment {
    fn type_tag(&self) -> &str {
        TYPE_TAG
    }

    fn audit_key(&self) -> String {
        self.id.to_string()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new()
            .with("id", self.id)
            .with("post_id", self.post_id)
            .with("parent_id", self.parent_id)
            .with("author_id", &self.author_id)
            .with("body", &self.body)
            .with("replies_count", self.replies_count)
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
    }
}

/// Input for [`CommentStore::add`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: Uuid,
    pub parent_id: Option<i64>,
    pub author_id: String,
    pub body: String,
}

impl NewComment {
    /// A top-level comment.
    #[must_use]
    pub fn new(post_id: Uuid, author_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            post_id,
            parent_id: None,
            author_id: author_id.into(),
            body: body.into(),
        }
    }

    /// Make this a reply to another comment on the same post.
    #[must_use]
    pub fn in_reply_to(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Comment persistence with audit hooks, bound to one connection or transaction.
///
/// Counters are kept in step with the tree: a top-level comment counts toward
/// its post's `comments_count`, a reply toward its parent's `replies_count`.
/// Each counter change is audited as an update of the counted entity.
#[derive(Debug, Clone, Copy)]
pub struct CommentStore<'c> {
    conn: &'c Connection,
    hooks: AuditHooks,
}

impl<'c> CommentStore<'c> {
    #[must_use]
    pub const fn new(conn: &'c Connection, hooks: AuditHooks) -> Self {
        Self { conn, hooks }
    }

    /// Add a comment or reply to a live post.
    ///
    /// # Errors
    ///
    /// Returns [`BlogError::NotFound`] for a missing post or parent,
    /// [`BlogError::Validation`] for an empty body or a parent on another
    /// post, or a storage or audit error if a write fails.
    pub fn add(&self, ctx: &ActorContext, new: NewComment) -> Result<Comment, BlogError> {
        let body = validate_body(&new.body)?;
        let posts = PostStore::new(self.conn, self.hooks);
        if posts.find(new.post_id)?.is_none() {
            return Err(BlogError::post_not_found(new.post_id));
        }

        let parent = match new.parent_id {
            Some(parent_id) => {
                let parent = self
                    .find(parent_id)?
                    .ok_or_else(|| BlogError::comment_not_found(parent_id))?;
                if parent.post_id != new.post_id {
                    return Err(BlogError::Validation(format!(
                        "comment {parent_id} belongs to another post"
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let now = Utc::now();
        self.conn.execute(
            "INSERT INTO comments (post_id, parent_id, author_id, body, replies_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?5)",
            params![new.post_id.to_string(), new.parent_id, new.author_id, body, now],
        )?;
        let comment = Comment {
            id: self.conn.last_insert_rowid(),
            post_id: new.post_id,
            parent_id: new.parent_id,
            author_id: new.author_id,
            body,
            replies_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.hooks.after_create(self.conn, ctx, &comment)?;

        match parent {
            Some(parent) => {
                self.adjust_replies_count(ctx, parent, 1)?;
            }
            None => {
                posts.adjust_comments_count(ctx, comment.post_id, 1)?;
            }
        }

        tracing::debug!(comment_id = comment.id, post_id = %comment.post_id, "Added comment");
        Ok(comment)
    }

    /// Replace a comment's body.
    ///
    /// # Errors
    ///
    /// Returns [`BlogError::NotFound`] for a missing comment,
    /// [`BlogError::Validation`] for an empty body, or a storage or audit
    /// error if a write fails.
    pub fn edit(&self, ctx: &ActorContext, id: i64, body: &str) -> Result<Comment, BlogError> {
        let body = validate_body(body)?;
        let mut comment = self
            .find(id)?
            .ok_or_else(|| BlogError::comment_not_found(id))?;
        let prior = self.hooks.before_update(&comment);

        if comment.body != body {
            comment.body = body;
            comment.updated_at = Utc::now();
            self.save(&comment)?;
        }
        self.hooks.after_update(self.conn, ctx, &comment, prior)?;
        Ok(comment)
    }

    /// Delete a comment and all replies below it.
    ///
    /// Every removed comment is audited. The counter of whatever the comment
    /// hung off (its parent or its post) goes down by one. Returns how many
    /// comments were removed.
    ///
    /// # Errors
    ///
    /// Returns [`BlogError::NotFound`] for a missing comment, or a storage or
    /// audit error if a write fails.
    pub fn delete(&self, ctx: &ActorContext, id: i64) -> Result<usize, BlogError> {
        let comment = self
            .find(id)?
            .ok_or_else(|| BlogError::comment_not_found(id))?;

        let removed = self.remove_tree(ctx, &comment)?;

        match comment.parent_id {
            Some(parent_id) => {
                if let Some(parent) = self.find(parent_id)? {
                    self.adjust_replies_count(ctx, parent, -1)?;
                }
            }
            None => {
                PostStore::new(self.conn, self.hooks).adjust_comments_count(
                    ctx,
                    comment.post_id,
                    -1,
                )?;
            }
        }

        tracing::debug!(comment_id = id, removed, "Deleted comment thread");
        Ok(removed)
    }

    /// A comment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn find(&self, id: i64) -> rusqlite::Result<Option<Comment>> {
        load_comment(self.conn, id)
    }

    /// Direct replies to a comment, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn replies(&self, id: i64) -> rusqlite::Result<Vec<Comment>> {
        self.collect(
            &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE parent_id = ?1 ORDER BY id"),
            params![id],
        )
    }

    /// Top-level comments on a post, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn for_post(&self, post_id: Uuid) -> rusqlite::Result<Vec<Comment>> {
        self.collect(
            &format!(
                "SELECT {COMMENT_COLUMNS} FROM comments
                 WHERE post_id = ?1 AND parent_id IS NULL ORDER BY id"
            ),
            params![post_id.to_string()],
        )
    }

    /// Remove every comment on a post without touching the post's counter.
    pub(crate) fn purge_for_post(
        &self,
        ctx: &ActorContext,
        post_id: Uuid,
    ) -> Result<usize, BlogError> {
        let mut removed = 0;
        for comment in self.for_post(post_id)? {
            removed += self.remove_tree(ctx, &comment)?;
        }
        Ok(removed)
    }

    // Every comment precedes its replies in `thread`, so deleting in reverse
    // never leaves a row pointing at a missing parent.
    fn remove_tree(&self, ctx: &ActorContext, comment: &Comment) -> Result<usize, BlogError> {
        let mut thread = Vec::new();
        let mut pending = vec![comment.clone()];
        while let Some(next) = pending.pop() {
            pending.extend(self.replies(next.id)?);
            thread.push(next);
        }

        for doomed in thread.iter().rev() {
            let snapshot = self.hooks.before_delete(doomed);
            self.conn
                .execute("DELETE FROM comments WHERE id = ?1", params![doomed.id])?;
            self.hooks.after_delete(self.conn, ctx, doomed, snapshot, false)?;
        }
        Ok(thread.len())
    }

    fn adjust_replies_count(
        &self,
        ctx: &ActorContext,
        mut parent: Comment,
        delta: i64,
    ) -> Result<Comment, BlogError> {
        let prior = self.hooks.before_update(&parent);
        parent.replies_count = (parent.replies_count + delta).max(0);
        parent.updated_at = Utc::now();
        self.save(&parent)?;
        self.hooks.after_update(self.conn, ctx, &parent, prior)?;
        Ok(parent)
    }

    fn save(&self, comment: &Comment) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE comments SET body = ?2, replies_count = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                comment.id,
                comment.body,
                comment.replies_count,
                comment.updated_at
            ],
        )?;
        Ok(())
    }

    fn collect<P: rusqlite::Params>(&self, sql: &str, params: P) -> rusqlite::Result<Vec<Comment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let comments = stmt
            .query_map(params, comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }
}

fn validate_body(body: &str) -> Result<String, BlogError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(BlogError::Validation("comment must not be empty".to_string()));
    }
    Ok(body.to_string())
}

fn load_comment(conn: &Connection, id: i64) -> rusqlite::Result<Option<Comment>> {
    conn.query_row(
        &format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = ?1"),
        params![id],
        comment_from_row,
    )
    .optional()
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let post_id: String = row.get(1)?;
    let post_id = Uuid::parse_str(&post_id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(Comment {
        id: row.get(0)?,
        post_id,
        parent_id: row.get(2)?,
        author_id: row.get(3)?,
        body: row.get(4)?,
        replies_count: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Loads comments for the entity registry.
pub(crate) struct CommentLoader;

impl EntityLoader for CommentLoader {
    fn load(&self, conn: &Connection, entity_id: &str) -> Result<Option<Snapshot>, AuditError> {
        let Ok(id) = entity_id.parse::<i64>() else {
            return Ok(None);
        };
        Ok(load_comment(conn, id)?.map(|comment| comment.snapshot()))
    }
}
