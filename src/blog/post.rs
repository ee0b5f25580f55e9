//! Soft-deletable blog posts.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::comment::CommentStore;
use super::BlogError;
use crate::audit::{ActorContext, AuditError, AuditHooks, EntityLoader, Snapshot, Trackable};

/// Type tag recorded for posts.
pub const TYPE_TAG: &str = "blog.post";

const POST_COLUMNS: &str =
    "id, author_id, title, content, status, comments_count, created_at, updated_at, deleted_at";

/// Publication state of a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

impl PostStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = BlogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "archived" => Ok(Self::Archived),
            other => Err(BlogError::Validation(format!("unknown post status '{other}'"))),
        }
    }
}

/// A blog post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub status: PostStatus,
    pub comments_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Whether the post is soft-deleted.
    #[must_use]
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Trackable for Post {
    fn type_tag(&self) -> &str {
        TYPE_TAG
    }

    fn audit_key(&self) -> String {
        self.id.to_string()
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot::new()
            .with("id", self.id)
            .with("author_id", &self.author_id)
            .with("title", &self.title)
            .with("content", &self.content)
            .with("status", self.status.as_str())
            .with("comments_count", self.comments_count)
            .with("created_at", self.created_at)
            .with("updated_at", self.updated_at)
            .with("deleted_at", self.deleted_at)
    }
}

/// Input for [`PostStore::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPost {
    pub author_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub status: PostStatus,
}

impl NewPost {
    /// A draft post.
    #[must_use]
    pub fn new(
        author_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            author_id: author_id.into(),
            title: title.into(),
            content: content.into(),
            status: PostStatus::Draft,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = status;
        self
    }
}

/// Partial update for [`PostStore::update`]. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<PostStatus>,
}

impl PostPatch {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Post persistence with audit hooks, bound to one connection or transaction.
#[derive(Debug, Clone, Copy)]
pub struct PostStore<'c> {
    conn: &'c Connection,
    hooks: AuditHooks,
}

impl<'c> PostStore<'c> {
    #[must_use]
    pub const fn new(conn: &'c Connection, hooks: AuditHooks) -> Self {
        Self { conn, hooks }
    }

    /// Insert a new post.
    ///
    /// # Errors
    ///
    /// Returns [`BlogError::Validation`] for an empty title, or a storage or
    /// audit error if a write fails.
    pub fn create(&self, ctx: &ActorContext, new: NewPost) -> Result<Post, BlogError> {
        let title = validate_title(&new.title)?;
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            author_id: new.author_id,
            title,
            content: new.content,
            status: new.status,
            comments_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.conn.execute(
            "INSERT INTO posts (id, author_id, title, content, status, comments_count, created_at, updated_at, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                post.id.to_string(),
                post.author_id,
                post.title,
                post.content,
                post.status.as_str(),
                post.comments_count,
                post.created_at,
                post.updated_at,
                post.deleted_at,
            ],
        )?;
        self.hooks.after_create(self.conn, ctx, &post)?;

        tracing::debug!(post_id = %post.id, "Created post");
        Ok(post)
    }

    /// Apply a patch to a live post.
    ///
    /// `updated_at` only moves when a field actually changes.
    ///
    /// # Errors
    ///
    /// Returns [`BlogError::NotFound`] for a missing or trashed post,
    /// [`BlogError::Validation`] for an empty title, or a storage or audit
    /// error if a write fails.
    pub fn update(&self, ctx: &ActorContext, id: Uuid, patch: PostPatch) -> Result<Post, BlogError> {
        let mut post = self.find(id)?.ok_or_else(|| BlogError::post_not_found(id))?;
        let prior = self.hooks.before_update(&post);

        if let Some(title) = patch.title {
            post.title = validate_title(&title)?;
        }
        if let Some(content) = patch.content {
            post.content = content;
        }
        if let Some(status) = patch.status {
            post.status = status;
        }

        if post.snapshot() != prior {
            post.updated_at = Utc::now();
            self.save(&post)?;
        }
        self.hooks.after_update(self.conn, ctx, &post, prior)?;
        Ok(post)
    }

    /// Move a live post to the trash.
    ///
    /// # Errors
    ///
    /// Returns [`BlogError::NotFound`] for a missing or already trashed post,
    /// or a storage or audit error if a write fails.
    pub fn soft_delete(&self, ctx: &ActorContext, id: Uuid) -> Result<Post, BlogError> {
        let mut post = self.find(id)?.ok_or_else(|| BlogError::post_not_found(id))?;
        let snapshot = self.hooks.before_delete(&post);

        post.deleted_at = Some(Utc::now());
        self.save(&post)?;
        self.hooks.after_delete(self.conn, ctx, &post, snapshot, false)?;

        tracing::debug!(post_id = %post.id, "Trashed post");
        Ok(post)
    }

    /// Bring a trashed post back.
    ///
    /// # Errors
    ///
    /// Returns [`BlogError::NotFound`] for a missing post,
    /// [`BlogError::Validation`] if it is not trashed, or a storage or audit
    /// error if a write fails.
    pub fn restore(&self, ctx: &ActorContext, id: Uuid) -> Result<Post, BlogError> {
        let mut post = self
            .find_with_trashed(id)?
            .ok_or_else(|| BlogError::post_not_found(id))?;
        if !post.is_trashed() {
            return Err(BlogError::Validation(format!("post {id} is not deleted")));
        }

        post.deleted_at = None;
        self.save(&post)?;
        self.hooks.after_restore(self.conn, ctx, &post)?;
        Ok(post)
    }

    /// Permanently remove a post, trashed or not, and its comments.
    ///
    /// Each removed comment gets its own `deleted` record before the post's
    /// `force_deleted` record.
    ///
    /// # Errors
    ///
    /// Returns [`BlogError::NotFound`] for a missing post, or a storage or
    /// audit error if a write fails.
    pub fn force_delete(&self, ctx: &ActorContext, id: Uuid) -> Result<Post, BlogError> {
        let post = self
            .find_with_trashed(id)?
            .ok_or_else(|| BlogError::post_not_found(id))?;
        let snapshot = self.hooks.before_delete(&post);

        let comments = CommentStore::new(self.conn, self.hooks).purge_for_post(ctx, id)?;
        self.conn
            .execute("DELETE FROM posts WHERE id = ?1", params![id.to_string()])?;
        self.hooks.after_delete(self.conn, ctx, &post, snapshot, true)?;

        tracing::debug!(post_id = %post.id, comments, "Purged post");
        Ok(post)
    }

    /// A live post by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn find(&self, id: Uuid) -> rusqlite::Result<Option<Post>> {
        load_post(self.conn, id, false)
    }

    /// A post by id, including trashed ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub fn find_with_trashed(&self, id: Uuid) -> rusqlite::Result<Option<Post>> {
        load_post(self.conn, id, true)
    }

    /// Shift the denormalised comment counter. The change is audited as an
    /// update of the post.
    pub(crate) fn adjust_comments_count(
        &self,
        ctx: &ActorContext,
        id: Uuid,
        delta: i64,
    ) -> Result<Post, BlogError> {
        let mut post = self
            .find_with_trashed(id)?
            .ok_or_else(|| BlogError::post_not_found(id))?;
        let prior = self.hooks.before_update(&post);

        post.comments_count = (post.comments_count + delta).max(0);
        post.updated_at = Utc::now();
        self.save(&post)?;
        self.hooks.after_update(self.conn, ctx, &post, prior)?;
        Ok(post)
    }

    fn save(&self, post: &Post) -> rusqlite::Result<()> {
        self.conn.execute(
            "UPDATE posts SET title = ?2, content = ?3, status = ?4, comments_count = ?5, updated_at = ?6, deleted_at = ?7
             WHERE id = ?1",
            params![
                post.id.to_string(),
                post.title,
                post.content,
                post.status.as_str(),
                post.comments_count,
                post.updated_at,
                post.deleted_at,
            ],
        )?;
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<String, BlogError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(BlogError::Validation("title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

fn load_post(conn: &Connection, id: Uuid, with_trashed: bool) -> rusqlite::Result<Option<Post>> {
    let sql = if with_trashed {
        format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1")
    } else {
        format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?1 AND deleted_at IS NULL")
    };
    conn.query_row(&sql, params![id.to_string()], post_from_row)
        .optional()
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    let id: String = row.get(0)?;
    let id = Uuid::parse_str(&id)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let status: String = row.get(4)?;
    let status = status
        .parse::<PostStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(Post {
        id,
        author_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        status,
        comments_count: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

/// Loads live posts for the entity registry.
pub(crate) struct PostLoader;

impl EntityLoader for PostLoader {
    fn load(&self, conn: &Connection, entity_id: &str) -> Result<Option<Snapshot>, AuditError> {
        let Ok(id) = Uuid::parse_str(entity_id) else {
            return Ok(None);
        };
        Ok(load_post(conn, id, false)?.map(|post| post.snapshot()))
    }
}
