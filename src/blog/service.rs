//! Async blog operations, each in its own audited transaction.

use uuid::Uuid;

use super::comment::{Comment, CommentStore, NewComment};
use super::post::{NewPost, Post, PostPatch, PostStore};
use super::{BlogError, BLOG_SCHEMA};
use crate::audit::{ActorContext, AuditHooks, AuditLog};

/// Blog entry point sharing the database of an [`AuditLog`].
///
/// Every mutation runs in one transaction together with the audit records it
/// produces, so a failed audit write leaves the blog untouched.
#[derive(Debug, Clone)]
pub struct Blog {
    log: AuditLog,
    hooks: AuditHooks,
}

impl Blog {
    /// Apply the blog schema to the log's database.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub async fn new(log: AuditLog, hooks: AuditHooks) -> Result<Self, BlogError> {
        log.execute_batch(BLOG_SCHEMA).await?;
        Ok(Self { log, hooks })
    }

    /// The underlying audit log.
    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.log
    }

    /// See [`PostStore::create`].
    ///
    /// # Errors
    ///
    /// Returns an error if validation or any write fails.
    pub async fn create_post(&self, ctx: ActorContext, new: NewPost) -> Result<Post, BlogError> {
        let hooks = self.hooks;
        self.log
            .transaction(move |tx| PostStore::new(tx, hooks).create(&ctx, new))
            .await
    }

    /// See [`PostStore::update`].
    ///
    /// # Errors
    ///
    /// Returns an error if the post is missing, validation fails, or any write fails.
    pub async fn update_post(
        &self,
        ctx: ActorContext,
        id: Uuid,
        patch: PostPatch,
    ) -> Result<Post, BlogError> {
        let hooks = self.hooks;
        self.log
            .transaction(move |tx| PostStore::new(tx, hooks).update(&ctx, id, patch))
            .await
    }

    /// See [`PostStore::soft_delete`].
    ///
    /// # Errors
    ///
    /// Returns an error if the post is missing or any write fails.
    pub async fn delete_post(&self, ctx: ActorContext, id: Uuid) -> Result<Post, BlogError> {
        let hooks = self.hooks;
        self.log
            .transaction(move |tx| PostStore::new(tx, hooks).soft_delete(&ctx, id))
            .await
    }

    /// See [`PostStore::restore`].
    ///
    /// # Errors
    ///
    /// Returns an error if the post is missing, not trashed, or any write fails.
    pub async fn restore_post(&self, ctx: ActorContext, id: Uuid) -> Result<Post, BlogError> {
        let hooks = self.hooks;
        self.log
            .transaction(move |tx| PostStore::new(tx, hooks).restore(&ctx, id))
            .await
    }

    /// See [`PostStore::force_delete`].
    ///
    /// # Errors
    ///
    /// Returns an error if the post is missing or any write fails.
    pub async fn force_delete_post(&self, ctx: ActorContext, id: Uuid) -> Result<Post, BlogError> {
        let hooks = self.hooks;
        self.log
            .transaction(move |tx| PostStore::new(tx, hooks).force_delete(&ctx, id))
            .await
    }

    /// A live post by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn find_post(&self, id: Uuid) -> Result<Option<Post>, BlogError> {
        let hooks = self.hooks;
        Ok(self
            .log
            .read(move |conn| Ok(PostStore::new(conn, hooks).find(id)?))
            .await?)
    }

    /// A post by id, including trashed ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn find_post_with_trashed(&self, id: Uuid) -> Result<Option<Post>, BlogError> {
        let hooks = self.hooks;
        Ok(self
            .log
            .read(move |conn| Ok(PostStore::new(conn, hooks).find_with_trashed(id)?))
            .await?)
    }

    /// See [`CommentStore::add`].
    ///
    /// # Errors
    ///
    /// Returns an error if the post or parent is missing, validation fails, or
    /// any write fails.
    pub async fn add_comment(
        &self,
        ctx: ActorContext,
        new: NewComment,
    ) -> Result<Comment, BlogError> {
        let hooks = self.hooks;
        self.log
            .transaction(move |tx| CommentStore::new(tx, hooks).add(&ctx, new))
            .await
    }

    /// See [`CommentStore::edit`].
    ///
    /// # Errors
    ///
    /// Returns an error if the comment is missing, validation fails, or any
    /// write fails.
    pub async fn edit_comment(
        &self,
        ctx: ActorContext,
        id: i64,
        body: impl Into<String>,
    ) -> Result<Comment, BlogError> {
        let hooks = self.hooks;
        let body = body.into();
        self.log
            .transaction(move |tx| CommentStore::new(tx, hooks).edit(&ctx, id, &body))
            .await
    }

    /// See [`CommentStore::delete`].
    ///
    /// # Errors
    ///
    /// Returns an error if the comment is missing or any write fails.
    pub async fn delete_comment(&self, ctx: ActorContext, id: i64) -> Result<usize, BlogError> {
        let hooks = self.hooks;
        self.log
            .transaction(move |tx| CommentStore::new(tx, hooks).delete(&ctx, id))
            .await
    }

    /// A comment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn find_comment(&self, id: i64) -> Result<Option<Comment>, BlogError> {
        let hooks = self.hooks;
        Ok(self
            .log
            .read(move |conn| Ok(CommentStore::new(conn, hooks).find(id)?))
            .await?)
    }
}
