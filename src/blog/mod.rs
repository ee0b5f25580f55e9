//! Blog entities whose lifecycles are audited.

mod comment;
mod post;
mod service;

pub use comment::{Comment, CommentStore, NewComment, TYPE_TAG as COMMENT_TYPE_TAG};
pub use post::{NewPost, Post, PostPatch, PostStatus, PostStore, TYPE_TAG as POST_TYPE_TAG};
pub use service::Blog;

use crate::audit::{AuditError, EntityRegistry};

/// SQL schema for the blog tables. Applied next to the audit schema in the
/// same database.
pub const BLOG_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS posts (
    id TEXT PRIMARY KEY NOT NULL,
    author_id TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'draft',
    comments_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id TEXT NOT NULL REFERENCES posts(id),
    parent_id INTEGER REFERENCES comments(id),
    author_id TEXT NOT NULL,
    body TEXT NOT NULL,
    replies_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(author_id);
CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id);
CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
";

/// Errors from blog operations.
#[derive(thiserror::Error, Debug)]
pub enum BlogError {
    /// The post or comment does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Input was rejected.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Writing or reading the audit trail failed.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Reading or writing blog tables failed.
    #[error("Blog storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl BlogError {
    pub(crate) fn post_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            kind: "Post",
            id: id.to_string(),
        }
    }

    pub(crate) fn comment_not_found(id: i64) -> Self {
        Self::NotFound {
            kind: "Comment",
            id: id.to_string(),
        }
    }
}

/// Register loaders for every blog entity type.
pub fn register_loaders(registry: &mut EntityRegistry) {
    registry.register(post::TYPE_TAG, post::PostLoader);
    registry.register(comment::TYPE_TAG, comment::CommentLoader);
}

#[cfg(test)]
pub(crate) mod test_support {
    use rusqlite::Connection;

    use super::BLOG_SCHEMA;
    use crate::audit::SCHEMA;

    pub fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        conn.execute_batch(BLOG_SCHEMA).unwrap();
        conn
    }

    pub fn audit_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM audits", [], |row| row.get(0))
            .unwrap()
    }
}
