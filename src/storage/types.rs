use secrecy::SecretString;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds a lock on the database file
    #[error("The database is locked by another process. Please try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// SQLITE_BUSY (5), SQLITE_LOCKED (6) and SQLITE_CANTOPEN (14) all surface as
/// lock conditions to the caller.
pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Helper Types
// ============================================================================

/// Outcome of [`Database::insert_post_if_absent`](super::Database::insert_post_if_absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// A post with the same URL already exists; nothing was written
    AlreadyPresent,
}

/// A post ready to be persisted, produced by the scraper from a parsed item
#[derive(Debug, Clone)]
pub struct NewPost {
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
}

/// Internal row type for feed queries (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub url: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_fetched_at: Option<i64>,
}

impl FeedDbRow {
    pub(crate) fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            user_id: self.user_id,
            name: Arc::from(self.name),
            url: self.url,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_fetched_at: self.last_fetched_at,
        }
    }
}

/// Internal row type for user queries. The API key is wrapped in a
/// [`SecretString`] as soon as it leaves the database.
#[derive(sqlx::FromRow)]
pub(crate) struct UserDbRow {
    pub id: i64,
    pub name: String,
    pub api_key: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserDbRow {
    pub(crate) fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            api_key: SecretString::from(self.api_key),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A registered user. Only the CLI ever exposes `api_key`, once, at creation.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub api_key: SecretString,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Feed data from database
///
/// `name` uses `Arc<str>` so the scraper can tag log lines and outcomes
/// without reallocating per task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feed {
    pub id: i64,
    pub user_id: i64,
    pub name: Arc<str>,
    pub url: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Watermark: when the scraper last attempted this feed, in Unix
    /// milliseconds. `None` until the first attempt.
    pub last_fetched_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct FeedFollow {
    pub id: i64,
    pub user_id: i64,
    pub feed_id: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub feed_id: i64,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}
