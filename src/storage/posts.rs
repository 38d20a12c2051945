use super::schema::Database;
use super::types::{DatabaseError, InsertOutcome, NewPost, Post};

// ============================================================================
// Query Limit Constants
// ============================================================================

/// Number of posts returned when the caller does not ask for a limit
pub const DEFAULT_POSTS_LIMIT: i64 = 10;

/// Maximum number of posts to return from any single query (OOM protection)
pub const MAX_POSTS_LIMIT: i64 = 500;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post unless one with the same URL already exists.
    ///
    /// Deduplication is delegated to the UNIQUE index on `posts.url`, so it
    /// holds across concurrent workers and across processes. A URL conflict is
    /// reported as [`InsertOutcome::AlreadyPresent`]; any other failure
    /// (foreign key, I/O, closed pool) is an error.
    pub async fn insert_post_if_absent(&self, post: &NewPost) -> Result<InsertOutcome, DatabaseError> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO posts (feed_id, title, url, description, published_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
        "#,
        )
        .bind(post.feed_id)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            Ok(InsertOutcome::AlreadyPresent)
        } else {
            Ok(InsertOutcome::Inserted)
        }
    }

    // ========================================================================
    // Post Queries
    // ========================================================================

    /// Newest posts from the feeds `user_id` follows.
    ///
    /// Posts without a publication date sort after dated ones. `limit`
    /// defaults to [`DEFAULT_POSTS_LIMIT`] and is capped at [`MAX_POSTS_LIMIT`].
    pub async fn get_posts_for_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Post>, DatabaseError> {
        let limit = limit
            .unwrap_or(DEFAULT_POSTS_LIMIT)
            .clamp(0, MAX_POSTS_LIMIT);

        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT p.id, p.feed_id, p.title, p.url, p.description, p.published_at,
                   p.created_at, p.updated_at
            FROM posts p
            JOIN feed_follows ff ON ff.feed_id = p.feed_id
            WHERE ff.user_id = ?
            ORDER BY p.published_at DESC NULLS LAST, p.id DESC
            LIMIT ?
        "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }

    /// All posts stored for one feed, oldest insert first
    pub async fn get_posts_for_feed(&self, feed_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT id, feed_id, title, url, description, published_at, created_at, updated_at
            FROM posts
            WHERE feed_id = ?
            ORDER BY id
        "#,
        )
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(posts)
    }
}
