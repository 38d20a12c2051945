use super::schema::Database;
use super::types::{DatabaseError, Feed, FeedDbRow, FeedFollow};

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed for `user_id` and follow it on their behalf.
    ///
    /// Both rows are written in one transaction: a feed is never created
    /// without its owner following it.
    pub async fn create_feed(
        &self,
        user_id: i64,
        name: &str,
        url: &str,
    ) -> Result<(Feed, FeedFollow), DatabaseError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, FeedDbRow>(
            r#"
            INSERT INTO feeds (user_id, name, url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, user_id, name, url, created_at, updated_at, last_fetched_at
        "#,
        )
        .bind(user_id)
        .bind(name)
        .bind(url)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, feed_id, created_at, updated_at
        "#,
        )
        .bind(user_id)
        .bind(row.id)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(feed_id = row.id, user_id, url = %row.url, "Feed created");
        Ok((row.into_feed(), follow))
    }

    /// Get all feeds, oldest first
    pub async fn get_feeds(&self) -> Result<Vec<Feed>, DatabaseError> {
        let rows = sqlx::query_as::<_, FeedDbRow>(
            r#"
            SELECT id, user_id, name, url, created_at, updated_at, last_fetched_at
            FROM feeds
            ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedDbRow::into_feed).collect())
    }

    pub async fn get_feed(&self, feed_id: i64) -> Result<Option<Feed>, DatabaseError> {
        let row = sqlx::query_as::<_, FeedDbRow>(
            r#"
            SELECT id, user_id, name, url, created_at, updated_at, last_fetched_at
            FROM feeds
            WHERE id = ?
        "#,
        )
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(FeedDbRow::into_feed))
    }

    // ========================================================================
    // Scraper Operations
    // ========================================================================

    /// Select up to `limit` feeds that are most overdue for a fetch.
    ///
    /// Feeds that were never fetched come first, then ascending by
    /// `last_fetched_at`. Ties are broken by id so the order is stable.
    /// A non-positive `limit` yields an empty batch.
    pub async fn select_feeds_to_fetch(&self, limit: i64) -> Result<Vec<Feed>, DatabaseError> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, FeedDbRow>(
            r#"
            SELECT id, user_id, name, url, created_at, updated_at, last_fetched_at
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, id ASC
            LIMIT ?
        "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(FeedDbRow::into_feed).collect())
    }

    /// Advance a feed's watermark to `fetched_at` (Unix milliseconds).
    ///
    /// The watermark never moves backwards: if the stored value is already at
    /// or past `fetched_at` (another engine got there first), nothing changes.
    /// Returns whether the row was updated.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: i64,
        fetched_at: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            r#"
            UPDATE feeds
            SET last_fetched_at = ?, updated_at = ?
            WHERE id = ? AND (last_fetched_at IS NULL OR last_fetched_at < ?)
        "#,
        )
        .bind(fetched_at)
        .bind(fetched_at.div_euclid(1000))
        .bind(feed_id)
        .bind(fetched_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
