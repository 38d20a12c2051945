use super::schema::Database;
use super::types::{DatabaseError, FeedFollow};

impl Database {
    // ========================================================================
    // Feed Follow Operations
    // ========================================================================

    pub async fn create_feed_follow(
        &self,
        user_id: i64,
        feed_id: i64,
    ) -> Result<FeedFollow, DatabaseError> {
        let now = chrono::Utc::now().timestamp();

        let follow = sqlx::query_as::<_, FeedFollow>(
            r#"
            INSERT INTO feed_follows (user_id, feed_id, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, user_id, feed_id, created_at, updated_at
        "#,
        )
        .bind(user_id)
        .bind(feed_id)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(follow)
    }

    pub async fn get_feed_follows_for_user(
        &self,
        user_id: i64,
    ) -> Result<Vec<FeedFollow>, DatabaseError> {
        let follows = sqlx::query_as::<_, FeedFollow>(
            r#"
            SELECT id, user_id, feed_id, created_at, updated_at
            FROM feed_follows
            WHERE user_id = ?
            ORDER BY id
        "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(follows)
    }

    /// Delete a follow owned by `user_id`. Returns `false` when no such follow
    /// exists for that user, including when it belongs to someone else.
    pub async fn delete_feed_follow(
        &self,
        follow_id: i64,
        user_id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM feed_follows WHERE id = ? AND user_id = ?")
            .bind(follow_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
