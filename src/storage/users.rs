use super::schema::Database;
use super::types::{DatabaseError, User, UserDbRow};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Create a user. The API key is generated by the database from 32 random
    /// bytes, hex-encoded.
    pub async fn create_user(&self, name: &str) -> Result<User, DatabaseError> {
        let now = chrono::Utc::now().timestamp();

        let row = sqlx::query_as::<_, UserDbRow>(
            r#"
            INSERT INTO users (name, created_at, updated_at)
            VALUES (?, ?, ?)
            RETURNING id, name, api_key, created_at, updated_at
        "#,
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = row.id, "User created");
        Ok(row.into_user())
    }

    /// Look up the user owning `api_key`.
    pub async fn get_user_by_api_key(&self, api_key: &str) -> Result<Option<User>, DatabaseError> {
        let row = sqlx::query_as::<_, UserDbRow>(
            r#"
            SELECT id, name, api_key, created_at, updated_at
            FROM users
            WHERE api_key = ?
        "#,
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(UserDbRow::into_user))
    }
}
