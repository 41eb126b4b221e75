//! # Credential Repository
//!
//! Small key/value store for the user token. Values never appear in logs.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Key under which the user token is stored.
pub const USER_TOKEN_KEY: &str = "user_token";

/// Present while a user session is active. Cleared on logout.
pub const SESSION_KEY: &str = "session_active";

/// Repository for stored credentials.
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pool: SqlitePool,
}

impl CredentialRepository {
    /// Creates a new CredentialRepository.
    pub fn new(pool: SqlitePool) -> Self {
        CredentialRepository { pool }
    }

    /// Reads a credential.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM credentials WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    /// Writes a credential, replacing any previous value.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(key = %key, "Credential stored");
        Ok(())
    }

    /// Deletes a credential. Returns true if it existed.
    pub async fn delete(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM credentials WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// The stored user token, if any.
    pub async fn user_token(&self) -> DbResult<Option<String>> {
        self.get(USER_TOKEN_KEY).await
    }

    /// Stores the user token.
    pub async fn set_user_token(&self, token: &str) -> DbResult<()> {
        self.set(USER_TOKEN_KEY, token).await
    }

    /// Removes the user token.
    pub async fn clear_user_token(&self) -> DbResult<bool> {
        self.delete(USER_TOKEN_KEY).await
    }

    /// Records that a user session is active.
    pub async fn mark_session_active(&self) -> DbResult<()> {
        self.set(SESSION_KEY, "1").await
    }

    /// Whether a user session was active when the store was last written.
    pub async fn session_active(&self) -> DbResult<bool> {
        Ok(self.get(SESSION_KEY).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_user_token_lifecycle() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let credentials = db.credentials();

        assert!(credentials.user_token().await.unwrap().is_none());

        credentials.set_user_token("first").await.unwrap();
        credentials.set_user_token("second").await.unwrap();
        assert_eq!(credentials.user_token().await.unwrap().as_deref(), Some("second"));

        assert!(credentials.clear_user_token().await.unwrap());
        assert!(credentials.user_token().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_marker() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let credentials = db.credentials();

        assert!(!credentials.session_active().await.unwrap());
        credentials.mark_session_active().await.unwrap();
        assert!(credentials.session_active().await.unwrap());

        db.clear_all().await.unwrap();
        assert!(!credentials.session_active().await.unwrap());
    }
}
