//! # Registered Connection Repository
//!
//! The set of connection ids the host app asked the SDK to keep in sync.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;

/// Repository for registered connection ids.
#[derive(Debug, Clone)]
pub struct RegistryRepository {
    pool: SqlitePool,
}

impl RegistryRepository {
    /// Creates a new RegistryRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RegistryRepository { pool }
    }

    /// Registers a connection id. Returns false if it was already registered.
    pub async fn register(&self, connection_id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO registered_connections (connection_id, registered_at)
            VALUES (?1, ?2)
            ON CONFLICT(connection_id) DO NOTHING
            "#,
        )
        .bind(connection_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let added = result.rows_affected() > 0;
        debug!(connection_id = %connection_id, added, "Connection registered");
        Ok(added)
    }

    /// Unregisters a connection id. Returns true if it was registered.
    pub async fn unregister(&self, connection_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM registered_connections WHERE connection_id = ?1")
            .bind(connection_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Lists registered ids in registration order.
    pub async fn list(&self) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT connection_id FROM registered_connections ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Returns true if `connection_id` is registered.
    pub async fn contains(&self, connection_id: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM registered_connections WHERE connection_id = ?1",
        )
        .bind(connection_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = db.registry();

        assert!(registry.register("a").await.unwrap());
        assert!(!registry.register("a").await.unwrap());
        assert!(registry.register("b").await.unwrap());

        assert_eq!(registry.list().await.unwrap(), vec!["a", "b"]);
        assert!(registry.contains("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_unregister() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let registry = db.registry();

        registry.register("a").await.unwrap();
        assert!(registry.unregister("a").await.unwrap());
        assert!(!registry.unregister("a").await.unwrap());
        assert!(!registry.contains("a").await.unwrap());
    }
}
