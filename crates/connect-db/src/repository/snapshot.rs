//! # Connection Snapshot Repository
//!
//! Stores the last successfully parsed payload of each connection. Payloads
//! are written in the wire shape so they re-parse through the same
//! `Connection::parse` path as a fresh fetch.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

use connect_core::Connection;

use crate::error::{DbError, DbResult};

/// A connection together with the time it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub connection: Connection,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct SnapshotRow {
    connection_id: String,
    payload: String,
    fetched_at: DateTime<Utc>,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = DbError;

    fn try_from(row: SnapshotRow) -> Result<Self, Self::Error> {
        let connection = Connection::parse(row.payload.as_bytes())
            .map_err(|e| DbError::corrupt("snapshot", row.connection_id, e))?;

        Ok(Snapshot {
            connection,
            fetched_at: row.fetched_at,
        })
    }
}

/// Repository for connection snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotRepository {
    pool: SqlitePool,
}

impl SnapshotRepository {
    /// Creates a new SnapshotRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SnapshotRepository { pool }
    }

    /// Gets the snapshot of one connection.
    pub async fn get(&self, connection_id: &str) -> DbResult<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT connection_id, payload, fetched_at
            FROM connection_snapshots
            WHERE connection_id = ?1
            "#,
        )
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Snapshot::try_from).transpose()
    }

    /// Lists every stored snapshot, oldest first.
    pub async fn list(&self) -> DbResult<Vec<Snapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT connection_id, payload, fetched_at
            FROM connection_snapshots
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Snapshot::try_from).collect()
    }

    /// Inserts or replaces the snapshot of `connection`.
    pub async fn upsert(&self, connection: &Connection) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_in(&mut conn, connection).await
    }

    /// Deletes a snapshot. Returns true if a row was deleted.
    pub async fn delete(&self, connection_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM connection_snapshots WHERE connection_id = ?1")
            .bind(connection_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub(crate) async fn upsert_in(
        conn: &mut SqliteConnection,
        connection: &Connection,
    ) -> DbResult<()> {
        let payload = connection
            .to_json()
            .map_err(|e| DbError::corrupt("snapshot", connection.id(), e))?;

        sqlx::query(
            r#"
            INSERT INTO connection_snapshots (connection_id, payload, fetched_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(connection_id) DO UPDATE SET
                payload = excluded.payload,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(connection.id())
        .bind(payload)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
