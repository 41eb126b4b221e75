//! # Monitored Region Repository
//!
//! Persists the set of geofences the SDK believes are registered with the OS.
//! Identifiers are unique; inserting an existing identifier replaces its
//! geometry.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use connect_core::{Coordinate, Region};

use crate::error::{DbError, DbResult};

/// Raw `monitored_regions` row.
#[derive(Debug, FromRow)]
struct RegionRow {
    identifier: String,
    radius: f64,
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RegionRow> for Region {
    type Error = DbError;

    fn try_from(row: RegionRow) -> Result<Self, Self::Error> {
        let center = Coordinate::new(row.latitude, row.longitude)
            .map_err(|e| DbError::corrupt("region", &row.identifier, e))?;
        Region::new(row.identifier.clone(), row.radius, center)
            .map_err(|e| DbError::corrupt("region", row.identifier, e))
    }
}

/// Repository for the monitored region mirror.
#[derive(Debug, Clone)]
pub struct RegionRepository {
    pool: SqlitePool,
}

impl RegionRepository {
    /// Creates a new RegionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RegionRepository { pool }
    }

    /// Lists all monitored regions in registration order.
    pub async fn list(&self) -> DbResult<Vec<Region>> {
        let rows = sqlx::query_as::<_, RegionRow>(
            r#"
            SELECT identifier, radius, latitude, longitude
            FROM monitored_regions
            ORDER BY rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Region::try_from).collect()
    }

    /// Inserts a region, replacing any region with the same identifier.
    pub async fn insert(&self, region: &Region) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_in(&mut conn, region).await
    }

    /// Removes a region by identifier. Returns true if a row was deleted.
    pub async fn remove(&self, identifier: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM monitored_regions WHERE identifier = ?1")
            .bind(identifier)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Replaces the whole mirror with `regions` in one transaction.
    pub async fn replace_all(&self, regions: &[Region]) -> DbResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        Self::replace_all_in(&mut tx, regions).await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }

    /// Number of monitored regions.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM monitored_regions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    pub(crate) async fn insert_in(conn: &mut SqliteConnection, region: &Region) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO monitored_regions (identifier, radius, latitude, longitude, registered_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(identifier) DO UPDATE SET
                radius = excluded.radius,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                registered_at = excluded.registered_at
            "#,
        )
        .bind(&region.identifier)
        .bind(region.radius)
        .bind(region.center.latitude)
        .bind(region.center.longitude)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub(crate) async fn replace_all_in(
        conn: &mut SqliteConnection,
        regions: &[Region],
    ) -> DbResult<()> {
        sqlx::query("DELETE FROM monitored_regions")
            .execute(&mut *conn)
            .await?;

        for region in regions {
            Self::insert_in(conn, region).await?;
        }

        debug!(count = regions.len(), "Monitored regions replaced");
        Ok(())
    }
}
