//! Alert persistence.
//!
//! An alert row is inserted when the alert opens and finalized when its
//! duration elapses. Rows are keyed naturally by `(world_id, zone_id,
//! started_at)`, so a retried insert returns the existing ID and a
//! finalize does not need the database ID.

use chrono::{DateTime, Utc};
use frontline_types::{Alert, AlertId, AlertReason};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::columns;
use crate::error::DbError;

/// Operations on the `alert` table.
#[derive(Debug)]
pub struct AlertStore<'a> {
    pool: &'a PgPool,
}

impl<'a> AlertStore<'a> {
    /// Create an alert store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a newly opened alert and return its ID. Inserting the same
    /// (world, zone, start) twice returns the first row's ID.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert(&self, alert: &Alert) -> Result<AlertId, DbError> {
        let id: i64 = sqlx::query_scalar(
            r"INSERT INTO alert (world_id, zone_id, started_at, duration_secs, reason)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (world_id, zone_id, started_at)
              DO UPDATE SET duration_secs = EXCLUDED.duration_secs
              RETURNING id",
        )
        .bind(columns::world(alert.world_id))
        .bind(columns::zone(alert.zone_id))
        .bind(alert.started_at)
        .bind(i32::try_from(alert.duration_secs).unwrap_or(i32::MAX))
        .bind(Json(alert.reason))
        .fetch_one(self.pool)
        .await?;

        tracing::debug!(alert_id = id, world = %alert.world_id, zone = %alert.zone_id, "Inserted alert");
        Ok(AlertId::new(id))
    }

    /// Mark an alert finished at its end time. Returns `false` if no
    /// matching unfinished row exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn finalize(&self, alert: &Alert) -> Result<bool, DbError> {
        let result = sqlx::query(
            r"UPDATE alert SET finished_at = $4
              WHERE world_id = $1 AND zone_id = $2 AND started_at = $3 AND finished_at IS NULL",
        )
        .bind(columns::world(alert.world_id))
        .bind(columns::zone(alert.zone_id))
        .bind(alert.started_at)
        .bind(alert.ends_at())
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Finalize every unfinished alert whose duration elapsed before `now`.
    /// Used at startup for alerts that expired while the process was down.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the update fails.
    pub async fn finalize_expired(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let result = sqlx::query(
            r"UPDATE alert
              SET finished_at = started_at + make_interval(secs => duration_secs)
              WHERE finished_at IS NULL
                AND started_at + make_interval(secs => duration_secs) <= $1",
        )
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Look up an alert by ID.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if the row does not fit the domain types.
    pub async fn get_by_id(&self, id: AlertId) -> Result<Option<Alert>, DbError> {
        let row = sqlx::query_as::<_, AlertRow>(
            r"SELECT id, world_id, zone_id, started_at, duration_secs, reason, finished_at
              FROM alert WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(self.pool)
        .await?;

        row.map(AlertRow::into_alert).transpose()
    }

    /// Alerts not yet finalized whose duration has not elapsed at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if a row does not fit the domain types.
    pub async fn get_unfinished(&self, now: DateTime<Utc>) -> Result<Vec<Alert>, DbError> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r"SELECT id, world_id, zone_id, started_at, duration_secs, reason, finished_at
              FROM alert
              WHERE finished_at IS NULL
                AND started_at + make_interval(secs => duration_secs) > $1
              ORDER BY started_at",
        )
        .bind(now)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(AlertRow::into_alert).collect()
    }
}

/// A row from the `alert` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    /// Database ID.
    pub id: i64,
    /// World of the alert.
    pub world_id: i32,
    /// Zone of the alert.
    pub zone_id: i64,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// Length in seconds.
    pub duration_secs: i32,
    /// Trigger reason.
    pub reason: Json<AlertReason>,
    /// Set once the alert has been finalized.
    pub finished_at: Option<DateTime<Utc>>,
}

impl AlertRow {
    /// Convert to the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] on out-of-range columns.
    pub fn into_alert(self) -> Result<Alert, DbError> {
        Ok(Alert {
            id: Some(AlertId::new(self.id)),
            world_id: columns::to_world(self.world_id)?,
            zone_id: columns::to_zone(self.zone_id)?,
            started_at: self.started_at,
            duration_secs: DbError::checked("duration_secs", self.duration_secs)?,
            reason: self.reason.0,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;
    use frontline_types::{WorldId, ZoneId};

    use super::*;

    #[test]
    fn row_converts_to_alert() {
        let row = AlertRow {
            id: 41,
            world_id: 1,
            zone_id: 2,
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap(),
            duration_secs: 900,
            reason: Json(AlertReason::Instability {
                events: 13,
                population: 120,
            }),
            finished_at: None,
        };
        let alert = row.into_alert().unwrap();
        assert_eq!(alert.id, Some(AlertId::new(41)));
        assert_eq!(alert.world_id, WorldId::new(1));
        assert_eq!(alert.zone_id, ZoneId::new(2));
        assert_eq!(alert.duration_secs, 900);
    }

    #[test]
    fn negative_duration_is_rejected() {
        let row = AlertRow {
            id: 1,
            world_id: 1,
            zone_id: 2,
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap(),
            duration_secs: -5,
            reason: Json(AlertReason::Restored),
            finished_at: None,
        };
        assert!(matches!(row.into_alert(), Err(DbError::Decode(_))));
    }
}
