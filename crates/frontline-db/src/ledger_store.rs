//! Control ledger persistence.
//!
//! Every applied capture or defense is appended to `facility_control`.
//! Rows are inserted in batches with a single multi-row UNNEST per chunk,
//! each chunk in its own transaction.

use chrono::{DateTime, Utc};
use frontline_types::{FacilityId, LedgerEntry, LedgerOutcome};
use sqlx::PgPool;

use crate::columns;
use crate::error::DbError;

/// Default batch size for ledger inserts.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Operations on the `facility_control` table.
#[derive(Debug)]
pub struct LedgerStore<'a> {
    pool: &'a PgPool,
    batch_size: usize,
}

impl<'a> LedgerStore<'a> {
    /// Create a ledger store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the batch size for inserts.
    #[must_use]
    pub const fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Batch-insert ledger entries.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn batch_insert(&self, entries: &[LedgerEntry]) -> Result<(), DbError> {
        if entries.is_empty() {
            return Ok(());
        }

        for chunk in entries.chunks(self.batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;

            let len = chunk.len();
            let mut facilities = Vec::with_capacity(len);
            let mut zones = Vec::with_capacity(len);
            let mut worlds = Vec::with_capacity(len);
            let mut outcomes = Vec::with_capacity(len);
            let mut factions = Vec::with_capacity(len);
            let mut previous = Vec::with_capacity(len);
            let mut timestamps = Vec::with_capacity(len);

            for entry in chunk {
                facilities.push(columns::facility(entry.facility_id));
                zones.push(columns::zone(entry.zone_id));
                worlds.push(columns::world(entry.world_id));
                outcomes.push(entry.outcome.as_str().to_owned());
                factions.push(columns::faction(entry.faction_id));
                previous.push(columns::faction(entry.previous_faction_id));
                timestamps.push(entry.timestamp);
            }

            sqlx::query(
                r"INSERT INTO facility_control (facility_id, zone_id, world_id, outcome, faction_id, previous_faction_id, occurred_at)
                  SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::INTEGER[], $4::control_outcome[], $5::SMALLINT[], $6::SMALLINT[], $7::TIMESTAMPTZ[])",
            )
            .bind(&facilities)
            .bind(&zones)
            .bind(&worlds)
            .bind(&outcomes)
            .bind(&factions)
            .bind(&previous)
            .bind(&timestamps)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        tracing::debug!(count = entries.len(), "Inserted ledger entries (batch UNNEST)");
        Ok(())
    }

    /// Ledger history for one facility, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if a row does not fit the domain types.
    pub async fn get_by_facility(&self, facility: FacilityId) -> Result<Vec<LedgerEntry>, DbError> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            r"SELECT facility_id, zone_id, world_id, outcome::TEXT AS outcome, faction_id, previous_faction_id, occurred_at
              FROM facility_control
              WHERE facility_id = $1
              ORDER BY occurred_at, id",
        )
        .bind(columns::facility(facility))
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(LedgerRow::into_entry).collect()
    }
}

/// A row from the `facility_control` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerRow {
    /// Facility that changed or held.
    pub facility_id: i64,
    /// Zone of the facility.
    pub zone_id: i64,
    /// World of the facility.
    pub world_id: i32,
    /// Outcome as text (cast from the `PostgreSQL` enum).
    pub outcome: String,
    /// Owner after the event.
    pub faction_id: i16,
    /// Owner before the event.
    pub previous_faction_id: i16,
    /// Event time.
    pub occurred_at: DateTime<Utc>,
}

impl LedgerRow {
    /// Convert to the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] on out-of-range columns or an unknown
    /// outcome.
    pub fn into_entry(self) -> Result<LedgerEntry, DbError> {
        let outcome = LedgerOutcome::parse(&self.outcome)
            .ok_or_else(|| DbError::Decode(format!("unknown outcome {}", self.outcome)))?;
        Ok(LedgerEntry {
            facility_id: columns::to_facility(self.facility_id)?,
            zone_id: columns::to_zone(self.zone_id)?,
            world_id: columns::to_world(self.world_id)?,
            outcome,
            faction_id: columns::to_faction(self.faction_id)?,
            previous_faction_id: columns::to_faction(self.previous_faction_id)?,
            timestamp: self.occurred_at,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;
    use frontline_types::{FactionId, WorldId, ZoneId};

    use super::*;

    fn row(outcome: &str) -> LedgerRow {
        LedgerRow {
            facility_id: 100,
            zone_id: 2,
            world_id: 17,
            outcome: outcome.to_owned(),
            faction_id: 2,
            previous_faction_id: 1,
            occurred_at: Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap(),
        }
    }

    #[test]
    fn row_converts_to_entry() {
        let entry = row("captured").into_entry().unwrap();
        assert_eq!(entry.facility_id, FacilityId::new(100));
        assert_eq!(entry.zone_id, ZoneId::new(2));
        assert_eq!(entry.world_id, WorldId::new(17));
        assert_eq!(entry.outcome, LedgerOutcome::Captured);
        assert_eq!(entry.previous_faction_id, FactionId::new(1));
    }

    #[test]
    fn unknown_outcome_is_a_decode_error() {
        assert!(matches!(row("razed").into_entry(), Err(DbError::Decode(_))));
    }
}
