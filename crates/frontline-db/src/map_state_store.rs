//! Map state history persistence.
//!
//! Each reconciliation pass appends one `zone_map_state` row per zone:
//! the authoritative owners and the population at that instant. Rows are
//! never updated.

use chrono::{DateTime, Utc};
use frontline_types::{FacilityId, FactionId, WorldId, ZoneId, ZoneMapState};
use sqlx::PgPool;
use sqlx::types::Json;

use crate::columns;
use crate::error::DbError;

/// Default batch size for map state inserts.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Operations on the `zone_map_state` table.
#[derive(Debug)]
pub struct MapStateStore<'a> {
    pool: &'a PgPool,
    batch_size: usize,
}

impl<'a> MapStateStore<'a> {
    /// Create a map state store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Batch-insert history rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn batch_insert(&self, states: &[ZoneMapState]) -> Result<(), DbError> {
        if states.is_empty() {
            return Ok(());
        }

        for chunk in states.chunks(self.batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;

            let len = chunk.len();
            let mut worlds = Vec::with_capacity(len);
            let mut zones = Vec::with_capacity(len);
            let mut recorded = Vec::with_capacity(len);
            let mut players: Vec<Option<i64>> = Vec::with_capacity(len);
            let mut owners = Vec::with_capacity(len);

            for state in chunk {
                worlds.push(columns::world(state.world_id));
                zones.push(columns::zone(state.zone_id));
                recorded.push(state.recorded_at);
                players.push(state.players.map(i64::from));
                owners.push(Json(state.owners.clone()));
            }

            sqlx::query(
                r"INSERT INTO zone_map_state (world_id, zone_id, recorded_at, players, owners)
                  SELECT * FROM UNNEST($1::INTEGER[], $2::BIGINT[], $3::TIMESTAMPTZ[], $4::BIGINT[], $5::JSONB[])",
            )
            .bind(&worlds)
            .bind(&zones)
            .bind(&recorded)
            .bind(&players)
            .bind(&owners)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        tracing::debug!(count = states.len(), "Inserted map states (batch UNNEST)");
        Ok(())
    }

    /// History of one zone recorded within `[from, to]`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if a row does not fit the domain types.
    pub async fn get_by_zone(
        &self,
        world: WorldId,
        zone: ZoneId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ZoneMapState>, DbError> {
        let rows = sqlx::query_as::<_, MapStateRow>(
            r"SELECT world_id, zone_id, recorded_at, players, owners
              FROM zone_map_state
              WHERE world_id = $1 AND zone_id = $2 AND recorded_at BETWEEN $3 AND $4
              ORDER BY recorded_at, id",
        )
        .bind(columns::world(world))
        .bind(columns::zone(zone))
        .bind(from)
        .bind(to)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(MapStateRow::into_map_state).collect()
    }
}

/// A row from the `zone_map_state` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MapStateRow {
    /// World ID.
    pub world_id: i32,
    /// Zone ID.
    pub zone_id: i64,
    /// When the pass ran.
    pub recorded_at: DateTime<Utc>,
    /// Zone population, if known.
    pub players: Option<i64>,
    /// Facility owners.
    pub owners: Json<Vec<(FacilityId, FactionId)>>,
}

impl MapStateRow {
    /// Convert to the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] on out-of-range columns.
    pub fn into_map_state(self) -> Result<ZoneMapState, DbError> {
        let players = self
            .players
            .map(|raw| DbError::checked::<_, u32>("players", raw))
            .transpose()?;
        Ok(ZoneMapState {
            world_id: columns::to_world(self.world_id)?,
            zone_id: columns::to_zone(self.zone_id)?,
            recorded_at: self.recorded_at,
            players,
            owners: self.owners.0,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use chrono::TimeZone;

    use super::*;

    fn row(players: Option<i64>) -> MapStateRow {
        MapStateRow {
            world_id: 17,
            zone_id: 2,
            recorded_at: Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap(),
            players,
            owners: Json(vec![(FacilityId::new(100), FactionId::new(3))]),
        }
    }

    #[test]
    fn row_converts_to_domain() {
        let state = row(Some(48)).into_map_state().unwrap();
        assert_eq!(state.world_id, WorldId::new(17));
        assert_eq!(state.players, Some(48));
        assert_eq!(state.owners, vec![(FacilityId::new(100), FactionId::new(3))]);
    }

    #[test]
    fn negative_population_is_rejected() {
        assert!(matches!(row(Some(-1)).into_map_state(), Err(DbError::Decode(_))));
    }
}
