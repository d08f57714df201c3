//! Facility reference data: metadata and lattice links.

use frontline_types::{FacilityLink, FacilityMetadata};
use sqlx::PgPool;

use crate::columns;
use crate::error::DbError;

/// Operations on the `facility` and `facility_link` tables.
#[derive(Debug)]
pub struct FacilityStore<'a> {
    pool: &'a PgPool,
}

impl<'a> FacilityStore<'a> {
    /// Create a facility store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert or update facility metadata in one statement.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the upsert fails.
    pub async fn upsert_all(&self, facilities: &[FacilityMetadata]) -> Result<u64, DbError> {
        if facilities.is_empty() {
            return Ok(0);
        }

        let len = facilities.len();
        let mut ids = Vec::with_capacity(len);
        let mut zones = Vec::with_capacity(len);
        let mut names = Vec::with_capacity(len);
        let mut type_ids = Vec::with_capacity(len);
        let mut type_names = Vec::with_capacity(len);
        for facility in facilities {
            ids.push(columns::facility(facility.facility_id));
            zones.push(columns::zone(facility.zone_id));
            names.push(facility.name.clone());
            type_ids.push(i64::from(facility.type_id));
            type_names.push(facility.type_name.clone());
        }

        let result = sqlx::query(
            r"INSERT INTO facility (facility_id, zone_id, name, type_id, type_name)
              SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::TEXT[], $4::BIGINT[], $5::TEXT[])
              ON CONFLICT (facility_id) DO UPDATE
              SET zone_id = EXCLUDED.zone_id,
                  name = EXCLUDED.name,
                  type_id = EXCLUDED.type_id,
                  type_name = EXCLUDED.type_name",
        )
        .bind(&ids)
        .bind(&zones)
        .bind(&names)
        .bind(&type_ids)
        .bind(&type_names)
        .execute(self.pool)
        .await?;

        tracing::debug!(count = len, "Upserted facilities");
        Ok(result.rows_affected())
    }

    /// All stored facility metadata.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if a row does not fit the domain types.
    pub async fn get_all(&self) -> Result<Vec<FacilityMetadata>, DbError> {
        let rows = sqlx::query_as::<_, FacilityRow>(
            r"SELECT facility_id, zone_id, name, type_id, type_name
              FROM facility ORDER BY facility_id",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(FacilityMetadata {
                    facility_id: columns::to_facility(row.facility_id)?,
                    zone_id: columns::to_zone(row.zone_id)?,
                    name: row.name,
                    type_id: DbError::checked("type_id", row.type_id)?,
                    type_name: row.type_name,
                })
            })
            .collect()
    }

    /// Insert links that are not yet stored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn upsert_links(&self, links: &[FacilityLink]) -> Result<u64, DbError> {
        if links.is_empty() {
            return Ok(0);
        }

        let zones: Vec<i64> = links.iter().map(|l| columns::zone(l.zone_id)).collect();
        let a: Vec<i64> = links.iter().map(|l| columns::facility(l.facility_a)).collect();
        let b: Vec<i64> = links.iter().map(|l| columns::facility(l.facility_b)).collect();

        let result = sqlx::query(
            r"INSERT INTO facility_link (zone_id, facility_a, facility_b)
              SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::BIGINT[])
              ON CONFLICT DO NOTHING",
        )
        .bind(&zones)
        .bind(&a)
        .bind(&b)
        .execute(self.pool)
        .await?;

        tracing::debug!(count = links.len(), "Upserted facility links");
        Ok(result.rows_affected())
    }

    /// All stored lattice links.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if a row does not fit the domain types.
    pub async fn get_links(&self) -> Result<Vec<FacilityLink>, DbError> {
        let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
            r"SELECT zone_id, facility_a, facility_b FROM facility_link
              ORDER BY zone_id, facility_a, facility_b",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|(zone, a, b)| {
                Ok(FacilityLink {
                    zone_id: columns::to_zone(zone)?,
                    facility_a: columns::to_facility(a)?,
                    facility_b: columns::to_facility(b)?,
                })
            })
            .collect()
    }
}

/// A row from the `facility` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FacilityRow {
    facility_id: i64,
    zone_id: i64,
    name: String,
    type_id: i64,
    type_name: String,
}
