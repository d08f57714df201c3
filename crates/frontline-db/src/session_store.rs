//! Closed session persistence and participation queries.

use chrono::{DateTime, Utc};
use frontline_types::{Session, WorldId};
use sqlx::PgPool;

use crate::columns;
use crate::error::DbError;

/// Default batch size for session inserts.
const DEFAULT_BATCH_SIZE: usize = 500;

/// Operations on the `character_session` table.
#[derive(Debug)]
pub struct SessionStore<'a> {
    pool: &'a PgPool,
    batch_size: usize,
}

impl<'a> SessionStore<'a> {
    /// Create a session store bound to a connection pool.
    pub const fn new(pool: &'a PgPool) -> Self {
        Self {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Batch-insert sessions.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn batch_insert(&self, sessions: &[Session]) -> Result<(), DbError> {
        if sessions.is_empty() {
            return Ok(());
        }

        for chunk in sessions.chunks(self.batch_size.max(1)) {
            let mut tx = self.pool.begin().await?;

            let len = chunk.len();
            let mut characters = Vec::with_capacity(len);
            let mut worlds = Vec::with_capacity(len);
            let mut starts = Vec::with_capacity(len);
            let mut ends: Vec<Option<DateTime<Utc>>> = Vec::with_capacity(len);
            let mut inferred = Vec::with_capacity(len);

            for session in chunk {
                characters.push(columns::character(session.character_id));
                worlds.push(columns::world(session.world_id));
                starts.push(session.start);
                ends.push(session.end);
                inferred.push(session.start_inferred);
            }

            sqlx::query(
                r"INSERT INTO character_session (character_id, world_id, started_at, ended_at, start_inferred)
                  SELECT * FROM UNNEST($1::BIGINT[], $2::INTEGER[], $3::TIMESTAMPTZ[], $4::TIMESTAMPTZ[], $5::BOOLEAN[])",
            )
            .bind(&characters)
            .bind(&worlds)
            .bind(&starts)
            .bind(&ends)
            .bind(&inferred)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
        }

        tracing::debug!(count = sessions.len(), "Inserted sessions (batch UNNEST)");
        Ok(())
    }

    /// Sessions on `world` that overlap `[start, end]`. A session with no
    /// end is treated as still open.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails and
    /// [`DbError::Decode`] if a row does not fit the domain types.
    pub async fn get_by_range(
        &self,
        world: WorldId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, DbError> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r"SELECT character_id, world_id, started_at, ended_at, start_inferred
              FROM character_session
              WHERE world_id = $1
                AND started_at <= $3
                AND (ended_at IS NULL OR ended_at >= $2)
              ORDER BY started_at, character_id",
        )
        .bind(columns::world(world))
        .bind(start)
        .bind(end)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }
}

/// A row from the `character_session` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    /// Character ID.
    pub character_id: i64,
    /// World ID.
    pub world_id: i32,
    /// Session start.
    pub started_at: DateTime<Utc>,
    /// Session end.
    pub ended_at: Option<DateTime<Utc>>,
    /// Whether the start came from reconciliation rather than a login.
    pub start_inferred: bool,
}

impl SessionRow {
    /// Convert to the domain type.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] on out-of-range columns.
    pub fn into_session(self) -> Result<Session, DbError> {
        Ok(Session {
            character_id: columns::to_character(self.character_id)?,
            world_id: columns::to_world(self.world_id)?,
            start: self.started_at,
            end: self.ended_at,
            start_inferred: self.start_inferred,
        })
    }
}
