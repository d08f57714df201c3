//! `PostgreSQL`-backed [`RecordSink`] for the persistence drain.

use frontline_core::{RecordSink, SinkError};
use frontline_db::{DbError, PostgresPool};
use frontline_types::{Alert, AlertId, LedgerEntry, Session, ZoneMapState};
use tracing::warn;

/// Writes derived records through the `frontline-db` stores.
#[derive(Debug, Clone)]
pub struct PgRecordSink {
    pool: PostgresPool,
}

impl PgRecordSink {
    /// Wrap a connected pool.
    pub const fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }
}

fn storage(e: &DbError) -> SinkError {
    SinkError::Storage(e.to_string())
}

impl RecordSink for PgRecordSink {
    async fn write_ledger(&self, entries: &[LedgerEntry]) -> Result<(), SinkError> {
        self.pool.ledger().batch_insert(entries).await.map_err(|e| storage(&e))
    }

    async fn write_sessions(&self, sessions: &[Session]) -> Result<(), SinkError> {
        self.pool.sessions().batch_insert(sessions).await.map_err(|e| storage(&e))
    }

    async fn write_map_states(&self, states: &[ZoneMapState]) -> Result<(), SinkError> {
        self.pool.map_states().batch_insert(states).await.map_err(|e| storage(&e))
    }

    async fn open_alert(&self, alert: &Alert) -> Result<AlertId, SinkError> {
        self.pool.alerts().insert(alert).await.map_err(|e| storage(&e))
    }

    async fn close_alert(&self, alert: &Alert) -> Result<(), SinkError> {
        let finalized = self.pool.alerts().finalize(alert).await.map_err(|e| storage(&e))?;
        if !finalized {
            warn!(
                world = %alert.world_id,
                zone = %alert.zone_id,
                started_at = %alert.started_at,
                "no unfinished alert row to finalize"
            );
        }
        Ok(())
    }
}
