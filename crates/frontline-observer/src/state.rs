//! Shared application state for the read API.
//!
//! [`AppState`] holds handles to the live state machines and, optionally,
//! an [`AlertArchive`] for queries that need durable history. All live
//! reads take brief shared locks and return point-in-time copies.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use frontline_core::{AlertManager, FrontlineCore, ServiceHealthMonitor, SessionTracker};
use frontline_db::PostgresPool;
use frontline_types::{Alert, AlertId, Session, WorldId};
use frontline_world::MapStore;

use crate::error::ObserverError;

/// Durable alert and session history.
pub trait AlertArchive: Send + Sync + 'static {
    /// Look up a persisted alert.
    fn alert(&self, id: AlertId) -> impl Future<Output = Result<Option<Alert>, ObserverError>> + Send;

    /// Closed sessions on `world` overlapping `[from, to]`.
    fn sessions_between(
        &self,
        world: WorldId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<Session>, ObserverError>> + Send;
}

impl AlertArchive for PostgresPool {
    async fn alert(&self, id: AlertId) -> Result<Option<Alert>, ObserverError> {
        Ok(self.alerts().get_by_id(id).await?)
    }

    async fn sessions_between(
        &self,
        world: WorldId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>, ObserverError> {
        Ok(self.sessions().get_by_range(world, from, to).await?)
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
pub struct AppState<A = PostgresPool> {
    /// Ownership store.
    pub store: Arc<MapStore>,
    /// Alert lifecycle manager.
    pub alerts: Arc<AlertManager>,
    /// Session tracker.
    pub sessions: Arc<SessionTracker>,
    /// Loop health and kill-switches.
    pub health: Arc<ServiceHealthMonitor>,
    /// Durable history, absent when running without a database.
    pub archive: Option<A>,
}

impl<A> std::fmt::Debug for AppState<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("archive", &self.archive.is_some())
            .finish_non_exhaustive()
    }
}

impl<A: AlertArchive> AppState<A> {
    /// Build state from the runtime's shared handles.
    pub fn new(core: &FrontlineCore, archive: Option<A>) -> Self {
        Self {
            store: Arc::clone(&core.store),
            alerts: Arc::clone(&core.alerts),
            sessions: Arc::clone(&core.sessions),
            health: Arc::clone(&core.health),
            archive,
        }
    }

    /// The archive, or [`ObserverError::StorageUnavailable`].
    ///
    /// # Errors
    ///
    /// Returns [`ObserverError::StorageUnavailable`] when no archive is attached.
    pub const fn archive(&self) -> Result<&A, ObserverError> {
        match &self.archive {
            Some(archive) => Ok(archive),
            None => Err(ObserverError::StorageUnavailable),
        }
    }
}
