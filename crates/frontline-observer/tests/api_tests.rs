//! Integration tests for the read API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. Durable history comes from an in-memory archive.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use frontline_core::{Clock, FrontlineConfig, FrontlineCore, ManualClock, PersistQueue};
use frontline_observer::router::build_router;
use frontline_observer::{AlertArchive, AppState, ObserverError};
use frontline_types::{
    Alert, AlertId, AlertReason, CharacterId, ControlEvent, FacilityId, FacilityMetadata,
    FactionId, PresenceEvent, Session, WorldId, ZoneId,
};
use frontline_world::FacilityCatalog;
use serde_json::Value;
use tower::ServiceExt;

const WORLD: WorldId = WorldId::new(1);
const ZONE: ZoneId = ZoneId::new(2);

#[derive(Debug, Default)]
struct MemoryArchive {
    alerts: Mutex<BTreeMap<AlertId, Alert>>,
    sessions: Mutex<Vec<Session>>,
}

/// Archive handle owned by the app state; the fixture keeps the other `Arc`.
struct SharedArchive(Arc<MemoryArchive>);

impl AlertArchive for SharedArchive {
    async fn alert(&self, id: AlertId) -> Result<Option<Alert>, ObserverError> {
        Ok(self.0.alerts.lock().unwrap().get(&id).cloned())
    }

    async fn sessions_between(
        &self,
        world: WorldId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>, ObserverError> {
        Ok(self
            .0
            .sessions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.world_id == world && s.overlaps(from, to))
            .cloned()
            .collect())
    }
}

struct Fixture {
    core: FrontlineCore,
    clock: Arc<ManualClock>,
    archive: Arc<MemoryArchive>,
    _queue: PersistQueue,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 20, 0, 0).unwrap()
}

fn running_alert() -> Alert {
    Alert {
        id: Some(AlertId::new(7)),
        world_id: WORLD,
        zone_id: ZONE,
        started_at: t0(),
        duration_secs: 900,
        reason: AlertReason::Instability {
            events: 13,
            population: 96,
        },
    }
}

fn fixture() -> Fixture {
    let facilities = [10, 11, 12]
        .into_iter()
        .map(|id| FacilityMetadata {
            facility_id: FacilityId::new(id),
            zone_id: ZONE,
            name: format!("Base {id}"),
            type_id: 2,
            type_name: "Amp Station".to_owned(),
        })
        .collect();
    let catalog = FacilityCatalog::from_parts(facilities, &[]);
    let clock = Arc::new(ManualClock::new(t0() + TimeDelta::minutes(1)));
    let (core, queue) = FrontlineCore::new(
        FrontlineConfig::default(),
        catalog,
        Arc::clone(&clock) as Arc<dyn Clock>,
    );

    core.tracker
        .apply(&ControlEvent {
            world_id: WORLD,
            zone_id: ZONE,
            facility_id: FacilityId::new(10),
            faction_id: FactionId::new(2),
            timestamp: t0(),
        })
        .unwrap();
    core.sessions.on_login(&PresenceEvent {
        character_id: CharacterId::new(500),
        world_id: WORLD,
        timestamp: t0() - TimeDelta::minutes(30),
    });
    assert!(core.alerts.restore(running_alert()));

    let archive = Arc::new(MemoryArchive::default());
    archive
        .alerts
        .lock()
        .unwrap()
        .insert(AlertId::new(7), running_alert());
    archive.sessions.lock().unwrap().push(Session {
        character_id: CharacterId::new(400),
        world_id: WORLD,
        start: t0() - TimeDelta::minutes(10),
        end: Some(t0() + TimeDelta::minutes(5)),
        start_inferred: false,
    });

    Fixture {
        core,
        clock,
        archive,
        _queue: queue,
    }
}

impl Fixture {
    fn router(&self) -> axum::Router {
        let state = AppState::new(&self.core, Some(SharedArchive(Arc::clone(&self.archive))));
        build_router(Arc::new(state))
    }
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(router: axum::Router, path: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

async fn post(router: axum::Router, path: &str) -> (StatusCode, Value) {
    let response = router
        .oneshot(Request::post(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

// =========================================================================
// Live state
// =========================================================================

#[tokio::test]
async fn zone_snapshot_lists_every_facility() {
    let fx = fixture();
    let (status, json) = get(fx.router(), "/api/worlds/1/zones/2").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 3);
    assert_eq!(json["facilities"][0]["facility_id"], 10);
    assert_eq!(json["facilities"][0]["faction_id"], 2);
    assert_eq!(json["facilities"][1]["faction_id"], 0);
}

#[tokio::test]
async fn unknown_zone_is_not_found() {
    let fx = fixture();
    let (status, json) = get(fx.router(), "/api/worlds/1/zones/99").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["status"], 404);
}

#[tokio::test]
async fn facility_owner_is_served() {
    let fx = fixture();
    let (status, json) = get(fx.router(), "/api/worlds/1/zones/2/facilities/10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["faction_id"], 2);

    let (status, _) = get(fx.router(), "/api/worlds/1/zones/2/facilities/4040").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn running_alert_is_served_per_zone() {
    let fx = fixture();
    let (status, json) = get(fx.router(), "/api/worlds/1/zones/2/alert").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], 7);
    assert_eq!(json["duration_secs"], 900);

    let (status, _) = get(fx.router(), "/api/worlds/1/zones/3/alert").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn open_session_is_served() {
    let fx = fixture();
    let (status, json) = get(fx.router(), "/api/worlds/1/characters/500/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["character_id"], 500);
    assert!(json["end"].is_null());

    let (status, _) = get(fx.router(), "/api/worlds/1/characters/501/session").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =========================================================================
// History
// =========================================================================

#[tokio::test]
async fn persisted_alert_reports_finished_flag() {
    let fx = fixture();
    let (status, json) = get(fx.router(), "/api/alerts/7").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["finished"], false);

    fx.clock.set(t0() + TimeDelta::seconds(900));
    let (_, json) = get(fx.router(), "/api/alerts/7").await;
    assert_eq!(json["finished"], true);
}

#[tokio::test]
async fn participants_are_rejected_while_alert_runs() {
    let fx = fixture();
    fx.clock.set(t0() + TimeDelta::seconds(899));
    let (status, json) = get(fx.router(), "/api/alerts/7/participants").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn participants_include_closed_and_open_sessions() {
    let fx = fixture();
    fx.clock.set(t0() + TimeDelta::seconds(900));
    let (status, json) = get(fx.router(), "/api/alerts/7/participants").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["characters"], serde_json::json!([400, 500]));
}

#[tokio::test]
async fn participants_are_scoped_to_the_alert_world() {
    let fx = fixture();
    fx.archive.sessions.lock().unwrap().push(Session {
        character_id: CharacterId::new(900),
        world_id: WorldId::new(17),
        start: t0(),
        end: Some(t0() + TimeDelta::minutes(5)),
        start_inferred: false,
    });
    fx.clock.set(t0() + TimeDelta::seconds(900));
    let (status, json) = get(fx.router(), "/api/alerts/7/participants").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["scope"], "world");
    assert_eq!(json["characters"], serde_json::json!([400, 500]));
}

#[tokio::test]
async fn unknown_alert_is_not_found() {
    let fx = fixture();
    let (status, _) = get(fx.router(), "/api/alerts/8").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn history_without_storage_is_unavailable() {
    let fx = fixture();
    let state = AppState::<SharedArchive>::new(&fx.core, None);
    let (status, _) = get(build_router(Arc::new(state)), "/api/alerts/7").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

// =========================================================================
// Health
// =========================================================================

#[tokio::test]
async fn health_kill_switch_round_trip() {
    let fx = fixture();

    let (status, json) = post(fx.router(), "/api/health/ingest/disable").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["enabled"], false);
    assert!(!fx.core.health.is_enabled("ingest"));

    let (_, json) = get(fx.router(), "/api/health").await;
    let ingest = json["services"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == "ingest")
        .unwrap();
    assert_eq!(ingest["enabled"], false);

    let (status, json) = post(fx.router(), "/api/health/ingest/enable").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["enabled"], true);
}

#[tokio::test]
async fn unknown_service_is_not_found() {
    let fx = fixture();
    let (status, _) = post(fx.router(), "/api/health/teleporter/disable").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
