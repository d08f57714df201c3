//! REST endpoint handlers.
//!
//! Live reads go to the in-memory state machines; alert history and
//! participation go to the [`AlertArchive`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/worlds/{world}/zones/{zone}` | Zone ownership snapshot |
//! | `GET` | `/api/worlds/{world}/zones/{zone}/facilities/{facility}` | Facility owner |
//! | `GET` | `/api/worlds/{world}/zones/{zone}/alert` | Running alert |
//! | `GET` | `/api/worlds/{world}/characters/{character}/session` | Open session |
//! | `GET` | `/api/alerts/{id}` | Persisted alert |
//! | `GET` | `/api/alerts/{id}/participants` | Sessions overlapping a finished alert |
//! | `GET` | `/api/health` | Loop health |
//! | `POST` | `/api/health/{name}/enable` | Re-enable a loop |
//! | `POST` | `/api/health/{name}/disable` | Disable a loop |

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use frontline_types::{AlertId, CharacterId, FacilityId, ServiceHealthEntry, WorldId, ZoneId};

use crate::error::ObserverError;
use crate::state::{AlertArchive, AppState};

// ---------------------------------------------------------------------------
// Live state
// ---------------------------------------------------------------------------

/// Ownership of every facility in a zone.
pub async fn get_zone<A: AlertArchive>(
    State(state): State<Arc<AppState<A>>>,
    Path((world, zone)): Path<(u16, u32)>,
) -> Result<impl IntoResponse, ObserverError> {
    let (world, zone) = (WorldId::new(world), ZoneId::new(zone));
    let snapshot = state.store.zone_snapshot(world, zone)?;
    if snapshot.is_empty() {
        return Err(ObserverError::NotFound(format!("zone {zone} on world {world}")));
    }

    let facilities: Vec<serde_json::Value> = snapshot
        .iter()
        .map(|(facility, faction)| {
            serde_json::json!({
                "facility_id": facility,
                "faction_id": faction,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "world_id": world,
        "zone_id": zone,
        "count": facilities.len(),
        "facilities": facilities,
    })))
}

/// Current owner of one facility.
pub async fn get_facility_owner<A: AlertArchive>(
    State(state): State<Arc<AppState<A>>>,
    Path((world, zone, facility)): Path<(u16, u32, u32)>,
) -> Result<impl IntoResponse, ObserverError> {
    let (world, zone, facility) = (WorldId::new(world), ZoneId::new(zone), FacilityId::new(facility));
    let owner = state
        .store
        .owner(world, zone, facility)?
        .ok_or_else(|| ObserverError::NotFound(format!("facility {facility} in zone {zone}")))?;

    Ok(Json(serde_json::json!({
        "world_id": world,
        "zone_id": zone,
        "facility_id": facility,
        "faction_id": owner,
    })))
}

/// The alert running in a zone.
pub async fn get_zone_alert<A: AlertArchive>(
    State(state): State<Arc<AppState<A>>>,
    Path((world, zone)): Path<(u16, u32)>,
) -> Result<impl IntoResponse, ObserverError> {
    let (world, zone) = (WorldId::new(world), ZoneId::new(zone));
    state
        .alerts
        .current_alert(world, zone)
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(format!("no running alert in zone {zone}")))
}

/// A character's open session.
pub async fn get_open_session<A: AlertArchive>(
    State(state): State<Arc<AppState<A>>>,
    Path((world, character)): Path<(u16, u64)>,
) -> Result<impl IntoResponse, ObserverError> {
    let (world, character) = (WorldId::new(world), CharacterId::new(character));
    state
        .sessions
        .open_session(character, world)
        .map(Json)
        .ok_or_else(|| ObserverError::NotFound(format!("no open session for {character}")))
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// A persisted alert, with whether it has finished.
pub async fn get_alert<A: AlertArchive>(
    State(state): State<Arc<AppState<A>>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ObserverError> {
    let alert = state
        .archive()?
        .alert(AlertId::new(id))
        .await?
        .ok_or_else(|| ObserverError::NotFound(format!("alert {id}")))?;
    let finished = state.alerts.is_alert_finished(&alert);

    Ok(Json(serde_json::json!({
        "alert": alert,
        "ends_at": alert.ends_at(),
        "finished": finished,
    })))
}

/// Characters present during a finished alert.
///
/// Rejected with 400 while the alert is still running. Sessions that are
/// still open and began before the alert ended count as participants.
///
/// Sessions record a world but not a zone, so every character connected to
/// the alert's world during the alert is counted. The response carries
/// `"scope": "world"` to say so.
pub async fn get_alert_participants<A: AlertArchive>(
    State(state): State<Arc<AppState<A>>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ObserverError> {
    let archive = state.archive()?;
    let alert = archive
        .alert(AlertId::new(id))
        .await?
        .ok_or_else(|| ObserverError::NotFound(format!("alert {id}")))?;
    state.alerts.ensure_finished(&alert)?;

    let (from, to) = (alert.started_at, alert.ends_at());
    let mut sessions = archive.sessions_between(alert.world_id, from, to).await?;
    sessions.extend(
        state
            .sessions
            .open_sessions(alert.world_id)
            .into_iter()
            .filter(|s| s.overlaps(from, to)),
    );
    let characters: BTreeSet<CharacterId> = sessions.iter().map(|s| s.character_id).collect();

    Ok(Json(serde_json::json!({
        "alert_id": id,
        "world_id": alert.world_id,
        "zone_id": alert.zone_id,
        "scope": "world",
        "count": characters.len(),
        "characters": characters,
        "sessions": sessions,
    })))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Every registered loop's health entry.
pub async fn get_health<A: AlertArchive>(State(state): State<Arc<AppState<A>>>) -> impl IntoResponse {
    let services = state.health.all();
    Json(serde_json::json!({
        "count": services.len(),
        "services": services,
    }))
}

/// Re-enable a loop.
pub async fn enable_service<A: AlertArchive>(
    State(state): State<Arc<AppState<A>>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    set_enabled(&state, &name, true)
}

/// Disable a loop. It skips work until re-enabled.
pub async fn disable_service<A: AlertArchive>(
    State(state): State<Arc<AppState<A>>>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    set_enabled(&state, &name, false)
}

fn set_enabled<A: AlertArchive>(
    state: &AppState<A>,
    name: &str,
    enabled: bool,
) -> Result<Json<ServiceHealthEntry>, ObserverError> {
    let entry = state
        .health
        .set_enabled(name, enabled)
        .ok_or_else(|| ObserverError::NotFound(format!("service {name}")))?;
    tracing::info!(service = name, enabled, "service toggled via API");
    Ok(Json(entry))
}
