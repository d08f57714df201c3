//! Axum router construction for the read API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::{AlertArchive, AppState};

/// Build the complete router.
///
/// CORS allows any origin; the API is read-only apart from the health
/// kill-switches.
pub fn build_router<A: AlertArchive>(state: Arc<AppState<A>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Live state
        .route("/api/worlds/{world}/zones/{zone}", get(handlers::get_zone::<A>))
        .route(
            "/api/worlds/{world}/zones/{zone}/facilities/{facility}",
            get(handlers::get_facility_owner::<A>),
        )
        .route("/api/worlds/{world}/zones/{zone}/alert", get(handlers::get_zone_alert::<A>))
        .route(
            "/api/worlds/{world}/characters/{character}/session",
            get(handlers::get_open_session::<A>),
        )
        // History
        .route("/api/alerts/{id}", get(handlers::get_alert::<A>))
        .route("/api/alerts/{id}/participants", get(handlers::get_alert_participants::<A>))
        // Health
        .route("/api/health", get(handlers::get_health::<A>))
        .route("/api/health/{name}/enable", post(handlers::enable_service::<A>))
        .route("/api/health/{name}/disable", post(handlers::disable_service::<A>))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
