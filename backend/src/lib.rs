pub mod cache;
pub mod channels;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod geodesy;
pub mod gpx_export;
pub mod grid;
pub mod land;
pub mod models;
pub mod pathfinder;
pub mod simplify;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;

use crate::engine::SafeRouteEngine;
use crate::error::RouteError;
use crate::gpx_export::encode_voyage_as_gpx;
use crate::models::{ApiError, SafeRouteRequest, SafeRouteResponse};
use crate::pathfinder::CancelFlag;

/// Itineraries longer than this are rejected outright.
pub const MAX_LEGS_PER_REQUEST: usize = 90;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SafeRouteEngine>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/trips/safe-route", post(safe_route_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

async fn safe_route_handler(
    State(state): State<AppState>,
    Json(req): Json<SafeRouteRequest>,
) -> Result<Json<SafeRouteResponse>, (StatusCode, Json<ApiError>)> {
    if req.days.is_empty() {
        return Err(bad_request("days must contain at least one leg"));
    }
    if req.days.len() > MAX_LEGS_PER_REQUEST {
        return Err(bad_request(&format!(
            "at most {MAX_LEGS_PER_REQUEST} legs per request, got {}",
            req.days.len()
        )));
    }

    // Dropping the handler (client went away) stops the search.
    let cancel = CancelFlag::new();
    let _guard = cancel.guard();

    let engine = state.engine.clone();
    let SafeRouteRequest {
        days,
        vessel,
        include_gpx,
    } = req;

    let (days, safe_route) = tokio::task::spawn_blocking(move || {
        let results = engine.route_legs(&days, &vessel, &cancel);
        (days, results)
    })
    .await
    .map_err(|err| internal_error(err.into()))?;

    let gpx_base64 = if include_gpx {
        Some(encode_voyage_as_gpx(&days, &safe_route).map_err(internal_error)?)
    } else {
        None
    };

    let failed = safe_route.iter().filter(|leg| leg.failed).count();
    tracing::info!(legs = safe_route.len(), failed, "safe route computed");

    Ok(Json(SafeRouteResponse {
        success: true,
        safe_route,
        gpx_base64,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    land_polygons: usize,
    buffer_km: f64,
    channel_fallback: bool,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let engine = &state.engine;
    Json(HealthResponse {
        status: "ok",
        land_polygons: engine.mask().polygon_count(),
        buffer_km: engine.mask().buffer_m() / 1000.0,
        channel_fallback: engine.has_fallback(),
    })
}

fn bad_request(message: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            message: message.to_owned(),
        }),
    )
}

fn internal_error(err: RouteError) -> (StatusCode, Json<ApiError>) {
    tracing::error!(error = %err, "safe route request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            message: err.to_string(),
        }),
    )
}
