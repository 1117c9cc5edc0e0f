//! Demo endpoints guarded by the rate limiter.
//!
//! - `GET /aircraft/{id}`
//! - `GET /regulations/{id}`
//! - `POST /check-compliance`

use axum::Json;
use axum::extract::{Path, State};
use chrono::Utc;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::models::{Aircraft, ComplianceCheckRequest, ComplianceCheckResponse, Regulation};
use crate::state::AppState;
use crate::validation::{validate_record_id, validate_regulation_ids};

/// Get an aircraft by id.
#[instrument(skip(state))]
pub async fn get_aircraft(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Aircraft>> {
    validate_record_id(&id, "Aircraft")?;

    state
        .catalog
        .aircraft(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Aircraft '{id}' not found")))
}

/// Get a regulation by id.
#[instrument(skip(state))]
pub async fn get_regulation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Regulation>> {
    validate_record_id(&id, "Regulation")?;

    state
        .catalog
        .regulation(&id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Regulation '{id}' not found")))
}

/// Check an aircraft against a list of regulations.
///
/// An empty `regulation_ids` checks every known regulation.
#[instrument(skip_all)]
pub async fn check_compliance(
    State(state): State<AppState>,
    Json(payload): Json<ComplianceCheckRequest>,
) -> AppResult<Json<ComplianceCheckResponse>> {
    validate_record_id(&payload.aircraft_id, "Aircraft")?;
    validate_regulation_ids(&payload.regulation_ids)?;

    let catalog = &state.catalog;
    let aircraft = catalog.aircraft(&payload.aircraft_id).ok_or_else(|| {
        AppError::NotFound(format!("Aircraft '{}' not found", payload.aircraft_id))
    })?;

    let regulation_ids = if payload.regulation_ids.is_empty() {
        catalog.regulation_ids().map(str::to_string).collect()
    } else {
        payload.regulation_ids
    };

    let findings = catalog
        .check(aircraft, &regulation_ids)
        .map_err(|id| AppError::NotFound(format!("Regulation '{id}' not found")))?;
    let compliant = findings.iter().all(|f| f.compliant);
    debug!(
        aircraft_id = %payload.aircraft_id,
        checked = findings.len(),
        compliant,
        "Compliance check complete"
    );

    Ok(Json(ComplianceCheckResponse {
        aircraft_id: payload.aircraft_id,
        compliant,
        findings,
        checked_at: Utc::now(),
    }))
}
