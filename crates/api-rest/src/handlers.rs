//! Request handlers.

use crate::{ApiError, AppState};
use api_shared::{CreatePatientRes, DispenseCreatedRes, ErrorRes, HealthRes, HealthService, IdentifierQuery};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use fhir::{MedicationDispense, Patient};
use serde_json::Value;

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for monitoring and load balancers.
pub(crate) async fn health() -> Json<HealthRes> {
    Json(HealthService::check_health())
}

#[utoipa::path(
    get,
    path = "/patient",
    params(IdentifierQuery),
    responses(
        (status = 200, description = "Patient holding the identifier", body = Object),
        (status = 404, description = "No patient holds the identifier", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Look a patient up by business identifier.
#[axum::debug_handler]
pub(crate) async fn get_patient_by_identifier(
    State(state): State<AppState>,
    Query(query): Query<IdentifierQuery>,
) -> Result<Json<Value>, ApiError> {
    let patient = state
        .patients
        .get_patient_by_identifier(&query.system, &query.value)
        .await?;
    Ok(Json(Patient::render(&patient)?))
}

#[utoipa::path(
    post,
    path = "/patient",
    request_body(content = Object, description = "FHIR Patient resource", content_type = "application/json"),
    responses(
        (status = 201, description = "Patient registered, or already registered under one of its identifiers", body = CreatePatientRes),
        (status = 422, description = "Payload is not a valid Patient", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Register a patient.
///
/// Registering a patient whose identifier is already held returns the existing id.
#[axum::debug_handler]
pub(crate) async fn create_patient(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<CreatePatientRes>), ApiError> {
    let outcome = state.patients.create_patient(&payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatePatientRes {
            id: outcome.id().to_string(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/patient/{id}",
    params(("id" = String, Path, description = "Patient record id")),
    responses(
        (status = 200, description = "Patient resource", body = Object),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 500, description = "Malformed id or internal error", body = ErrorRes)
    )
)]
/// Fetch a patient by record id.
#[axum::debug_handler]
pub(crate) async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let patient = state.patients.get_patient_by_id(&id).await?;
    Ok(Json(Patient::render(&patient)?))
}

#[utoipa::path(
    post,
    path = "/patient/{id}/medications",
    params(("id" = String, Path, description = "Patient record id")),
    request_body(content = Object, description = "Dispense request: medication, quantity, daysSupply, dosage and optional details", content_type = "application/json"),
    responses(
        (status = 201, description = "Dispense registered", body = DispenseCreatedRes),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 422, description = "Payload is not a valid dispense request", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// Record a medication hand-over for a patient.
#[axum::debug_handler]
pub(crate) async fn register_dispense(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<Value>,
) -> Result<(StatusCode, Json<DispenseCreatedRes>), ApiError> {
    let medication_id = state.medications.register_dispense(&id, &payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(DispenseCreatedRes {
            medication_id: medication_id.to_string(),
            patient_id: id,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/patient/{id}/medications",
    params(("id" = String, Path, description = "Patient record id")),
    responses(
        (status = 200, description = "MedicationDispense resources, most recent first", body = [Object]),
        (status = 404, description = "Patient not found", body = ErrorRes),
        (status = 500, description = "Internal server error", body = ErrorRes)
    )
)]
/// A patient's dispense history.
#[axum::debug_handler]
pub(crate) async fn list_dispenses(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let dispenses = state.medications.list_dispenses_for_patient(&id).await?;
    let rendered = dispenses
        .iter()
        .map(MedicationDispense::render)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(rendered))
}
