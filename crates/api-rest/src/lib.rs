//! # API REST
//!
//! REST API implementation for MDR.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (status codes, error bodies, CORS)
//!
//! Uses `api-shared` for the response envelopes and `mdr-core` for the record services.

#![warn(rust_2018_idioms)]

mod error;
mod handlers;

use axum::{
    http::{HeaderValue, Method},
    routing::get,
    Router,
};
use mdr_core::{Collections, MedicationService, PatientService};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use error::ApiError;

/// Application state shared by every request handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub patients: PatientService,
    pub medications: MedicationService,
}

impl AppState {
    pub fn new(collections: &Collections) -> Self {
        Self {
            patients: PatientService::new(collections),
            medications: MedicationService::new(collections),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_patient_by_identifier,
        handlers::create_patient,
        handlers::get_patient,
        handlers::register_dispense,
        handlers::list_dispenses,
    ),
    components(schemas(
        api_shared::HealthRes,
        api_shared::CreatePatientRes,
        api_shared::DispenseCreatedRes,
        api_shared::ErrorRes,
    ))
)]
pub struct ApiDoc;

/// Build the MDR router: record endpoints, health check and Swagger UI.
pub fn router(state: AppState, cors: CorsLayer) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/patient",
            get(handlers::get_patient_by_identifier).post(handlers::create_patient),
        )
        .route("/patient/:id", get(handlers::get_patient))
        .route(
            "/patient/:id/medications",
            get(handlers::list_dispenses).post(handlers::register_dispense),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .with_state(state)
}

/// CORS policy from the `ALLOWED_ORIGINS` value (comma separated).
///
/// Unset or blank means any origin is allowed. Entries that are not valid header values are
/// skipped with a warning.
pub fn cors_layer_from_env_value(value: Option<String>) -> CorsLayer {
    let origins: Vec<HeaderValue> = value
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(header) => Some(header),
            Err(_) => {
                tracing::warn!(origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    tracing::info!(count = origins.len(), "restricting CORS origins");
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}
