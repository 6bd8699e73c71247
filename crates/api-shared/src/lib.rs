//! # API Shared
//!
//! Shared definitions for the MDR HTTP surface.
//!
//! Contains:
//! - Request/response DTOs with OpenAPI schemas (`dto` module)
//! - The `HealthService` behind `GET /health`
//!
//! FHIR resources themselves travel as plain JSON and are validated by the `fhir` crate; only
//! the small envelopes around them are defined here.

pub mod dto;
pub mod health;

pub use dto::{CreatePatientRes, DispenseCreatedRes, ErrorRes, HealthRes, IdentifierQuery};
pub use health::HealthService;
