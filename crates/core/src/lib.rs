//! # MDR Core
//!
//! Core record logic for the MDR medication dispense service.
//!
//! This crate contains the data operations only:
//! - Patient registration (deduplicated by business identifier) and lookup
//! - Medication dispense registration and per-patient history
//! - The document-store seam and its MongoDB / in-memory backends
//!
//! **No API concerns**: HTTP routing, status codes and OpenAPI belong in `api-rest` and
//! `api-shared`.

pub mod config;
pub mod constants;
pub mod error;
pub mod repositories;
pub mod store;

pub use config::{database_name_from_env_value, CoreConfig, StoreBackend};
pub use error::{RecordError, RecordResult, StoreError, StoreResult};
pub use repositories::medications::MedicationService;
pub use repositories::patients::{PatientCreation, PatientService};
pub use store::{connect, Collections, DocumentCollection};

pub use fhir::{MedicationDispenseData, PatientData, RecordId};
