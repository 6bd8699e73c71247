//! FHIR wire/boundary support for MDR.
//!
//! This crate provides **wire models** and **validation** for the two resources MDR stores:
//! - `Patient` (registration documents)
//! - `MedicationDispense` (dispense events)
//!
//! This crate focuses on:
//! - a strict subset of the FHIR R4 JSON shapes (unknown keys are rejected)
//! - validation of inbound payloads, with the JSON path of the failing field in errors
//! - translation between domain-level records and the JSON documents that are persisted
//!
//! It has no knowledge of storage or HTTP; `mdr-core` and `api-rest` build on it.

pub mod datatypes;
pub mod medication_dispense;
pub mod patient;
pub mod validation;

// Re-export facades
pub use medication_dispense::MedicationDispense;
pub use patient::Patient;

// Re-export public domain-level types
pub use datatypes::{
    Address, AddressType, AddressUse, AdministrativeGender, CodeableConcept, Coding, ContactPoint,
    ContactPointSystem, ContactPointUse, HumanName, Identifier, IdentifierUse, NameUse, Period,
    Quantity, Reference,
};
pub use medication_dispense::{DispenseRequest, DispenseStatus, MedicationDispenseData};
pub use patient::PatientData;
pub use validation::{format_instant, validate, ResourceKind, ValidatedRecord};

pub use mdr_types::NonEmptyText;
pub use mdr_uuid::RecordId;

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
