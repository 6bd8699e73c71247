//! Resource validation entry point and shared wire helpers.
//!
//! [`validate`] is the single place inbound payloads are checked before anything is written.
//! It is a linear list of schema, presence and type checks; there are no cross-field rules.

use crate::medication_dispense::{DispenseRequest, MedicationDispense};
use crate::patient::{Patient, PatientData};
use crate::{FhirError, FhirResult};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Resource kinds MDR accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Patient,
    MedicationDispense,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::MedicationDispense => "MedicationDispense",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceKind::Patient),
            "MedicationDispense" => Ok(ResourceKind::MedicationDispense),
            other => Err(FhirError::InvalidInput(format!(
                "unsupported resource kind '{other}'"
            ))),
        }
    }
}

/// A payload that passed validation for its kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ValidatedRecord {
    Patient(PatientData),
    MedicationDispense(DispenseRequest),
}

/// Validate an inbound payload against the schema for `kind`.
///
/// - `Patient`: schema match, `identifier` and `name` present and non-empty. Server-assigned
///   `id`/`createdAt`/`updatedAt` are ignored.
/// - `MedicationDispense`: `medication`, `quantity`, `daysSupply` and `dosage` present (checked
///   in that order), numeric fields coercible to `f64`.
///
/// # Errors
///
/// Returns [`FhirError::MissingField`] naming the first absent required field, or
/// [`FhirError::Translation`] / [`FhirError::InvalidInput`] for malformed values.
pub fn validate(kind: ResourceKind, payload: &Value) -> FhirResult<ValidatedRecord> {
    match kind {
        ResourceKind::Patient => {
            Patient::parse_registration(payload).map(ValidatedRecord::Patient)
        }
        ResourceKind::MedicationDispense => {
            MedicationDispense::parse_request(payload).map(ValidatedRecord::MedicationDispense)
        }
    }
}

/// Render an instant the way every MDR document stores it.
///
/// Fixed microsecond precision with a `Z` suffix keeps lexical order equal to time order, which
/// is what the store relies on when sorting by timestamp.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Deserialize `value` into a wire struct, reporting the JSON path of the first mismatch.
pub(crate) fn deserialize_wire<T: DeserializeOwned>(resource: &str, value: &Value) -> FhirResult<T> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(|err| {
        let path = err.path().to_string();
        let source = err.into_inner();
        let path = if path.is_empty() || path == "." {
            "<root>"
        } else {
            path.as_str()
        };
        FhirError::Translation(format!("{resource} schema mismatch at {path}: {source}"))
    })
}

/// Parse an RFC 3339 instant held in `field`.
pub(crate) fn parse_instant(field: &str, raw: &str) -> FhirResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FhirError::InvalidInput(format!("{field} is not an RFC 3339 instant: {e}")))
}

/// True for FHIR `date` values: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
pub(crate) fn is_fhir_date(raw: &str) -> bool {
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    match raw.len() {
        4 => all_digits(raw),
        7 => NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").is_ok(),
        10 => NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok(),
        _ => false,
    }
}
