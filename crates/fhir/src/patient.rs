//! FHIR-aligned patient wire model and translation helpers.
//!
//! Responsibilities:
//! - Define the public domain-level [`PatientData`] record
//! - Define a strict wire model for (de)serialisation of Patient JSON documents
//! - Enforce the registration rules: at least one identifier and at least one name
//!
//! Notes:
//! - Patients are written once at registration and never updated
//! - `createdAt`/`updatedAt` are MDR bookkeeping fields that sit beside the FHIR elements
//! - Standard R4 Patient elements MDR does not model (`meta`, `contact`, `deceased[x]`, ...)
//!   are carried through verbatim; any other top-level key is rejected

use crate::datatypes::{Address, AdministrativeGender, ContactPoint, HumanName, Identifier};
use crate::validation::{deserialize_wire, format_instant, is_fhir_date, parse_instant};
use crate::{FhirError, FhirResult};
use chrono::{DateTime, Utc};
use mdr_uuid::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

const RESOURCE_TYPE: &str = "Patient";

/// Keys the server assigns; a registration payload may carry them but they are discarded.
const SERVER_ASSIGNED: [&str; 3] = ["id", "createdAt", "updatedAt"];

/// R4 Patient elements kept verbatim in [`PatientData::other_elements`].
const PASS_THROUGH_ELEMENTS: [&str; 18] = [
    "meta",
    "implicitRules",
    "language",
    "text",
    "contained",
    "extension",
    "modifierExtension",
    "deceasedBoolean",
    "deceasedDateTime",
    "maritalStatus",
    "multipleBirthBoolean",
    "multipleBirthInteger",
    "photo",
    "contact",
    "communication",
    "generalPractitioner",
    "managingOrganization",
    "link",
];

/// Primitive elements that may carry a `_<name>` sibling with their id and extensions.
const PRIMITIVE_ELEMENTS: [&str; 9] = [
    "implicitRules",
    "language",
    "active",
    "gender",
    "birthDate",
    "deceasedBoolean",
    "deceasedDateTime",
    "multipleBirthBoolean",
    "multipleBirthInteger",
];

// ============================================================================
// Public domain-level types
// ============================================================================

/// Domain-level carrier for a patient registration.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PatientData {
    /// Record identity; `None` until the patient has been stored.
    pub id: Option<RecordId>,

    /// Business identifiers (national ID, passport, ...). Never empty once validated.
    pub identifiers: Vec<Identifier>,

    /// Names. Never empty once validated.
    pub names: Vec<HumanName>,

    pub telecom: Vec<ContactPoint>,

    pub gender: Option<AdministrativeGender>,

    /// FHIR `date`: `YYYY`, `YYYY-MM` or `YYYY-MM-DD`.
    pub birth_date: Option<String>,

    pub addresses: Vec<Address>,

    pub active: Option<bool>,

    pub created_at: Option<DateTime<Utc>>,

    pub updated_at: Option<DateTime<Utc>>,

    /// Other standard Patient elements, keyed by their JSON name and stored as sent.
    pub other_elements: BTreeMap<String, Value>,
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient resource operations.
///
/// This is a zero-sized type used for namespacing patient-related operations.
pub struct Patient;

impl Patient {
    /// Parse and validate a Patient submitted for registration.
    ///
    /// `id`, `createdAt` and `updatedAt` are server-assigned: whatever the client sends for them
    /// (an HL7 example id such as `"example"`, say) is dropped before parsing, so the result
    /// never carries them.
    ///
    /// # Errors
    ///
    /// As [`Patient::parse`], minus the id and timestamp checks.
    pub fn parse_registration(json: &Value) -> FhirResult<PatientData> {
        match json.as_object() {
            Some(object) => {
                let submitted: Map<String, Value> = object
                    .iter()
                    .filter(|(key, _)| !SERVER_ASSIGNED.contains(&key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                Self::parse(&Value::Object(submitted))
            }
            None => Self::parse(json),
        }
    }

    /// Parse and validate a stored Patient document.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the JSON does not match the wire schema (wrong types, bad codes, keys that are not
    ///   R4 Patient elements); the message carries the path of the failing field,
    ///   e.g. `name[0].given`,
    /// - `resourceType` is present and is not `"Patient"`,
    /// - `identifier` or `name` is missing or empty ([`FhirError::MissingField`]),
    /// - a name carries no text, family or given part,
    /// - `birthDate` is not a FHIR date, or `id`/timestamps are malformed.
    pub fn parse(json: &Value) -> FhirResult<PatientData> {
        let wire: PatientWire = deserialize_wire(RESOURCE_TYPE, json)?;
        check_other_elements(&wire.other)?;

        if let Some(resource_type) = wire.resource_type.as_deref() {
            if resource_type != RESOURCE_TYPE {
                return Err(FhirError::InvalidInput(format!(
                    "Expected resourceType 'Patient', got '{resource_type}'"
                )));
            }
        }

        let data = wire_to_domain(wire)?;
        validate_required(&data)?;
        Ok(data)
    }

    /// Render a patient as its JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] if serialisation fails.
    pub fn render(data: &PatientData) -> FhirResult<Value> {
        serde_json::to_value(domain_to_wire(data))
            .map_err(|e| FhirError::Translation(format!("Failed to serialise patient: {e}")))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
struct PatientWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    resource_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    active: Option<bool>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    identifier: Vec<Identifier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    name: Vec<HumanName>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    telecom: Vec<ContactPoint>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    gender: Option<AdministrativeGender>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    birth_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    address: Vec<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,

    /// Everything else; checked by `check_other_elements`.
    #[serde(flatten)]
    other: BTreeMap<String, Value>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn wire_to_domain(wire: PatientWire) -> FhirResult<PatientData> {
    let id = wire
        .id
        .as_deref()
        .map(|raw| {
            RecordId::parse(raw).map_err(|e| FhirError::InvalidUuid(format!("Patient.id: {e}")))
        })
        .transpose()?;

    if let Some(birth_date) = wire.birth_date.as_deref() {
        if !is_fhir_date(birth_date) {
            return Err(FhirError::InvalidInput(format!(
                "birthDate must be YYYY, YYYY-MM or YYYY-MM-DD, got '{birth_date}'"
            )));
        }
    }

    let created_at = wire
        .created_at
        .as_deref()
        .map(|raw| parse_instant("createdAt", raw))
        .transpose()?;
    let updated_at = wire
        .updated_at
        .as_deref()
        .map(|raw| parse_instant("updatedAt", raw))
        .transpose()?;

    Ok(PatientData {
        id,
        identifiers: wire.identifier,
        names: wire.name,
        telecom: wire.telecom,
        gender: wire.gender,
        birth_date: wire.birth_date,
        addresses: wire.address,
        active: wire.active,
        created_at,
        updated_at,
        other_elements: wire.other,
    })
}

fn domain_to_wire(data: &PatientData) -> PatientWire {
    PatientWire {
        resource_type: Some(RESOURCE_TYPE.to_string()),
        id: data.id.as_ref().map(RecordId::to_string),
        active: data.active,
        identifier: data.identifiers.clone(),
        name: data.names.clone(),
        telecom: data.telecom.clone(),
        gender: data.gender,
        birth_date: data.birth_date.clone(),
        address: data.addresses.clone(),
        created_at: data.created_at.as_ref().map(format_instant),
        updated_at: data.updated_at.as_ref().map(format_instant),
        other: data.other_elements.clone(),
    }
}

fn check_other_elements(other: &BTreeMap<String, Value>) -> FhirResult<()> {
    let known = |key: &str| match key.strip_prefix('_') {
        Some(primitive) => PRIMITIVE_ELEMENTS.contains(&primitive),
        None => PASS_THROUGH_ELEMENTS.contains(&key),
    };

    match other.keys().find(|key| !known(key)) {
        Some(key) => Err(FhirError::Translation(format!(
            "{RESOURCE_TYPE} schema mismatch at {key}: unknown field `{key}`"
        ))),
        None => Ok(()),
    }
}

fn validate_required(data: &PatientData) -> FhirResult<()> {
    if data.identifiers.is_empty() {
        return Err(FhirError::MissingField("identifier"));
    }
    if data.names.is_empty() {
        return Err(FhirError::MissingField("name"));
    }
    if let Some(index) = data.names.iter().position(HumanName::is_blank) {
        return Err(FhirError::InvalidInput(format!(
            "name[{index}] must carry text, family or given"
        )));
    }
    Ok(())
}
