//! FHIR-aligned MedicationDispense model.
//!
//! Two shapes live here:
//! - the *dispense request*: the flat payload a pharmacist submits (`medication`, `quantity`,
//!   `daysSupply`, `dosage`, ...), validated by [`MedicationDispense::parse_request`];
//! - the stored *MedicationDispense document*: the FHIR resource MDR builds from a request and
//!   persists, handled by [`MedicationDispense::render`] / [`MedicationDispense::parse`].
//!
//! Dispenses are immutable events; status is always `completed`.

use crate::datatypes::{CodeableConcept, Quantity};
use crate::validation::{deserialize_wire, format_instant, parse_instant};
use crate::{FhirError, FhirResult};
use chrono::{DateTime, Utc};
use mdr_types::NonEmptyText;
use mdr_uuid::RecordId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const RESOURCE_TYPE: &str = "MedicationDispense";
const PATIENT_REFERENCE_PREFIX: &str = "Patient/";

/// Unit recorded for `quantity` when the request does not name one.
pub const DEFAULT_QUANTITY_UNIT: &str = "units";
/// Unit recorded for `daysSupply` when the request does not name one.
pub const DEFAULT_DAYS_SUPPLY_UNIT: &str = "days";

// ============================================================================
// Public domain-level types
// ============================================================================

/// Dispense status. MDR only records completed hand-overs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispenseStatus {
    #[default]
    Completed,
}

/// A validated dispense request.
#[derive(Clone, Debug, PartialEq)]
pub struct DispenseRequest {
    pub medication: CodeableConcept,
    pub quantity: Quantity,
    pub days_supply: Quantity,
    pub dosage: NonEmptyText,
    pub performer: Option<String>,
    pub note: Option<String>,
    /// Reference to the authorising prescription, e.g. `MedicationRequest/123`.
    pub prescription: Option<String>,
    /// When the medication was handed over; the server clock is used when absent.
    pub when_handed_over: Option<DateTime<Utc>>,
}

/// A stored dispense event.
#[derive(Clone, Debug, PartialEq)]
pub struct MedicationDispenseData {
    pub id: RecordId,
    pub status: DispenseStatus,
    pub medication: CodeableConcept,
    /// The dispensed-to patient.
    pub subject: RecordId,
    pub quantity: Quantity,
    pub days_supply: Quantity,
    pub dosage_instruction: Vec<String>,
    pub performer: Option<String>,
    pub notes: Vec<String>,
    pub authorizing_prescription: Option<String>,
    pub when_handed_over: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl MedicationDispenseData {
    /// Build the record for `request`, dispensed to `subject`, created at `now`.
    pub fn from_request(
        id: RecordId,
        subject: RecordId,
        request: DispenseRequest,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: DispenseStatus::Completed,
            medication: request.medication,
            subject,
            quantity: request.quantity,
            days_supply: request.days_supply,
            dosage_instruction: vec![request.dosage.into_string()],
            performer: request.performer,
            notes: request.note.into_iter().collect(),
            authorizing_prescription: request.prescription,
            when_handed_over: request.when_handed_over.unwrap_or(now),
            created_at: now,
        }
    }
}

// ============================================================================
// Public MedicationDispense operations
// ============================================================================

/// MedicationDispense resource operations.
pub struct MedicationDispense;

impl MedicationDispense {
    /// The `subject.reference` value pointing at `patient_id`.
    pub fn subject_reference(patient_id: &RecordId) -> String {
        format!("{PATIENT_REFERENCE_PREFIX}{patient_id}")
    }

    /// Validate a dispense request payload.
    ///
    /// Required fields are checked in the order `medication`, `quantity`, `daysSupply`,
    /// `dosage`; the first one missing is reported. `medicationName` is accepted as an alias
    /// of `medication`, and `whenHandedOver` as an alias of `timestamp`.
    ///
    /// # Errors
    ///
    /// - [`FhirError::MissingField`] for an absent or blank required field,
    /// - [`FhirError::InvalidInput`] for a non-numeric `quantity`/`daysSupply` or a bad
    ///   timestamp,
    /// - [`FhirError::Translation`] for unknown keys or wrongly typed values.
    pub fn parse_request(json: &Value) -> FhirResult<DispenseRequest> {
        let wire: DispenseRequestWire = deserialize_wire("MedicationDispense request", json)?;

        let medication = match wire.medication {
            Some(MedicationWire::Text(text)) => CodeableConcept::from_text(text.trim()),
            Some(MedicationWire::Concept(concept)) => concept,
            None => return Err(FhirError::MissingField("medication")),
        };
        if medication.is_blank() {
            return Err(FhirError::MissingField("medication"));
        }

        let quantity = wire
            .quantity
            .ok_or(FhirError::MissingField("quantity"))?
            .coerce("quantity")?;
        let days_supply = wire
            .days_supply
            .ok_or(FhirError::MissingField("daysSupply"))?
            .coerce("daysSupply")?;
        let dosage = wire
            .dosage
            .and_then(|d| NonEmptyText::new(d).ok())
            .ok_or(FhirError::MissingField("dosage"))?;

        let when_handed_over = wire
            .timestamp
            .as_deref()
            .map(|raw| parse_instant("timestamp", raw))
            .transpose()?;

        Ok(DispenseRequest {
            medication,
            quantity: Quantity {
                value: quantity,
                unit: unit_or_default(wire.quantity_unit, DEFAULT_QUANTITY_UNIT),
            },
            days_supply: Quantity {
                value: days_supply,
                unit: unit_or_default(wire.days_supply_unit, DEFAULT_DAYS_SUPPLY_UNIT),
            },
            dosage,
            performer: non_blank(wire.performer),
            note: non_blank(wire.note),
            prescription: non_blank(wire.prescription),
            when_handed_over,
        })
    }

    /// Parse a stored MedicationDispense document.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if the document does not match the wire schema, its id or subject
    /// reference is malformed, or a timestamp cannot be parsed.
    pub fn parse(json: &Value) -> FhirResult<MedicationDispenseData> {
        let wire: MedicationDispenseWire = deserialize_wire(RESOURCE_TYPE, json)?;

        if wire.resource_type != RESOURCE_TYPE {
            return Err(FhirError::InvalidInput(format!(
                "Expected resourceType 'MedicationDispense', got '{}'",
                wire.resource_type
            )));
        }

        let id = RecordId::parse(&wire.id)
            .map_err(|e| FhirError::InvalidUuid(format!("MedicationDispense.id: {e}")))?;

        let subject = wire
            .subject
            .reference
            .strip_prefix(PATIENT_REFERENCE_PREFIX)
            .ok_or_else(|| {
                FhirError::InvalidInput(format!(
                    "subject.reference must start with '{PATIENT_REFERENCE_PREFIX}', got '{}'",
                    wire.subject.reference
                ))
            })
            .and_then(|raw| {
                RecordId::parse(raw)
                    .map_err(|e| FhirError::InvalidUuid(format!("subject.reference: {e}")))
            })?;

        Ok(MedicationDispenseData {
            id,
            status: wire.status,
            medication: wire.medication_codeable_concept,
            subject,
            quantity: wire.quantity,
            days_supply: wire.days_supply,
            dosage_instruction: wire.dosage_instruction.into_iter().map(|d| d.text).collect(),
            performer: wire
                .performer
                .into_iter()
                .next()
                .and_then(|p| p.actor.display),
            notes: wire.note.into_iter().map(|n| n.text).collect(),
            authorizing_prescription: wire
                .authorizing_prescription
                .into_iter()
                .next()
                .map(|r| r.reference),
            when_handed_over: parse_instant("whenHandedOver", &wire.when_handed_over)?,
            created_at: parse_instant("createdAt", &wire.created_at)?,
        })
    }

    /// Render a dispense record as its FHIR JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::Translation`] if serialisation fails.
    pub fn render(data: &MedicationDispenseData) -> FhirResult<Value> {
        let wire = MedicationDispenseWire {
            resource_type: RESOURCE_TYPE.to_string(),
            id: data.id.to_string(),
            status: data.status,
            medication_codeable_concept: data.medication.clone(),
            subject: ReferenceWire {
                reference: Self::subject_reference(&data.subject),
            },
            performer: data
                .performer
                .iter()
                .map(|display| PerformerWire {
                    actor: ActorWire {
                        display: Some(display.clone()),
                    },
                })
                .collect(),
            authorizing_prescription: data
                .authorizing_prescription
                .iter()
                .map(|reference| ReferenceWire {
                    reference: reference.clone(),
                })
                .collect(),
            quantity: data.quantity.clone(),
            days_supply: data.days_supply.clone(),
            when_handed_over: format_instant(&data.when_handed_over),
            dosage_instruction: data
                .dosage_instruction
                .iter()
                .map(|text| TextWire { text: text.clone() })
                .collect(),
            note: data
                .notes
                .iter()
                .map(|text| TextWire { text: text.clone() })
                .collect(),
            created_at: format_instant(&data.created_at),
        };

        serde_json::to_value(wire).map_err(|e| {
            FhirError::Translation(format!("Failed to serialise medication dispense: {e}"))
        })
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct DispenseRequestWire {
    #[serde(default, alias = "medicationName")]
    medication: Option<MedicationWire>,

    #[serde(default)]
    quantity: Option<NumberWire>,

    #[serde(default)]
    quantity_unit: Option<String>,

    #[serde(default)]
    days_supply: Option<NumberWire>,

    #[serde(default)]
    days_supply_unit: Option<String>,

    #[serde(default)]
    dosage: Option<String>,

    #[serde(default)]
    performer: Option<String>,

    #[serde(default)]
    note: Option<String>,

    #[serde(default)]
    prescription: Option<String>,

    #[serde(default, alias = "whenHandedOver")]
    timestamp: Option<String>,
}

/// Medication given either as free text or as a coded concept.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MedicationWire {
    Text(String),
    Concept(CodeableConcept),
}

/// A number that may arrive as a JSON number or as a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberWire {
    Number(f64),
    Text(String),
}

impl NumberWire {
    fn coerce(self, field: &'static str) -> FhirResult<f64> {
        let value = match self {
            NumberWire::Number(n) => n,
            NumberWire::Text(raw) => raw.trim().parse::<f64>().map_err(|_| {
                FhirError::InvalidInput(format!("{field} must be numeric, got '{raw}'"))
            })?,
        };

        if !value.is_finite() {
            return Err(FhirError::InvalidInput(format!(
                "{field} must be a finite number"
            )));
        }
        Ok(value)
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct MedicationDispenseWire {
    resource_type: String,
    id: String,
    status: DispenseStatus,
    medication_codeable_concept: CodeableConcept,
    subject: ReferenceWire,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    performer: Vec<PerformerWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    authorizing_prescription: Vec<ReferenceWire>,
    quantity: Quantity,
    days_supply: Quantity,
    when_handed_over: String,
    #[serde(default)]
    dosage_instruction: Vec<TextWire>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    note: Vec<TextWire>,
    created_at: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ReferenceWire {
    reference: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct PerformerWire {
    actor: ActorWire,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct ActorWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    display: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct TextWire {
    text: String,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn unit_or_default(unit: Option<String>, default: &str) -> String {
    non_blank(unit).unwrap_or_else(|| default.to_string())
}
