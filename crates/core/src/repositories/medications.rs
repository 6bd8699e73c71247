//! Medication dispense registration and history.
//!
//! A dispense references its patient by `subject.reference = "Patient/<id>"`. The patient must
//! exist when the dispense is registered; the check and the insert are separate store calls
//! and are not transactional.

use crate::constants::{DISPENSE_TIMESTAMP_PATH, SUBJECT_REFERENCE_PATH};
use crate::error::{RecordError, RecordResult};
use crate::repositories::patients::PatientService;
use crate::store::{Collections, DocumentCollection, Filter, Sort, StoredDocument};
use chrono::Utc;
use fhir::{MedicationDispense, MedicationDispenseData, RecordId};
use serde_json::Value;
use std::sync::Arc;

/// Service for recording medication hand-overs against registered patients.
#[derive(Clone, Debug)]
pub struct MedicationService {
    patients: PatientService,
    medications: Arc<dyn DocumentCollection>,
}

impl MedicationService {
    pub fn new(collections: &Collections) -> Self {
        Self {
            patients: PatientService::new(collections),
            medications: Arc::clone(&collections.medications),
        }
    }

    /// Register a dispense for `patient_id` and return the new dispense id.
    ///
    /// The patient is looked up before the payload is validated, so a request for an unknown
    /// patient reports [`RecordError::PatientNotFound`] whatever its body. Nothing is written
    /// when any step fails.
    ///
    /// # Errors
    ///
    /// - [`RecordError::PatientNotFound`] if the patient does not exist (malformed ids
    ///   included),
    /// - [`RecordError::Validation`] if the payload is not a valid dispense request,
    /// - [`RecordError::Store`] if the store fails.
    pub async fn register_dispense(
        &self,
        patient_id: &str,
        payload: &Value,
    ) -> RecordResult<RecordId> {
        let subject = self.existing_patient(patient_id).await?;
        let request = MedicationDispense::parse_request(payload)?;

        let id = RecordId::new();
        let data = MedicationDispenseData::from_request(id.clone(), subject, request, Utc::now());
        let body = MedicationDispense::render(&data).map_err(|source| {
            RecordError::CorruptDocument {
                collection: self.medications.name().to_string(),
                id: id.to_string(),
                source,
            }
        })?;

        self.medications.insert_one(&id.to_string(), body).await?;

        tracing::info!(
            medication_id = %id,
            patient_id = %data.subject,
            "medication dispense registered"
        );
        Ok(id)
    }

    /// Every dispense recorded for `patient_id`, most recent hand-over first.
    ///
    /// # Errors
    ///
    /// - [`RecordError::PatientNotFound`] if the patient does not exist,
    /// - [`RecordError::CorruptDocument`] if a stored dispense cannot be parsed.
    pub async fn list_dispenses_for_patient(
        &self,
        patient_id: &str,
    ) -> RecordResult<Vec<MedicationDispenseData>> {
        let subject = self.existing_patient(patient_id).await?;

        let filter = Filter::eq(
            SUBJECT_REFERENCE_PATH,
            MedicationDispense::subject_reference(&subject),
        );
        let sort = Sort::descending(DISPENSE_TIMESTAMP_PATH);

        self.medications
            .find(&filter, Some(&sort))
            .await?
            .iter()
            .map(|document| self.decode(document))
            .collect()
    }

    async fn existing_patient(&self, patient_id: &str) -> RecordResult<RecordId> {
        self.patients
            .resolve(patient_id)
            .await?
            .ok_or_else(|| RecordError::PatientNotFound(patient_id.to_string()))
    }

    fn decode(&self, document: &StoredDocument) -> RecordResult<MedicationDispenseData> {
        MedicationDispense::parse(&document.body).map_err(|source| RecordError::CorruptDocument {
            collection: self.medications.name().to_string(),
            id: document.id.clone(),
            source,
        })
    }
}
