//! Patient registration and lookup.
//!
//! Patients are written once and never updated. Registration is idempotent per business
//! identifier: if any submitted `(system, value)` pair is already held by a stored patient,
//! that patient's id is returned and nothing is written. The store enforces the pair as a
//! unique key, so a registration that loses a race to a concurrent one also resolves to the
//! winner's id.
//!
//! ## Storage Layout
//!
//! ```text
//! patients
//!   { "_id": "<record id>", "resourceType": "Patient", "id": "<record id>",
//!     "identifier": [...], "name": [...], ..., "createdAt": "...", "updatedAt": "..." }
//! ```

use crate::constants::IDENTIFIER_PATH;
use crate::error::{RecordError, RecordResult, StoreError};
use crate::store::{Collections, DocumentCollection, Filter, StoredDocument};
use chrono::Utc;
use fhir::{Identifier, Patient, PatientData, RecordId};
use serde_json::Value;
use std::sync::Arc;

const PATIENT_KIND: &str = "patient";

/// Outcome of [`PatientService::create_patient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PatientCreation {
    /// A new patient document was inserted.
    Created(RecordId),
    /// A stored patient already holds one of the submitted identifiers.
    Existing(RecordId),
}

impl PatientCreation {
    pub fn id(&self) -> &RecordId {
        match self {
            PatientCreation::Created(id) | PatientCreation::Existing(id) => id,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, PatientCreation::Created(_))
    }
}

/// Service for registering and reading patients.
#[derive(Clone, Debug)]
pub struct PatientService {
    patients: Arc<dyn DocumentCollection>,
}

impl PatientService {
    pub fn new(collections: &Collections) -> Self {
        Self {
            patients: Arc::clone(&collections.patients),
        }
    }

    /// Validate and register a patient.
    ///
    /// Any `id` in the payload is ignored; a fresh [`RecordId`] is assigned and `createdAt` /
    /// `updatedAt` are stamped with the server clock.
    ///
    /// # Errors
    ///
    /// - [`RecordError::Validation`] if the payload is not a valid Patient,
    /// - [`RecordError::Store`] if the lookup or the insert fails.
    pub async fn create_patient(&self, payload: &Value) -> RecordResult<PatientCreation> {
        let mut data = Patient::parse_registration(payload)?;

        if let Some(id) = self.find_registered(&data.identifiers).await? {
            return Ok(PatientCreation::Existing(id));
        }

        let id = RecordId::new();
        let now = Utc::now();
        data.id = Some(id.clone());
        data.created_at = Some(now);
        data.updated_at = Some(now);

        let body = Patient::render(&data).map_err(|source| RecordError::CorruptDocument {
            collection: self.patients.name().to_string(),
            id: id.to_string(),
            source,
        })?;
        if let Err(err) = self.patients.insert_one(&id.to_string(), body).await {
            if matches!(err, StoreError::DuplicateKey { .. }) {
                if let Some(existing) = self.find_registered(&data.identifiers).await? {
                    return Ok(PatientCreation::Existing(existing));
                }
            }
            return Err(err.into());
        }

        tracing::info!(patient_id = %id, "patient registered");
        Ok(PatientCreation::Created(id))
    }

    /// Fetch a patient by record id.
    ///
    /// # Errors
    ///
    /// - [`RecordError::InvalidId`] if `id` is not a well-formed record id,
    /// - [`RecordError::NotFound`] if no patient has that id.
    pub async fn get_patient_by_id(&self, id: &str) -> RecordResult<PatientData> {
        let record_id = RecordId::parse(id).map_err(|_| RecordError::InvalidId(id.to_string()))?;

        let document = self
            .patients
            .find_by_id(&record_id.to_string())
            .await?
            .ok_or_else(|| RecordError::NotFound {
                kind: PATIENT_KIND,
                key: id.to_string(),
            })?;

        self.decode(&document)
    }

    /// Fetch the patient holding the identifier `(system, value)`.
    ///
    /// Both parts are trimmed, matching how identifiers are stored.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::NotFound`] if no patient holds it.
    pub async fn get_patient_by_identifier(
        &self,
        system: &str,
        value: &str,
    ) -> RecordResult<PatientData> {
        let (system, value) = (system.trim(), value.trim());
        let filter = identifier_filter(system, value);
        let document = self
            .patients
            .find_one(&filter)
            .await?
            .ok_or_else(|| RecordError::NotFound {
                kind: PATIENT_KIND,
                key: format!("{system}|{value}"),
            })?;

        self.decode(&document)
    }

    /// Whether a patient with record id `id` is stored. A malformed id does not exist.
    pub async fn exists(&self, id: &str) -> RecordResult<bool> {
        Ok(self.resolve(id).await?.is_some())
    }

    /// The parsed id of the stored patient `id`, if there is one.
    pub(crate) async fn resolve(&self, id: &str) -> RecordResult<Option<RecordId>> {
        let Ok(record_id) = RecordId::parse(id) else {
            return Ok(None);
        };

        let found = self.patients.find_by_id(&record_id.to_string()).await?;
        Ok(found.map(|_| record_id))
    }

    /// Id of the first stored patient holding any of `identifiers`.
    async fn find_registered(&self, identifiers: &[Identifier]) -> RecordResult<Option<RecordId>> {
        for identifier in identifiers {
            let filter = identifier_filter(identifier.system.as_str(), identifier.value.as_str());
            if let Some(existing) = self.patients.find_one(&filter).await? {
                let id = self.document_id(&existing)?;
                tracing::info!(
                    patient_id = %id,
                    system = identifier.system.as_str(),
                    "patient already registered under identifier"
                );
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    fn document_id(&self, document: &StoredDocument) -> RecordResult<RecordId> {
        RecordId::parse(&document.id).map_err(|e| RecordError::CorruptDocument {
            collection: self.patients.name().to_string(),
            id: document.id.clone(),
            source: fhir::FhirError::InvalidUuid(e.to_string()),
        })
    }

    fn decode(&self, document: &StoredDocument) -> RecordResult<PatientData> {
        let mut data =
            Patient::parse(&document.body).map_err(|source| RecordError::CorruptDocument {
                collection: self.patients.name().to_string(),
                id: document.id.clone(),
                source,
            })?;

        if data.id.is_none() {
            data.id = Some(self.document_id(document)?);
        }
        Ok(data)
    }
}

fn identifier_filter(system: &str, value: &str) -> Filter {
    Filter::elem_match(IDENTIFIER_PATH, [("system", system), ("value", value)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{IDENTIFIER_KEY_FIELDS, PATIENTS_COLLECTION};
    use crate::error::StoreResult;
    use crate::store::memory::MemoryCollection;
    use async_trait::async_trait;
    use fhir::FhirError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Misses the first `find_one`, like a lookup that ran before a concurrent insert landed.
    #[derive(Debug)]
    struct StaleFirstLookup {
        inner: Arc<MemoryCollection>,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl DocumentCollection for StaleFirstLookup {
        fn name(&self) -> &str {
            self.inner.name()
        }

        async fn insert_one(&self, id: &str, body: Value) -> StoreResult<()> {
            self.inner.insert_one(id, body).await
        }

        async fn find_by_id(&self, id: &str) -> StoreResult<Option<StoredDocument>> {
            self.inner.find_by_id(id).await
        }

        async fn find_one(&self, filter: &Filter) -> StoreResult<Option<StoredDocument>> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(None);
            }
            self.inner.find_one(filter).await
        }

        async fn find(
            &self,
            filter: &Filter,
            sort: Option<&crate::store::Sort>,
        ) -> StoreResult<Vec<StoredDocument>> {
            self.inner.find(filter, sort).await
        }
    }

    fn service() -> PatientService {
        PatientService::new(&Collections::in_memory())
    }

    fn payload(system: &str, value: &str) -> Value {
        json!({
            "resourceType": "Patient",
            "identifier": [{"system": system, "value": value}],
            "name": [{"use": "official", "family": "Duarte", "given": ["Mario", "Enrique"]}],
            "gender": "male",
            "birthDate": "1986-02-25"
        })
    }

    #[tokio::test]
    async fn create_twice_with_same_identifier_returns_same_id() {
        let service = service();

        let first = service.create_patient(&payload("doc", "123")).await.unwrap();
        let second = service.create_patient(&payload("doc", "123")).await.unwrap();

        assert!(first.is_new());
        assert_eq!(second, PatientCreation::Existing(first.id().clone()));

        let fetched = service.get_patient_by_identifier("doc", "123").await.unwrap();
        assert_eq!(fetched.id.as_ref(), Some(first.id()));
    }

    #[tokio::test]
    async fn dedup_matches_any_submitted_identifier() {
        let service = service();
        let first = service.create_patient(&payload("doc", "123")).await.unwrap();

        let mut second = payload("passport", "AQ1");
        second["identifier"]
            .as_array_mut()
            .unwrap()
            .push(json!({"system": "doc", "value": "123"}));

        let outcome = service.create_patient(&second).await.unwrap();
        assert_eq!(outcome.id(), first.id());
        assert!(!outcome.is_new());
    }

    #[tokio::test]
    async fn identifier_pairs_must_match_on_one_element() {
        let service = service();
        let first = service.create_patient(&payload("doc", "123")).await.unwrap();

        let other = service.create_patient(&payload("passport", "123")).await.unwrap();
        assert!(other.is_new());
        assert_ne!(other.id(), first.id());
    }

    #[tokio::test]
    async fn identifier_and_name_round_trip_through_get_by_id() {
        let service = service();
        let created = service.create_patient(&payload("doc", "987")).await.unwrap();

        let fetched = service
            .get_patient_by_id(&created.id().to_string())
            .await
            .unwrap();

        assert_eq!(fetched.id.as_ref(), Some(created.id()));
        assert_eq!(fetched.identifiers.len(), 1);
        assert_eq!(fetched.identifiers[0].system.as_str(), "doc");
        assert_eq!(fetched.identifiers[0].value.as_str(), "987");
        assert_eq!(fetched.names[0].family.as_deref(), Some("Duarte"));
        assert_eq!(fetched.names[0].given, vec!["Mario", "Enrique"]);
        assert_eq!(fetched.birth_date.as_deref(), Some("1986-02-25"));
        assert!(fetched.created_at.is_some());
        assert_eq!(fetched.created_at, fetched.updated_at);

        let by_identifier = service.get_patient_by_identifier("doc", "987").await.unwrap();
        assert_eq!(by_identifier, fetched);
    }

    #[tokio::test]
    async fn lookup_by_identifier_trims_its_arguments() {
        let service = service();
        let created = service.create_patient(&payload(" doc", " 123")).await.unwrap();

        for (system, value) in [("doc", "123"), (" doc ", " 123 "), ("doc\t", "123\n")] {
            let found = service.get_patient_by_identifier(system, value).await.unwrap();
            assert_eq!(found.id.as_ref(), Some(created.id()));
        }
    }

    #[tokio::test]
    async fn concurrent_registrations_share_one_id() {
        let collections = Collections::in_memory();
        let service = PatientService::new(&collections);

        let (payload_a, payload_b) = (payload("doc", "123"), payload("doc", "123"));
        let (a, b) = tokio::join!(
            service.create_patient(&payload_a),
            service.create_patient(&payload_b),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.id(), b.id());
        assert!(a.is_new() != b.is_new());

        let stored = collections
            .patients
            .find(&identifier_filter("doc", "123"), None)
            .await
            .unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn registration_losing_the_insert_race_resolves_to_the_winner() {
        let inner = Arc::new(
            MemoryCollection::new(PATIENTS_COLLECTION)
                .with_unique_index(IDENTIFIER_PATH, IDENTIFIER_KEY_FIELDS),
        );
        let winner = PatientService {
            patients: inner.clone(),
        };
        let loser = PatientService {
            patients: Arc::new(StaleFirstLookup {
                inner: inner.clone(),
                lookups: AtomicUsize::new(0),
            }),
        };

        let first = winner.create_patient(&payload("doc", "123")).await.unwrap();
        let second = loser.create_patient(&payload("doc", "123")).await.unwrap();

        assert_eq!(second, PatientCreation::Existing(first.id().clone()));
        assert_eq!(inner.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn standard_patient_elements_survive_storage() {
        let service = service();
        let mut body = payload("doc", "42");
        body["id"] = json!("example");
        body["maritalStatus"] = json!({"text": "Married"});
        body["contact"] = json!([{"name": {"family": "Ruiz"}}]);

        let created = service.create_patient(&body).await.unwrap();
        let fetched = service.get_patient_by_id(&created.id().to_string()).await.unwrap();

        assert_eq!(fetched.other_elements["maritalStatus"], body["maritalStatus"]);
        assert_eq!(fetched.other_elements["contact"], body["contact"]);
        assert!(!fetched.other_elements.contains_key("id"));
    }

    #[tokio::test]
    async fn submitted_id_is_replaced() {
        let service = service();
        let supplied = RecordId::new();
        let mut body = payload("doc", "555");
        body["id"] = json!(supplied.to_string());

        let created = service.create_patient(&body).await.unwrap();
        assert_ne!(created.id(), &supplied);
    }

    #[tokio::test]
    async fn get_by_unknown_id_is_not_found() {
        let err = service()
            .get_patient_by_id(&RecordId::new().to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::NotFound { .. }));
        assert!(err.is_client_error());
    }

    #[tokio::test]
    async fn get_by_malformed_id_is_invalid_id() {
        let err = service().get_patient_by_id("not-an-id").await.unwrap_err();
        assert!(matches!(err, RecordError::InvalidId(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn get_by_unknown_identifier_is_not_found() {
        let err = service()
            .get_patient_by_identifier("doc", "missing")
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::NotFound { .. }));
    }

    #[tokio::test]
    async fn missing_identifier_or_name_is_rejected_without_writing() {
        let collections = Collections::in_memory();
        let service = PatientService::new(&collections);

        let err = service
            .create_patient(&json!({"name": [{"family": "Duarte"}]}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Validation(FhirError::MissingField("identifier"))
        ));

        let err = service
            .create_patient(&json!({"identifier": [{"system": "doc", "value": "1"}], "name": []}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Validation(FhirError::MissingField("name"))
        ));

        let none = collections
            .patients
            .find_one(&identifier_filter("doc", "1"))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn exists_treats_malformed_ids_as_absent() {
        let service = service();
        let created = service.create_patient(&payload("doc", "1")).await.unwrap();

        assert!(service.exists(&created.id().to_string()).await.unwrap());
        assert!(!service.exists(&RecordId::new().to_string()).await.unwrap());
        assert!(!service.exists("Patient/123").await.unwrap());
    }

    #[tokio::test]
    async fn corrupt_stored_document_is_reported() {
        let collections = Collections::in_memory();
        let id = RecordId::new().to_string();
        collections
            .patients
            .insert_one(&id, json!({"identifier": "not-a-list"}))
            .await
            .unwrap();

        let err = PatientService::new(&collections)
            .get_patient_by_id(&id)
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::CorruptDocument { .. }));
    }
}
