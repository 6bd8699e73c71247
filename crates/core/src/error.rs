//! Error taxonomy for the core services.

/// Failures raised by a document-store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to document store: {0}")]
    Connection(String),
    #[error("document store error in collection '{collection}': {message}")]
    Backend { collection: String, message: String },
    #[error("document id '{id}' already exists in collection '{collection}'")]
    DuplicateId { collection: String, id: String },
    #[error("unique key violated in collection '{collection}': {message}")]
    DuplicateKey { collection: String, message: String },
    #[error("failed to convert document: {0}")]
    Conversion(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures surfaced by the patient and medication repositories.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },
    #[error("patient not found: {0}")]
    PatientNotFound(String),
    #[error("validation failed: {0}")]
    Validation(#[from] fhir::FhirError),
    #[error("invalid record id: {0}")]
    InvalidId(String),
    #[error("stored {collection} document {id} is malformed: {source}")]
    CorruptDocument {
        collection: String,
        id: String,
        #[source]
        source: fhir::FhirError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RecordError {
    /// True for failures caused by the caller (missing entity or bad payload).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RecordError::NotFound { .. }
                | RecordError::PatientNotFound(_)
                | RecordError::Validation(_)
        )
    }
}

pub type RecordResult<T> = std::result::Result<T, RecordError>;
