//! Constants used throughout the MDR core crate.

/// Collection holding Patient documents.
pub const PATIENTS_COLLECTION: &str = "patients";

/// Collection holding MedicationDispense documents.
pub const MEDICATIONS_COLLECTION: &str = "medications";

/// Database used when neither `MONGO_DB` nor the connection URI names one.
pub const DEFAULT_DATABASE_NAME: &str = "SamplePatientService";

/// URI scheme selecting the in-process document store.
pub const MEMORY_URI_SCHEME: &str = "memory";

/// URI schemes handled by the MongoDB driver.
pub const MONGO_URI_SCHEMES: [&str; 2] = ["mongodb", "mongodb+srv"];

/// Array of business identifiers on a Patient document.
pub const IDENTIFIER_PATH: &str = "identifier";

/// Fields of an identifier element that together must be unique across patients.
pub const IDENTIFIER_KEY_FIELDS: [&str; 2] = ["system", "value"];

/// Document path of a dispense's patient reference.
pub const SUBJECT_REFERENCE_PATH: &str = "subject.reference";

/// Document path dispense histories are ordered by.
pub const DISPENSE_TIMESTAMP_PATH: &str = "whenHandedOver";
