//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup (binaries read the environment) and then
//! passed into [`crate::store::connect`]. Nothing in the core reads environment variables while
//! handling a request.

use crate::constants::{DEFAULT_DATABASE_NAME, MEMORY_URI_SCHEME, MONGO_URI_SCHEMES};
use crate::{RecordError, RecordResult};

/// Which document-store backend a connection URI selects.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Mongo,
    Memory,
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    store_uri: String,
    database: String,
    backend: StoreBackend,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidInput`] if the URI is empty or uses an unsupported scheme,
    /// or if the database name is not one MongoDB accepts.
    pub fn new(store_uri: String, database: String) -> RecordResult<Self> {
        let store_uri = store_uri.trim().to_string();
        if store_uri.is_empty() {
            return Err(RecordError::InvalidInput(
                "document store URI cannot be empty".into(),
            ));
        }

        let backend = backend_for_uri(&store_uri)?;
        validate_database_name(&database)?;

        Ok(Self {
            store_uri,
            database,
            backend,
        })
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self {
            store_uri: format!("{MEMORY_URI_SCHEME}://"),
            database: DEFAULT_DATABASE_NAME.to_string(),
            backend: StoreBackend::Memory,
        }
    }

    pub fn store_uri(&self) -> &str {
        &self.store_uri
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn backend(&self) -> StoreBackend {
        self.backend
    }
}

/// Resolve the database name from an optional explicit value and the connection URI.
///
/// Precedence: a non-blank `value` (`MONGO_DB`), then the path segment of the URI
/// (`mongodb://host/<name>?...`), then [`DEFAULT_DATABASE_NAME`].
pub fn database_name_from_env_value(store_uri: &str, value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| database_from_uri(store_uri).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string())
}

fn database_from_uri(uri: &str) -> Option<&str> {
    let (_, rest) = uri.split_once("://")?;
    let (_, path) = rest.split_once('/')?;
    let name = path.split('?').next().unwrap_or("");
    (!name.is_empty()).then_some(name)
}

fn backend_for_uri(uri: &str) -> RecordResult<StoreBackend> {
    let scheme = uri
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .ok_or_else(|| {
            RecordError::InvalidInput("document store URI must have a scheme".into())
        })?;

    if scheme == MEMORY_URI_SCHEME {
        Ok(StoreBackend::Memory)
    } else if MONGO_URI_SCHEMES.contains(&scheme) {
        Ok(StoreBackend::Mongo)
    } else {
        Err(RecordError::InvalidInput(format!(
            "unsupported document store scheme '{scheme}'"
        )))
    }
}

fn validate_database_name(name: &str) -> RecordResult<()> {
    const MAX_DATABASE_NAME_LEN: usize = 63;
    const FORBIDDEN_CHARS: &[char] = &[
        '/', '\\', '.', ' ', '"', '$', '*', '<', '>', ':', '|', '?', '\0',
    ];

    if name.trim().is_empty() {
        return Err(RecordError::InvalidInput(
            "database name cannot be empty".into(),
        ));
    }

    if name.len() > MAX_DATABASE_NAME_LEN {
        return Err(RecordError::InvalidInput(format!(
            "database name exceeds maximum length of {MAX_DATABASE_NAME_LEN} characters"
        )));
    }

    if name.contains(FORBIDDEN_CHARS) {
        return Err(RecordError::InvalidInput(format!(
            "database name '{name}' contains characters MongoDB does not allow"
        )));
    }

    Ok(())
}
