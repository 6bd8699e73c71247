//! Document-store seam.
//!
//! The repositories talk to two named collections through the [`DocumentCollection`] trait.
//! Two backends implement it:
//! - [`mongo`]: MongoDB via the official driver, for deployments;
//! - [`memory`]: an in-process store, for tests and local runs.
//!
//! Documents are plain JSON objects. The record id is passed separately on insert and becomes
//! the backend's primary key (`_id` in MongoDB); it is never a driver-generated `ObjectId`.
//!
//! Filters cover what the repositories need and no more: equality on a dotted path, and an
//! element match against an array of objects. Both follow MongoDB's array semantics, so a path
//! that crosses an array matches if *any* element matches.

pub mod memory;
pub mod mongo;

use crate::config::{CoreConfig, StoreBackend};
use crate::constants::{
    IDENTIFIER_KEY_FIELDS, IDENTIFIER_PATH, MEDICATIONS_COLLECTION, PATIENTS_COLLECTION,
};
use crate::error::StoreResult;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A document read back from a collection.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    /// Primary key the document was inserted under.
    pub id: String,
    /// Document body, without any backend bookkeeping such as `_id`.
    pub body: Value,
}

/// Query predicate understood by every backend.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// `path` equals `value` (or, for an array, contains it).
    Eq { path: String, value: Value },
    /// Some element of the array at `path` matches every `(field, value)` pair.
    ElemMatch {
        path: String,
        fields: Vec<(String, Value)>,
    },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn elem_match<K, V>(path: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Filter::ElemMatch {
            path: path.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Single-key sort order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub path: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn descending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Descending,
        }
    }

    pub fn ascending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            direction: SortDirection::Ascending,
        }
    }
}

/// A named collection of JSON documents.
#[async_trait]
pub trait DocumentCollection: Send + Sync + fmt::Debug {
    /// Collection name, for logs and errors.
    fn name(&self) -> &str;

    /// Insert `body` under primary key `id`. Single-document inserts are atomic.
    async fn insert_one(&self, id: &str, body: Value) -> StoreResult<()>;

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<StoredDocument>>;

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<StoredDocument>>;

    /// All documents matching `filter`, ordered by `sort` when given.
    async fn find(&self, filter: &Filter, sort: Option<&Sort>) -> StoreResult<Vec<StoredDocument>>;
}

/// Handles to the two collections MDR uses. Cheap to clone; shared by every request.
#[derive(Clone, Debug)]
pub struct Collections {
    pub patients: Arc<dyn DocumentCollection>,
    pub medications: Arc<dyn DocumentCollection>,
}

impl Collections {
    /// Fresh, empty in-memory collections.
    ///
    /// Patients carry the same unique identifier index the MongoDB backend creates.
    pub fn in_memory() -> Self {
        Self {
            patients: Arc::new(
                memory::MemoryCollection::new(PATIENTS_COLLECTION)
                    .with_unique_index(IDENTIFIER_PATH, IDENTIFIER_KEY_FIELDS),
            ),
            medications: Arc::new(memory::MemoryCollection::new(MEDICATIONS_COLLECTION)),
        }
    }
}

/// Open the document store described by `cfg` and return its collections.
///
/// For MongoDB this issues a `ping`, so an unreachable server fails here rather than on the
/// first request, and ensures the unique index on patient identifiers. There is no retry.
///
/// # Errors
///
/// Returns [`crate::StoreError::Connection`] if the store cannot be reached.
pub async fn connect(cfg: &CoreConfig) -> StoreResult<Collections> {
    let collections = match cfg.backend() {
        StoreBackend::Memory => Collections::in_memory(),
        StoreBackend::Mongo => mongo::connect(cfg.store_uri(), cfg.database()).await?,
    };

    tracing::info!(
        backend = ?cfg.backend(),
        database = cfg.database(),
        "connected to document store"
    );

    Ok(collections)
}
