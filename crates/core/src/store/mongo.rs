//! MongoDB backend.
//!
//! Documents cross the boundary as JSON: `serde_json::Value` is serialised into BSON on the
//! way in and rendered back as relaxed extended JSON on the way out. Timestamps are stored as
//! RFC 3339 strings, so no BSON-specific types leak into the repositories.

use super::{Collections, DocumentCollection, Filter, Sort, SortDirection, StoredDocument};
use crate::constants::{
    IDENTIFIER_KEY_FIELDS, IDENTIFIER_PATH, MEDICATIONS_COLLECTION, PATIENTS_COLLECTION,
};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, FindOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use serde_json::Value;
use std::sync::Arc;

const ID_FIELD: &str = "_id";

/// Server error code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Connect to `uri`, verify the server answers, and open both collections in `database`.
pub(crate) async fn connect(uri: &str, database: &str) -> StoreResult<Collections> {
    let options = ClientOptions::parse(uri)
        .await
        .map_err(|e| StoreError::Connection(format!("invalid MongoDB URI: {e}")))?;
    let client = Client::with_options(options).map_err(|e| StoreError::Connection(e.to_string()))?;
    let db = client.database(database);

    db.run_command(doc! { "ping": 1 }, None)
        .await
        .map_err(|e| StoreError::Connection(format!("MongoDB ping failed: {e}")))?;

    let patients: Collection<Document> = db.collection(PATIENTS_COLLECTION);
    patients
        .create_index(identifier_index(), None)
        .await
        .map_err(|e| StoreError::Connection(format!("failed to ensure identifier index: {e}")))?;

    Ok(Collections {
        patients: Arc::new(MongoCollection::new(patients)),
        medications: Arc::new(MongoCollection::new(db.collection(MEDICATIONS_COLLECTION))),
    })
}

#[derive(Debug, Clone)]
pub struct MongoCollection {
    inner: Collection<Document>,
}

impl MongoCollection {
    pub fn new(inner: Collection<Document>) -> Self {
        Self { inner }
    }

    fn backend_error(&self, err: mongodb::error::Error) -> StoreError {
        StoreError::Backend {
            collection: self.inner.name().to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl DocumentCollection for MongoCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn insert_one(&self, id: &str, body: Value) -> StoreResult<()> {
        let mut document = bson::to_document(&body)
            .map_err(|e| StoreError::Conversion(format!("document {id}: {e}")))?;
        document.insert(ID_FIELD, id);

        self.inner
            .insert_one(document, None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    StoreError::DuplicateKey {
                        collection: self.inner.name().to_string(),
                        message: e.to_string(),
                    }
                } else {
                    self.backend_error(e)
                }
            })?;
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<StoredDocument>> {
        self.inner
            .find_one(doc! { ID_FIELD: id }, None)
            .await
            .map_err(|e| self.backend_error(e))?
            .map(from_document)
            .transpose()
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<StoredDocument>> {
        self.inner
            .find_one(filter_document(filter)?, None)
            .await
            .map_err(|e| self.backend_error(e))?
            .map(from_document)
            .transpose()
    }

    async fn find(&self, filter: &Filter, sort: Option<&Sort>) -> StoreResult<Vec<StoredDocument>> {
        let options = sort.map(|sort| {
            let direction = match sort.direction {
                SortDirection::Ascending => 1,
                SortDirection::Descending => -1,
            };
            let mut order = Document::new();
            order.insert(sort.path.as_str(), direction);
            FindOptions::builder().sort(order).build()
        });

        let mut cursor = self
            .inner
            .find(filter_document(filter)?, options)
            .await
            .map_err(|e| self.backend_error(e))?;

        let mut found = Vec::new();
        while cursor.advance().await.map_err(|e| self.backend_error(e))? {
            let document = cursor
                .deserialize_current()
                .map_err(|e| self.backend_error(e))?;
            found.push(from_document(document)?);
        }
        Ok(found)
    }
}

/// Unique compound index over `identifier.system` and `identifier.value`. Keys are taken per
/// array element, so two patients may not share a `(system, value)` pair.
fn identifier_index() -> IndexModel {
    let mut keys = Document::new();
    for field in IDENTIFIER_KEY_FIELDS {
        keys.insert(format!("{IDENTIFIER_PATH}.{field}"), 1);
    }

    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

fn to_bson(value: &Value) -> StoreResult<Bson> {
    bson::to_bson(value).map_err(|e| StoreError::Conversion(e.to_string()))
}

fn filter_document(filter: &Filter) -> StoreResult<Document> {
    let mut document = Document::new();
    match filter {
        Filter::Eq { path, value } => {
            document.insert(path.as_str(), to_bson(value)?);
        }
        Filter::ElemMatch { path, fields } => {
            let mut element = Document::new();
            for (field, value) in fields {
                element.insert(field.as_str(), to_bson(value)?);
            }
            document.insert(path.as_str(), doc! { "$elemMatch": element });
        }
    }
    Ok(document)
}

fn from_document(mut document: Document) -> StoreResult<StoredDocument> {
    let id = match document.remove(ID_FIELD) {
        Some(Bson::String(id)) => id,
        Some(other) => other.to_string(),
        None => {
            return Err(StoreError::Conversion(
                "stored document has no _id".into(),
            ))
        }
    };

    Ok(StoredDocument {
        id,
        body: Bson::Document(document).into_relaxed_extjson(),
    })
}
