//! In-process document store.
//!
//! Documents are kept in insertion order behind a `std::sync::RwLock`. No lock is held across
//! an `.await`, so a blocking lock is fine inside async handlers.

use super::{DocumentCollection, Filter, Sort, SortDirection, StoredDocument};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::sync::RwLock;

#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<StoredDocument>>,
    unique: Option<UniqueIndex>,
}

/// Compound unique key over the elements of an array of objects, like a MongoDB unique
/// index on `path.field1, path.field2`. Each element contributes one key.
#[derive(Debug)]
struct UniqueIndex {
    path: String,
    fields: Vec<String>,
}

impl UniqueIndex {
    fn keys<'a>(&self, document: &'a Value) -> Vec<Vec<&'a Value>> {
        values_at_path(document, &self.path)
            .into_iter()
            .filter_map(Value::as_array)
            .flatten()
            .filter_map(|element| {
                self.fields
                    .iter()
                    .map(|field| element.get(field.as_str()))
                    .collect::<Option<Vec<_>>>()
            })
            .collect()
    }
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
            unique: None,
        }
    }

    /// Reject inserts whose `path` array shares a `fields` combination with a stored document.
    pub fn with_unique_index<F>(
        mut self,
        path: impl Into<String>,
        fields: impl IntoIterator<Item = F>,
    ) -> Self
    where
        F: Into<String>,
    {
        self.unique = Some(UniqueIndex {
            path: path.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Number of stored documents.
    pub fn len(&self) -> StoreResult<usize> {
        Ok(self.read()?.len())
    }

    fn read(&self) -> StoreResult<std::sync::RwLockReadGuard<'_, Vec<StoredDocument>>> {
        self.documents.read().map_err(|_| self.poisoned())
    }

    fn poisoned(&self) -> StoreError {
        StoreError::Backend {
            collection: self.name.clone(),
            message: "collection lock poisoned".into(),
        }
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, id: &str, body: Value) -> StoreResult<()> {
        if !body.is_object() {
            return Err(StoreError::Conversion(format!(
                "document {id} for collection '{}' is not a JSON object",
                self.name
            )));
        }

        let mut documents = self.documents.write().map_err(|_| self.poisoned())?;
        if documents.iter().any(|doc| doc.id == id) {
            return Err(StoreError::DuplicateId {
                collection: self.name.clone(),
                id: id.to_string(),
            });
        }

        if let Some(index) = &self.unique {
            let keys = index.keys(&body);
            if let Some(existing) = documents
                .iter()
                .find(|doc| index.keys(&doc.body).iter().any(|key| keys.contains(key)))
            {
                return Err(StoreError::DuplicateKey {
                    collection: self.name.clone(),
                    message: format!(
                        "document {id} repeats a {}.{{{}}} key held by {}",
                        index.path,
                        index.fields.join(","),
                        existing.id
                    ),
                });
            }
        }

        documents.push(StoredDocument {
            id: id.to_string(),
            body,
        });
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<StoredDocument>> {
        Ok(self.read()?.iter().find(|doc| doc.id == id).cloned())
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<StoredDocument>> {
        Ok(self
            .read()?
            .iter()
            .find(|doc| matches(&doc.body, filter))
            .cloned())
    }

    async fn find(&self, filter: &Filter, sort: Option<&Sort>) -> StoreResult<Vec<StoredDocument>> {
        let mut found: Vec<StoredDocument> = self
            .read()?
            .iter()
            .filter(|doc| matches(&doc.body, filter))
            .cloned()
            .collect();

        if let Some(sort) = sort {
            found.sort_by(|a, b| {
                let ordering = compare(
                    first_at_path(&a.body, &sort.path),
                    first_at_path(&b.body, &sort.path),
                );
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            });
        }

        Ok(found)
    }
}

// ============================================================================
// Filter evaluation
// ============================================================================

fn matches(document: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::Eq { path, value } => path_equals(document, path, value),
        Filter::ElemMatch { path, fields } => values_at_path(document, path)
            .into_iter()
            .filter_map(Value::as_array)
            .flatten()
            .any(|element| {
                fields
                    .iter()
                    .all(|(field, expected)| path_equals(element, field, expected))
            }),
    }
}

/// MongoDB equality: a leaf array matches if it equals `expected` or contains it.
fn path_equals(document: &Value, path: &str, expected: &Value) -> bool {
    values_at_path(document, path).into_iter().any(|found| {
        found == expected
            || found
                .as_array()
                .is_some_and(|items| items.iter().any(|item| item == expected))
    })
}

/// Every value reachable at a dotted `path`, fanning out across intermediate arrays.
fn values_at_path<'a>(document: &'a Value, path: &str) -> Vec<&'a Value> {
    fn walk<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
        let Some((head, rest)) = segments.split_first() else {
            out.push(value);
            return;
        };

        match value {
            Value::Object(map) => {
                if let Some(child) = map.get(*head) {
                    walk(child, rest, out);
                }
            }
            Value::Array(items) => {
                for item in items {
                    walk(item, segments, out);
                }
            }
            _ => {}
        }
    }

    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    walk(document, &segments, &mut out);
    out
}

fn first_at_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    values_at_path(document, path).into_iter().next()
}

/// Missing values sort first, as in MongoDB.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
