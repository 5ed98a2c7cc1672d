//! In-memory storage implementation for document stores.
//!
//! Collections are vectors of BSON documents kept in insertion order behind an
//! async-aware read-write lock.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};
use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::trace;

use docmodel_core::{
    backend::{
        DeleteOutcome, InsertOutcome, StoreBackend, StoreBackendBuilder, Update, UpdateOutcome,
        WriteOptions,
    },
    entity::ID_FIELD,
    error::{DocumentStoreError, DocumentStoreResult},
    path::{self, FieldPath},
    query::{Expr, Query, SortDirection},
};

use crate::evaluator::{DocumentEvaluator, sort_key};

type StoreMap = HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses an `Arc`-wrapped internal state, so
/// clones share the same data. The `_id` field is unique within a collection.
///
/// Write concerns are honoured only in what they report: an unacknowledged
/// write is still applied, but its outcome says it was not acknowledged.
///
/// # Performance
///
/// Queries scan all documents in a collection (no indexing).
///
/// # Example
///
/// ```ignore
/// use docmodel_memory::InMemoryStore;
/// use docmodel::backend::{StoreBackend, WriteOptions};
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// store.insert_one("jedi", doc! { "_id": 1, "name": "Yoda" }, &WriteOptions::default()).await?;
/// assert_eq!(store.count("jedi", None).await?, 1);
/// ```
#[derive(Default, Clone, Debug)]
pub struct InMemoryStore {
    store: Arc<RwLock<StoreMap>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory document store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }
}

fn position(documents: &[Document], filter: &Expr) -> Option<usize> {
    documents
        .iter()
        .position(|document| DocumentEvaluator::matches(document, Some(filter)))
}

fn apply_update(document: &mut Document, update: &Update) -> DocumentStoreResult<()> {
    for (key, value) in &update.set {
        path::set_path(document, &FieldPath::parse(key)?, value.clone());
    }
    for key in &update.unset {
        path::unset_path(document, &FieldPath::parse(key)?);
    }

    Ok(())
}

/// Builds the document an upsert inserts: the filter's equality conditions plus the update.
fn upserted_document(filter: &Expr, update: &Update) -> DocumentStoreResult<Document> {
    let mut document = Document::new();

    for (field, value) in filter.equalities() {
        path::set_path(&mut document, &FieldPath::parse(field)?, value.clone());
    }
    apply_update(&mut document, update)?;

    if !document.contains_key(ID_FIELD) {
        document.insert(ID_FIELD, ObjectId::new());
    }

    Ok(document)
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        options: &WriteOptions,
    ) -> DocumentStoreResult<InsertOutcome> {
        let Some(id) = document.get(ID_FIELD).cloned() else {
            return Err(DocumentStoreError::InvalidArgument(
                "document must carry an _id".to_string(),
            ));
        };

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        if documents.iter().any(|existing| existing.get(ID_FIELD) == Some(&id)) {
            return Err(DocumentStoreError::DuplicateIdentifier(
                id.to_string(),
                collection.to_string(),
            ));
        }

        trace!(collection, %id, "inserting document");
        documents.push(document);

        Ok(InsertOutcome {
            acknowledged: options.write_concern.is_acknowledged(),
            inserted_count: 1,
        })
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: &Update,
        options: &WriteOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let acknowledged = options.write_concern.is_acknowledged();
        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        match position(documents, filter) {
            Some(index) => {
                let before = documents[index].clone();
                apply_update(&mut documents[index], update)?;

                Ok(UpdateOutcome {
                    acknowledged,
                    matched_count: 1,
                    modified_count: u64::from(documents[index] != before),
                    upserted_count: 0,
                })
            }
            None if options.upsert => {
                let document = upserted_document(filter, update)?;
                trace!(collection, id = ?document.get(ID_FIELD), "upserting document");
                documents.push(document);

                Ok(UpdateOutcome {
                    acknowledged,
                    upserted_count: 1,
                    ..UpdateOutcome::default()
                })
            }
            None => Ok(UpdateOutcome {
                acknowledged,
                ..UpdateOutcome::default()
            }),
        }
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome> {
        let mut store = self.store.write().await;
        let deleted_count = match store.get_mut(collection) {
            Some(documents) => match position(documents, filter) {
                Some(index) => {
                    documents.remove(index);
                    1
                }
                None => 0,
            },
            None => 0,
        };

        Ok(DeleteOutcome {
            acknowledged: options.write_concern.is_acknowledged(),
            deleted_count,
        })
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome> {
        let mut store = self.store.write().await;
        let deleted_count = match store.get_mut(collection) {
            Some(documents) => {
                let before = documents.len();
                documents.retain(|document| !DocumentEvaluator::matches(document, Some(filter)));
                (before - documents.len()) as u64
            }
            None => 0,
        };

        Ok(DeleteOutcome {
            acknowledged: options.write_concern.is_acknowledged(),
            deleted_count,
        })
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        let store = self.store.read().await;
        let Some(documents) = store.get(collection) else {
            return Ok(vec![]);
        };

        let mut matched = documents
            .iter()
            .filter(|document| DocumentEvaluator::matches(document, query.filter.as_ref()))
            .collect::<Vec<_>>();

        if let Some(sort) = &query.sort {
            matched.sort_by(|a, b| {
                let left = sort_key(a, &sort.field);
                let right = sort_key(b, &sort.field);

                match sort.direction {
                    SortDirection::Asc => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
                    SortDirection::Desc => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
                }
            });
        }

        Ok(matched
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        let store = self.store.read().await;

        Ok(store
            .get(collection)
            .map(|documents| {
                documents
                    .iter()
                    .filter(|document| DocumentEvaluator::matches(document, filter))
                    .count() as u64
            })
            .unwrap_or(0))
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
#[derive(Default)]
pub struct InMemoryStoreBuilder;

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(InMemoryStore::new())
    }
}
