//! Storage backend abstraction consumed by models.
//!
//! This module defines the single-document write primitives and the finder
//! primitives a document store must provide. Models never talk to a driver
//! directly; they issue these calls and interpret the acknowledgement counts.
//!
//! # Traits
//!
//! - [`StoreBackend`]: The core trait for storage backends
//! - [`StoreBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docmodel::backend::{StoreBackend, WriteOptions};
//! use bson::{doc, oid::ObjectId};
//!
//! let backend = MyBackendImpl::new();
//!
//! let outcome = backend
//!     .insert_one("users", doc! { "_id": ObjectId::new(), "name": "Alice" }, &WriteOptions::default())
//!     .await?;
//! assert!(outcome.acknowledged);
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    query::{Expr, Query},
};

/// Durability level requested for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteConcern {
    /// Fire and forget; the store never confirms the write.
    Unacknowledged,
    /// Confirmed by the primary.
    #[default]
    Acknowledged,
    /// Confirmed by a majority of replica set members.
    Majority,
    /// Confirmed by the given number of members.
    Nodes(u32),
}

impl WriteConcern {
    /// Returns `true` if writes under this concern report a confirmation.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, WriteConcern::Unacknowledged | WriteConcern::Nodes(0))
    }
}

/// Options passed with every write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOptions {
    pub write_concern: WriteConcern,
    /// For `update_one`: insert a new document when the filter matches nothing.
    pub upsert: bool,
}

impl WriteOptions {
    pub fn new(write_concern: WriteConcern) -> Self {
        Self { write_concern, upsert: false }
    }

    pub fn with_upsert(mut self, upsert: bool) -> Self {
        self.upsert = upsert;
        self
    }
}

/// Field-level modifications for a single document.
///
/// Keys are dotted paths. Backends render this as `$set` / `$unset`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Document,
    pub unset: Vec<String>,
}

impl Update {
    pub fn set(set: Document) -> Self {
        Self { set, unset: Vec::new() }
    }

    pub fn unset(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            set: Document::new(),
            unset: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }

    /// Renders the update in store operator syntax, omitting empty operators.
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();

        if !self.set.is_empty() {
            document.insert("$set", self.set.clone());
        }
        if !self.unset.is_empty() {
            document.insert(
                "$unset",
                self.unset
                    .iter()
                    .map(|field| (field.clone(), Bson::String(String::new())))
                    .collect::<Document>(),
            );
        }

        document
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOutcome {
    pub acknowledged: bool,
    pub inserted_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateOutcome {
    pub acknowledged: bool,
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeleteOutcome {
    pub acknowledged: bool,
    pub deleted_count: u64,
}

/// Abstract interface for document storage backends.
///
/// Implementations must be thread-safe (`Send + Sync`). Each write reports how
/// many documents it touched and whether the store acknowledged it; models use
/// those counts to detect stale in-memory state, so backends must not invent them.
///
/// # Error Handling
///
/// Backends classify failures structurally: a unique-key violation is
/// [`DocumentStoreError::DuplicateIdentifier`](crate::error::DocumentStoreError::DuplicateIdentifier),
/// a failure worth retrying is [`DocumentStoreError::Transient`](crate::error::DocumentStoreError::Transient),
/// anything else is [`DocumentStoreError::Backend`](crate::error::DocumentStoreError::Backend).
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Inserts a single document. The document carries its own `_id`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentifier` if a document with the same `_id` exists.
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        options: &WriteOptions,
    ) -> DocumentStoreResult<InsertOutcome>;

    /// Applies `update` to the first document matching `filter`.
    ///
    /// With `options.upsert` set and no match, a new document is built from the
    /// equality conditions of the filter plus the update and inserted.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: &Update,
        options: &WriteOptions,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Deletes the first document matching `filter`.
    async fn delete_one(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome>;

    /// Deletes every document matching `filter`.
    async fn delete_many(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome>;

    /// Returns the documents matching the query's filter, sorted and paged.
    ///
    /// A missing collection yields an empty result.
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>>;

    /// Counts the documents matching `filter` (all documents when `None`).
    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op.
    async fn shutdown(self) -> DocumentStoreResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend,
{
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        options: &WriteOptions,
    ) -> DocumentStoreResult<InsertOutcome> {
        (*self).insert_one(collection, document, options).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: &Update,
        options: &WriteOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        (*self).update_one(collection, filter, update, options).await
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome> {
        (*self).delete_one(collection, filter, options).await
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome> {
        (*self).delete_many(collection, filter, options).await
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        (*self).find(collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        (*self).count(collection, filter).await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
