//! Shared test helpers: a recording, fault-injecting backend and a counting observer.

#![allow(dead_code)]

use std::{
    collections::VecDeque,
    future::Future,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use docmodel::{
    backend::{DeleteOutcome, InsertOutcome, StoreBackend, Update, UpdateOutcome, WriteOptions},
    bson::Document,
    config::ModelConfig,
    error::{DocumentStoreError, DocumentStoreResult},
    memory::InMemoryStore,
    observer::{WriteFailure, WriteObserver},
    query::{Expr, Query},
    retry::WriteKind,
};

/// A write the backend received, in the shape it was sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Insert(Document),
    Update {
        filter: Expr,
        update: Document,
        upsert: bool,
    },
    DeleteOne(Expr),
    DeleteMany(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    /// Fail without touching the store.
    Before,
    /// Apply the write, then fail as if the reply was lost.
    After,
}

/// Wraps [`InMemoryStore`], recording every write and failing on demand.
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<VecDeque<(Fault, DocumentStoreError)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// The next `times` writes fail with `error` before reaching the store.
    pub fn fail_next(&self, times: usize, error: DocumentStoreError) {
        let mut faults = self.faults.lock().unwrap();
        for _ in 0..times {
            faults.push_back((Fault::Before, error.clone()));
        }
    }

    /// The next write is applied but reports `error`.
    pub fn fail_after_applying(&self, error: DocumentStoreError) {
        self.faults.lock().unwrap().push_back((Fault::After, error));
    }

    fn record(&self, call: Call) -> Option<(Fault, DocumentStoreError)> {
        self.calls.lock().unwrap().push(call);
        self.faults.lock().unwrap().pop_front()
    }
}

async fn run<T>(
    fault: Option<(Fault, DocumentStoreError)>,
    write: impl Future<Output = DocumentStoreResult<T>>,
) -> DocumentStoreResult<T> {
    match fault {
        Some((Fault::Before, error)) => Err(error),
        Some((Fault::After, error)) => {
            write.await?;
            Err(error)
        }
        None => write.await,
    }
}

#[async_trait]
impl StoreBackend for RecordingStore {
    async fn insert_one(
        &self,
        collection: &str,
        document: Document,
        options: &WriteOptions,
    ) -> DocumentStoreResult<InsertOutcome> {
        let fault = self.record(Call::Insert(document.clone()));
        run(fault, self.inner.insert_one(collection, document, options)).await
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Expr,
        update: &Update,
        options: &WriteOptions,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let fault = self.record(Call::Update {
            filter: filter.clone(),
            update: update.to_document(),
            upsert: options.upsert,
        });
        run(fault, self.inner.update_one(collection, filter, update, options)).await
    }

    async fn delete_one(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome> {
        let fault = self.record(Call::DeleteOne(filter.clone()));
        run(fault, self.inner.delete_one(collection, filter, options)).await
    }

    async fn delete_many(
        &self,
        collection: &str,
        filter: &Expr,
        options: &WriteOptions,
    ) -> DocumentStoreResult<DeleteOutcome> {
        let fault = self.record(Call::DeleteMany(filter.clone()));
        run(fault, self.inner.delete_many(collection, filter, options)).await
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        self.inner.find(collection, query).await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        self.inner.count(collection, filter).await
    }
}

/// Collects failed attempts. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct CountingObserver {
    failures: Arc<Mutex<Vec<(WriteKind, u32, DocumentStoreError)>>>,
}

impl CountingObserver {
    pub fn count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }

    pub fn failures(&self) -> Vec<(WriteKind, u32, DocumentStoreError)> {
        self.failures.lock().unwrap().clone()
    }
}

impl WriteObserver for CountingObserver {
    fn write_failed(&self, failure: &WriteFailure<'_>) {
        self.failures
            .lock()
            .unwrap()
            .push((failure.operation, failure.attempt, failure.error.clone()));
    }
}

pub fn jedi_config() -> ModelConfig {
    ModelConfig::builder("jedi").build().unwrap()
}

pub fn soft_jedi_config() -> ModelConfig {
    ModelConfig::builder("jedi").soft_delete(true).build().unwrap()
}

pub fn transient() -> DocumentStoreError {
    DocumentStoreError::Transient("connection reset by peer".into())
}
