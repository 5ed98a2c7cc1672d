//! Convenient re-exports of commonly used types from docmodel.
//!
//! ```ignore
//! use docmodel::prelude::*;
//! ```

pub use docmodel_core::{
    backend::{StoreBackend, StoreBackendBuilder, Update, WriteConcern, WriteOptions},
    bulk::BulkOperation,
    config::{IdGeneration, ModelConfig, RetryPolicy, TimestampFields},
    entity::{Entity, IdState},
    error::{DocumentStoreError, DocumentStoreResult},
    hooks::ModelHooks,
    model::{Model, ModelDefinition},
    observer::{TracingObserver, WriteFailure, WriteObserver},
    query::{Expr, FieldOp, Filter, Query, QueryBuilder, Sort, SortDirection},
    retry::WriteKind,
    store::DocumentStore,
};
pub use docmodel_memory::InMemoryStore;
