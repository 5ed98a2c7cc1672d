//! In-memory document storage backend for docmodel.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It uses async-aware read-write locks for concurrent access and is meant for development
//! and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware RwLock
//! - **Store semantics** - Unique `_id`, upserts seeded from filter equalities, `$set`/`$unset` on dotted paths
//! - **Query support** - Filtering on nested fields, sorting and pagination
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let jedi = store.model_for(ModelConfig::builder("jedi").build()?);
//!
//!     let mut yoda = jedi.create();
//!     yoda.set("name", "Yoda")?;
//!     jedi.save(&mut yoda).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docmodel_memory;

pub mod store;
pub mod evaluator;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
