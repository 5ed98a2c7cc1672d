//! Main docmodel crate: active-record style persistence for document stores.
//!
//! This crate is the primary entry point for users of docmodel. It re-exports
//! the core types from the sub-crates and provides access to the storage backends.
//!
//! # Features
//!
//! - **Tracked entities** - Nested property trees whose changes are saved as minimal `$set`/`$unset` updates
//! - **Lifecycle management** - Insert, upsert, soft delete, restore and hard delete with bookkeeping timestamps
//! - **Bounded retries** - Store failures are reported to an observer and retried up to a configured ceiling
//! - **Bulk descriptors** - Entities can be turned into batch write operations
//! - **Multiple backends** - In-memory and MongoDB storage behind one trait
//!
//! # Quick Start
//!
//! ```ignore
//! use docmodel::{prelude::*, memory::InMemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let store = DocumentStore::new(InMemoryStore::builder().build().await?);
//!     let jedi = store.model_for(ModelConfig::builder("jedi").soft_delete(true).build()?);
//!
//!     let mut anakin = jedi.create();
//!     anakin.set("name", "Anakin Skywalker")?;
//!     anakin.set("master.name", "Obi-Wan Kenobi")?;
//!     jedi.save(&mut anakin).await?;
//!
//!     anakin.set("name", "Darth Vader")?;
//!     jedi.save(&mut anakin).await?;
//!
//!     jedi.delete(&mut anakin, false).await?;
//!     assert_eq!(jedi.count(None).await?, 0);
//!     assert_eq!(jedi.with_trashed().count(None).await?, 1);
//!
//!     store.shutdown().await
//! }
//! ```
//!
//! # Hooks and observers
//!
//! ```ignore
//! struct RequireName;
//!
//! impl ModelHooks for RequireName {
//!     fn before_save(&self, entity: &mut Entity) -> DocumentStoreResult<()> {
//!         match entity.get("name") {
//!             Some(_) => Ok(()),
//!             None => Err(DocumentStoreError::Rejected("name is required".into())),
//!         }
//!     }
//! }
//!
//! let definition = ModelDefinition::new(config).with_hooks(RequireName);
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod prelude;

pub use docmodel_core::{
    backend, bulk, config, datetime, diff, entity, error, hooks, model, observer, path, query,
    retry, store,
};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docmodel_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docmodel_mongodb::{MongoDbStore, MongoDbStoreBuilder};
}
