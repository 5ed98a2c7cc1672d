//! Main document store interface.
//!
//! A [`DocumentStore`] owns a backend and hands out [`Model`]s bound to it.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::prelude::*;
//!
//! let store = DocumentStore::new(InMemoryStore::new());
//! let jedi = store.model_for(ModelConfig::builder("jedi").build()?);
//! ```

use crate::{
    backend::StoreBackend,
    config::ModelConfig,
    error::DocumentStoreResult,
    model::{Model, ModelDefinition},
};

/// A document store bound to a specific backend implementation.
///
/// # Type Parameters
///
/// * `B` - The backend implementation type
#[derive(Debug)]
pub struct DocumentStore<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> DocumentStore<B> {
    /// Creates a new document store with the given backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Gets a model for the given definition.
    pub fn model(&self, definition: ModelDefinition) -> Model<'_, B> {
        Model::new(&self.backend, definition)
    }

    /// Gets a model with default hooks and observer for the given configuration.
    pub fn model_for(&self, config: ModelConfig) -> Model<'_, B> {
        self.model(ModelDefinition::new(config))
    }

    /// Shuts down the store and releases backend resources.
    ///
    /// # Errors
    ///
    /// Returns an error if the shutdown operation fails.
    pub async fn shutdown(self) -> DocumentStoreResult<()> {
        self.backend.shutdown().await?;

        Ok(())
    }
}
