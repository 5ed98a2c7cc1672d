//! Persistence operations for one entity type.
//!
//! A [`Model`] pairs a [`ModelDefinition`] (configuration, hooks and failure
//! observer) with a backend. It creates and loads [`Entity`] values, drives
//! their lifecycle transitions through retried single-document writes, and
//! offers finders scoped to documents that are not soft-deleted.
//!
//! # Lifecycle
//!
//! ```text
//! New --save--> Persisted --delete(soft)--> SoftDeleted --restore--> Persisted
//!                   |  \--delete(hard)--> HardDeleted
//!                   \--write matches nothing--> Stale
//! ```
//!
//! # Example
//!
//! ```ignore
//! let store = DocumentStore::new(InMemoryStore::new());
//! let jedi = store.model(ModelDefinition::new(ModelConfig::builder("jedi").soft_delete(true).build()?));
//!
//! let mut yoda = jedi.create();
//! yoda.set("name", "Yoda")?;
//! jedi.save(&mut yoda).await?;
//!
//! jedi.delete(&mut yoda, false).await?;
//! assert!(jedi.find_by_id(yoda.id().cloned().unwrap()).await?.is_none());
//! assert!(jedi.with_trashed().find_by_id(yoda.id().cloned().unwrap()).await?.is_some());
//! ```

use bson::{Bson, Document};
use std::{fmt, sync::Arc};
use tracing::debug;

use crate::{
    backend::{StoreBackend, Update, WriteOptions},
    config::ModelConfig,
    datetime,
    entity::{Entity, PreparedWrite},
    error::{DocumentStoreError, DocumentStoreResult},
    hooks::{ModelHooks, NoHooks},
    observer::{TracingObserver, WriteObserver},
    query::{Expr, Filter, Query},
    retry::{Acknowledgement, RetryExecutor, WriteKind, WriteOutcome},
};

/// Everything that defines an entity type apart from its backend.
#[derive(Clone)]
pub struct ModelDefinition {
    config: Arc<ModelConfig>,
    hooks: Arc<dyn ModelHooks>,
    observer: Arc<dyn WriteObserver>,
}

impl ModelDefinition {
    /// A definition without hooks that logs failed writes through `tracing`.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config: Arc::new(config),
            hooks: Arc::new(NoHooks),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_hooks(mut self, hooks: impl ModelHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_observer(mut self, observer: impl WriteObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}

impl fmt::Debug for ModelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelDefinition")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct Model<'a, B: StoreBackend> {
    backend: &'a B,
    definition: ModelDefinition,
    include_deleted: bool,
}

impl<B: StoreBackend> Clone for Model<'_, B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend,
            definition: self.definition.clone(),
            include_deleted: self.include_deleted,
        }
    }
}

impl<'a, B: StoreBackend> Model<'a, B> {
    pub fn new(backend: &'a B, definition: ModelDefinition) -> Self {
        Self {
            backend,
            definition,
            include_deleted: false,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.definition.config
    }

    pub fn collection_name(&self) -> &str {
        &self.definition.config.collection
    }

    /// A new, unsaved entity of this type.
    pub fn create(&self) -> Entity {
        Entity::new(Arc::clone(&self.definition.config))
    }

    /// An entity filled from a stored document, without tracking.
    ///
    /// # Errors
    ///
    /// Fails like [`Entity::fill`] when the document holds keys the store reserves.
    pub fn load(&self, document: Document) -> DocumentStoreResult<Entity> {
        Entity::from_document(Arc::clone(&self.definition.config), document)
    }

    /// A copy of this model whose finders also return soft-deleted documents.
    pub fn with_trashed(&self) -> Self {
        Self {
            include_deleted: true,
            ..self.clone()
        }
    }

    /// Persists the entity: an insert when it has no identifier, otherwise an upsert.
    ///
    /// Returns `Ok(true)` immediately, without any store call, for a persisted
    /// entity with nothing pending. Returns `Ok(false)` when every attempt
    /// failed (unless the retry policy raises) or the stored document
    /// disappeared, in which case the entity is no longer persisted.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an entity of another model or an unstorable identifier
    /// - whatever `before_save` returns when it rejects the save
    /// - any non-store error raised by the backend
    /// - the last store error when attempts run out and `raise_on_exhausted` is set
    pub async fn save(&self, entity: &mut Entity) -> DocumentStoreResult<bool> {
        self.check_owned(entity)?;

        if entity.is_persisted() && !entity.has_changes() {
            debug!(collection = self.collection_name(), id = ?entity.id(), "nothing to save");
            return Ok(true);
        }

        self.definition.hooks.before_save(entity)?;

        let write = entity.prepare_write(datetime::now())?;
        if write.is_noop() {
            debug!(collection = self.collection_name(), id = ?entity.id(), "nothing the store would see");
            entity.mark_persisted();
            self.definition.hooks.after_save(entity);
            return Ok(true);
        }

        let saved = match write {
            PreparedWrite::Insert(document) => self.insert(entity, document).await?,
            PreparedWrite::Update { filter, update, upsert } => {
                self.upsert(entity, filter, update, upsert).await?
            }
        };

        if saved {
            self.definition.hooks.after_save(entity);
        }

        Ok(saved)
    }

    async fn insert(&self, entity: &mut Entity, document: Document) -> DocumentStoreResult<bool> {
        let backend = self.backend;
        let collection = self.collection_name();
        let options = &self.write_options();

        let outcome = self
            .executor()
            .execute(WriteKind::Insert, entity, || {
                let document = document.clone();
                async move {
                    let outcome = backend.insert_one(collection, document, options).await?;
                    Ok(if outcome.acknowledged {
                        Acknowledgement::Applied
                    } else {
                        Acknowledgement::Unacknowledged
                    })
                }
            })
            .await?;

        self.settle_save(entity, WriteKind::Insert, outcome)
    }

    async fn upsert(
        &self,
        entity: &mut Entity,
        filter: Expr,
        update: Update,
        upsert: bool,
    ) -> DocumentStoreResult<bool> {
        let backend = self.backend;
        let collection = self.collection_name();
        let options = &self.write_options().with_upsert(upsert);
        let (filter, update) = (&filter, &update);

        let outcome = self
            .executor()
            .execute(WriteKind::Upsert, entity, || async move {
                let outcome = backend.update_one(collection, filter, update, options).await?;
                Ok(if !outcome.acknowledged {
                    Acknowledgement::Unacknowledged
                } else if outcome.matched_count == 0 && outcome.upserted_count == 0 {
                    Acknowledgement::NoMatch
                } else {
                    Acknowledgement::Applied
                })
            })
            .await?;

        self.settle_save(entity, WriteKind::Upsert, outcome)
    }

    fn settle_save(
        &self,
        entity: &mut Entity,
        kind: WriteKind,
        outcome: WriteOutcome,
    ) -> DocumentStoreResult<bool> {
        match outcome {
            WriteOutcome::Applied | WriteOutcome::Converged => {
                entity.mark_persisted();
                debug!(collection = self.collection_name(), operation = %kind, id = ?entity.id(), "entity saved");
                Ok(true)
            }
            outcome => self.unsuccessful(entity, kind, outcome),
        }
    }

    /// Deletes the entity.
    ///
    /// With soft delete enabled and `hard` unset, only the deletion timestamp
    /// is written and finders stop returning the document. Otherwise the
    /// document is removed and the entity loses its identifier and
    /// timestamps. A hard delete that finds nothing to remove still succeeds.
    ///
    /// Deleting an unsaved or already soft-deleted entity is a no-op success.
    ///
    /// # Errors
    ///
    /// As for [`Model::save`]; a persisted entity without a storable identifier
    /// is an `InvalidArgument`.
    pub async fn delete(&self, entity: &mut Entity, hard: bool) -> DocumentStoreResult<bool> {
        self.check_owned(entity)?;

        if !entity.is_persisted() {
            return Ok(true);
        }

        let filter = Filter::id(self.persisted_id(entity)?);

        if self.config().soft_delete && !hard {
            if entity.is_deleted() {
                return Ok(true);
            }
            self.soft_delete(entity, filter).await
        } else {
            self.hard_delete(entity, filter).await
        }
    }

    async fn soft_delete(&self, entity: &mut Entity, filter: Expr) -> DocumentStoreResult<bool> {
        let backend = self.backend;
        let collection = self.collection_name();
        let options = &self.write_options();
        let field = self.config().fields.deleted_at.clone();
        let now = datetime::now();
        let mut stamp = Document::new();
        stamp.insert(field.clone(), now);
        let update = &Update::set(stamp);
        let filter = &filter;

        let outcome = self
            .executor()
            .execute(WriteKind::SoftDelete, entity, || async move {
                let outcome = backend.update_one(collection, filter, update, options).await?;
                Ok(matched(outcome.acknowledged, outcome.matched_count))
            })
            .await?;

        match outcome {
            WriteOutcome::Applied => {
                entity.apply_stored(&field, Some(Bson::DateTime(now)))?;
                debug!(collection, id = ?entity.id(), "entity soft-deleted");
                Ok(true)
            }
            outcome => self.unsuccessful(entity, WriteKind::SoftDelete, outcome),
        }
    }

    async fn hard_delete(&self, entity: &mut Entity, filter: Expr) -> DocumentStoreResult<bool> {
        let backend = self.backend;
        let collection = self.collection_name();
        let options = &self.write_options();
        let filter = &filter;

        let outcome = self
            .executor()
            .execute(WriteKind::HardDelete, entity, || async move {
                let outcome = backend.delete_one(collection, filter, options).await?;
                Ok(if outcome.acknowledged {
                    Acknowledgement::Applied
                } else {
                    Acknowledgement::Unacknowledged
                })
            })
            .await?;

        match outcome {
            WriteOutcome::Applied => {
                debug!(collection, id = ?entity.id(), "entity deleted");
                entity.clear_identity();
                Ok(true)
            }
            outcome => self.unsuccessful(entity, WriteKind::HardDelete, outcome),
        }
    }

    /// Clears the deletion timestamp of a soft-deleted entity.
    ///
    /// Returns `Ok(false)` for an unsaved entity and `Ok(true)` without any
    /// store call when the entity is not soft-deleted.
    pub async fn restore(&self, entity: &mut Entity) -> DocumentStoreResult<bool> {
        self.check_owned(entity)?;

        if !entity.is_persisted() {
            return Ok(false);
        }
        if !entity.is_deleted() {
            return Ok(true);
        }

        let backend = self.backend;
        let collection = self.collection_name();
        let options = &self.write_options();
        let field = self.config().fields.deleted_at.clone();
        let update = &Update::unset([field.as_str()]);
        let filter = &Filter::id(self.persisted_id(entity)?);

        let outcome = self
            .executor()
            .execute(WriteKind::Restore, entity, || async move {
                let outcome = backend.update_one(collection, filter, update, options).await?;
                Ok(matched(outcome.acknowledged, outcome.matched_count))
            })
            .await?;

        match outcome {
            WriteOutcome::Applied => {
                entity.apply_stored(&field, None)?;
                debug!(collection, id = ?entity.id(), "entity restored");
                Ok(true)
            }
            outcome => self.unsuccessful(entity, WriteKind::Restore, outcome),
        }
    }

    /// Returns the entities matching the query, excluding soft-deleted ones
    /// unless this model came from [`Model::with_trashed`].
    pub async fn find(&self, query: Query) -> DocumentStoreResult<Vec<Entity>> {
        let documents = self
            .backend
            .find(self.collection_name(), self.scoped(query))
            .await?;

        documents
            .into_iter()
            .map(|document| self.load(document))
            .collect()
    }

    pub async fn find_one(&self, filter: Expr) -> DocumentStoreResult<Option<Entity>> {
        let query = Query::builder().filter(filter).limit(1).build();

        Ok(self.find(query).await?.into_iter().next())
    }

    pub async fn find_by_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<Option<Entity>> {
        self.find_one(Filter::id(id)).await
    }

    /// Counts matching documents under the same scoping as [`Model::find`].
    pub async fn count(&self, filter: Option<Expr>) -> DocumentStoreResult<u64> {
        let query = self.scoped(Query { filter, ..Query::default() });

        self.backend
            .count(self.collection_name(), query.filter.as_ref())
            .await
    }

    /// Removes every matching document, soft-deleted or not. Returns the number removed.
    pub async fn delete_many(&self, filter: Expr) -> DocumentStoreResult<u64> {
        let outcome = self
            .backend
            .delete_many(self.collection_name(), &filter, &self.write_options())
            .await?;

        Ok(outcome.deleted_count)
    }

    /// Removes the first matching document. Returns whether one was removed.
    pub async fn delete_one(&self, filter: Expr) -> DocumentStoreResult<bool> {
        let outcome = self
            .backend
            .delete_one(self.collection_name(), &filter, &self.write_options())
            .await?;

        Ok(outcome.deleted_count > 0)
    }

    fn scoped(&self, query: Query) -> Query {
        if self.config().soft_delete && !self.include_deleted {
            query.and_filter(Filter::eq(self.config().fields.deleted_at.as_str(), Bson::Null))
        } else {
            query
        }
    }

    fn executor(&self) -> RetryExecutor<'_> {
        RetryExecutor::new(
            self.collection_name(),
            &self.definition.config.retry,
            self.definition.observer.as_ref(),
        )
    }

    fn write_options(&self) -> WriteOptions {
        WriteOptions::new(self.config().write_concern)
    }

    fn check_owned(&self, entity: &Entity) -> DocumentStoreResult<()> {
        if Arc::ptr_eq(entity.shared_config(), &self.definition.config)
            || entity.config() == self.config()
        {
            Ok(())
        } else {
            Err(DocumentStoreError::InvalidArgument(format!(
                "entity of collection {:?} cannot be written through model {:?}",
                entity.config().collection,
                self.collection_name()
            )))
        }
    }

    fn persisted_id(&self, entity: &Entity) -> DocumentStoreResult<Bson> {
        entity.id().cloned().ok_or_else(|| {
            DocumentStoreError::InvalidArgument(
                "persisted entity has no storable identifier".to_string(),
            )
        })
    }

    /// Handles stale and exhausted outcomes shared by every write.
    fn unsuccessful(
        &self,
        entity: &mut Entity,
        kind: WriteKind,
        outcome: WriteOutcome,
    ) -> DocumentStoreResult<bool> {
        match outcome {
            WriteOutcome::Stale => {
                debug!(collection = self.collection_name(), operation = %kind, id = ?entity.id(), "stored document is gone");
                entity.mark_stale();
                Ok(false)
            }
            WriteOutcome::Failed {
                last_error: Some(error),
                ..
            } if self.config().retry.raise_on_exhausted => Err(error),
            _ => Ok(false),
        }
    }
}

fn matched(acknowledged: bool, matched_count: u64) -> Acknowledgement {
    if !acknowledged {
        Acknowledgement::Unacknowledged
    } else if matched_count == 0 {
        Acknowledgement::NoMatch
    } else {
        Acknowledgement::Applied
    }
}
