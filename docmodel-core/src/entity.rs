//! In-memory entity state: the property tree, its pending diff and persistence flags.
//!
//! An [`Entity`] never performs I/O. Reads and tracked writes happen here; the
//! owning [`Model`](crate::model::Model) turns the pending diff into store
//! operations and applies the resulting state transitions.
//!
//! # Example
//!
//! ```ignore
//! let mut jedi = model.create();
//! jedi.set("name", "Yoda")?;
//! jedi.set("lightsaber.color", "green")?;
//!
//! assert!(!jedi.is_persisted());
//! assert!(model.save(&mut jedi).await?);
//! assert!(jedi.is_persisted());
//! ```

use bson::{
    Bson, DateTime as BsonDateTime, Document,
    de::deserialize_from_bson,
    ser::serialize_to_bson,
};
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

use crate::{
    backend::Update,
    config::ModelConfig,
    datetime,
    diff::PendingUpdates,
    error::{DocumentStoreError, DocumentStoreResult},
    path::{self, FieldPath},
    query::{Expr, Filter},
};

/// Name of the identifier field in stored documents.
pub const ID_FIELD: &str = "_id";

fn touches_identifier(path: &FieldPath) -> bool {
    path.segments().first().is_some_and(|segment| segment == ID_FIELD)
}

/// Classification of the current identifier value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IdState<'a> {
    /// No identifier yet (missing or null): the next save inserts.
    Missing,
    /// A storable identifier: the next save upserts.
    Assigned(&'a Bson),
    /// A value the store cannot use as an identifier. Saving fails.
    Invalid(&'a Bson),
}

/// The store write an entity needs in order to become persisted.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PreparedWrite {
    Insert(Document),
    Update {
        filter: Expr,
        update: Update,
        upsert: bool,
    },
}

impl PreparedWrite {
    /// An update of a stored document that would change nothing.
    pub(crate) fn is_noop(&self) -> bool {
        matches!(self, PreparedWrite::Update { update, upsert: false, .. } if update.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct Entity {
    config: Arc<ModelConfig>,
    properties: Document,
    pending: PendingUpdates,
    persisted: bool,
}

impl Entity {
    /// Creates an empty, unsaved entity.
    pub fn new(config: Arc<ModelConfig>) -> Self {
        Self {
            config,
            properties: Document::new(),
            pending: PendingUpdates::new(),
            persisted: false,
        }
    }

    /// Creates an entity from a stored document. See [`Entity::fill`].
    pub fn from_document(config: Arc<ModelConfig>, document: Document) -> DocumentStoreResult<Self> {
        let mut entity = Self::new(config);
        entity.fill(document)?;
        Ok(entity)
    }

    /// Replaces all properties with a loaded document without tracking changes.
    ///
    /// The entity counts as persisted when the document carries an identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if any key is blank, starts with `$` or
    /// contains `.`, and `TooDeeplyNested` past the nesting limit. The entity
    /// is left unchanged in both cases.
    pub fn fill(&mut self, document: Document) -> DocumentStoreResult<()> {
        path::check_document_field_names(&document)?;

        self.properties = document;
        self.pending.clear();
        self.persisted = matches!(self.id_state(), IdState::Assigned(_));

        Ok(())
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub(crate) fn shared_config(&self) -> &Arc<ModelConfig> {
        &self.config
    }

    /// Reads the value at a dotted path. Malformed paths read as missing.
    pub fn get(&self, path: &str) -> Option<&Bson> {
        FieldPath::parse(path)
            .ok()
            .and_then(|path| path::get_path(&self.properties, &path))
    }

    /// Reads and deserializes the value at a dotted path.
    ///
    /// # Errors
    ///
    /// Returns `Serialization` if the stored value does not fit `T`.
    pub fn get_typed<T: DeserializeOwned>(&self, path: &str) -> DocumentStoreResult<Option<T>> {
        self.get(path)
            .map(|value| deserialize_from_bson(value.clone()))
            .transpose()
            .map_err(Into::into)
    }

    /// Writes a value at a dotted path and records the change.
    ///
    /// Intermediate documents are created as needed; a non-document value in
    /// the way is replaced. Returns the value previously at the exact path.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a malformed path, a reserved key inside
    /// `value` or a change to the identifier of a persisted entity, and
    /// `TooDeeplyNested` past the nesting limit.
    pub fn set(&mut self, path: &str, value: impl Into<Bson>) -> DocumentStoreResult<Option<Bson>> {
        let path = FieldPath::parse(path)?;
        let value = value.into();
        path::check_nested_field_names(&value)?;

        if self.persisted && touches_identifier(&path) {
            if path.segments().len() == 1 && self.properties.get(ID_FIELD) == Some(&value) {
                return Ok(Some(value));
            }
            return Err(self.identity_locked());
        }

        let outcome = path::set_path(&mut self.properties, &path, value);
        self.pending
            .record_set(&self.properties, &path, outcome.boundary);

        Ok(outcome.previous)
    }

    /// Serializes `value` and writes it at a dotted path. See [`Entity::set`].
    pub fn set_typed<T: Serialize>(&mut self, path: &str, value: &T) -> DocumentStoreResult<Option<Bson>> {
        self.set(path, serialize_to_bson(value)?)
    }

    /// Writes every top-level field of a serializable record, tracking each one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the record does not serialize to a document.
    pub fn assign<T: Serialize>(&mut self, record: &T) -> DocumentStoreResult<()> {
        let Bson::Document(document) = serialize_to_bson(record)? else {
            return Err(DocumentStoreError::InvalidArgument(
                "record must serialize to a document".to_string(),
            ));
        };

        for (key, value) in document {
            self.set(&key, value)?;
        }

        Ok(())
    }

    /// Deserializes the whole property tree into a record.
    pub fn to_typed<T: DeserializeOwned>(&self) -> DocumentStoreResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self.properties.clone()))?)
    }

    /// Removes the value at a dotted path and records the removal.
    ///
    /// Removing a missing field changes nothing and records nothing. The
    /// identifier of a persisted entity cannot be removed.
    pub fn unset(&mut self, path: &str) -> DocumentStoreResult<Option<Bson>> {
        let path = FieldPath::parse(path)?;
        if self.persisted && touches_identifier(&path) {
            return Err(self.identity_locked());
        }

        let previous = path::unset_path(&mut self.properties, &path);

        if previous.is_some() {
            self.pending.record_unset(&self.properties, &path);
        }

        Ok(previous)
    }

    fn identity_locked(&self) -> DocumentStoreError {
        DocumentStoreError::InvalidArgument(format!(
            "the identifier of a persisted entity cannot change (current: {})",
            self.properties.get(ID_FIELD).unwrap_or(&Bson::Null)
        ))
    }

    pub fn id_state(&self) -> IdState<'_> {
        match self.properties.get(ID_FIELD) {
            None | Some(Bson::Null) => IdState::Missing,
            Some(
                value @ (Bson::Array(_)
                | Bson::RegularExpression(_)
                | Bson::Undefined
                | Bson::MinKey
                | Bson::MaxKey
                | Bson::JavaScriptCode(_)
                | Bson::JavaScriptCodeWithScope(_)),
            ) => IdState::Invalid(value),
            Some(value) => IdState::Assigned(value),
        }
    }

    /// The identifier, when one is assigned and valid.
    pub fn id(&self) -> Option<&Bson> {
        match self.id_state() {
            IdState::Assigned(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Returns `true` for a soft-deleted entity. Always `false` when soft delete is disabled.
    pub fn is_deleted(&self) -> bool {
        self.config.soft_delete
            && !matches!(self.get(&self.config.fields.deleted_at), None | Some(Bson::Null))
    }

    /// Returns `true` if tracked changes are waiting to be saved.
    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_updates(&self) -> &PendingUpdates {
        &self.pending
    }

    pub fn as_document(&self) -> &Document {
        &self.properties
    }

    pub fn to_document(&self) -> Document {
        self.properties.clone()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(&self.config.fields.created_at)
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(&self.config.fields.updated_at)
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp(&self.config.fields.deleted_at)
    }

    fn timestamp(&self, field: &str) -> Option<DateTime<Utc>> {
        self.get(field).and_then(datetime::from_bson)
    }

    pub(crate) fn mark_persisted(&mut self) {
        self.persisted = true;
        self.pending.clear();
    }

    /// The store no longer holds what this entity believes it holds.
    pub(crate) fn mark_stale(&mut self) {
        self.persisted = false;
    }

    /// Forgets the stored identity after a hard delete.
    pub(crate) fn clear_identity(&mut self) {
        self.properties.remove(ID_FIELD);

        let fields = self.config.fields.clone();
        for field in [fields.created_at, fields.updated_at, fields.deleted_at] {
            if let Ok(path) = FieldPath::parse(&field) {
                path::unset_path(&mut self.properties, &path);
            }
        }

        self.pending.clear();
        self.persisted = false;
    }

    /// Writes a value the store already holds, without leaving anything pending for it.
    pub(crate) fn apply_stored(&mut self, field: &str, value: Option<Bson>) -> DocumentStoreResult<()> {
        let path = FieldPath::parse(field)?;

        match value {
            Some(value) => {
                path::set_path(&mut self.properties, &path, value);
            }
            None => {
                path::unset_path(&mut self.properties, &path);
            }
        }
        self.pending.settle(&self.properties, &path);

        Ok(())
    }

    /// Stamps bookkeeping timestamps as tracked writes.
    fn stamp_timestamps(&mut self, now: BsonDateTime) -> DocumentStoreResult<()> {
        if !self.config.timestamps {
            return Ok(());
        }

        let config = Arc::clone(&self.config);
        if !self.persisted {
            self.set(&config.fields.created_at, now)?;
        }
        self.set(&config.fields.updated_at, now)?;

        Ok(())
    }

    /// Puts a freshly generated identifier first in the property tree.
    fn assign_generated_id(&mut self) {
        let id = self.config.id_generation.generate();
        self.properties = std::iter::once((ID_FIELD.to_string(), id))
            .chain(std::mem::take(&mut self.properties))
            .collect();
    }

    /// Validates the identifier, stamps timestamps and computes the write that
    /// brings the store in line with this entity.
    ///
    /// Without an identifier one is generated and the whole document is
    /// inserted. With one, a persisted entity sends only its pending diff while
    /// an unsaved one upserts every field.
    pub(crate) fn prepare_write(&mut self, now: BsonDateTime) -> DocumentStoreResult<PreparedWrite> {
        let id = match self.id_state() {
            IdState::Invalid(value) => {
                return Err(DocumentStoreError::InvalidArgument(format!(
                    "{value} cannot be used as a document identifier"
                )));
            }
            IdState::Missing => None,
            IdState::Assigned(id) => Some(id.clone()),
        };

        self.stamp_timestamps(now)?;

        let Some(id) = id else {
            self.assign_generated_id();
            return Ok(PreparedWrite::Insert(self.properties.clone()));
        };

        let update = if self.persisted {
            self.pending.to_update()
        } else {
            Update::set(
                self.properties
                    .iter()
                    .filter(|(key, _)| key.as_str() != ID_FIELD)
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            )
        };

        Ok(PreparedWrite::Update {
            filter: Filter::id(id),
            update,
            upsert: !self.persisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{doc, oid::ObjectId};
    use serde::Deserialize;

    use crate::diff::FieldChange;

    fn config() -> Arc<ModelConfig> {
        Arc::new(ModelConfig::builder("jedi").soft_delete(true).build().unwrap())
    }

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Jedi {
        name: String,
        rank: String,
    }

    #[test]
    fn set_tracks_and_returns_previous() {
        let mut entity = Entity::new(config());

        assert_eq!(entity.set("name", "Anakin Skywalker").unwrap(), None);
        assert_eq!(
            entity.set("name", "Darth Vader").unwrap(),
            Some(Bson::from("Anakin Skywalker"))
        );
        assert_eq!(entity.get("name"), Some(&Bson::from("Darth Vader")));
        assert_eq!(entity.pending_updates().keys().collect::<Vec<_>>(), ["name"]);
    }

    #[test]
    fn set_rejects_reserved_keys_without_side_effects() {
        let mut entity = Entity::new(config());

        assert!(entity.set("$where", 1).is_err());
        assert!(entity.set("profile", doc! { "a.b": 1 }).is_err());
        assert!(entity.as_document().is_empty());
        assert!(!entity.has_changes());
    }

    #[test]
    fn fill_bypasses_tracking() {
        let id = ObjectId::new();
        let entity = Entity::from_document(config(), doc! { "_id": id, "name": "Yoda" }).unwrap();

        assert!(entity.is_persisted());
        assert!(!entity.has_changes());
        assert_eq!(entity.id(), Some(&Bson::ObjectId(id)));

        let loose = Entity::from_document(config(), doc! { "name": "Yoda" }).unwrap();
        assert!(!loose.is_persisted());
    }

    #[test]
    fn fill_rejects_reserved_keys_and_keeps_state() {
        let mut entity = Entity::from_document(config(), doc! { "_id": 1, "name": "Yoda" }).unwrap();

        for document in [
            doc! { "a.b": 1 },
            doc! { "$x": 1 },
            doc! { "": 2 },
            doc! { "profile": { "$where": "x" } },
        ] {
            assert!(matches!(
                entity.fill(document),
                Err(DocumentStoreError::InvalidArgument(_))
            ));
        }

        assert_eq!(entity.as_document(), &doc! { "_id": 1, "name": "Yoda" });
        assert!(entity.is_persisted());
        assert!(Entity::from_document(config(), doc! { "a.b": 1 }).is_err());
    }

    #[test]
    fn persisted_identifier_cannot_change() {
        let mut entity = Entity::from_document(config(), doc! { "_id": 1, "name": "Yoda" }).unwrap();

        assert_eq!(entity.set("_id", 1).unwrap(), Some(Bson::from(1)));
        assert!(!entity.has_changes());

        for result in [entity.set("_id", 2), entity.set("_id.part", 2), entity.unset("_id")] {
            assert!(matches!(result, Err(DocumentStoreError::InvalidArgument(_))));
        }
        assert_eq!(entity.id(), Some(&Bson::from(1)));
        assert!(!entity.has_changes());

        let mut unsaved = Entity::new(config());
        unsaved.set("_id", 1).unwrap();
        unsaved.set("_id", 2).unwrap();
        assert_eq!(unsaved.unset("_id").unwrap(), Some(Bson::from(2)));
    }

    #[test]
    fn identifier_only_diff_is_a_noop_write() {
        let untimed = Arc::new(ModelConfig::builder("jedi").timestamps(false).build().unwrap());
        let mut entity = Entity::new(untimed);
        entity.set("_id", 1).unwrap();
        entity.persisted = true;

        let write = entity.prepare_write(datetime::now()).unwrap();

        assert!(write.is_noop());
        assert!(!PreparedWrite::Insert(doc! { "_id": 1 }).is_noop());
    }

    #[test]
    fn unset_of_missing_field_records_nothing() {
        let mut entity = Entity::from_document(config(), doc! { "_id": 1, "name": "Yoda" }).unwrap();

        assert_eq!(entity.unset("rank").unwrap(), None);
        assert!(!entity.has_changes());
        assert_eq!(entity.unset("name").unwrap(), Some(Bson::from("Yoda")));
        assert_eq!(entity.pending_updates().get("name"), Some(&FieldChange::Unset));
    }

    #[test]
    fn identifier_classification() {
        let mut entity = Entity::new(config());
        assert_eq!(entity.id_state(), IdState::Missing);

        entity.fill(doc! { "_id": Bson::Null }).unwrap();
        assert_eq!(entity.id_state(), IdState::Missing);

        entity.fill(doc! { "_id": [1, 2] }).unwrap();
        assert!(matches!(entity.id_state(), IdState::Invalid(_)));
        assert!(!entity.is_persisted());

        entity.fill(doc! { "_id": "luke" }).unwrap();
        assert_eq!(entity.id_state(), IdState::Assigned(&Bson::from("luke")));

        entity.fill(doc! { "_id": { "planet": "Tatooine", "seq": 1 } }).unwrap();
        assert!(matches!(entity.id_state(), IdState::Assigned(Bson::Document(_))));
        assert!(entity.is_persisted());
    }

    #[test]
    fn soft_delete_flag_reads_configured_field() {
        let mut entity = Entity::from_document(config(), doc! { "_id": 1, "deleted_at": Bson::Null }).unwrap();
        assert!(!entity.is_deleted());

        entity.fill(doc! { "_id": 1, "deleted_at": datetime::now() }).unwrap();
        assert!(entity.is_deleted());
        assert!(entity.deleted_at().is_some());

        let hard_only = Arc::new(ModelConfig::builder("jedi").build().unwrap());
        let entity = Entity::from_document(hard_only, doc! { "_id": 1, "deleted_at": datetime::now() }).unwrap();
        assert!(!entity.is_deleted());
    }

    #[test]
    fn typed_round_trip() {
        let mut entity = Entity::new(config());
        entity
            .assign(&Jedi { name: "Obi-Wan Kenobi".into(), rank: "master".into() })
            .unwrap();

        assert_eq!(entity.pending_updates().len(), 2);
        assert_eq!(entity.get_typed::<String>("rank").unwrap(), Some("master".to_string()));
        assert_eq!(
            entity.to_typed::<Jedi>().unwrap(),
            Jedi { name: "Obi-Wan Kenobi".into(), rank: "master".into() }
        );
        assert!(entity.get_typed::<i32>("name").is_err());
    }

    #[test]
    fn prepare_insert_generates_leading_id_and_timestamps() {
        let mut entity = Entity::new(config());
        entity.set("name", "Yoda").unwrap();

        let PreparedWrite::Insert(document) = entity.prepare_write(datetime::now()).unwrap() else {
            panic!("expected insert");
        };

        assert_eq!(
            document.keys().collect::<Vec<_>>(),
            ["_id", "name", "created_at", "updated_at"]
        );
        assert!(matches!(entity.id(), Some(Bson::ObjectId(_))));
    }

    #[test]
    fn prepare_for_persisted_entity_sends_diff_only() {
        let now = datetime::now();
        let mut entity = Entity::from_document(
            config(),
            doc! { "_id": 1, "name": "Anakin Skywalker", "side": "light" },
        )
        .unwrap();
        entity.set("name", "Darth Vader").unwrap();

        assert_eq!(
            entity.prepare_write(now).unwrap(),
            PreparedWrite::Update {
                filter: Filter::id(1),
                update: Update::set(doc! { "name": "Darth Vader", "updated_at": now }),
                upsert: false,
            }
        );
    }

    #[test]
    fn prepare_for_unsaved_entity_with_id_upserts_everything() {
        let now = datetime::now();
        let mut entity = Entity::new(config());
        entity.set("_id", "luke").unwrap();
        entity.set("name", "Luke Skywalker").unwrap();

        let PreparedWrite::Update { update, upsert, .. } = entity.prepare_write(now).unwrap() else {
            panic!("expected update");
        };

        assert!(upsert);
        assert_eq!(
            update.set,
            doc! { "name": "Luke Skywalker", "created_at": now, "updated_at": now }
        );
    }

    #[test]
    fn prepare_rejects_invalid_identifier_untouched() {
        let mut entity = Entity::new(config());
        entity.set("_id", vec![Bson::from(1)]).unwrap();

        assert!(matches!(
            entity.prepare_write(datetime::now()),
            Err(DocumentStoreError::InvalidArgument(_))
        ));
        assert!(entity.get("created_at").is_none());
    }

    #[test]
    fn clear_identity_drops_id_and_timestamps() {
        let mut entity = Entity::from_document(
            config(),
            doc! { "_id": 1, "name": "Yoda", "created_at": datetime::now(), "updated_at": datetime::now() },
        )
        .unwrap();

        entity.clear_identity();

        assert_eq!(entity.as_document(), &doc! { "name": "Yoda" });
        assert!(!entity.is_persisted());
    }
}
