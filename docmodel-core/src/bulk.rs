//! Translation of entities into batch write descriptors.
//!
//! A [`BulkOperation`] describes the write an entity needs without executing
//! it, so callers can group many entities into one batch request against the
//! store. Producing the descriptor optimistically marks the entity persisted;
//! callers that see the batch fail should reload the affected entities.

use bson::Document;

use crate::{
    backend::Update,
    datetime,
    entity::{Entity, PreparedWrite},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Filter},
};

#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    Insert {
        document: Document,
    },
    Update {
        filter: Expr,
        update: Update,
        upsert: bool,
    },
    Delete {
        filter: Expr,
    },
}

impl BulkOperation {
    /// The operation name used in batch write requests.
    pub fn name(&self) -> &'static str {
        match self {
            BulkOperation::Insert { .. } => "insertOne",
            BulkOperation::Update { .. } => "updateOne",
            BulkOperation::Delete { .. } => "deleteOne",
        }
    }
}

impl Entity {
    /// Returns the write that would persist this entity, or `None` if it is
    /// already persisted without changes that the store would see.
    ///
    /// Timestamps are stamped and a missing identifier is generated exactly as
    /// [`Model::save`](crate::model::Model::save) would. The entity is then
    /// marked persisted with no pending changes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the identifier cannot be stored.
    pub fn as_bulk_operation(&mut self) -> DocumentStoreResult<Option<BulkOperation>> {
        if self.is_persisted() && !self.has_changes() {
            return Ok(None);
        }

        let write = self.prepare_write(datetime::now())?;
        if write.is_noop() {
            self.mark_persisted();
            return Ok(None);
        }

        let operation = match write {
            PreparedWrite::Insert(document) => BulkOperation::Insert { document },
            PreparedWrite::Update { filter, update, upsert } => {
                BulkOperation::Update { filter, update, upsert }
            }
        };
        self.mark_persisted();

        Ok(Some(operation))
    }

    /// Returns a delete descriptor targeting this entity's identifier.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the entity has no storable identifier.
    pub fn as_bulk_delete(&self) -> DocumentStoreResult<BulkOperation> {
        let id = self.id().ok_or_else(|| {
            DocumentStoreError::InvalidArgument(
                "cannot delete an entity without an identifier".to_string(),
            )
        })?;

        Ok(BulkOperation::Delete {
            filter: Filter::id(id.clone()),
        })
    }
}
