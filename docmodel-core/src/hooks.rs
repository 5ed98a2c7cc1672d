//! Save lifecycle hooks.

use crate::{entity::Entity, error::DocumentStoreResult};

/// Callbacks around [`Model::save`](crate::model::Model::save).
///
/// `before_save` runs after the no-op check and before any validation or
/// timestamping, so changes it makes are saved too. Returning an error aborts
/// the save before any store call; [`DocumentStoreError::Rejected`](crate::error::DocumentStoreError::Rejected)
/// is the conventional choice.
///
/// `after_save` runs only when the save succeeded.
pub trait ModelHooks: Send + Sync {
    fn before_save(&self, _entity: &mut Entity) -> DocumentStoreResult<()> {
        Ok(())
    }

    fn after_save(&self, _entity: &Entity) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl ModelHooks for NoHooks {}
