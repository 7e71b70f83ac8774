// ── Dispatch target ──
//
// What `Dispatcher::enqueue` is asked to run. The variant decides the
// path (direct/serialized, batch fan-out, bulk fan-out) up front.

use super::EntityConfig;
use crate::error::CoreError;

#[derive(Debug, Clone)]
pub enum Target {
    /// One entity backed by a single URL.
    Single(EntityConfig),
    /// One entity whose DataConfig carries a batch override.
    Batch(EntityConfig),
    /// Several independent entities joined by position.
    Bulk(Vec<EntityConfig>),
}

impl Target {
    /// Reject targets whose variant disagrees with their configs.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            Self::Single(entity) if entity.is_batch() => Err(CoreError::invalid(
                "single target carries a batch override",
            )),
            Self::Batch(entity) if !entity.is_batch() => Err(CoreError::invalid(
                "batch target has no batch override",
            )),
            Self::Bulk(entities) if entities.is_empty() => {
                Err(CoreError::invalid("bulk target is empty"))
            }
            Self::Bulk(entities) if entities.iter().any(EntityConfig::is_batch) => Err(
                CoreError::invalid("bulk targets cannot contain batch entities"),
            ),
            _ => Ok(()),
        }
    }
}

impl From<EntityConfig> for Target {
    fn from(entity: EntityConfig) -> Self {
        if entity.is_batch() {
            Self::Batch(entity)
        } else {
            Self::Single(entity)
        }
    }
}

impl From<Vec<EntityConfig>> for Target {
    fn from(entities: Vec<EntityConfig>) -> Self {
        Self::Bulk(entities)
    }
}
