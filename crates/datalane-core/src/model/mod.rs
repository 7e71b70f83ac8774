// ── Domain model ──
//
// Static resource descriptions (DataConfig, EntityConfig), the values
// delivered to views, and the persisted cache record.

mod blob;
mod data_config;
mod entity;
mod operation;
mod outcome;
mod record;
mod reuse;
mod target;

pub use blob::{Blob, BlobClass, DataPayload};
pub use data_config::{BatchCall, DataConfig, DataSource};
pub use entity::{EntityConfig, EntityConfigBuilder, EntityId, ResourceKey};
pub use operation::Operation;
pub use outcome::{BatchResults, DataError, LeafOutcome};
pub use record::{CacheMeta, CacheRecord};
pub use reuse::{CacheScope, DEFAULT_REUSE_TIMEOUT_MS, ReuseHandler, ReusePolicy};
pub use target::Target;
