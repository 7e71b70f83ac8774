// ── EntityConfig ──
//
// Binds a DataConfig to whoever consumes its results. Built once,
// validated at construction, cheap to clone (`Arc` inside). Identity
// keys used for response propagation are computed here so nothing has
// to re-serialize the config on every response.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use url::Url;

use super::{BlobClass, DataConfig, DataSource};
use crate::error::CoreError;
use crate::processor::Processor;
use crate::view::DataView;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique handle for one built `EntityConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Normalized resource URL plus blob class name.
///
/// Two entities with the same key are the same resource as far as
/// response propagation is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    pub fn new(source: &DataSource, blob_class: Option<&BlobClass>) -> Self {
        let resource = match source {
            DataSource::Url(url) => normalize_url(url),
            DataSource::Batch(calls) => {
                let urls: Vec<String> = calls.iter().map(|c| normalize_url(&c.url)).collect();
                format!("batch:{}", urls.join(","))
            }
        };
        let class = blob_class.map(BlobClass::name).unwrap_or_default();
        Self(Arc::from(format!("{resource}#{class}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lower-case scheme/host for absolute URLs, strip trailing slashes,
/// and give relative paths a leading slash.
fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Ok(url) = Url::parse(trimmed) {
        return url.as_str().trim_end_matches('/').to_owned();
    }
    let path = trimmed.trim_end_matches('/');
    if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("/{path}")
    }
}

fn fingerprint(config: &DataConfig) -> Result<u64, CoreError> {
    let serialized = serde_json::to_string(config)
        .map_err(|e| CoreError::invalid(format!("data config is not serializable: {e}")))?;
    let mut hasher = DefaultHasher::new();
    serialized.hash(&mut hasher);
    Ok(hasher.finish())
}

// ── EntityConfig ─────────────────────────────────────────────────────

/// A DataConfig bound to its consumer.
#[derive(Clone)]
pub struct EntityConfig {
    inner: Arc<EntityInner>,
}

struct EntityInner {
    id: EntityId,
    data_config: DataConfig,
    view: Option<Arc<dyn DataView>>,
    processor: Option<Arc<dyn Processor>>,
    blob_class: Option<BlobClass>,
    derived_from: Option<EntityId>,
    resource_key: ResourceKey,
    fingerprint: u64,
}

impl EntityConfig {
    pub fn builder(data_config: DataConfig) -> EntityConfigBuilder {
        EntityConfigBuilder {
            data_config,
            view: None,
            processor: None,
            blob_class: None,
            derived_from: None,
        }
    }

    pub fn id(&self) -> EntityId {
        self.inner.id
    }

    pub fn data_config(&self) -> &DataConfig {
        &self.inner.data_config
    }

    /// Single-resource URL; `None` for batch configs.
    pub fn url(&self) -> Option<&str> {
        self.inner.data_config.url()
    }

    pub fn is_batch(&self) -> bool {
        self.inner.data_config.is_batch()
    }

    pub fn view(&self) -> Option<&Arc<dyn DataView>> {
        self.inner.view.as_ref()
    }

    pub fn processor(&self) -> Option<&Arc<dyn Processor>> {
        self.inner.processor.as_ref()
    }

    pub fn blob_class(&self) -> Option<&BlobClass> {
        self.inner.blob_class.as_ref()
    }

    pub fn resource_key(&self) -> &ResourceKey {
        &self.inner.resource_key
    }

    /// The entity this one was cloned from to run one leaf of a fan-out.
    pub fn derived_from(&self) -> Option<EntityId> {
        self.inner.derived_from
    }

    /// Hash of the serialized DataConfig, computed at build time.
    pub fn fingerprint(&self) -> u64 {
        self.inner.fingerprint
    }

    /// Whether responses for `self` should also reach `other`.
    ///
    /// An entity is never equivalent to itself or to a leaf derived from it.
    pub fn is_equivalent(&self, other: &EntityConfig) -> bool {
        !self.is_same_request(other)
            && (self.resource_key() == other.resource_key()
                || self.fingerprint() == other.fingerprint())
    }

    fn is_same_request(&self, other: &EntityConfig) -> bool {
        self.id() == other.id()
            || self.derived_from() == Some(other.id())
            || other.derived_from() == Some(self.id())
    }
}

impl fmt::Debug for EntityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityConfig")
            .field("id", &self.inner.id)
            .field("data_config", &self.inner.data_config)
            .field("blob_class", &self.inner.blob_class)
            .field("has_view", &self.inner.view.is_some())
            .field("has_processor", &self.inner.processor.is_some())
            .finish()
    }
}

// ── Builder ──────────────────────────────────────────────────────────

pub struct EntityConfigBuilder {
    data_config: DataConfig,
    view: Option<Arc<dyn DataView>>,
    processor: Option<Arc<dyn Processor>>,
    blob_class: Option<BlobClass>,
    derived_from: Option<EntityId>,
}

impl EntityConfigBuilder {
    pub fn view(mut self, view: Arc<dyn DataView>) -> Self {
        self.view = Some(view);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn blob_class(mut self, class: impl Into<BlobClass>) -> Self {
        self.blob_class = Some(class.into());
        self
    }

    /// Mark the built entity as a fan-out leaf standing in for `source`.
    pub fn derived_from(mut self, source: EntityId) -> Self {
        self.derived_from = Some(source);
        self
    }

    /// Validate and freeze the config.
    ///
    /// A valid entity has a well-formed DataConfig and someone to deliver
    /// results to: an explicit processor or a view.
    pub fn build(self) -> Result<EntityConfig, CoreError> {
        self.data_config.validate()?;
        if self.processor.is_none() && self.view.is_none() {
            return Err(CoreError::invalid(
                "entity config needs either a processor or a view",
            ));
        }

        let resource_key = ResourceKey::new(&self.data_config.source, self.blob_class.as_ref());
        let fingerprint = fingerprint(&self.data_config)?;

        Ok(EntityConfig {
            inner: Arc::new(EntityInner {
                id: EntityId(NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed)),
                data_config: self.data_config,
                view: self.view,
                processor: self.processor,
                blob_class: self.blob_class,
                derived_from: self.derived_from,
                resource_key,
                fingerprint,
            }),
        })
    }
}
