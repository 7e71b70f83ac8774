// ── Processors ──
//
// A processor turns a finished request into calls on the consumer. Each
// entity resolves to its own processor or the shared fallback, which
// builds blobs and forwards them to the requesting view.
//
// The registry also tracks subscribed entities so a successful response
// for one entity reaches every equivalent one (same resource key or
// same DataConfig fingerprint).

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::model::{DataError, DataPayload, EntityConfig, EntityId, Operation, ResourceKey};
use crate::view::DataView;

/// Success and error hooks for one entity.
pub trait Processor: Send + Sync + 'static {
    fn on_success(&self, ctx: &ProcessorContext, response: &Value);

    fn on_error(&self, ctx: &ProcessorContext, error: &DataError);
}

/// Who asked for what.
#[derive(Clone)]
pub struct ProcessorContext {
    pub operation: Operation,
    pub entity: EntityConfig,
    pub caller_view: Option<Arc<dyn DataView>>,
}

impl ProcessorContext {
    pub fn new(
        operation: Operation,
        entity: EntityConfig,
        caller_view: Option<Arc<dyn DataView>>,
    ) -> Self {
        Self {
            operation,
            entity,
            caller_view,
        }
    }

    /// The requesting view: the caller's if given, else the entity's.
    pub fn view(&self) -> Option<&Arc<dyn DataView>> {
        self.caller_view.as_ref().or_else(|| self.entity.view())
    }

    /// `response` shaped by the entity's blob class and the operation.
    pub fn payload(&self, response: &Value) -> DataPayload {
        DataPayload::from_response(self.entity.blob_class(), self.operation, response)
    }
}

impl fmt::Debug for ProcessorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorContext")
            .field("operation", &self.operation)
            .field("entity", &self.entity.id())
            .field("has_caller_view", &self.caller_view.is_some())
            .finish()
    }
}

// ── Built-in processors ──────────────────────────────────────────────

/// Forwards blobs and errors to the requesting view.
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackProcessor;

impl Processor for FallbackProcessor {
    fn on_success(&self, ctx: &ProcessorContext, response: &Value) {
        match ctx.view() {
            Some(view) => view.handle_data_change(ctx.payload(response)),
            None => debug!(entity = %ctx.entity.id(), "no view for response"),
        }
    }

    fn on_error(&self, ctx: &ProcessorContext, error: &DataError) {
        match ctx.view() {
            Some(view) => view.handle_data_error(error.clone()),
            None => debug!(entity = %ctx.entity.id(), %error, "no view for error"),
        }
    }
}

/// Processor assembled from two closures.
pub struct FnProcessor<S, E> {
    success: S,
    error: E,
}

impl<S, E> Processor for FnProcessor<S, E>
where
    S: Fn(&ProcessorContext, &Value) + Send + Sync + 'static,
    E: Fn(&ProcessorContext, &DataError) + Send + Sync + 'static,
{
    fn on_success(&self, ctx: &ProcessorContext, response: &Value) {
        (self.success)(ctx, response);
    }

    fn on_error(&self, ctx: &ProcessorContext, error: &DataError) {
        (self.error)(ctx, error);
    }
}

pub fn processor_fn<S, E>(success: S, error: E) -> Arc<dyn Processor>
where
    S: Fn(&ProcessorContext, &Value) + Send + Sync + 'static,
    E: Fn(&ProcessorContext, &DataError) + Send + Sync + 'static,
{
    Arc::new(FnProcessor { success, error })
}

// ── Registry ─────────────────────────────────────────────────────────

pub struct ProcessorRegistry {
    fallback: Arc<dyn Processor>,
    subscribers: DashMap<EntityId, EntityConfig>,
    by_resource: DashMap<ResourceKey, BTreeSet<EntityId>>,
    by_fingerprint: DashMap<u64, BTreeSet<EntityId>>,
}

impl ProcessorRegistry {
    pub fn new(fallback: Arc<dyn Processor>) -> Self {
        Self {
            fallback,
            subscribers: DashMap::new(),
            by_resource: DashMap::new(),
            by_fingerprint: DashMap::new(),
        }
    }

    pub fn resolve(&self, entity: &EntityConfig) -> Arc<dyn Processor> {
        entity
            .processor()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Subscribe `entity` to responses fetched for equivalent entities.
    pub fn register(&self, entity: EntityConfig) {
        let id = entity.id();
        self.by_resource
            .entry(entity.resource_key().clone())
            .or_default()
            .insert(id);
        self.by_fingerprint
            .entry(entity.fingerprint())
            .or_default()
            .insert(id);
        debug!(entity = %id, key = %entity.resource_key(), "entity registered");
        self.subscribers.insert(id, entity);
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister(&self, id: EntityId) -> bool {
        let Some((_, entity)) = self.subscribers.remove(&id) else {
            return false;
        };
        self.by_resource
            .remove_if_mut(entity.resource_key(), |_, ids| {
                ids.remove(&id);
                ids.is_empty()
            });
        self.by_fingerprint
            .remove_if_mut(&entity.fingerprint(), |_, ids| {
                ids.remove(&id);
                ids.is_empty()
            });
        true
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Registered entities equivalent to `entity`, in registration order.
    /// The entity a fan-out leaf was derived from is left out.
    pub fn equivalents(&self, entity: &EntityConfig) -> Vec<EntityConfig> {
        let mut ids = BTreeSet::new();
        if let Some(set) = self.by_resource.get(entity.resource_key()) {
            ids.extend(set.iter().copied());
        }
        if let Some(set) = self.by_fingerprint.get(&entity.fingerprint()) {
            ids.extend(set.iter().copied());
        }
        ids.remove(&entity.id());
        if let Some(source) = entity.derived_from() {
            ids.remove(&source);
        }
        ids.into_iter()
            .filter_map(|id| self.subscribers.get(&id).map(|e| e.value().clone()))
            .collect()
    }

    /// Deliver a response to the requester, then to every equivalent
    /// registered entity.
    pub fn deliver_success(&self, ctx: &ProcessorContext, response: &Value) {
        self.resolve(&ctx.entity).on_success(ctx, response);

        // Collected up front: callbacks may register or unregister.
        let listeners = self.equivalents(&ctx.entity);
        if !listeners.is_empty() {
            debug!(
                entity = %ctx.entity.id(),
                listeners = listeners.len(),
                "propagating response"
            );
        }
        for listener in listeners {
            let listener_ctx = ProcessorContext::new(ctx.operation, listener, None);
            self.resolve(&listener_ctx.entity)
                .on_success(&listener_ctx, response);
        }
    }

    /// Errors only reach the requester.
    pub fn deliver_error(&self, ctx: &ProcessorContext, error: &DataError) {
        self.resolve(&ctx.entity).on_error(ctx, error);
    }
}
