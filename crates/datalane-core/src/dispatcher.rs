// ── Dispatcher ──
//
// The single entry point for data requests. `enqueue` validates its
// target synchronously and returns; every outcome is delivered later
// through the resolved processor. Owns the reuse cache, the per-URL
// serializer and the processor registry. Cheap to clone.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use serde_json::Value;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use datalane_api::{Request, Transport};

use crate::cache::{ReuseCache, unique_url};
use crate::clock::{Clock, SystemClock};
use crate::config::DispatcherConfig;
use crate::coordinator;
use crate::error::CoreError;
use crate::model::{DataError, EntityConfig, EntityId, Operation, Target};
use crate::processor::{FallbackProcessor, Processor, ProcessorContext, ProcessorRegistry};
use crate::router::{PageRouter, Router};
use crate::serializer::{Admission, RequestSerializer};
use crate::store::{KvStore, MemoryStore};
use crate::view::DataView;

// ── EnqueueOptions ───────────────────────────────────────────────────

/// Per-call options for [`Dispatcher::enqueue`].
#[derive(Clone)]
pub struct EnqueueOptions {
    /// Receives the result instead of the entity's own view. For batch
    /// and bulk calls this is the aggregate receiver.
    pub caller_view: Option<Arc<dyn DataView>>,
    /// Route mutating requests through the per-URL serializer. Calls
    /// made from inside a processor for the same URL must turn this off.
    pub consider_for_queueing: bool,
    /// Extra headers for the outbound request.
    pub headers: Vec<(String, String)>,
}

impl EnqueueOptions {
    pub fn with_caller_view(mut self, view: Arc<dyn DataView>) -> Self {
        self.caller_view = Some(view);
        self
    }

    pub fn without_queueing(mut self) -> Self {
        self.consider_for_queueing = false;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Options for a fan-out leaf: never queued, never delivered to a view.
    pub(crate) fn leaf(parent: &Self) -> Self {
        Self {
            caller_view: None,
            consider_for_queueing: false,
            headers: parent.headers.clone(),
        }
    }
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            caller_view: None,
            consider_for_queueing: true,
            headers: Vec::new(),
        }
    }
}

impl fmt::Debug for EnqueueOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnqueueOptions")
            .field("has_caller_view", &self.caller_view.is_some())
            .field("consider_for_queueing", &self.consider_for_queueing)
            .field("headers", &self.headers)
            .finish()
    }
}

/// One single-entity request, queued or about to run.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) operation: Operation,
    pub(crate) entity: EntityConfig,
    pub(crate) payload: Option<Value>,
    pub(crate) options: EnqueueOptions,
}

// ── Dispatcher ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    config: DispatcherConfig,
    transport: Arc<dyn Transport>,
    router: Arc<dyn Router>,
    cache: ReuseCache,
    serializer: RequestSerializer<PendingRequest>,
    registry: ProcessorRegistry,
    /// Token for the current `start()`; replaced on restart.
    cancel: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn builder(transport: Arc<dyn Transport>) -> DispatcherBuilder {
        DispatcherBuilder {
            transport,
            store: None,
            router: None,
            clock: None,
            fallback: None,
            config: DispatcherConfig::default(),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &ReuseCache {
        &self.inner.cache
    }

    pub fn router(&self) -> &Arc<dyn Router> {
        &self.inner.router
    }

    /// Mutating requests waiting behind the in-flight one for `url`.
    pub fn queue_len(&self, url: &str) -> usize {
        self.inner.serializer.queue_len(url)
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    /// Submit a request. Returns once the target has been validated;
    /// results arrive through the resolved processor.
    ///
    /// `operation` defaults to the entity's `default_operation`. Fails
    /// synchronously only for malformed targets or when called outside
    /// a Tokio runtime.
    pub fn enqueue(
        &self,
        operation: Option<Operation>,
        target: impl Into<Target>,
        payload: Option<Value>,
        options: EnqueueOptions,
    ) -> Result<(), CoreError> {
        let target = target.into();
        target.validate()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CoreError::Internal(
                "enqueue called outside a Tokio runtime".into(),
            ));
        }

        match target {
            Target::Batch(entity) => coordinator::batch::dispatch(self, entity, payload, options),
            Target::Bulk(entities) => {
                coordinator::bulk::dispatch(self, operation, entities, payload, options)
            }
            Target::Single(entity) => {
                let operation = operation.unwrap_or(entity.data_config().default_operation);
                self.submit(PendingRequest {
                    operation,
                    entity,
                    payload,
                    options,
                });
                Ok(())
            }
        }
    }

    /// Run a single-entity request, through the serializer when it
    /// mutates and queueing is enabled.
    pub(crate) fn submit(&self, request: PendingRequest) {
        let serialize = !request.operation.is_read() && request.options.consider_for_queueing;
        let url = request.entity.url().map(str::to_owned);

        match url {
            Some(url) if serialize => match self.inner.serializer.admit(&url, request) {
                Admission::Dispatch(request) => self.spawn_serialized(url, request),
                Admission::Queued { .. } => {}
            },
            _ => {
                let dispatcher = self.clone();
                tokio::spawn(async move { dispatcher.run(request).await });
            }
        }
    }

    /// Drain `url`'s queue on one task, one request at a time.
    fn spawn_serialized(&self, url: String, first: PendingRequest) {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            let mut next = Some(first);
            while let Some(request) = next {
                // A panicking callback must still hand the URL to the next waiter.
                if AssertUnwindSafe(dispatcher.run(request))
                    .catch_unwind()
                    .await
                    .is_err()
                {
                    warn!(url = %url, "request handler panicked; releasing queue");
                }
                next = dispatcher.inner.serializer.complete(&url);
            }
        });
    }

    async fn run(&self, request: PendingRequest) {
        let PendingRequest {
            operation,
            entity,
            payload,
            options,
        } = request;
        let result = self
            .execute(operation, &entity, payload, &options.headers)
            .await;

        let ctx = ProcessorContext::new(operation, entity, options.caller_view);
        match result {
            Ok(response) => self.inner.registry.deliver_success(&ctx, &response),
            Err(e) => {
                debug!(entity = %ctx.entity.id(), %operation, error = %e, "request failed");
                self.inner.registry.deliver_error(&ctx, &DataError::from(&e));
            }
        }
    }

    /// Authorize, consult the cache, then hit the network.
    async fn execute(
        &self,
        operation: Operation,
        entity: &EntityConfig,
        payload: Option<Value>,
        headers: &[(String, String)],
    ) -> Result<Value, CoreError> {
        let data_config = entity.data_config();
        let method = operation.method();
        if !self.inner.config.allows(method) && !data_config.allowed_operations.contains(&operation)
        {
            debug!(entity = %entity.id(), %operation, "operation not permitted");
            return Err(CoreError::Unauthorized { operation });
        }
        let url = entity
            .url()
            .ok_or_else(|| CoreError::Internal("single request without a url".into()))?;

        let policy = &data_config.reuse;
        let cache_key = if operation.is_read() && policy.enable {
            let key = unique_url(url, payload.as_ref());
            match self.inner.cache.recall(&key).await {
                Ok(cached) if policy.accepts(&cached) => {
                    debug!(url, %operation, key = %key, "served from cache");
                    return Ok(cached);
                }
                Ok(_) => debug!(url, key = %key, "cached response rejected by handler"),
                Err(e) => debug!(url, key = %key, reason = %e, "cache miss"),
            }
            Some(key)
        } else {
            None
        };

        let mut request = Request::new(method, url);
        if let Some(body) = payload {
            request = request.with_body(body);
        }
        for (name, value) in headers {
            request = request.with_header(name.clone(), value.clone());
        }
        debug!(url, %operation, "dispatching");
        let response = self.inner.transport.call(request).await?;

        if let Some(key) = cache_key {
            if let Err(e) = self
                .inner
                .cache
                .remember(&key, &response.body, policy, url)
                .await
            {
                warn!(key = %key, error = %e, "failed to persist reusable response");
            }
        }
        Ok(response.body)
    }

    // ── Subscriptions & cache control ────────────────────────────────

    /// Deliver responses fetched for equivalent entities to `entity`.
    pub fn register(&self, entity: EntityConfig) {
        self.inner.registry.register(entity);
    }

    pub fn unregister(&self, id: EntityId) -> bool {
        self.inner.registry.unregister(id)
    }

    /// Drop the cached response for a read of `url` with `payload`.
    pub async fn invalidate(&self, url: &str, payload: Option<&Value>) -> Result<(), CoreError> {
        self.inner.cache.remove(&unique_url(url, payload)).await
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the background route sweeper. Calling it twice restarts it.
    pub async fn start(&self) {
        self.shutdown().await;

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock().await = cancel.clone();

        let routes = self.inner.router.route_changes();
        let handle = tokio::spawn(route_sweep_task(self.clone(), routes, cancel));
        self.inner.task_handles.lock().await.push(handle);
        info!("dispatcher started");
    }

    /// Stop background tasks and wait for them to finish. In-flight
    /// requests are not cancelled.
    pub async fn shutdown(&self) {
        self.inner.cancel.lock().await.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        if handles.is_empty() {
            return;
        }
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("dispatcher stopped");
    }
}

async fn route_sweep_task(
    dispatcher: Dispatcher,
    mut routes: watch::Receiver<Option<String>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = routes.changed() => {
                if changed.is_err() {
                    debug!("router closed; route sweeper exiting");
                    break;
                }
                let page = routes.borrow_and_update().clone();
                match dispatcher.cache().sweep().await {
                    Ok(removed) => debug!(page = ?page, removed, "route change sweep"),
                    Err(e) => warn!(page = ?page, error = %e, "route change sweep failed"),
                }
            }
        }
    }
}

// ── Builder ──────────────────────────────────────────────────────────

/// Assembles a [`Dispatcher`]. Every collaborator except the transport
/// has an in-process default.
pub struct DispatcherBuilder {
    transport: Arc<dyn Transport>,
    store: Option<Arc<dyn KvStore>>,
    router: Option<Arc<dyn Router>>,
    clock: Option<Arc<dyn Clock>>,
    fallback: Option<Arc<dyn Processor>>,
    config: DispatcherConfig,
}

impl DispatcherBuilder {
    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the processor used by entities without their own.
    pub fn fallback(mut self, processor: Arc<dyn Processor>) -> Self {
        self.fallback = Some(processor);
        self
    }

    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Dispatcher {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let router = self
            .router
            .unwrap_or_else(|| Arc::new(PageRouter::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let fallback = self
            .fallback
            .unwrap_or_else(|| Arc::new(FallbackProcessor));

        let default_timeout_ms =
            u64::try_from(self.config.default_reuse_timeout.as_millis()).unwrap_or(u64::MAX);
        let cache = ReuseCache::new(store, Arc::clone(&router), clock, default_timeout_ms);
        let serializer = RequestSerializer::new(self.config.stale_queue_after);

        Dispatcher {
            inner: Arc::new(DispatcherInner {
                config: self.config,
                transport: self.transport,
                router,
                cache,
                serializer,
                registry: ProcessorRegistry::new(fallback),
                cancel: Mutex::new(CancellationToken::new()),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }
}
