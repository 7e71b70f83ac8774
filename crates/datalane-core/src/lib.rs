//! Data orchestration between views and a backend API.
//!
//! Every read and write a view makes goes through one [`Dispatcher`]:
//!
//! - **[`Dispatcher`]** — `enqueue(operation, target, payload, options)`
//!   validates the target synchronously, then runs the request in the
//!   background and delivers the outcome through a [`Processor`].
//!   Mutating requests are serialized per URL by a [`RequestSerializer`];
//!   queued requests that wait longer than the stale threshold are
//!   dropped together with the rest of that URL's backlog.
//!
//! - **[`ReuseCache`]** — read responses are kept in a [`KvStore`] under
//!   a key built from the URL and the sorted payload ([`unique_url`]),
//!   with an absolute expiry and optional page scope. A [`Router`]
//!   supplies the current page and triggers a sweep on navigation once
//!   [`Dispatcher::start`] has been called.
//!
//! - **[`ProcessorRegistry`]** — resolves each entity to its own
//!   processor or the [`FallbackProcessor`], and propagates successful
//!   responses to every registered entity backed by the same resource.
//!
//! - **Batch and bulk** — a [`Target::Batch`] fans out over the
//!   entity's `BatchCall`s and joins by identifier; a [`Target::Bulk`]
//!   fans out over several entities and joins by position. Either way
//!   the aggregate reaches the receiving [`DataView`] exactly once.
//!
//! - **Domain model** ([`model`]) — `DataConfig`, `EntityConfig`,
//!   `ReusePolicy`, blobs and the persisted `CacheRecord`.

pub mod cache;
pub mod clock;
pub mod config;
mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod processor;
pub mod router;
pub mod serializer;
pub mod store;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{ReuseCache, unique_url};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::DispatcherConfig;
pub use dispatcher::{Dispatcher, DispatcherBuilder, EnqueueOptions};
pub use error::{CoreError, UNAUTHORIZED_STATUS};
pub use processor::{
    FallbackProcessor, FnProcessor, Processor, ProcessorContext, ProcessorRegistry, processor_fn,
};
pub use router::{PageRouter, Router};
pub use serializer::{Admission, RequestSerializer};
pub use store::{FileStore, KvStore, MemoryStore, StoreError};
pub use view::DataView;

pub use model::{
    BatchCall, BatchResults, Blob, BlobClass, CacheMeta, CacheRecord, CacheScope, DataConfig,
    DataError, DataPayload, DataSource, EntityConfig, EntityId, LeafOutcome, Operation,
    ResourceKey, ReusePolicy, Target,
};

// Transport types callers need to build a dispatcher.
pub use datalane_api::{HttpTransport, Method, TlsMode, Transport, TransportConfig};
