#![allow(clippy::unwrap_used)]
// End-to-end dispatcher behavior against a scripted in-memory transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use datalane_api::{Error as ApiError, Method, Request, Response, Transport};
use datalane_core::{
    BatchCall, BatchResults, CacheScope, CoreError, DataConfig, DataError, DataPayload, DataView,
    Dispatcher, EnqueueOptions, EntityConfig, LeafOutcome, ManualClock, MemoryStore, Operation,
    PageRouter, ReusePolicy, Target, processor_fn,
};

// ── Scripted transport ──────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Ok(Value),
    Fail(u16, &'static str),
}

#[derive(Default)]
struct MockTransport {
    routes: Mutex<HashMap<String, (Duration, Reply)>>,
    calls: Mutex<Vec<Request>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    fn route(&self, method: Method, url: &str, delay: Duration, reply: Reply) {
        self.routes
            .lock()
            .unwrap()
            .insert(format!("{method} {url}"), (delay, reply));
    }

    fn calls(&self) -> Vec<Request> {
        self.calls.lock().unwrap().clone()
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(&self, request: Request) -> Result<Response, ApiError> {
        let key = format!("{} {}", request.method, request.url);
        self.calls.lock().unwrap().push(request);
        let scripted = self.routes.lock().unwrap().get(&key).cloned();

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let (delay, reply) = scripted.unwrap_or((Duration::ZERO, Reply::Fail(404, "Not Found")));
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match reply {
            Reply::Ok(body) => Ok(Response::ok(body)),
            Reply::Fail(status, message) => Err(ApiError::Http {
                status,
                message: message.into(),
            }),
        }
    }
}

// ── Recording view ──────────────────────────────────────────────────

#[derive(Debug)]
enum Event {
    Change(DataPayload),
    Error(DataError),
    Batch(BatchResults),
    Bulk(Vec<LeafOutcome>),
}

struct RecordingView {
    tx: mpsc::UnboundedSender<Event>,
}

impl DataView for RecordingView {
    fn handle_data_change(&self, data: DataPayload) {
        let _ = self.tx.send(Event::Change(data));
    }

    fn handle_data_error(&self, error: DataError) {
        let _ = self.tx.send(Event::Error(error));
    }

    fn handle_batch_data(&self, results: BatchResults) {
        let _ = self.tx.send(Event::Batch(results));
    }

    fn handle_bulk_data(&self, results: Vec<LeafOutcome>) {
        let _ = self.tx.send(Event::Bulk(results));
    }
}

fn recording_view() -> (Arc<RecordingView>, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(RecordingView { tx }), rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(600), rx.recv())
        .await
        .expect("timed out waiting for a view event")
        .expect("view channel closed")
}

/// Let spawned tasks run to quiescence.
async fn settle() {
    tokio::time::sleep(Duration::from_secs(120)).await;
}

fn change_value(event: Event) -> Value {
    match event {
        Event::Change(payload) => payload.into_value(),
        other => panic!("expected data change, got {other:?}"),
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    dispatcher: Dispatcher,
    transport: Arc<MockTransport>,
    router: Arc<PageRouter>,
    clock: Arc<ManualClock>,
}

fn harness() -> Harness {
    let transport = Arc::new(MockTransport::default());
    let router = Arc::new(PageRouter::with_page("home"));
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let dispatcher = Dispatcher::builder(transport.clone())
        .store(Arc::new(MemoryStore::new()))
        .router(router.clone())
        .clock(clock.clone())
        .build();
    Harness {
        dispatcher,
        transport,
        router,
        clock,
    }
}

fn entity(config: DataConfig, view: &Arc<RecordingView>) -> EntityConfig {
    EntityConfig::builder(config)
        .view(view.clone())
        .build()
        .unwrap()
}

const NO_DELAY: Duration = Duration::ZERO;

// ── Serialization ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn mutations_to_one_url_run_one_at_a_time_in_order() {
    let h = harness();
    h.transport.route(
        Method::Post,
        "/orders",
        Duration::from_millis(100),
        Reply::Ok(json!({ "ok": true })),
    );
    let (view, mut rx) = recording_view();
    let orders = entity(DataConfig::for_url("/orders").allow(Operation::Post), &view);

    for n in 0..3 {
        h.dispatcher
            .enqueue(
                Some(Operation::Post),
                orders.clone(),
                Some(json!({ "n": n })),
                EnqueueOptions::default(),
            )
            .unwrap();
    }
    assert_eq!(h.dispatcher.queue_len("/orders"), 2);

    for _ in 0..3 {
        change_value(next_event(&mut rx).await);
    }
    let sent: Vec<Value> = h.transport.calls().into_iter().map(|r| r.body.unwrap()).collect();
    assert_eq!(sent, vec![json!({ "n": 0 }), json!({ "n": 1 }), json!({ "n": 2 })]);
    assert_eq!(h.transport.max_in_flight.load(Ordering::SeqCst), 1);
    assert_eq!(h.dispatcher.queue_len("/orders"), 0);
}

#[tokio::test(start_paused = true)]
async fn stale_queue_is_dropped_entirely() {
    let h = harness();
    h.transport.route(
        Method::Post,
        "/orders",
        Duration::from_secs(31),
        Reply::Ok(json!({ "ok": true })),
    );
    let (view, mut rx) = recording_view();
    let orders = entity(DataConfig::for_url("/orders").allow(Operation::Post), &view);

    for n in 0..3 {
        h.dispatcher
            .enqueue(
                Some(Operation::Post),
                orders.clone(),
                Some(json!({ "n": n })),
                EnqueueOptions::default(),
            )
            .unwrap();
    }

    change_value(next_event(&mut rx).await);
    settle().await;

    assert_eq!(h.transport.call_count(), 1);
    assert!(rx.try_recv().is_err());
    assert_eq!(h.dispatcher.queue_len("/orders"), 0);
}

#[tokio::test(start_paused = true)]
async fn queue_within_the_window_is_fully_served() {
    let h = harness();
    h.transport.route(
        Method::Put,
        "/orders/1",
        Duration::from_secs(10),
        Reply::Ok(json!({})),
    );
    let (view, mut rx) = recording_view();
    let order = entity(DataConfig::for_url("/orders/1").allow(Operation::Put), &view);

    for _ in 0..3 {
        h.dispatcher
            .enqueue(Some(Operation::Put), order.clone(), None, EnqueueOptions::default())
            .unwrap();
    }
    for _ in 0..3 {
        change_value(next_event(&mut rx).await);
    }
    assert_eq!(h.transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_still_releases_the_url() {
    let h = harness();
    h.transport.route(
        Method::Post,
        "/orders",
        Duration::from_millis(100),
        Reply::Ok(json!({ "ok": true })),
    );
    let exploding = EntityConfig::builder(DataConfig::for_url("/orders").allow(Operation::Post))
        .processor(processor_fn(
            |_, _| panic!("success hook failed"),
            |_, _| {},
        ))
        .build()
        .unwrap();
    let (view, mut rx) = recording_view();
    let orders = entity(DataConfig::for_url("/orders").allow(Operation::Post), &view);

    h.dispatcher
        .enqueue(
            Some(Operation::Post),
            exploding,
            Some(json!({ "n": 0 })),
            EnqueueOptions::default(),
        )
        .unwrap();
    h.dispatcher
        .enqueue(
            Some(Operation::Post),
            orders,
            Some(json!({ "n": 1 })),
            EnqueueOptions::default(),
        )
        .unwrap();
    assert_eq!(h.dispatcher.queue_len("/orders"), 1);

    assert_eq!(change_value(next_event(&mut rx).await), json!({ "ok": true }));
    assert_eq!(h.transport.call_count(), 2);
    assert_eq!(h.dispatcher.queue_len("/orders"), 0);
}

#[tokio::test(start_paused = true)]
async fn disabling_queueing_runs_mutations_concurrently() {
    let h = harness();
    h.transport.route(
        Method::Post,
        "/events",
        Duration::from_millis(50),
        Reply::Ok(json!({})),
    );
    let (view, mut rx) = recording_view();
    let events = entity(DataConfig::for_url("/events").allow(Operation::Post), &view);

    for _ in 0..2 {
        h.dispatcher
            .enqueue(
                Some(Operation::Post),
                events.clone(),
                None,
                EnqueueOptions::default().without_queueing(),
            )
            .unwrap();
    }
    next_event(&mut rx).await;
    next_event(&mut rx).await;
    assert_eq!(h.transport.max_in_flight.load(Ordering::SeqCst), 2);
}

// ── Reuse ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn reads_are_served_from_cache_until_expiry() {
    let h = harness();
    h.transport
        .route(Method::Get, "/users", NO_DELAY, Reply::Ok(json!([{ "id": 1 }])));
    let (view, mut rx) = recording_view();
    let users = entity(
        DataConfig::for_url("/users")
            .default_operation(Operation::GetList)
            .reuse(ReusePolicy::default().with_timeout_ms(60_000)),
        &view,
    );

    h.dispatcher
        .enqueue(None, users.clone(), None, EnqueueOptions::default())
        .unwrap();
    assert_eq!(change_value(next_event(&mut rx).await), json!([{ "id": 1 }]));

    h.clock.advance(Duration::from_millis(59_999));
    h.dispatcher
        .enqueue(None, users.clone(), None, EnqueueOptions::default())
        .unwrap();
    assert_eq!(change_value(next_event(&mut rx).await), json!([{ "id": 1 }]));
    assert_eq!(h.transport.call_count(), 1);

    h.clock.advance(Duration::from_millis(1));
    h.dispatcher
        .enqueue(None, users, None, EnqueueOptions::default())
        .unwrap();
    next_event(&mut rx).await;
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn payload_is_part_of_the_cache_key() {
    let h = harness();
    h.transport
        .route(Method::Get, "/users", NO_DELAY, Reply::Ok(json!([])));
    let (view, mut rx) = recording_view();
    let users = entity(DataConfig::for_url("/users"), &view);

    for payload in [json!({ "page": 1 }), json!({ "page": 2 }), json!({ "page": 1 })] {
        h.dispatcher
            .enqueue(None, users.clone(), Some(payload), EnqueueOptions::default())
            .unwrap();
        next_event(&mut rx).await;
    }
    assert_eq!(h.transport.call_count(), 2);
    let keys: Vec<String> = h
        .dispatcher
        .cache()
        .records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(keys, vec!["/users?page=1", "/users?page=2"]);
}

#[tokio::test(start_paused = true)]
async fn non_object_read_payloads_stay_distinct_on_the_wire() {
    let h = harness();
    h.transport
        .route(Method::Get, "/n", NO_DELAY, Reply::Ok(json!("n")));
    let (view, mut rx) = recording_view();
    let numbers = entity(DataConfig::for_url("/n"), &view);

    for payload in [json!([1]), json!([2])] {
        h.dispatcher
            .enqueue(
                Some(Operation::Get),
                numbers.clone(),
                Some(payload),
                EnqueueOptions::default(),
            )
            .unwrap();
        change_value(next_event(&mut rx).await);
    }

    let sent: Vec<Vec<(String, String)>> = h
        .transport
        .calls()
        .iter()
        .map(Request::query_pairs)
        .collect();
    assert_eq!(
        sent,
        vec![
            vec![("_body".to_owned(), "[1]".to_owned())],
            vec![("_body".to_owned(), "[2]".to_owned())],
        ]
    );

    let mut keys: Vec<String> = h
        .dispatcher
        .cache()
        .records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url)
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["/n?_body=%5B1%5D", "/n?_body=%5B2%5D"]);
}

#[tokio::test(start_paused = true)]
async fn handler_rejection_forces_refetch() {
    let h = harness();
    h.transport
        .route(Method::Get, "/feed", NO_DELAY, Reply::Ok(json!({ "stale": true })));
    let (view, mut rx) = recording_view();
    let feed = entity(
        DataConfig::for_url("/feed")
            .reuse(ReusePolicy::default().with_handler(|cached| cached["stale"] != json!(true))),
        &view,
    );

    for _ in 0..2 {
        h.dispatcher
            .enqueue(None, feed.clone(), None, EnqueueOptions::default())
            .unwrap();
        next_event(&mut rx).await;
    }
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_reuse_always_hits_network() {
    let h = harness();
    h.transport
        .route(Method::Get, "/now", NO_DELAY, Reply::Ok(json!(1)));
    let (view, mut rx) = recording_view();
    let now = entity(DataConfig::for_url("/now").reuse(ReusePolicy::disabled()), &view);

    for _ in 0..2 {
        h.dispatcher
            .enqueue(None, now.clone(), None, EnqueueOptions::default())
            .unwrap();
        next_event(&mut rx).await;
    }
    assert_eq!(h.transport.call_count(), 2);
    assert!(h.dispatcher.cache().records().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn in_page_record_is_not_reused_after_navigation() {
    let h = harness();
    h.transport
        .route(Method::Get, "/widgets", NO_DELAY, Reply::Ok(json!([])));
    let (view, mut rx) = recording_view();
    let widgets = entity(
        DataConfig::for_url("/widgets")
            .reuse(ReusePolicy::default().with_scope(CacheScope::InPage)),
        &view,
    );

    h.dispatcher
        .enqueue(None, widgets.clone(), None, EnqueueOptions::default())
        .unwrap();
    next_event(&mut rx).await;
    let record = h.dispatcher.cache().records().await.unwrap().remove(0);
    assert_eq!(record.meta.page_name.as_deref(), Some("home"));

    h.router.navigate("settings");
    h.dispatcher
        .enqueue(None, widgets, None, EnqueueOptions::default())
        .unwrap();
    next_event(&mut rx).await;
    assert_eq!(h.transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn route_change_sweeps_foreign_page_records() {
    let h = harness();
    h.dispatcher.start().await;
    h.transport
        .route(Method::Get, "/widgets", NO_DELAY, Reply::Ok(json!([])));
    h.transport
        .route(Method::Get, "/profile", NO_DELAY, Reply::Ok(json!({})));
    let (view, mut rx) = recording_view();
    let widgets = entity(
        DataConfig::for_url("/widgets")
            .reuse(ReusePolicy::default().with_scope(CacheScope::InPage)),
        &view,
    );
    let profile = entity(DataConfig::for_url("/profile"), &view);

    for target in [widgets, profile] {
        h.dispatcher
            .enqueue(None, target, None, EnqueueOptions::default())
            .unwrap();
        next_event(&mut rx).await;
    }
    assert_eq!(h.dispatcher.cache().records().await.unwrap().len(), 2);

    h.router.navigate("settings");
    settle().await;

    let remaining: Vec<String> = h
        .dispatcher
        .cache()
        .records()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.url)
        .collect();
    assert_eq!(remaining, vec!["/profile"]);
    h.dispatcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn writes_do_not_invalidate_cached_reads() {
    let h = harness();
    h.transport
        .route(Method::Get, "/users/1", NO_DELAY, Reply::Ok(json!({ "id": 1 })));
    h.transport
        .route(Method::Delete, "/users/1", NO_DELAY, Reply::Ok(Value::Null));
    let (view, mut rx) = recording_view();
    let user = entity(
        DataConfig::for_url("/users/1").allow(Operation::Delete),
        &view,
    );

    h.dispatcher
        .enqueue(Some(Operation::Get), user.clone(), None, EnqueueOptions::default())
        .unwrap();
    next_event(&mut rx).await;
    h.dispatcher
        .enqueue(Some(Operation::Delete), user.clone(), None, EnqueueOptions::default())
        .unwrap();
    next_event(&mut rx).await;
    h.dispatcher
        .enqueue(Some(Operation::Get), user.clone(), None, EnqueueOptions::default())
        .unwrap();
    assert_eq!(change_value(next_event(&mut rx).await), json!({ "id": 1 }));
    assert_eq!(h.transport.call_count(), 2);

    h.dispatcher.invalidate("/users/1", None).await.unwrap();
    h.dispatcher
        .enqueue(Some(Operation::Get), user, None, EnqueueOptions::default())
        .unwrap();
    next_event(&mut rx).await;
    assert_eq!(h.transport.call_count(), 3);
}

// ── Authorization & errors ──────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn unlisted_write_is_unauthorized_without_network_call() {
    let h = harness();
    let (view, mut rx) = recording_view();
    let users = entity(DataConfig::for_url("/users"), &view);

    h.dispatcher
        .enqueue(Some(Operation::Delete), users, None, EnqueueOptions::default())
        .unwrap();

    match next_event(&mut rx).await {
        Event::Error(err) => assert_eq!(err, DataError::new("Unauthorized Request", Some(405))),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn backend_errors_reach_the_error_hook() {
    let h = harness();
    h.transport
        .route(Method::Get, "/broken", NO_DELAY, Reply::Fail(503, "maintenance"));
    let (view, mut rx) = recording_view();
    let broken = entity(DataConfig::for_url("/broken"), &view);

    h.dispatcher
        .enqueue(None, broken, None, EnqueueOptions::default())
        .unwrap();

    match next_event(&mut rx).await {
        Event::Error(err) => assert_eq!(err, DataError::new("maintenance", Some(503))),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(h.dispatcher.cache().records().await.unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn caller_view_receives_instead_of_entity_view() {
    let h = harness();
    h.transport
        .route(Method::Get, "/me", NO_DELAY, Reply::Ok(json!({ "id": 7 })));
    let (own, mut own_rx) = recording_view();
    let (caller, mut caller_rx) = recording_view();
    let me = entity(DataConfig::for_url("/me"), &own);

    h.dispatcher
        .enqueue(None, me, None, EnqueueOptions::default().with_caller_view(caller))
        .unwrap();

    assert_eq!(change_value(next_event(&mut caller_rx).await), json!({ "id": 7 }));
    settle().await;
    assert!(own_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn malformed_targets_fail_synchronously() {
    let h = harness();
    let (view, _rx) = recording_view();
    let single = entity(DataConfig::for_url("/a"), &view);
    let batch = entity(
        DataConfig::for_batch(vec![BatchCall::new("a", "/a", Operation::Get)]),
        &view,
    );

    let err = h
        .dispatcher
        .enqueue(None, Target::Batch(single.clone()), None, EnqueueOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfig { .. }));

    let err = h
        .dispatcher
        .enqueue(None, Target::Single(batch.clone()), None, EnqueueOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfig { .. }));

    let err = h
        .dispatcher
        .enqueue(None, Vec::<EntityConfig>::new(), None, EnqueueOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfig { .. }));

    let err = h
        .dispatcher
        .enqueue(None, vec![single, batch], None, EnqueueOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfig { .. }));
    assert_eq!(h.transport.call_count(), 0);
}

#[test]
fn enqueue_outside_a_runtime_is_rejected() {
    let h = harness();
    let (view, _rx) = recording_view();
    let users = entity(DataConfig::for_url("/users"), &view);

    let err = h
        .dispatcher
        .enqueue(None, users, None, EnqueueOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::Internal(_)));
}

// ── Propagation ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn response_reaches_every_equivalent_registered_entity() {
    let h = harness();
    h.transport
        .route(Method::Get, "/users", NO_DELAY, Reply::Ok(json!([{ "id": 1 }])));
    let (list_view, mut list_rx) = recording_view();
    let (badge_view, mut badge_rx) = recording_view();
    let list = EntityConfig::builder(DataConfig::for_url("/users"))
        .view(list_view.clone())
        .blob_class("User")
        .build()
        .unwrap();
    let badge = EntityConfig::builder(DataConfig::for_url("/users"))
        .view(badge_view.clone())
        .blob_class("User")
        .build()
        .unwrap();
    h.dispatcher.register(list.clone());
    h.dispatcher.register(badge.clone());

    h.dispatcher
        .enqueue(Some(Operation::GetList), list, None, EnqueueOptions::default())
        .unwrap();

    for rx in [&mut list_rx, &mut badge_rx] {
        match next_event(rx).await {
            Event::Change(DataPayload::List(blobs)) => {
                assert_eq!(blobs.len(), 1);
                assert_eq!(blobs[0].class.name(), "User");
            }
            other => panic!("expected blob list, got {other:?}"),
        }
    }
    settle().await;
    assert!(list_rx.try_recv().is_err());
    assert_eq!(h.transport.call_count(), 1);

    assert!(h.dispatcher.unregister(badge.id()));
}

// ── Batch ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn batch_delivers_one_map_with_partial_failure() {
    let h = harness();
    h.transport.route(
        Method::Get,
        "/me",
        Duration::from_millis(300),
        Reply::Ok(json!({ "id": 7 })),
    );
    h.transport
        .route(Method::Get, "/stats", NO_DELAY, Reply::Fail(500, "stats down"));
    h.transport
        .route(Method::Get, "/teams", Duration::from_millis(100), Reply::Ok(json!([])));
    let (view, mut rx) = recording_view();
    let dashboard = entity(
        DataConfig::for_batch(vec![
            BatchCall::new("me", "/me", Operation::Get),
            BatchCall::new("stats", "/stats", Operation::Get),
            BatchCall::new("teams", "/teams", Operation::GetList).with_blob_class("Team"),
        ]),
        &view,
    );

    h.dispatcher
        .enqueue(None, dashboard, None, EnqueueOptions::default())
        .unwrap();

    let Event::Batch(results) = next_event(&mut rx).await else {
        panic!("expected batch results");
    };
    let ids: Vec<&str> = results.keys().map(String::as_str).collect();
    assert_eq!(ids, vec!["me", "stats", "teams"]);
    assert_eq!(
        results["me"].success().cloned().map(DataPayload::into_value),
        Some(json!({ "id": 7 }))
    );
    assert_eq!(results["stats"].error().and_then(|e| e.status), Some(500));
    assert!(matches!(results["teams"], LeafOutcome::Success(DataPayload::List(_))));

    settle().await;
    assert!(rx.try_recv().is_err());
    assert_eq!(h.transport.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn batch_leaf_inherits_parent_reuse_policy() {
    let h = harness();
    h.transport
        .route(Method::Get, "/me", NO_DELAY, Reply::Ok(json!({ "id": 7 })));
    let (view, mut rx) = recording_view();
    let dashboard = entity(
        DataConfig::for_batch(vec![BatchCall::new("me", "/me", Operation::Get)])
            .reuse(ReusePolicy::disabled()),
        &view,
    );

    for _ in 0..2 {
        h.dispatcher
            .enqueue(None, dashboard.clone(), None, EnqueueOptions::default())
            .unwrap();
        next_event(&mut rx).await;
    }
    assert_eq!(h.transport.call_count(), 2);
}

// ── Bulk ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn bulk_results_keep_original_positions() {
    let h = harness();
    h.transport.route(
        Method::Get,
        "/slow",
        Duration::from_millis(500),
        Reply::Ok(json!("slow")),
    );
    h.transport.route(
        Method::Get,
        "/missing",
        Duration::from_millis(50),
        Reply::Fail(404, "Not Found"),
    );
    h.transport
        .route(Method::Get, "/fast", Duration::from_millis(5), Reply::Ok(json!("fast")));
    let (own, mut own_rx) = recording_view();
    let (aggregate, mut rx) = recording_view();
    let targets = vec![
        entity(DataConfig::for_url("/slow"), &own),
        entity(DataConfig::for_url("/missing"), &own),
        entity(DataConfig::for_url("/fast"), &own),
    ];

    h.dispatcher
        .enqueue(
            None,
            targets,
            None,
            EnqueueOptions::default().with_caller_view(aggregate),
        )
        .unwrap();

    let Event::Bulk(outcomes) = next_event(&mut rx).await else {
        panic!("expected bulk results");
    };
    assert_eq!(outcomes.len(), 3);
    assert_eq!(
        outcomes[0].success().cloned().map(DataPayload::into_value),
        Some(json!("slow"))
    );
    assert_eq!(outcomes[1].error().and_then(|e| e.status), Some(404));
    assert_eq!(
        outcomes[2].success().cloned().map(DataPayload::into_value),
        Some(json!("fast"))
    );
    assert_eq!(h.transport.max_in_flight.load(Ordering::SeqCst), 3);

    settle().await;
    assert!(own_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn bulk_without_aggregate_receiver_reports_per_entity() {
    let h = harness();
    h.transport
        .route(Method::Get, "/a", NO_DELAY, Reply::Ok(json!("a")));
    h.transport
        .route(Method::Get, "/b", NO_DELAY, Reply::Ok(json!("b")));
    let (a_view, mut a_rx) = recording_view();
    let (b_view, mut b_rx) = recording_view();

    h.dispatcher
        .enqueue(
            None,
            vec![
                entity(DataConfig::for_url("/a"), &a_view),
                entity(DataConfig::for_url("/b"), &b_view),
            ],
            None,
            EnqueueOptions::default(),
        )
        .unwrap();

    assert_eq!(change_value(next_event(&mut a_rx).await), json!("a"));
    assert_eq!(change_value(next_event(&mut b_rx).await), json!("b"));
}

#[tokio::test(start_paused = true)]
async fn bulk_aggregate_does_not_echo_to_registered_sources() {
    let h = harness();
    h.transport
        .route(Method::Get, "/users", NO_DELAY, Reply::Ok(json!([{ "id": 1 }])));
    let (own, mut own_rx) = recording_view();
    let (peer_view, mut peer_rx) = recording_view();
    let (aggregate, mut rx) = recording_view();
    let users = entity(DataConfig::for_url("/users"), &own);
    let peer = entity(DataConfig::for_url("/users"), &peer_view);
    h.dispatcher.register(users.clone());
    h.dispatcher.register(peer);

    h.dispatcher
        .enqueue(
            None,
            vec![users],
            None,
            EnqueueOptions::default().with_caller_view(aggregate),
        )
        .unwrap();

    let Event::Bulk(outcomes) = next_event(&mut rx).await else {
        panic!("expected bulk results");
    };
    assert_eq!(outcomes.len(), 1);
    assert_eq!(
        change_value(next_event(&mut peer_rx).await),
        json!([{ "id": 1 }])
    );

    settle().await;
    assert!(own_rx.try_recv().is_err());
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn bulk_rejects_write_operations() {
    let h = harness();
    let (view, _rx) = recording_view();
    let targets = vec![
        entity(DataConfig::for_url("/a").allow(Operation::Post), &view),
        entity(DataConfig::for_url("/b").allow(Operation::Post), &view),
    ];

    let err = h
        .dispatcher
        .enqueue(Some(Operation::Post), targets, None, EnqueueOptions::default())
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidConfig { .. }));
    settle().await;
    assert_eq!(h.transport.call_count(), 0);
}
