// ── Reuse cache ──
//
// Read-through response cache over the persistent store. Records carry
// an absolute expiry and, for page-scoped reuse, the page that stored
// them. A lapsed or foreign-page record is indistinguishable from a
// missing one.
//
// Writes land in an in-memory shadow map before the store is awaited,
// so a `recall` racing a pending `remember` for the same key sees the
// new record. Each shadow entry carries a generation so a slow write
// never evicts a newer one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use datalane_api::BODY_PARAM;
use serde_json::Value;
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::clock::Clock;
use crate::error::CoreError;
use crate::model::{CacheMeta, CacheRecord, CacheScope, ReusePolicy};
use crate::router::Router;
use crate::store::KvStore;

pub struct ReuseCache {
    store: Arc<dyn KvStore>,
    router: Arc<dyn Router>,
    clock: Arc<dyn Clock>,
    default_timeout_ms: u64,
    shadow: DashMap<String, (u64, CacheRecord)>,
    generation: AtomicU64,
}

impl ReuseCache {
    pub fn new(
        store: Arc<dyn KvStore>,
        router: Arc<dyn Router>,
        clock: Arc<dyn Clock>,
        default_timeout_ms: u64,
    ) -> Self {
        Self {
            store,
            router,
            clock,
            default_timeout_ms,
            shadow: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    fn current_page(&self) -> String {
        self.router.current_page_name().unwrap_or_default()
    }

    // ── Read / write ─────────────────────────────────────────────────

    /// Store `response` under `key` until `now + policy.timeout_ms`.
    ///
    /// Resolves once the record is persisted. If persistence fails the
    /// record is withdrawn from the shadow map as well.
    pub async fn remember(
        &self,
        key: &str,
        response: &Value,
        policy: &ReusePolicy,
        original_url: &str,
    ) -> Result<(), CoreError> {
        let timeout_ms = match policy.timeout_ms {
            0 => self.default_timeout_ms,
            t => t,
        };
        let lifetime = i64::try_from(timeout_ms).unwrap_or(i64::MAX);
        let page_name = match policy.scope {
            CacheScope::InPage => Some(self.current_page()),
            CacheScope::Global => None,
        };
        let record = CacheRecord {
            url: key.to_owned(),
            response: response.clone(),
            meta: CacheMeta {
                expires: self.clock.now_ms().saturating_add(lifetime),
                url: original_url.to_owned(),
                page_name,
            },
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        self.shadow.insert(key.to_owned(), (generation, record.clone()));

        let result = match serde_json::to_value(&record) {
            Ok(value) => self.store.put(key, value).await.map_err(CoreError::from),
            Err(e) => Err(CoreError::Internal(format!("cache record encoding: {e}"))),
        };
        self.shadow.remove_if(key, |_, (g, _)| *g == generation);

        debug!(key, expires = record.meta.expires, ok = result.is_ok(), "remember");
        result
    }

    /// The stored response for `key`, if present, unexpired and visible
    /// on the current page.
    pub async fn recall(&self, key: &str) -> Result<Value, CoreError> {
        let shadowed = self.shadow.get(key).map(|entry| entry.value().1.clone());
        let record = match shadowed {
            Some(record) => Some(record),
            None => self.load(key).await?,
        };
        let miss = || CoreError::CacheMiss {
            key: key.to_owned(),
        };

        let record = record.ok_or_else(miss)?;
        if record.is_expired(self.clock.now_ms()) || !record.is_visible_on(&self.current_page()) {
            return Err(miss());
        }
        Ok(record.response)
    }

    pub async fn remove(&self, key: &str) -> Result<(), CoreError> {
        self.shadow.remove(key);
        self.store.delete(key).await?;
        debug!(key, "cache record removed");
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), CoreError> {
        self.shadow.clear();
        self.store.clear().await?;
        Ok(())
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Delete every record that has expired or belongs to a page other
    /// than the current one. Unreadable records are deleted too.
    /// Returns the number of records removed.
    pub async fn sweep(&self) -> Result<usize, CoreError> {
        let now = self.clock.now_ms();
        let page = self.current_page();
        let mut removed = 0;

        for key in self.store.keys().await? {
            let keep = match self.load(&key).await {
                Ok(Some(record)) => !record.is_expired(now) && record.is_visible_on(&page),
                Ok(None) => true,
                Err(e) => {
                    warn!(key = %key, error = %e, "dropping unreadable cache record");
                    false
                }
            };
            if !keep {
                self.store.delete(&key).await?;
                removed += 1;
            }
        }

        debug!(removed, page = %page, "cache sweep complete");
        Ok(removed)
    }

    /// Every persisted record that can be decoded, ordered by key.
    pub async fn records(&self) -> Result<Vec<CacheRecord>, CoreError> {
        let mut records = Vec::new();
        for key in self.store.keys().await? {
            if let Ok(Some(record)) = self.load(&key).await {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(records)
    }

    async fn load(&self, key: &str) -> Result<Option<CacheRecord>, CoreError> {
        let Some(value) = self.store.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| CoreError::Internal(format!("cache record for {key} is malformed: {e}")))
    }
}

// ── Cache keys ───────────────────────────────────────────────────────

/// Cache key for a read: `url` plus the payload as a sorted query string.
///
/// Object payloads contribute one `key=value` pair per field (strings
/// verbatim, everything else as JSON); any other non-null payload
/// contributes a single `_body` pair.
pub fn unique_url(url: &str, payload: Option<&Value>) -> String {
    let mut pairs: Vec<(String, String)> = match payload {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), query_value(v)))
            .collect(),
        Some(other) => vec![(BODY_PARAM.to_owned(), other.to_string())],
    };
    if pairs.is_empty() {
        return url.to_owned();
    }
    pairs.sort();

    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
