// ── Persisted cache record ──
//
// Shape written to the key/value store. Field names are part of the
// on-disk format and must not change.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Cache key: URL plus sorted query string.
    pub url: String,
    pub response: Value,
    #[serde(rename = "_")]
    pub meta: CacheMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Expiry as epoch milliseconds.
    pub expires: i64,
    /// The URL the response was fetched from.
    pub url: String,
    /// Set only for page-scoped records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_name: Option<String>,
}

impl CacheRecord {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        now_ms >= self.meta.expires
    }

    /// Page-scoped records are only valid on the page that stored them.
    pub fn is_visible_on(&self, page: &str) -> bool {
        self.meta.page_name.as_deref().is_none_or(|p| p == page)
    }
}
