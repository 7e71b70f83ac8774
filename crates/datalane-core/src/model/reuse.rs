// ── Reuse policy ──
//
// Per-resource response caching rules for read operations.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

/// Default lifetime of a reusable response.
pub const DEFAULT_REUSE_TIMEOUT_MS: u64 = 300_000;

/// Consulted before trusting a cache hit; `false` forces a refetch.
pub type ReuseHandler = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Where a cached response stays valid.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Survives navigation.
    #[default]
    Global,
    /// Valid only while the router stays on the page that stored it.
    InPage,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReusePolicy {
    pub enable: bool,
    /// Lifetime in milliseconds; `0` falls back to the dispatcher default.
    pub timeout_ms: u64,
    pub scope: CacheScope,
    #[serde(skip)]
    pub handler: Option<ReuseHandler>,
}

impl ReusePolicy {
    /// A policy that never reuses.
    pub fn disabled() -> Self {
        Self {
            enable: false,
            ..Self::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_scope(mut self, scope: CacheScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_handler(mut self, handler: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Whether a cached response may be served without a refetch.
    pub fn accepts(&self, cached: &Value) -> bool {
        self.handler.as_ref().is_none_or(|h| h(cached))
    }
}

impl Default for ReusePolicy {
    fn default() -> Self {
        Self {
            enable: true,
            timeout_ms: DEFAULT_REUSE_TIMEOUT_MS,
            scope: CacheScope::Global,
            handler: None,
        }
    }
}

impl fmt::Debug for ReusePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReusePolicy")
            .field("enable", &self.enable)
            .field("timeout_ms", &self.timeout_ms)
            .field("scope", &self.scope)
            .field("handler", &self.handler.as_ref().map(|_| "<fn>"))
            .finish()
    }
}
