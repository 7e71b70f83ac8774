// ── Dispatcher tuning ──

use std::collections::BTreeSet;
use std::time::Duration;

use datalane_api::Method;

use crate::model::DEFAULT_REUSE_TIMEOUT_MS;
use crate::serializer::DEFAULT_STALE_AFTER;

/// Framework-level settings shared by every dispatch.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Lifetime for reuse policies that leave `timeout_ms` at zero.
    pub default_reuse_timeout: Duration,
    /// Maximum time a mutating request may wait behind another.
    pub stale_queue_after: Duration,
    /// Verbs permitted for every entity without explicit allowance.
    pub allowed_methods: BTreeSet<Method>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_reuse_timeout: Duration::from_millis(DEFAULT_REUSE_TIMEOUT_MS),
            stale_queue_after: DEFAULT_STALE_AFTER,
            allowed_methods: BTreeSet::from([Method::Get]),
        }
    }
}

impl DispatcherConfig {
    pub fn allows(&self, method: Method) -> bool {
        self.allowed_methods.contains(&method)
    }
}
