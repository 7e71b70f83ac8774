// ── Per-URL request serializer ──
//
// At most one mutating request is in flight per URL. A URL with an
// entry in `queues` is busy; the deque holds the requests waiting
// behind the one in flight. When the in-flight request completes the
// next waiter is handed out, unless it has waited longer than the stale
// threshold, in which case the whole backlog for that URL is dropped.

use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default maximum wait before a queued request is considered stale.
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(30);

struct QueueEntry<T> {
    enqueued_at: Instant,
    item: T,
}

/// Result of offering a request to the serializer.
#[derive(Debug)]
pub enum Admission<T> {
    /// The URL was idle; the caller must dispatch `T` now and call
    /// [`RequestSerializer::complete`] when it finishes.
    Dispatch(T),
    /// Another request is in flight; this one waits at `position` (1-based).
    Queued { position: usize },
}

pub struct RequestSerializer<T> {
    queues: DashMap<String, VecDeque<QueueEntry<T>>>,
    stale_after: Duration,
}

impl<T> RequestSerializer<T> {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            queues: DashMap::new(),
            stale_after,
        }
    }

    /// Dispatch immediately if `url` is idle, otherwise append to its queue.
    pub fn admit(&self, url: &str, item: T) -> Admission<T> {
        match self.queues.entry(url.to_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                Admission::Dispatch(item)
            }
            Entry::Occupied(mut slot) => {
                let queue = slot.get_mut();
                queue.push_back(QueueEntry {
                    enqueued_at: Instant::now(),
                    item,
                });
                let position = queue.len();
                debug!(url, position, "request queued");
                Admission::Queued { position }
            }
        }
    }

    /// Mark the in-flight request for `url` as finished.
    ///
    /// Returns the next request to dispatch. `None` means the URL is idle
    /// again, either because nothing was waiting or because the head had
    /// gone stale and the backlog was discarded.
    pub fn complete(&self, url: &str) -> Option<T> {
        let Entry::Occupied(mut slot) = self.queues.entry(url.to_owned()) else {
            return None;
        };
        let Some(head) = slot.get_mut().pop_front() else {
            slot.remove();
            return None;
        };

        let waited = head.enqueued_at.elapsed();
        if waited > self.stale_after {
            let dropped = slot.remove().len() + 1;
            warn!(
                url,
                dropped,
                waited_ms = waited.as_millis(),
                "stale request queue discarded"
            );
            return None;
        }
        Some(head.item)
    }

    /// Requests waiting behind the in-flight one.
    pub fn queue_len(&self, url: &str) -> usize {
        self.queues.get(url).map_or(0, |q| q.len())
    }
}
