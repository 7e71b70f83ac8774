// ── Router collaborator ──
//
// The dispatcher needs two things from routing: the name of the page
// currently shown (stamped on page-scoped cache records) and a signal
// whenever that changes (triggers the cache sweep).

use tokio::sync::watch;
use tracing::debug;

pub trait Router: Send + Sync + 'static {
    /// Name of the current page, if any page is active.
    fn current_page_name(&self) -> Option<String>;

    /// Receiver that observes every navigation.
    fn route_changes(&self) -> watch::Receiver<Option<String>>;
}

/// Minimal router for hosts without their own: a page name behind a
/// `watch` channel.
#[derive(Debug)]
pub struct PageRouter {
    current: watch::Sender<Option<String>>,
}

impl PageRouter {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self { current }
    }

    pub fn with_page(name: impl Into<String>) -> Self {
        let (current, _) = watch::channel(Some(name.into()));
        Self { current }
    }

    /// Switch to `name` and notify subscribers, even when the page is
    /// unchanged.
    pub fn navigate(&self, name: impl Into<String>) {
        let name = name.into();
        debug!(page = %name, "navigate");
        self.current.send_replace(Some(name));
    }
}

impl Default for PageRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Router for PageRouter {
    fn current_page_name(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    fn route_changes(&self) -> watch::Receiver<Option<String>> {
        self.current.subscribe()
    }
}
