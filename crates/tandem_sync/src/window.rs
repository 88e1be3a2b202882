//! Cached window-focus state with edge callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::host::HostAdapter;

type FocusCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Tracks whether this instance's window is focused. The host pushes edges
/// asynchronously; `is_active(true)` re-queries the host and repairs the
/// cache if they disagree.
pub struct WindowState {
    adapter: Arc<dyn HostAdapter>,
    active: AtomicBool,
    on_change: Mutex<Option<FocusCallback>>,
}

impl WindowState {
    pub fn new(adapter: Arc<dyn HostAdapter>) -> Self {
        let active = adapter.is_window_focused();
        Self {
            adapter,
            active: AtomicBool::new(active),
            on_change: Mutex::new(None),
        }
    }

    /// Cached focus flag; with `force_real_time` the host is queried and a
    /// stale cache fires the change callback.
    pub fn is_active(&self, force_real_time: bool) -> bool {
        if !force_real_time {
            return self.active.load(Ordering::SeqCst);
        }
        let real = self.adapter.is_window_focused();
        let cached = self.active.swap(real, Ordering::SeqCst);
        if cached != real {
            debug!(focused = real, "focus cache was stale");
            self.fire(real);
        }
        real
    }

    /// Focus edge pushed by the host.
    pub(crate) fn apply_edge(&self, focused: bool) {
        let previous = self.active.swap(focused, Ordering::SeqCst);
        if previous != focused {
            self.fire(focused);
        }
    }

    pub(crate) fn set_on_change(&self, callback: FocusCallback) {
        *self.on_change.lock().unwrap() = Some(callback);
    }

    fn fire(&self, focused: bool) {
        let callback = self.on_change.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(focused);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tandem_test_utils::ScriptedHost;

    #[test]
    fn test_edge_fires_callback_once() {
        let host = ScriptedHost::new();
        host.set_focused(true);
        let window = WindowState::new(host.adapter());

        let edges = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&edges);
        window.set_on_change(Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        window.apply_edge(false);
        window.apply_edge(false);
        assert_eq!(edges.load(Ordering::SeqCst), 1);
        assert!(!window.is_active(false));
    }

    #[test]
    fn test_forced_query_repairs_stale_cache() {
        let host = ScriptedHost::new();
        host.set_focused(true);
        let window = WindowState::new(host.adapter());
        assert!(window.is_active(false));

        // Host focus changed without an edge reaching us.
        host.set_focused(false);
        assert!(window.is_active(false), "cache still stale");
        assert!(!window.is_active(true), "forced query sees the host");
        assert!(!window.is_active(false), "cache repaired");
    }
}
