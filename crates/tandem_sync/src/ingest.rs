//! Host event intake: normalization, filtering, and per-file debouncing.
//!
//! The host calls the [`EventSink`] from its own threads; everything here is
//! non-blocking. Caret movement coalesces per file on a 300 ms window, tab
//! open/close bypasses the window, and a close cancels any caret timer still
//! pending for the same file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

use tandem_protocol::defaults::NAVIGATE_DEBOUNCE_MS;
use tandem_protocol::paths::local_file_path;
use tandem_protocol::{Caret, EditorState, IdeFamily, Selection};

use crate::queue::SendQueue;
use crate::window::WindowState;

/// Clonable handle the host's bindings push editor events into.
#[derive(Clone)]
pub struct EventSink {
    inner: Arc<SinkInner>,
}

struct SinkInner {
    queue: SendQueue,
    window: Arc<WindowState>,
    source: IdeFamily,
    runtime: Handle,
    enabled: AtomicBool,
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl EventSink {
    /// Must be constructed inside a tokio runtime; debounce timers are
    /// spawned onto it.
    pub(crate) fn new(queue: SendQueue, window: Arc<WindowState>, source: IdeFamily) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                queue,
                window,
                source,
                runtime: Handle::current(),
                enabled: AtomicBool::new(false),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn file_opened(&self, path: &str, caret: Caret, selection: Option<Selection>) {
        self.emit_open(path, caret, selection);
    }

    pub fn active_tab_changed(&self, path: &str, caret: Caret, selection: Option<Selection>) {
        self.emit_open(path, caret, selection);
    }

    pub fn caret_or_selection_changed(&self, path: &str, caret: Caret, selection: Option<Selection>) {
        if !self.enabled() {
            return;
        }
        let Some(path) = local_file_path(path) else {
            debug!(raw = path, "non-file document ignored");
            return;
        };
        let state = EditorState::navigate(
            path.clone(),
            caret,
            selection,
            self.inner.source,
            self.inner.window.is_active(false),
        );
        self.schedule_navigate(path, state);
    }

    /// `still_visible` is true when the host shows the file in another tab
    /// group; such closes are suppressed.
    pub fn file_closed(&self, path: &str, still_visible: bool) {
        let Some(path) = local_file_path(path) else {
            return;
        };
        if still_visible {
            debug!(path = %path, "close suppressed, file still visible");
            return;
        }
        self.cancel_for(&path);
        let state = EditorState::close(
            path,
            self.inner.source,
            self.inner.window.is_active(false),
        );
        self.enqueue(state);
    }

    /// Focus edge pushed by the host window.
    pub fn focus_changed(&self, focused: bool) {
        self.inner.window.apply_edge(focused);
    }

    fn emit_open(&self, path: &str, caret: Caret, selection: Option<Selection>) {
        let Some(path) = local_file_path(path) else {
            debug!(raw = path, "non-file document ignored");
            return;
        };
        let state = EditorState::open(
            path,
            caret,
            selection,
            self.inner.source,
            self.inner.window.is_active(false),
        );
        self.enqueue(state);
    }

    /// Unfocused windows observe but never command: inactive events stop at
    /// this boundary.
    fn enqueue(&self, state: EditorState) {
        if !self.enabled() {
            return;
        }
        if !state.is_active {
            debug!(action = %state.action, "window unfocused, event not queued");
            return;
        }
        self.inner.queue.push(state);
    }

    fn schedule_navigate(&self, path: String, state: EditorState) {
        let mut pending = self.inner.pending.lock().unwrap();
        if let Some(previous) = pending.remove(&path) {
            previous.abort();
        }
        let sink = self.clone();
        let key = path.clone();
        let handle = self.inner.runtime.spawn(async move {
            tokio::time::sleep(Duration::from_millis(NAVIGATE_DEBOUNCE_MS)).await;
            sink.inner.pending.lock().unwrap().remove(&key);
            sink.enqueue(state);
        });
        pending.insert(path, handle);
    }

    fn cancel_for(&self, path: &str) {
        if let Some(handle) = self.inner.pending.lock().unwrap().remove(path) {
            handle.abort();
        }
    }

    pub(crate) fn cancel_pending(&self) {
        for (_, handle) in self.inner.pending.lock().unwrap().drain() {
            handle.abort();
        }
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    fn enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }
}
