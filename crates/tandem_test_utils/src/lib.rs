//! Test doubles for the Tandem engine.
//!
//! [`ScriptedHost`] is an in-memory [`HostAdapter`]: tab list, active
//! editor, and focus flag live behind a mutex, every mutation is recorded,
//! and scheduled tasks run inline so tests stay deterministic.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use tandem_protocol::{Caret, Selection};
use tandem_sync::{EditorSnapshot, EventSink, HostAdapter, HostTask};

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    Open { path: String, take_focus: bool },
    Close { path: String },
    SetCursor {
        path: String,
        caret: Caret,
        selection: Option<Selection>,
    },
}

#[derive(Default)]
struct HostState {
    focused: bool,
    tabs: Vec<String>,
    active: Option<EditorSnapshot>,
    ops: Vec<HostOp>,
    sink: Option<EventSink>,
    attach_calls: usize,
    attach_failures_left: u32,
}

/// Scriptable in-memory IDE.
#[derive(Default)]
pub struct ScriptedHost {
    state: Mutex<HostState>,
}

impl ScriptedHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// This host as the engine-facing trait object.
    pub fn adapter(self: &Arc<Self>) -> Arc<dyn HostAdapter> {
        Arc::clone(self) as Arc<dyn HostAdapter>
    }

    pub fn set_focused(&self, focused: bool) {
        self.state.lock().unwrap().focused = focused;
    }

    /// Open tabs without recording ops (test setup).
    pub fn seed_tabs(&self, paths: &[&str]) {
        let mut state = self.state.lock().unwrap();
        for path in paths {
            let path = path.to_string();
            if !state.tabs.contains(&path) {
                state.tabs.push(path);
            }
        }
    }

    pub fn set_active_editor(&self, path: &str, caret: Caret, selection: Option<Selection>) {
        self.state.lock().unwrap().active = Some(EditorSnapshot {
            file_path: path.to_string(),
            caret,
            selection,
        });
    }

    /// The next `n` attach attempts report the window as unavailable.
    pub fn fail_attaches(&self, n: u32) {
        self.state.lock().unwrap().attach_failures_left = n;
    }

    pub fn open_files(&self) -> Vec<String> {
        self.state.lock().unwrap().tabs.clone()
    }

    pub fn active_snapshot(&self) -> Option<EditorSnapshot> {
        self.state.lock().unwrap().active.clone()
    }

    pub fn ops(&self) -> Vec<HostOp> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().unwrap().ops.clear();
    }

    pub fn attach_calls(&self) -> usize {
        self.state.lock().unwrap().attach_calls
    }

    pub fn attached(&self) -> bool {
        self.state.lock().unwrap().sink.is_some()
    }

    /// The sink the engine attached, for driving events in tests.
    pub fn sink(&self) -> Option<EventSink> {
        self.state.lock().unwrap().sink.clone()
    }
}

impl HostAdapter for ScriptedHost {
    fn open_file(&self, path: &str, take_focus: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        state.ops.push(HostOp::Open {
            path: path.to_string(),
            take_focus,
        });
        if !state.tabs.iter().any(|t| t == path) {
            state.tabs.push(path.to_string());
        }
        if take_focus {
            state.active = Some(EditorSnapshot {
                file_path: path.to_string(),
                caret: Caret::default(),
                selection: None,
            });
        }
        true
    }

    fn close_file(&self, path: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        state.ops.push(HostOp::Close {
            path: path.to_string(),
        });
        let Some(index) = state.tabs.iter().position(|t| t == path) else {
            return false;
        };
        state.tabs.remove(index);
        if state
            .active
            .as_ref()
            .is_some_and(|snap| snap.file_path == path)
        {
            state.active = None;
        }
        true
    }

    fn opened_files(&self) -> Vec<String> {
        self.state.lock().unwrap().tabs.clone()
    }

    fn active_editor(&self) -> Option<EditorSnapshot> {
        self.state.lock().unwrap().active.clone()
    }

    fn set_cursor(&self, path: &str, caret: Caret, selection: Option<Selection>) -> bool {
        let mut state = self.state.lock().unwrap();
        state.ops.push(HostOp::SetCursor {
            path: path.to_string(),
            caret,
            selection,
        });
        if !state.tabs.iter().any(|t| t == path) {
            return false;
        }
        state.active = Some(EditorSnapshot {
            file_path: path.to_string(),
            caret,
            selection,
        });
        true
    }

    fn is_window_focused(&self) -> bool {
        self.state.lock().unwrap().focused
    }

    /// Inline execution keeps "host thread" ordering trivially sequential.
    fn schedule(&self, task: HostTask) {
        task();
    }

    fn attach_listeners(&self, sink: EventSink) -> bool {
        let mut state = self.state.lock().unwrap();
        state.attach_calls += 1;
        if state.attach_failures_left > 0 {
            state.attach_failures_left -= 1;
            return false;
        }
        state.sink = Some(sink);
        true
    }
}

/// A currently free loopback port, reserved momentarily via bind-to-zero.
pub fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_host_tab_lifecycle() {
        let host = ScriptedHost::new();
        assert!(host.open_file("/p/a.rs", false));
        assert!(host.open_file("/p/a.rs", false), "reopen is fine");
        assert_eq!(host.open_files(), vec!["/p/a.rs".to_string()]);

        assert!(host.set_cursor("/p/a.rs", Caret::new(1, 2), None));
        assert_eq!(host.active_snapshot().unwrap().caret, Caret::new(1, 2));

        assert!(host.close_file("/p/a.rs"));
        assert!(!host.close_file("/p/a.rs"), "second close finds no tab");
        assert!(host.active_snapshot().is_none());
    }

    #[test]
    fn test_set_cursor_needs_open_tab() {
        let host = ScriptedHost::new();
        assert!(!host.set_cursor("/p/missing.rs", Caret::default(), None));
    }

    #[test]
    fn test_free_port_is_bindable() {
        let port = free_port();
        assert!(port >= 1024);
        TcpListener::bind(("127.0.0.1", port)).expect("reserved port still free");
    }
}
