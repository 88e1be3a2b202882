//! In-memory host for the headless runner.
//!
//! Mimics a real IDE's threading contract: a dedicated host thread executes
//! scheduled tasks sequentially, and every applied mutation is logged so two
//! runners on one machine make the sync traffic visible.

use std::sync::mpsc::{self, Sender};
use std::sync::Mutex;
use std::thread;
use tracing::info;

use tandem_protocol::{Caret, Selection};
use tandem_sync::{EditorSnapshot, EventSink, HostAdapter, HostTask};

#[derive(Default)]
struct HeadlessState {
    focused: bool,
    tabs: Vec<String>,
    active: Option<EditorSnapshot>,
    sink: Option<EventSink>,
}

pub struct HeadlessHost {
    state: Mutex<HeadlessState>,
    tasks: Sender<HostTask>,
}

impl HeadlessHost {
    /// Spawns the host thread; it exits when the host is dropped.
    pub fn new(focused: bool, tabs: Vec<String>) -> Self {
        let (tasks, task_rx) = mpsc::channel::<HostTask>();
        thread::Builder::new()
            .name("tandem-host".into())
            .spawn(move || {
                while let Ok(task) = task_rx.recv() {
                    task();
                }
            })
            .expect("spawn host thread");

        Self {
            state: Mutex::new(HeadlessState {
                focused,
                tabs,
                active: None,
                sink: None,
            }),
            tasks,
        }
    }

    pub fn tabs(&self) -> Vec<String> {
        self.state.lock().unwrap().tabs.clone()
    }
}

impl HostAdapter for HeadlessHost {
    fn open_file(&self, path: &str, take_focus: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        if !state.tabs.iter().any(|t| t == path) {
            state.tabs.push(path.to_string());
        }
        info!(path, take_focus, tabs = state.tabs.len(), "host: open");
        true
    }

    fn close_file(&self, path: &str) -> bool {
        let mut state = self.state.lock().unwrap();
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
        info!(path, tabs = state.tabs.len(), "host: close");
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
        if !state.tabs.iter().any(|t| t == path) {
            return false;
        }
        info!(path, position = %caret.display(), "host: caret");
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

    fn schedule(&self, task: HostTask) {
        // The receiver only goes away when the host is dropped; a task
        // arriving after that is moot.
        let _ = self.tasks.send(task);
    }

    fn attach_listeners(&self, sink: EventSink) -> bool {
        self.state.lock().unwrap().sink = Some(sink);
        true
    }
}
