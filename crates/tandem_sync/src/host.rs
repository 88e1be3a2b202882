//! The seam to the embedding IDE.
//!
//! The host outlives the core; the core holds an `Arc<dyn HostAdapter>` and
//! never owns host resources. Mutating calls (`open_file`, `close_file`,
//! `set_cursor`) must only be made from the host thread, which is why the
//! applier routes everything through [`HostAdapter::schedule`].

use tandem_protocol::{Caret, Selection};

use crate::ingest::EventSink;

/// Path, caret, and selection of the editor currently in front of the user.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorSnapshot {
    pub file_path: String,
    pub caret: Caret,
    pub selection: Option<Selection>,
}

/// A unit of work for the host's UI-like thread. Tasks run sequentially in
/// submission order.
pub type HostTask = Box<dyn FnOnce() + Send + 'static>;

/// Everything the engine needs from the embedding IDE.
pub trait HostAdapter: Send + Sync {
    /// Open `path` in a tab; `take_focus = false` must not steal the window
    /// focus. Returns `false` when the file cannot be opened.
    fn open_file(&self, path: &str, take_focus: bool) -> bool;

    /// Close the tab matching `path`. Returns `false` when no tab matches.
    fn close_file(&self, path: &str) -> bool;

    /// Paths of every open tab, in tab order.
    fn opened_files(&self) -> Vec<String>;

    /// Snapshot of the active editor, if any.
    fn active_editor(&self) -> Option<EditorSnapshot>;

    /// Move the caret and replace (or clear, when `selection` is `None`) the
    /// selection in `path`, scrolling the caret into view if needed.
    /// Returns `false` when the file has no open editor.
    fn set_cursor(&self, path: &str, caret: Caret, selection: Option<Selection>) -> bool;

    /// Real-time focus query, bypassing any cached state.
    fn is_window_focused(&self) -> bool;

    /// Run `task` on the host thread.
    fn schedule(&self, task: HostTask);

    /// Subscribe `sink` to the host's editor and focus events. Returns
    /// `false` when the host window is not available yet; the core retries.
    fn attach_listeners(&self, sink: EventSink) -> bool;
}
