//! Applies inbound editor states to the host.
//!
//! Every mutation runs as one task on the host thread, in receive order.
//! Incoming payload paths get the full normalization (including the
//! artifact-suffix repair); paths read back from the host only get the
//! family transform.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use tandem_protocol::paths::{self, PathStyle};
use tandem_protocol::{Caret, EditorState, Selection, SyncAction};

use crate::host::{EditorSnapshot, HostAdapter};
use crate::window::WindowState;

pub struct Applier {
    adapter: Arc<dyn HostAdapter>,
    window: Arc<WindowState>,
    style: PathStyle,
}

impl Applier {
    pub fn new(adapter: Arc<dyn HostAdapter>, window: Arc<WindowState>, style: PathStyle) -> Self {
        Self {
            adapter,
            window,
            style,
        }
    }

    /// Queue one host-thread task for this payload.
    pub fn apply(self: &Arc<Self>, state: EditorState) {
        let this = Arc::clone(self);
        let adapter = Arc::clone(&self.adapter);
        adapter.schedule(Box::new(move || this.run(state)));
    }

    fn run(&self, state: EditorState) {
        debug!(action = %state.action, path = %state.file_path, "applying partner event");
        match state.action {
            SyncAction::Close => self.run_close(&state),
            SyncAction::Open | SyncAction::Navigate => self.run_open(&state),
            SyncAction::WorkspaceSync => self.run_workspace_sync(&state),
        }
    }

    fn incoming_path(&self, raw: &str) -> String {
        paths::normalize(raw, self.style)
    }

    fn run_close(&self, state: &EditorState) {
        let path = self.incoming_path(&state.file_path);
        if !self.adapter.close_file(&path) {
            warn!(path = %path, "close requested for a tab that is not open");
        }
    }

    /// `OPEN` and `NAVIGATE` both land here: ensure the file has a tab
    /// (without stealing focus), then place caret and selection.
    fn run_open(&self, state: &EditorState) {
        let path = self.incoming_path(&state.file_path);
        if !self.adapter.open_file(&path, false) {
            warn!(path = %path, "could not open file from partner");
            return;
        }
        self.place_cursor(&path, state.caret(), state.selection());
    }

    /// With a selection: span `[start, end]`, caret on the endpoint nearest
    /// the payload position so selection direction survives. Without one:
    /// clear and move. The adapter scrolls the caret into view either way.
    fn place_cursor(&self, path: &str, caret: Caret, selection: Option<Selection>) {
        let (caret, selection) = match selection {
            Some(sel) => {
                let sel = sel.ordered();
                (sel.endpoint_nearest(caret), Some(sel))
            }
            None => (caret, None),
        };
        if !self.adapter.set_cursor(path, caret, selection) {
            warn!(path = %path, position = %caret.display(), "could not place caret");
        }
    }

    /// Mirror the sender's tab set. When this side is the one currently in
    /// use, only the background tab set is aligned and the local view is
    /// restored afterwards.
    fn run_workspace_sync(&self, state: &EditorState) {
        let was_active = self.window.is_active(true);
        let saved: Option<EditorSnapshot> = if was_active {
            self.adapter.active_editor()
        } else {
            None
        };

        let target: Vec<String> = state
            .opened_files
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|p| self.incoming_path(p))
            .collect();
        let target_set: HashSet<&str> = target.iter().map(String::as_str).collect();

        let current: Vec<String> = self
            .adapter
            .opened_files()
            .iter()
            .map(|p| paths::host_key(p, self.style))
            .collect();
        let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();

        let mut closed = 0usize;
        for path in current.iter().filter(|p| !target_set.contains(p.as_str())) {
            if self.adapter.close_file(path) {
                closed += 1;
            } else {
                warn!(path = %path, "reconcile could not close tab");
            }
        }

        let mut opened = 0usize;
        for path in target.iter().filter(|p| !current_set.contains(p.as_str())) {
            if self.adapter.open_file(path, false) {
                opened += 1;
            } else {
                warn!(path = %path, "reconcile could not open file");
            }
        }

        // Focus may have moved while tabs were churning.
        let active_now = self.window.is_active(true);
        if let Some(saved) = saved.filter(|_| active_now && opened > 0) {
            debug!(path = %saved.file_path, "restoring local view after reconcile");
            self.place_cursor(&saved.file_path, saved.caret, saved.selection);
        } else if !state.file_path.is_empty() {
            let path = self.incoming_path(&state.file_path);
            self.adapter.open_file(&path, false);
            self.place_cursor(&path, state.caret(), state.selection());
        }

        info!(closed, opened, "workspace reconciled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_protocol::IdeFamily;
    use tandem_test_utils::{HostOp, ScriptedHost};

    fn applier_for(host: &Arc<ScriptedHost>) -> Arc<Applier> {
        let window = Arc::new(WindowState::new(host.adapter()));
        Arc::new(Applier::new(host.adapter(), window, PathStyle::Posix))
    }

    fn navigate(path: &str, line: u32, column: u32) -> EditorState {
        EditorState::navigate(
            path.into(),
            Caret::new(line, column),
            None,
            IdeFamily::B,
            true,
        )
    }

    #[test]
    fn test_open_places_cursor_without_stealing_focus() {
        let host = ScriptedHost::new();
        let applier = applier_for(&host);

        applier.apply(EditorState::open(
            "/p/a.rs".into(),
            Caret::new(3, 7),
            None,
            IdeFamily::B,
            true,
        ));

        assert_eq!(
            host.ops(),
            vec![
                HostOp::Open {
                    path: "/p/a.rs".into(),
                    take_focus: false
                },
                HostOp::SetCursor {
                    path: "/p/a.rs".into(),
                    caret: Caret::new(3, 7),
                    selection: None
                },
            ]
        );
    }

    #[test]
    fn test_open_twice_is_idempotent() {
        let host = ScriptedHost::new();
        let applier = applier_for(&host);
        let state = EditorState::open("/p/a.rs".into(), Caret::new(1, 1), None, IdeFamily::B, true);

        applier.apply(state.clone());
        let after_once = host.open_files();
        let snapshot_once = host.active_snapshot();

        applier.apply(state);
        assert_eq!(host.open_files(), after_once);
        assert_eq!(host.active_snapshot(), snapshot_once);
    }

    #[test]
    fn test_close_unknown_tab_is_tolerated() {
        let host = ScriptedHost::new();
        let applier = applier_for(&host);
        applier.apply(EditorState::close("/p/gone.rs".into(), IdeFamily::B, true));
        assert!(host.open_files().is_empty());
    }

    #[test]
    fn test_incoming_path_suffix_repair() {
        let host = ScriptedHost::new();
        let applier = applier_for(&host);
        applier.apply(navigate("/p/a.rs.git", 0, 0));
        assert_eq!(host.open_files(), vec!["/p/a.rs".to_string()]);
    }

    #[test]
    fn test_selection_applied_with_direction() {
        let host = ScriptedHost::new();
        let applier = applier_for(&host);

        let mut state = navigate("/p/a.rs", 2, 0);
        // Upward selection: caret at the start of the span.
        state.set_selection(Some(Selection::new(Caret::new(2, 0), Caret::new(8, 5))));
        applier.apply(state);

        match host.ops().last().unwrap() {
            HostOp::SetCursor {
                caret, selection, ..
            } => {
                assert_eq!(*caret, Caret::new(2, 0));
                assert_eq!(
                    *selection,
                    Some(Selection::new(Caret::new(2, 0), Caret::new(8, 5)))
                );
            }
            other => panic!("expected SetCursor, got {other:?}"),
        }
    }

    /// The S5 scenario: the receiver is still active, so its tab set is
    /// aligned but its view is restored.
    #[test]
    fn test_reconcile_restores_active_receivers_view() {
        let host = ScriptedHost::new();
        host.set_focused(true);
        host.seed_tabs(&["/p/a.rs", "/p/b.rs", "/p/c.rs"]);
        host.set_active_editor("/p/a.rs", Caret::new(5, 2), None);
        let applier = applier_for(&host);
        host.clear_ops();

        let sync = EditorState::workspace_sync(
            vec!["/p/a.rs".into(), "/p/b.rs".into(), "/p/d.rs".into()],
            Some(("/p/d.rs".into(), Caret::new(10, 0), None)),
            IdeFamily::B,
            true,
        );
        applier.apply(sync);

        let mut files = host.open_files();
        files.sort();
        assert_eq!(files, vec!["/p/a.rs", "/p/b.rs", "/p/d.rs"]);

        // The local view was restored, not yanked to /p/d.rs.
        let snapshot = host.active_snapshot().unwrap();
        assert_eq!(snapshot.file_path, "/p/a.rs");
        assert_eq!(snapshot.caret, Caret::new(5, 2));
    }

    #[test]
    fn test_reconcile_follows_remote_when_receiver_inactive() {
        let host = ScriptedHost::new();
        host.set_focused(false);
        host.seed_tabs(&["/p/a.rs"]);
        let applier = applier_for(&host);

        let sync = EditorState::workspace_sync(
            vec!["/p/a.rs".into(), "/p/d.rs".into()],
            Some(("/p/d.rs".into(), Caret::new(10, 0), None)),
            IdeFamily::B,
            true,
        );
        applier.apply(sync);

        let snapshot = host.active_snapshot().unwrap();
        assert_eq!(snapshot.file_path, "/p/d.rs");
        assert_eq!(snapshot.caret, Caret::new(10, 0));
    }

    #[test]
    fn test_reconcile_equal_sets_touches_no_tabs() {
        let host = ScriptedHost::new();
        host.set_focused(false);
        host.seed_tabs(&["/p/a.rs", "/p/b.rs"]);
        let applier = applier_for(&host);
        host.clear_ops();

        let sync = EditorState::workspace_sync(
            vec!["/p/a.rs".into(), "/p/b.rs".into()],
            Some(("/p/a.rs".into(), Caret::new(0, 0), None)),
            IdeFamily::B,
            true,
        );
        applier.apply(sync);

        // No tab churn; only the caret followed the remote.
        assert!(host
            .ops()
            .iter()
            .all(|op| !matches!(op, HostOp::Close { .. })));
        let mut files = host.open_files();
        files.sort();
        assert_eq!(files, vec!["/p/a.rs", "/p/b.rs"]);
    }

    #[test]
    fn test_reconcile_empty_file_path_skips_cursor() {
        let host = ScriptedHost::new();
        host.set_focused(false);
        host.seed_tabs(&["/p/a.rs"]);
        let applier = applier_for(&host);
        host.clear_ops();

        let sync = EditorState::workspace_sync(vec![], None, IdeFamily::B, true);
        applier.apply(sync);

        assert!(host.open_files().is_empty());
        assert!(host
            .ops()
            .iter()
            .all(|op| !matches!(op, HostOp::SetCursor { .. })));
    }
}
