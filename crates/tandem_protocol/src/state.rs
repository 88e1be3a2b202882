//! Sync payload model.
//!
//! [`EditorState`] is the unit of synchronization: one editor action with
//! enough context for the receiving side to replay it. Caret and selection
//! coordinates are zero-based on the wire; anything user-facing goes through
//! [`Caret::display`] which shifts to one-based.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::timefmt;

/// The four actions a peer can ask its partner to mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncAction {
    Open,
    Close,
    Navigate,
    WorkspaceSync,
}

impl SyncAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncAction::Open => "OPEN",
            SyncAction::Close => "CLOSE",
            SyncAction::Navigate => "NAVIGATE",
            SyncAction::WorkspaceSync => "WORKSPACE_SYNC",
        }
    }
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the two IDE families originated an event. Used for logging only;
/// the receiver never branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdeFamily {
    A,
    B,
}

impl IdeFamily {
    /// The family on the other end of the link.
    pub fn partner(self) -> Self {
        match self {
            IdeFamily::A => IdeFamily::B,
            IdeFamily::B => IdeFamily::A,
        }
    }

    /// Path shape this family speaks.
    pub fn path_style(self) -> crate::paths::PathStyle {
        match self {
            IdeFamily::A => crate::paths::PathStyle::Posix,
            IdeFamily::B => crate::paths::PathStyle::Windows,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IdeFamily::A => "A",
            IdeFamily::B => "B",
        }
    }
}

impl fmt::Display for IdeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Zero-based caret position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Caret {
    pub line: u32,
    pub column: u32,
}

impl Caret {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// One-based rendering for logs and status surfaces.
    pub fn display(self) -> String {
        format!("{}:{}", self.line + 1, self.column + 1)
    }
}

/// A non-empty selection. On the wire this travels as four individual
/// `selection*` fields on the payload (see [`EditorState`]); an empty
/// selection is the absence of all four.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Selection {
    pub fn new(start: Caret, end: Caret) -> Self {
        Self {
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
        }
    }

    pub fn start(&self) -> Caret {
        Caret::new(self.start_line, self.start_column)
    }

    pub fn end(&self) -> Caret {
        Caret::new(self.end_line, self.end_column)
    }

    /// Swap the endpoints if they arrived out of document order.
    pub fn ordered(self) -> Self {
        if self.start() <= self.end() {
            self
        } else {
            Self::new(self.end(), self.start())
        }
    }

    /// The endpoint closest to `caret` in document order. Preserves the
    /// direction of up-vs-down selections when the caret is re-applied.
    pub fn endpoint_nearest(&self, caret: Caret) -> Caret {
        let start = self.start();
        let end = self.end();
        if caret <= start {
            return start;
        }
        if caret >= end {
            return end;
        }
        // Caret strictly inside the span: pick by line distance, then column.
        let to_start = (caret.line - start.line, caret.column.abs_diff(start.column));
        let to_end = (end.line - caret.line, caret.column.abs_diff(end.column));
        if to_start <= to_end {
            start
        } else {
            end
        }
    }
}

/// One editor action, self-contained for replay on the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    pub action: SyncAction,
    /// Absolute path; empty only for a `WORKSPACE_SYNC` with no active editor.
    pub file_path: String,
    pub line: u32,
    pub column: u32,
    pub source: IdeFamily,
    /// Whether the sending window was focused at event time. Receivers never
    /// apply a payload with `is_active == false`.
    pub is_active: bool,
    /// Wall-clock string, `YYYY-MM-DD HH:MM:SS.mmm`.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened_files: Option<Vec<String>>,
    // The four selection coordinates are individually optional on the wire
    // but only meaningful together; selection()/set_selection() are the
    // typed view.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selection_start_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selection_start_column: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selection_end_line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selection_end_column: Option<u32>,
}

impl EditorState {
    fn base(
        action: SyncAction,
        file_path: String,
        caret: Caret,
        source: IdeFamily,
        is_active: bool,
    ) -> Self {
        Self {
            action,
            file_path,
            line: caret.line,
            column: caret.column,
            source,
            is_active,
            timestamp: timefmt::now_wire(),
            opened_files: None,
            selection_start_line: None,
            selection_start_column: None,
            selection_end_line: None,
            selection_end_column: None,
        }
    }

    pub fn open(
        file_path: String,
        caret: Caret,
        selection: Option<Selection>,
        source: IdeFamily,
        is_active: bool,
    ) -> Self {
        let mut state = Self::base(SyncAction::Open, file_path, caret, source, is_active);
        state.set_selection(selection);
        state
    }

    pub fn navigate(
        file_path: String,
        caret: Caret,
        selection: Option<Selection>,
        source: IdeFamily,
        is_active: bool,
    ) -> Self {
        let mut state = Self::base(SyncAction::Navigate, file_path, caret, source, is_active);
        state.set_selection(selection);
        state
    }

    /// A `CLOSE` carries no position; the caret is pinned to the origin.
    pub fn close(file_path: String, source: IdeFamily, is_active: bool) -> Self {
        Self::base(SyncAction::Close, file_path, Caret::default(), source, is_active)
    }

    /// Full tab-set snapshot, emitted when the sender's window loses focus.
    pub fn workspace_sync(
        opened_files: Vec<String>,
        active: Option<(String, Caret, Option<Selection>)>,
        source: IdeFamily,
        is_active: bool,
    ) -> Self {
        let (file_path, caret, selection) = match active {
            Some((path, caret, selection)) => (path, caret, selection),
            None => (String::new(), Caret::default(), None),
        };
        let mut state = Self::base(SyncAction::WorkspaceSync, file_path, caret, source, is_active);
        state.opened_files = Some(opened_files);
        state.set_selection(selection);
        state
    }

    pub fn caret(&self) -> Caret {
        Caret::new(self.line, self.column)
    }

    /// The selection, if all four coordinates are present. A payload with a
    /// partial set is treated as having none.
    pub fn selection(&self) -> Option<Selection> {
        match (
            self.selection_start_line,
            self.selection_start_column,
            self.selection_end_line,
            self.selection_end_column,
        ) {
            (Some(start_line), Some(start_column), Some(end_line), Some(end_column)) => {
                Some(Selection {
                    start_line,
                    start_column,
                    end_line,
                    end_column,
                })
            }
            _ => None,
        }
    }

    /// Replace or clear the selection, normalizing to document order.
    pub fn set_selection(&mut self, selection: Option<Selection>) {
        match selection.map(Selection::ordered) {
            Some(sel) => {
                self.selection_start_line = Some(sel.start_line);
                self.selection_start_column = Some(sel.start_column);
                self.selection_end_line = Some(sel.end_line);
                self.selection_end_column = Some(sel.end_column);
            }
            None => {
                self.selection_start_line = None;
                self.selection_start_column = None;
                self.selection_end_line = None;
                self.selection_end_column = None;
            }
        }
    }

    pub fn has_selection(&self) -> bool {
        self.selection().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        assert_eq!(
            serde_json::to_string(&SyncAction::WorkspaceSync).unwrap(),
            "\"WORKSPACE_SYNC\""
        );
        assert_eq!(serde_json::to_string(&SyncAction::Open).unwrap(), "\"OPEN\"");
        let parsed: SyncAction = serde_json::from_str("\"NAVIGATE\"").unwrap();
        assert_eq!(parsed, SyncAction::Navigate);
    }

    #[test]
    fn test_family_tag() {
        assert_eq!(serde_json::to_string(&IdeFamily::A).unwrap(), "\"A\"");
        assert_eq!(IdeFamily::A.partner(), IdeFamily::B);
    }

    #[test]
    fn test_selection_travels_as_four_payload_fields() {
        let state = EditorState::navigate(
            "/home/u/proj/a.rs".into(),
            Caret::new(4, 2),
            Some(Selection::new(Caret::new(4, 0), Caret::new(4, 2))),
            IdeFamily::A,
            true,
        );
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["selectionStartLine"], 4);
        assert_eq!(json["selectionStartColumn"], 0);
        assert_eq!(json["selectionEndLine"], 4);
        assert_eq!(json["selectionEndColumn"], 2);
        assert_eq!(json["filePath"], "/home/u/proj/a.rs");
        assert_eq!(json["isActive"], true);

        let back: EditorState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
        assert_eq!(
            back.selection(),
            Some(Selection::new(Caret::new(4, 0), Caret::new(4, 2)))
        );
    }

    #[test]
    fn test_absent_selection_is_absent_on_wire() {
        let state = EditorState::close("/tmp/x.rs".into(), IdeFamily::B, true);
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("selectionStartLine").is_none());
        assert!(json.get("openedFiles").is_none());
        assert_eq!(json["line"], 0);
        assert_eq!(json["column"], 0);

        let back: EditorState = serde_json::from_value(json).unwrap();
        assert!(back.selection().is_none());
        assert!(back.opened_files.is_none());
    }

    #[test]
    fn test_payload_without_selection_fields_deserializes() {
        // The common case on the wire: no selection at all.
        let line = r#"{"action":"CLOSE","filePath":"/p/a.rs","line":0,"column":0,
            "source":"B","isActive":true,"timestamp":"2026-03-01 08:15:30.250"}"#;
        let state: EditorState = serde_json::from_str(line).unwrap();
        assert_eq!(state.action, SyncAction::Close);
        assert!(state.selection().is_none());
        assert!(!state.has_selection());
    }

    #[test]
    fn test_partial_selection_reads_as_none() {
        let line = r#"{"action":"NAVIGATE","filePath":"/p/a.rs","line":3,"column":1,
            "source":"A","isActive":true,"timestamp":"2026-03-01 08:15:30.250",
            "selectionStartLine":3,"selectionStartColumn":0}"#;
        let state: EditorState = serde_json::from_str(line).unwrap();
        assert!(state.selection().is_none());
    }

    #[test]
    fn test_selection_reordered_to_document_order() {
        let sel = Selection::new(Caret::new(10, 4), Caret::new(2, 0)).ordered();
        assert_eq!(sel.start(), Caret::new(2, 0));
        assert_eq!(sel.end(), Caret::new(10, 4));
    }

    #[test]
    fn test_endpoint_nearest_preserves_direction() {
        let sel = Selection::new(Caret::new(2, 0), Caret::new(10, 4));
        // Upward selection: caret sits at the start.
        assert_eq!(sel.endpoint_nearest(Caret::new(2, 0)), Caret::new(2, 0));
        // Downward selection: caret sits at the end.
        assert_eq!(sel.endpoint_nearest(Caret::new(10, 4)), Caret::new(10, 4));
        // Out-of-span caret clamps to the closer edge.
        assert_eq!(sel.endpoint_nearest(Caret::new(0, 0)), Caret::new(2, 0));
        assert_eq!(sel.endpoint_nearest(Caret::new(99, 0)), Caret::new(10, 4));
    }

    #[test]
    fn test_workspace_sync_without_active_editor() {
        let state = EditorState::workspace_sync(vec![], None, IdeFamily::A, true);
        assert_eq!(state.file_path, "");
        assert_eq!(state.opened_files.as_deref(), Some(&[][..]));
    }

    #[test]
    fn test_caret_display_is_one_based() {
        assert_eq!(Caret::new(0, 0).display(), "1:1");
        assert_eq!(Caret::new(9, 41).display(), "10:42");
    }
}
