//! Wire protocol for Tandem editor-state synchronization.
//!
//! Two IDE processes on one host mirror each other's editing focus over
//! loopback TCP. Every frame is one line of UTF-8 JSON terminated by `\n`.
//!
//! # Frame taxonomy
//!
//! Frames with a top-level `"type"` field are control traffic:
//!
//! - `HANDSHAKE` (listener -> scanner, on accept)
//! - `HANDSHAKE_ACK` (scanner -> listener, on project-path match)
//! - `HEARTBEAT` / `HEARTBEAT_ACK` (both directions, every 2 s once linked)
//!
//! Everything else is a [`MessageWrapper`] envelope carrying one
//! [`EditorState`] payload. Control frames never leave the transport layer;
//! envelopes are what the sync engine consumes.

pub mod config;
pub mod dedup;
pub mod defaults;
pub mod error;
pub mod identity;
pub mod paths;
pub mod state;
pub mod timefmt;
pub mod wire;

pub use config::{Role, SyncConfig};
pub use dedup::DedupTable;
pub use error::{ProtocolError, Result};
pub use identity::{epoch_millis, InstanceId, MessageIdGen};
pub use paths::PathStyle;
pub use state::{Caret, EditorState, IdeFamily, Selection, SyncAction};
pub use wire::{encode_line, parse_frame, ControlFrame, Frame, LineSplitter, MessageWrapper};
