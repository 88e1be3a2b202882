//! Control frames, the sync envelope, and newline-delimited framing.

use serde::{Deserialize, Serialize};

use crate::defaults::MAX_FRAME_BYTES;
use crate::error::{ProtocolError, Result};
use crate::identity::epoch_millis;
use crate::state::{EditorState, IdeFamily};

/// Transport-level traffic, distinguished by the top-level `type` tag.
/// Control frames never reach the sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ControlFrame {
    /// Listener -> scanner, sent immediately on accept.
    Handshake {
        project_path: String,
        ide_type: IdeFamily,
        ide_name: String,
        port: u16,
    },
    /// Scanner -> listener, sent iff the project paths match.
    HandshakeAck {
        project_path: String,
        ide_type: IdeFamily,
        ide_name: String,
    },
    Heartbeat {
        timestamp: i64,
        project_path: String,
    },
    HeartbeatAck {
        timestamp: i64,
    },
}

impl ControlFrame {
    pub fn heartbeat(project_path: String) -> Self {
        ControlFrame::Heartbeat {
            timestamp: epoch_millis(),
            project_path,
        }
    }

    pub fn heartbeat_ack() -> Self {
        ControlFrame::HeartbeatAck {
            timestamp: epoch_millis(),
        }
    }
}

/// Envelope around one [`EditorState`] payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageWrapper {
    /// `"{instanceId}-{sequence}-{epochMs}"`, unique per instance.
    pub message_id: String,
    pub sender_id: String,
    /// Epoch milliseconds at wrap time.
    pub timestamp: i64,
    pub payload: EditorState,
}

impl MessageWrapper {
    pub fn new(message_id: String, sender_id: String, payload: EditorState) -> Self {
        Self {
            message_id,
            sender_id,
            timestamp: epoch_millis(),
            payload,
        }
    }
}

/// One parsed inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Control(ControlFrame),
    Sync(Box<MessageWrapper>),
}

/// Classify a line: a known control `type` tag makes it a control frame,
/// anything else must parse as a sync envelope.
pub fn parse_frame(line: &str) -> Result<Frame> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("type").is_some() {
        Ok(Frame::Control(serde_json::from_value(value)?))
    } else {
        Ok(Frame::Sync(Box::new(serde_json::from_value(value)?)))
    }
}

/// Serialize `msg` as one newline-terminated frame, enforcing the size cap.
pub fn encode_line<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec(msg)?;
    bytes.push(b'\n');
    if bytes.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            size: bytes.len(),
            max: MAX_FRAME_BYTES,
        });
    }
    Ok(bytes)
}

/// Splits a byte stream into newline-terminated frames. Partial reads are
/// the norm on TCP; the unterminated tail is retained for the next push.
#[derive(Debug)]
pub struct LineSplitter {
    buf: Vec<u8>,
    max_frame: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::with_max_frame(MAX_FRAME_BYTES)
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame,
        }
    }

    /// Feed one received chunk; returns every complete line it finished
    /// (without the terminator). An unterminated segment longer than the
    /// frame cap poisons the stream and resets the buffer.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.is_empty() {
                continue;
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        if self.buf.len() > self.max_frame {
            let size = self.buf.len();
            self.buf.clear();
            return Err(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame,
            });
        }
        Ok(lines)
    }

    /// Bytes waiting for their terminator.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new()
    }
}
