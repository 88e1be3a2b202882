//! Canonical constants shared by both roles.
//!
//! Both peers must agree on the wire-visible values here (scan range,
//! heartbeat cadence, frame cap); the rest are engine tuning knobs kept in
//! one place so the contract is auditable.

/// First port probed by the automatic scan.
pub const PORT_SCAN_START: u16 = 3000;
/// Last port probed by the automatic scan (inclusive).
pub const PORT_SCAN_END: u16 = 4000;
/// Lowest port accepted from the `custom_port` option.
pub const CUSTOM_PORT_MIN: u16 = 1024;

/// TCP connect timeout for one scanner probe.
pub const CONNECT_PROBE_TIMEOUT_MS: u64 = 500;
/// How long the listener waits for a `HANDSHAKE_ACK` after accepting.
pub const HANDSHAKE_ACK_TIMEOUT_MS: u64 = 2_000;
/// Delay before a failed bind/scan cycle is retried.
pub const RECONNECT_DELAY_SECS: u64 = 5;

/// Interval between outbound `HEARTBEAT` frames once linked.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 2;
/// A peer silent for longer than this is considered dead (three misses).
pub const HEARTBEAT_TIMEOUT_SECS: u64 = 6;

/// Hard cap on one newline-delimited frame, including the terminator.
pub const MAX_FRAME_BYTES: usize = 8 * 1024;

/// Outbound queue capacity; the oldest entry is dropped on overflow.
pub const SEND_QUEUE_CAPACITY: usize = 100;
/// Pause between queue drains to smooth bursts.
pub const SEND_PACING_MS: u64 = 50;

/// Coalescing window for caret movement on one file.
pub const NAVIGATE_DEBOUNCE_MS: u64 = 300;

/// Replay-suppression table capacity.
pub const DEDUP_CAPACITY: usize = 1_000;
/// Replay-suppression sliding window.
pub const DEDUP_WINDOW_SECS: u64 = 300;

/// Inbound payloads older than this are dropped as stale.
pub const STALE_MESSAGE_MILLIS: i64 = 5_000;

/// Focus-listener attach attempts before giving up.
pub const FOCUS_ATTACH_RETRIES: u32 = 10;
/// Delay between focus-listener attach attempts.
pub const FOCUS_ATTACH_DELAY_MS: u64 = 500;

/// Budget for joining engine tasks during shutdown.
pub const SHUTDOWN_JOIN_SECS: u64 = 5;
