//! Established-connection duties: frame pump, heartbeats, watchdog.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tracing::{debug, info, warn};

use tandem_protocol::defaults::{HEARTBEAT_INTERVAL_SECS, HEARTBEAT_TIMEOUT_SECS};
use tandem_protocol::wire::{parse_frame, ControlFrame, Frame, LineSplitter};

use crate::shutdown::ShutdownToken;

use super::Shared;

const READ_CHUNK: usize = 4 * 1024;

/// Pump one established connection until it dies, is replaced, or the
/// transport shuts down. Heartbeat frames terminate here; only sync
/// envelopes are delivered upward.
pub(super) async fn run_connection(
    shared: Arc<Shared>,
    mut read_half: OwnedReadHalf,
    mut splitter: LineSplitter,
    initial_lines: Vec<String>,
    epoch: u64,
    shutdown: ShutdownToken,
) {
    // Lines that rode in on the same read as the handshake.
    for line in initial_lines {
        handle_line(&shared, &line).await;
    }

    let mut heartbeat = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let timeout = Duration::from_secs(HEARTBEAT_TIMEOUT_SECS);
    let mut buf = vec![0u8; READ_CHUNK];

    loop {
        if shared.current_epoch() != epoch {
            debug!("connection superseded, reader exiting");
            return;
        }
        tokio::select! {
            _ = shutdown.cancelled() => return,

            _ = heartbeat.tick() => {
                if shared.current_epoch() != epoch {
                    return;
                }
                if shared.rx_elapsed() >= timeout {
                    warn!(
                        silent_for = ?shared.rx_elapsed(),
                        "partner missed three heartbeats, dropping link"
                    );
                    shared.demote(epoch).await;
                    return;
                }
                let beat = ControlFrame::heartbeat(shared.config.project_path.clone());
                if !shared.send_control(&beat).await {
                    // The failed write already tore the link down.
                    return;
                }
            }

            read = read_half.read(&mut buf) => match read {
                Ok(0) => {
                    info!("partner closed the connection");
                    shared.demote(epoch).await;
                    return;
                }
                Ok(n) => {
                    let lines = match splitter.push(&buf[..n]) {
                        Ok(lines) => lines,
                        Err(err) => {
                            warn!("inbound framing error, dropping link: {err}");
                            shared.demote(epoch).await;
                            return;
                        }
                    };
                    for line in lines {
                        handle_line(&shared, &line).await;
                    }
                }
                Err(err) => {
                    warn!("read error, dropping link: {err}");
                    shared.demote(epoch).await;
                    return;
                }
            }
        }
    }
}

async fn handle_line(shared: &Shared, line: &str) {
    match parse_frame(line) {
        Ok(Frame::Control(ControlFrame::Heartbeat { .. })) => {
            shared.touch_rx();
            shared.send_control(&ControlFrame::heartbeat_ack()).await;
        }
        Ok(Frame::Control(ControlFrame::HeartbeatAck { .. })) => {
            shared.touch_rx();
        }
        Ok(Frame::Control(other)) => {
            debug!(frame = ?other, "unexpected control frame on established link");
        }
        Ok(Frame::Sync(wrapper)) => {
            shared.deliver(*wrapper);
        }
        Err(err) => {
            warn!("dropping malformed frame: {err}");
        }
    }
}

/// Read frames until at least one complete line is available. Returns the
/// first line plus anything that arrived with it; the splitter keeps any
/// partial tail.
pub(super) async fn read_frame_batch(
    read_half: &mut OwnedReadHalf,
    splitter: &mut LineSplitter,
) -> Option<(String, Vec<String>)> {
    let mut buf = [0u8; 1024];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => return None,
            Ok(n) => match splitter.push(&buf[..n]) {
                Ok(lines) if !lines.is_empty() => {
                    let mut lines = lines.into_iter();
                    let first = lines.next().unwrap_or_default();
                    return Some((first, lines.collect()));
                }
                Ok(_) => continue,
                Err(err) => {
                    debug!("framing error during handshake: {err}");
                    return None;
                }
            },
            Err(err) => {
                debug!("read error during handshake: {err}");
                return None;
            }
        }
    }
}
