//! Scanner role: probe the port range, verify the listener's project, link.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

use tandem_protocol::defaults::{
    CONNECT_PROBE_TIMEOUT_MS, HANDSHAKE_ACK_TIMEOUT_MS, PORT_SCAN_END, PORT_SCAN_START,
    RECONNECT_DELAY_SECS,
};
use tandem_protocol::paths::project_paths_match;
use tandem_protocol::wire::{encode_line, parse_frame, ControlFrame, Frame, LineSplitter};

use crate::shutdown::ShutdownToken;

use super::conn::{read_frame_batch, run_connection};
use super::{LinkState, Shared};

/// A linked connection fresh out of the handshake.
struct Linked {
    read_half: OwnedReadHalf,
    splitter: LineSplitter,
    initial_lines: Vec<String>,
    epoch: u64,
}

pub(super) async fn run(shared: Arc<Shared>, shutdown: ShutdownToken) {
    let rescan = Duration::from_secs(RECONNECT_DELAY_SECS);
    shared.set_state(LinkState::Connecting);
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        if let Some(linked) = scan_once(&shared, &shutdown).await {
            run_connection(
                Arc::clone(&shared),
                linked.read_half,
                linked.splitter,
                linked.initial_lines,
                linked.epoch,
                shutdown.clone(),
            )
            .await;
            if shutdown.is_cancelled() {
                break;
            }
            shared.set_state(LinkState::Connecting);
        } else {
            debug!("scan cycle found no partner");
        }
        if shutdown.sleep_unless_cancelled(rescan).await {
            break;
        }
    }
    shared.set_state(LinkState::Disconnected);
}

/// One pass over the candidate ports: the custom port first when configured,
/// then the scan range.
async fn scan_once(shared: &Arc<Shared>, shutdown: &ShutdownToken) -> Option<Linked> {
    let custom = shared.config.effective_custom_port();
    let ports = custom
        .into_iter()
        .chain((PORT_SCAN_START..=PORT_SCAN_END).filter(|p| Some(*p) != custom));

    for port in ports {
        if shutdown.is_cancelled() {
            return None;
        }
        if let Some(linked) = probe(shared, port).await {
            return Some(linked);
        }
    }
    None
}

/// Connect with a short timeout and read one line expecting the listener's
/// `HANDSHAKE`. Anything else - nobody listening, a different project, a
/// foreign protocol - closes the socket and moves on.
async fn probe(shared: &Arc<Shared>, port: u16) -> Option<Linked> {
    let connect = TcpStream::connect(("127.0.0.1", port));
    let stream = match tokio::time::timeout(
        Duration::from_millis(CONNECT_PROBE_TIMEOUT_MS),
        connect,
    )
    .await
    {
        Ok(Ok(stream)) => stream,
        _ => return None,
    };
    let _ = stream.set_nodelay(true);
    let (mut read_half, write_half) = stream.into_split();

    let mut splitter = LineSplitter::new();
    let greeting_timeout = Duration::from_millis(HANDSHAKE_ACK_TIMEOUT_MS);
    let batch = tokio::time::timeout(
        greeting_timeout,
        read_frame_batch(&mut read_half, &mut splitter),
    );
    let (first, rest) = match batch.await {
        Ok(Some(batch)) => batch,
        _ => {
            debug!(port, "no greeting, not a tandem listener");
            return None;
        }
    };

    match parse_frame(&first) {
        Ok(Frame::Control(ControlFrame::Handshake {
            project_path,
            ide_name,
            ..
        })) => {
            if !project_paths_match(&shared.config.project_path, &project_path) {
                debug!(port, theirs = %project_path, "different project, continuing scan");
                return None;
            }
            finish_handshake(shared, port, ide_name, read_half, write_half, splitter, rest).await
        }
        _ => {
            debug!(port, "port speaks something else, continuing scan");
            None
        }
    }
}

async fn finish_handshake(
    shared: &Arc<Shared>,
    port: u16,
    peer_name: String,
    read_half: OwnedReadHalf,
    mut write_half: OwnedWriteHalf,
    splitter: LineSplitter,
    initial_lines: Vec<String>,
) -> Option<Linked> {
    let ack = ControlFrame::HandshakeAck {
        project_path: shared.config.project_path.clone(),
        ide_type: shared.config.ide_family,
        ide_name: shared.config.ide_name.clone(),
    };
    let bytes = encode_line(&ack).ok()?;
    if write_half.write_all(&bytes).await.is_err() {
        debug!(port, "listener vanished during the handshake");
        return None;
    }

    let epoch = shared.install_writer(write_half).await;
    shared.set_connected(port, peer_name.clone());
    info!(port, peer = %peer_name, "partner linked");
    Some(Linked {
        read_half,
        splitter,
        initial_lines,
        epoch,
    })
}
