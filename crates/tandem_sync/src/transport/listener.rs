//! Listener role: bind a loopback port, greet every client, keep accepting.
//!
//! The listener stays bound while a connection is live; a later successful
//! handshake replaces the current connection (the partner may have restarted
//! without the old socket dying visibly).

use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use tandem_protocol::defaults::{
    HANDSHAKE_ACK_TIMEOUT_MS, PORT_SCAN_END, PORT_SCAN_START, RECONNECT_DELAY_SECS,
};
use tandem_protocol::paths::project_paths_match;
use tandem_protocol::wire::{encode_line, parse_frame, ControlFrame, Frame, LineSplitter};

use crate::shutdown::ShutdownToken;

use super::conn::{read_frame_batch, run_connection};
use super::{LinkState, Shared};

pub(super) async fn run(shared: Arc<Shared>, shutdown: ShutdownToken) {
    let retry = Duration::from_secs(RECONNECT_DELAY_SECS);
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        let Some((listener, port)) = bind(&shared).await else {
            warn!(
                "no bindable port in {}..={}; retrying in {}s",
                PORT_SCAN_START, PORT_SCAN_END, RECONNECT_DELAY_SECS
            );
            shared.set_state(LinkState::Connecting);
            if shutdown.sleep_unless_cancelled(retry).await {
                break;
            }
            continue;
        };
        shared.set_state(LinkState::Connecting);
        info!(port, "listening for partner");
        accept_loop(&shared, &listener, port, &shutdown).await;
        break;
    }
    shared.set_state(LinkState::Disconnected);
}

/// Custom port first when configured, otherwise walk the scan range.
async fn bind(shared: &Shared) -> Option<(TcpListener, u16)> {
    if let Some(port) = shared.config.effective_custom_port() {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Some((listener, port)),
            Err(err) => {
                warn!(port, "custom port bind failed ({err}), falling back to scan");
            }
        }
    }
    for port in PORT_SCAN_START..=PORT_SCAN_END {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            return Some((listener, port));
        }
    }
    None
}

async fn accept_loop(
    shared: &Arc<Shared>,
    listener: &TcpListener,
    port: u16,
    shutdown: &ShutdownToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!(%addr, "client connected, greeting");
                    greet(shared, stream, port, shutdown).await;
                }
                Err(err) => {
                    warn!("accept failed: {err}");
                    if shutdown.sleep_unless_cancelled(Duration::from_secs(1)).await {
                        return;
                    }
                }
            }
        }
    }
}

/// Send our `HANDSHAKE`, wait for a matching `HANDSHAKE_ACK`, and promote
/// the connection. Mismatches and timeouts close the socket silently; the
/// listener just keeps accepting.
async fn greet(shared: &Arc<Shared>, stream: TcpStream, port: u16, shutdown: &ShutdownToken) {
    let _ = stream.set_nodelay(true);
    let (mut read_half, mut write_half) = stream.into_split();

    let hello = ControlFrame::Handshake {
        project_path: shared.config.project_path.clone(),
        ide_type: shared.config.ide_family,
        ide_name: shared.config.ide_name.clone(),
        port,
    };
    let bytes = match encode_line(&hello) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("could not encode handshake: {err}");
            return;
        }
    };
    if write_half.write_all(&bytes).await.is_err() {
        debug!("client vanished before the handshake");
        return;
    }

    let mut splitter = LineSplitter::new();
    let ack_timeout = Duration::from_millis(HANDSHAKE_ACK_TIMEOUT_MS);
    let batch = tokio::time::timeout(ack_timeout, read_frame_batch(&mut read_half, &mut splitter));
    let (first, rest) = match batch.await {
        Ok(Some(batch)) => batch,
        _ => {
            debug!("no handshake ack, closing");
            return;
        }
    };

    match parse_frame(&first) {
        Ok(Frame::Control(ControlFrame::HandshakeAck {
            project_path,
            ide_name,
            ..
        })) => {
            if !project_paths_match(&shared.config.project_path, &project_path) {
                info!(
                    theirs = %project_path,
                    "handshake ack from a different project, closing"
                );
                return;
            }
            let epoch = shared.install_writer(write_half).await;
            shared.set_connected(port, ide_name.clone());
            info!(port, peer = %ide_name, "partner linked");
            tokio::spawn(run_connection(
                Arc::clone(shared),
                read_half,
                splitter,
                rest,
                epoch,
                shutdown.clone(),
            ));
        }
        other => {
            debug!(?other, "expected HANDSHAKE_ACK, closing");
        }
    }
}
