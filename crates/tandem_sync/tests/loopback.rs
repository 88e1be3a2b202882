//! Loopback integration tests: two cores, real sockets, real timers.
//!
//! Every test reserves its own high port so parallel tests never share a
//! listener, and project paths are unique per test so a stray range scan
//! from another test can never pass the handshake.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use tandem_protocol::wire::{parse_frame, ControlFrame, Frame};
use tandem_protocol::{Caret, IdeFamily, Role, SyncConfig};
use tandem_sync::{LinkState, SyncCore};
use tandem_test_utils::{free_port, HostOp, ScriptedHost};

fn config(role: Role, project: &str, port: u16) -> SyncConfig {
    let family = match role {
        Role::Listener => IdeFamily::A,
        Role::Scanner => IdeFamily::B,
    };
    let mut config = SyncConfig::new(
        project.to_string(),
        family,
        format!("{} 1.0", family),
        role,
    );
    config.use_custom_port = true;
    config.custom_port = port;
    config
}

async fn wait_for(what: &str, timeout: Duration, mut predicate: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

/// S1: matching projects link within the handshake budget. The scanner's
/// workspace sits under the listener's root, which the prefix rule admits
/// (and keeps the two instance ids distinct inside one test process).
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handshake_links_both_sides() {
    let port = free_port();
    let listener_host = ScriptedHost::new();
    let scanner_host = ScriptedHost::new();

    let listener = SyncCore::new(
        config(Role::Listener, "/tmp/tandem-s1/proj", port),
        listener_host.adapter(),
    );
    let scanner = SyncCore::new(
        config(Role::Scanner, "/tmp/tandem-s1/proj/app", port),
        scanner_host.adapter(),
    );

    listener.enable();
    wait_for("listener to bind", Duration::from_secs(2), || {
        listener.state().state == LinkState::Connecting
    })
    .await;
    scanner.enable();

    wait_for("both sides connected", Duration::from_secs(5), || {
        listener.state().state == LinkState::Connected
            && scanner.state().state == LinkState::Connected
    })
    .await;

    let listener_status = listener.state();
    assert_eq!(listener_status.port, Some(port));
    assert_eq!(listener_status.peer_name.as_deref(), Some("B 1.0"));
    let scanner_status = scanner.state();
    assert_eq!(scanner_status.port, Some(port));
    assert_eq!(scanner_status.peer_name.as_deref(), Some("A 1.0"));

    scanner.shutdown().await;
    listener.shutdown().await;
}

/// S2: a project mismatch never links and never fires a connected callback.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn handshake_rejects_foreign_project() {
    let port = free_port();
    let listener_host = ScriptedHost::new();
    let scanner_host = ScriptedHost::new();

    let listener = SyncCore::new(
        config(Role::Listener, "/tmp/tandem-s2/proj", port),
        listener_host.adapter(),
    );
    let scanner = SyncCore::new(
        config(Role::Scanner, "/tmp/tandem-s2-other/workspace", port),
        scanner_host.adapter(),
    );

    let transitions: Arc<Mutex<Vec<LinkState>>> = Arc::new(Mutex::new(Vec::new()));
    for core in [&listener, &scanner] {
        let transitions = Arc::clone(&transitions);
        core.set_state_callback(Arc::new(move |state| {
            transitions.lock().unwrap().push(state);
        }));
    }

    listener.enable();
    wait_for("listener to bind", Duration::from_secs(2), || {
        listener.state().state == LinkState::Connecting
    })
    .await;
    scanner.enable();

    // Give the scanner time to probe the listener and move on.
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(listener.state().state, LinkState::Connecting);
    assert_ne!(scanner.state().state, LinkState::Connected);
    assert!(
        !transitions.lock().unwrap().contains(&LinkState::Connected),
        "no connected callback may fire on a path mismatch"
    );

    scanner.shutdown().await;
    listener.shutdown().await;
}

/// A caret move on the focused side lands on the partner's host.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn caret_moves_reach_the_partner() {
    let port = free_port();
    let listener_host = ScriptedHost::new();
    let scanner_host = ScriptedHost::new();
    scanner_host.set_focused(true);

    let listener = SyncCore::new(
        config(Role::Listener, "/tmp/tandem-e2e/proj", port),
        listener_host.adapter(),
    );
    let scanner = SyncCore::new(
        config(Role::Scanner, "/tmp/tandem-e2e/proj/app", port),
        scanner_host.adapter(),
    );

    listener.enable();
    wait_for("listener to bind", Duration::from_secs(2), || {
        listener.state().state == LinkState::Connecting
    })
    .await;
    scanner.enable();
    wait_for("link", Duration::from_secs(5), || {
        scanner.state().state == LinkState::Connected
    })
    .await;

    wait_for("listeners attached", Duration::from_secs(2), || {
        scanner_host.attached()
    })
    .await;
    let sink = scanner_host.sink().expect("listeners attached on enable");
    sink.caret_or_selection_changed("/tmp/tandem-e2e/proj/app/main.rs", Caret::new(41, 7), None);

    wait_for("caret to arrive", Duration::from_secs(5), || {
        listener_host.ops().iter().any(|op| {
            matches!(
                op,
                HostOp::SetCursor { path, caret, .. }
                    if path == "/tmp/tandem-e2e/proj/app/main.rs" && *caret == Caret::new(41, 7)
            )
        })
    })
    .await;

    // NAVIGATE on a missing file opens it first, without stealing focus.
    assert!(listener_host.ops().iter().any(|op| {
        matches!(
            op,
            HostOp::Open { path, take_focus: false }
                if path == "/tmp/tandem-e2e/proj/app/main.rs"
        )
    }));

    scanner.shutdown().await;
    listener.shutdown().await;
}

async fn fake_scanner_handshake(port: u16) -> (BufReader<tokio::net::tcp::OwnedReadHalf>, tokio::net::tcp::OwnedWriteHalf) {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.expect("connect");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    reader.read_line(&mut line).await.expect("read handshake");
    let project_path = match parse_frame(line.trim()).expect("parse handshake") {
        Frame::Control(ControlFrame::Handshake { project_path, .. }) => project_path,
        other => panic!("expected HANDSHAKE, got {other:?}"),
    };

    let ack = ControlFrame::HandshakeAck {
        project_path,
        ide_type: IdeFamily::B,
        ide_name: "Fake Scanner".into(),
    };
    let mut bytes = serde_json::to_vec(&ack).expect("encode ack");
    bytes.push(b'\n');
    write_half.write_all(&bytes).await.expect("send ack");

    (reader, write_half)
}

/// Invariant: a newer completed handshake replaces the older connection.
/// The listener stays connected throughout; heartbeats flow to the newest
/// client, and the superseded socket is closed.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn newer_handshake_replaces_older_connection() {
    let port = free_port();
    let listener_host = ScriptedHost::new();
    let listener = SyncCore::new(
        config(Role::Listener, "/tmp/tandem-swap/proj", port),
        listener_host.adapter(),
    );
    listener.enable();
    wait_for("listener to bind", Duration::from_secs(2), || {
        listener.state().state == LinkState::Connecting
    })
    .await;

    let (mut first_reader, _first_write) = fake_scanner_handshake(port).await;
    wait_for("first link", Duration::from_secs(2), || {
        listener.state().state == LinkState::Connected
    })
    .await;

    let (mut second_reader, _second_write) = fake_scanner_handshake(port).await;
    // The listener must remain connected across the swap.
    assert_eq!(listener.state().state, LinkState::Connected);

    // The newest client receives the heartbeat traffic.
    let mut line = String::new();
    let read = tokio::time::timeout(
        Duration::from_secs(4),
        second_reader.read_line(&mut line),
    )
    .await
    .expect("heartbeat within one interval")
    .expect("read heartbeat");
    assert!(read > 0);
    assert!(
        matches!(
            parse_frame(line.trim()).expect("parse"),
            Frame::Control(ControlFrame::Heartbeat { .. })
        ),
        "expected a heartbeat, got {line:?}"
    );

    // The superseded socket gets closed once its reader task unwinds.
    let mut old_line = String::new();
    let old_read = tokio::time::timeout(
        Duration::from_secs(6),
        first_reader.read_line(&mut old_line),
    )
    .await
    .expect("old socket should close");
    assert_eq!(old_read.unwrap_or(0), 0, "old connection should see EOF");

    listener.shutdown().await;
}

/// S3: a partner that goes silent is dropped within the watchdog window.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn silent_partner_is_dropped_by_the_watchdog() {
    let port = free_port();
    let listener_host = ScriptedHost::new();
    let listener = SyncCore::new(
        config(Role::Listener, "/tmp/tandem-s3/proj", port),
        listener_host.adapter(),
    );
    listener.enable();
    wait_for("listener to bind", Duration::from_secs(2), || {
        listener.state().state == LinkState::Connecting
    })
    .await;

    // Handshake, then never send another byte: no heartbeats, no acks.
    let (_reader, _writer) = fake_scanner_handshake(port).await;
    wait_for("link", Duration::from_secs(2), || {
        listener.state().state == LinkState::Connected
    })
    .await;

    let linked_at = Instant::now();
    wait_for("watchdog to fire", Duration::from_secs(12), || {
        listener.state().state == LinkState::Connecting
    })
    .await;
    let elapsed = linked_at.elapsed();
    assert!(
        elapsed >= Duration::from_secs(5),
        "dropped too early: {elapsed:?}"
    );

    listener.shutdown().await;
}
