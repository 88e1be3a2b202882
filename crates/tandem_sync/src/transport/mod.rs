//! Loopback TCP transport.
//!
//! One listener, one scanner, fixed per IDE family. Both roles present the
//! same surface: enable/disable, a fire-and-forget `send`, and coalesced
//! link-state callbacks. At most one connection is live at a time; a newer
//! completed handshake replaces the older connection atomically.

mod conn;
mod listener;
mod scanner;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tandem_protocol::wire::{encode_line, ControlFrame, MessageWrapper};
use tandem_protocol::{Role, SyncConfig};

use crate::shutdown::ShutdownToken;

/// Connection lifecycle, per side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Auto-reconnect is off.
    Disconnected,
    /// Binding, scanning, or waiting for the partner to come back.
    Connecting,
    /// Handshake complete, heartbeats flowing.
    Connected,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Disconnected => "disconnected",
            LinkState::Connecting => "connecting",
            LinkState::Connected => "connected",
        }
    }
}

/// Snapshot of the link for status surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStatus {
    pub state: LinkState,
    /// Negotiated port while connected.
    pub port: Option<u16>,
    /// Partner's advertised IDE name while connected.
    pub peer_name: Option<String>,
}

impl LinkStatus {
    fn idle(state: LinkState) -> Self {
        Self {
            state,
            port: None,
            peer_name: None,
        }
    }
}

pub(crate) type MessageCallback = Arc<dyn Fn(MessageWrapper) + Send + Sync>;
pub type StateCallback = Arc<dyn Fn(LinkState) + Send + Sync>;

/// Role-agnostic transport facade.
pub struct Transport {
    shared: Arc<Shared>,
    runtime: Handle,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<ShutdownToken>>,
}

impl Transport {
    /// Must be constructed inside a tokio runtime.
    pub fn new(config: SyncConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new(config)),
            runtime: Handle::current(),
            task: Mutex::new(None),
            shutdown: Mutex::new(None),
        }
    }

    pub(crate) fn set_message_callback(&self, callback: MessageCallback) {
        *self.shared.on_message.lock().unwrap() = Some(callback);
    }

    /// Link-state observer for status surfaces. Transitions are coalesced;
    /// re-entering the current state never fires.
    pub fn set_state_callback(&self, callback: StateCallback) {
        *self.shared.on_state.lock().unwrap() = Some(callback);
    }

    /// Start the role loop (idempotent while running).
    pub fn enable(&self) {
        let mut shutdown = self.shutdown.lock().unwrap();
        if shutdown.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return;
        }
        let token = ShutdownToken::new();
        *shutdown = Some(token.clone());
        drop(shutdown);

        let mut task = self.task.lock().unwrap();
        // A previous loop may still be winding down; don't wait for it.
        if let Some(old) = task.take() {
            old.abort();
        }
        let shared = Arc::clone(&self.shared);
        let handle = match shared.config.role {
            Role::Listener => self.runtime.spawn(listener::run(shared, token)),
            Role::Scanner => self.runtime.spawn(scanner::run(shared, token)),
        };
        *task = Some(handle);
    }

    /// Stop reconnecting and drop any live connection.
    pub fn disable(&self) {
        if let Some(token) = self.shutdown.lock().unwrap().take() {
            token.cancel();
        }
        self.shared.set_state(LinkState::Disconnected);
    }

    pub fn restart(&self) {
        info!("transport restart requested");
        self.disable();
        self.enable();
    }

    /// Write one envelope. Returns `false` without retrying when the link is
    /// down; a write failure demotes the link and also returns `false`.
    pub async fn send(&self, wrapper: &MessageWrapper) -> bool {
        self.shared.send_wrapper(wrapper).await
    }

    pub fn status(&self) -> LinkStatus {
        self.shared.status.lock().unwrap().clone()
    }

    pub fn state(&self) -> LinkState {
        self.status().state
    }

    /// Hand the role-loop task to the caller for the shutdown join.
    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        self.task.lock().unwrap().take()
    }
}

/// State shared between the facade and the role/connection tasks.
pub(crate) struct Shared {
    pub(crate) config: SyncConfig,
    status: Mutex<LinkStatus>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    /// Bumped on every install and teardown; connection tasks exit when the
    /// epoch moves past them.
    epoch: AtomicU64,
    last_rx: Mutex<Instant>,
    on_message: Mutex<Option<MessageCallback>>,
    on_state: Mutex<Option<StateCallback>>,
}

impl Shared {
    fn new(config: SyncConfig) -> Self {
        Self {
            config,
            status: Mutex::new(LinkStatus::idle(LinkState::Disconnected)),
            writer: tokio::sync::Mutex::new(None),
            epoch: AtomicU64::new(0),
            last_rx: Mutex::new(Instant::now()),
            on_message: Mutex::new(None),
            on_state: Mutex::new(None),
        }
    }

    /// Transition with coalescing: re-entering the current state is silent.
    pub(crate) fn set_state(&self, next: LinkState) {
        {
            let mut status = self.status.lock().unwrap();
            if status.state == next {
                return;
            }
            if next == LinkState::Connected {
                status.state = next;
            } else {
                *status = LinkStatus::idle(next);
            }
        }
        info!(state = next.as_str(), role = self.config.role.as_str(), "link state changed");
        let callback = self.on_state.lock().unwrap().clone();
        if let Some(callback) = callback {
            callback(next);
        }
    }

    pub(crate) fn set_connected(&self, port: u16, peer_name: String) {
        {
            let mut status = self.status.lock().unwrap();
            status.port = Some(port);
            status.peer_name = Some(peer_name);
        }
        self.set_state(LinkState::Connected);
    }

    pub(crate) fn state(&self) -> LinkState {
        self.status.lock().unwrap().state
    }

    /// Install a fresh write half, replacing whatever was there. Returns the
    /// new connection epoch. The epoch moves under the writer lock so a
    /// racing teardown of the old connection cannot clobber the new one.
    pub(crate) async fn install_writer(&self, writer: OwnedWriteHalf) -> u64 {
        let mut guard = self.writer.lock().await;
        if guard.is_some() {
            info!("replacing existing connection with newer handshake");
        }
        *guard = Some(writer);
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        drop(guard);
        self.touch_rx();
        epoch
    }

    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Tear the connection down if `epoch` is still the live one. Used by
    /// connection tasks so a replaced task cannot kill its successor.
    pub(crate) async fn demote(&self, epoch: u64) {
        let mut guard = self.writer.lock().await;
        if self.current_epoch() != epoch {
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *guard = None;
        drop(guard);
        if self.state() == LinkState::Connected {
            self.set_state(LinkState::Connecting);
        }
    }

    pub(crate) fn touch_rx(&self) {
        *self.last_rx.lock().unwrap() = Instant::now();
    }

    pub(crate) fn rx_elapsed(&self) -> Duration {
        self.last_rx.lock().unwrap().elapsed()
    }

    pub(crate) async fn send_wrapper(&self, wrapper: &MessageWrapper) -> bool {
        if self.state() != LinkState::Connected {
            return false;
        }
        let bytes = match encode_line(wrapper) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(message_id = %wrapper.message_id, "dropping outbound message: {err}");
                return false;
            }
        };
        self.write_bytes(&bytes).await
    }

    pub(crate) async fn send_control(&self, frame: &ControlFrame) -> bool {
        match encode_line(frame) {
            Ok(bytes) => self.write_bytes(&bytes).await,
            Err(err) => {
                warn!("dropping control frame: {err}");
                false
            }
        }
    }

    async fn write_bytes(&self, bytes: &[u8]) -> bool {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return false;
        };
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("write failed, dropping link: {err}");
                *guard = None;
                self.epoch.fetch_add(1, Ordering::SeqCst);
                drop(guard);
                if self.state() == LinkState::Connected {
                    self.set_state(LinkState::Connecting);
                }
                false
            }
        }
    }

    pub(crate) fn deliver(&self, wrapper: MessageWrapper) {
        let callback = self.on_message.lock().unwrap().clone();
        match callback {
            Some(callback) => callback(wrapper),
            None => debug!("no message callback installed, frame dropped"),
        }
    }
}
