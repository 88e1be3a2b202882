//! Core orchestrator: owns and wires every component.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tandem_protocol::defaults::{
    FOCUS_ATTACH_DELAY_MS, FOCUS_ATTACH_RETRIES, SHUTDOWN_JOIN_SECS,
};
use tandem_protocol::paths::local_file_path;
use tandem_protocol::{EditorState, InstanceId, MessageIdGen, SyncConfig};

use crate::apply::Applier;
use crate::host::HostAdapter;
use crate::inbound::InboundProcessor;
use crate::ingest::EventSink;
use crate::queue::{run_worker, SendQueue};
use crate::shutdown::ShutdownToken;
use crate::transport::{LinkStatus, StateCallback, Transport};
use crate::window::WindowState;

/// One synchronization core per IDE process. Construct inside a tokio
/// runtime; the host adapter outlives the core.
pub struct SyncCore {
    config: SyncConfig,
    adapter: Arc<dyn HostAdapter>,
    ids: Arc<MessageIdGen>,
    window: Arc<WindowState>,
    queue: SendQueue,
    sink: EventSink,
    transport: Arc<Transport>,
    shutdown: Mutex<ShutdownToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    enabled: AtomicBool,
    runtime: Handle,
}

impl SyncCore {
    pub fn new(config: SyncConfig, adapter: Arc<dyn HostAdapter>) -> Arc<Self> {
        let ids = Arc::new(MessageIdGen::new(InstanceId::for_project(&config.project_path)));
        let window = Arc::new(WindowState::new(Arc::clone(&adapter)));
        let queue = SendQueue::new();
        let sink = EventSink::new(queue.clone(), Arc::clone(&window), config.ide_family);
        let transport = Arc::new(Transport::new(config.clone()));

        let applier = Arc::new(Applier::new(
            Arc::clone(&adapter),
            Arc::clone(&window),
            config.ide_family.path_style(),
        ));
        let inbound = Arc::new(InboundProcessor::new(ids.instance_id().clone(), applier));
        {
            let inbound = Arc::clone(&inbound);
            transport.set_message_callback(Arc::new(move |wrapper| inbound.process(wrapper)));
        }

        let core = Arc::new_cyclic(|weak: &Weak<SyncCore>| {
            let on_focus = {
                let weak = weak.clone();
                Arc::new(move |focused: bool| {
                    if !focused {
                        if let Some(core) = weak.upgrade() {
                            core.on_focus_lost();
                        }
                    }
                })
            };
            window.set_on_change(on_focus);

            SyncCore {
                config,
                adapter,
                ids,
                window,
                queue,
                sink,
                transport,
                shutdown: Mutex::new(ShutdownToken::new()),
                tasks: Mutex::new(Vec::new()),
                enabled: AtomicBool::new(false),
                runtime: Handle::current(),
            }
        });

        info!(
            instance = %core.ids.instance_id(),
            role = core.config.role.as_str(),
            project = %core.config.project_path,
            "sync core created"
        );
        if core.config.auto_start_sync {
            core.enable();
        }
        core
    }

    /// Turn synchronization on: transport reconnect loop, queue worker, and
    /// host listener attachment (retried while the window comes up).
    pub fn enable(&self) {
        if self.enabled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("sync enabled");
        let token = ShutdownToken::new();
        *self.shutdown.lock().unwrap() = token.clone();
        self.sink.set_enabled(true);
        self.transport.enable();

        let worker = {
            let queue = self.queue.clone();
            let ids = Arc::clone(&self.ids);
            let transport = Arc::clone(&self.transport);
            let token = token.clone();
            self.runtime.spawn(async move {
                run_worker(
                    queue,
                    ids,
                    move |wrapper| {
                        let transport = Arc::clone(&transport);
                        async move { transport.send(&wrapper).await }
                    },
                    token,
                )
                .await;
            })
        };

        let attach = {
            let adapter = Arc::clone(&self.adapter);
            let sink = self.sink.clone();
            let token = token.clone();
            self.runtime.spawn(async move {
                attach_with_retry(adapter, sink, token).await;
            })
        };

        self.tasks.lock().unwrap().extend([worker, attach]);
    }

    /// Turn synchronization off. Pending debounce timers are cancelled and
    /// the queue is flushed; tasks unwind on their own.
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("sync disabled");
        self.sink.set_enabled(false);
        self.sink.cancel_pending();
        self.shutdown.lock().unwrap().cancel();
        self.transport.disable();
        self.queue.clear();
    }

    pub fn restart(&self) {
        self.disable();
        self.enable();
    }

    /// Disable and join every engine task, forcing detachment after the
    /// join budget.
    pub async fn shutdown(&self) {
        self.disable();
        let mut handles: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        handles.extend(self.transport.take_task());

        let join_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(Duration::from_secs(SHUTDOWN_JOIN_SECS), join_all)
            .await
            .is_err()
        {
            warn!("engine tasks did not stop within {SHUTDOWN_JOIN_SECS}s, detaching");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Current link state for status surfaces.
    pub fn state(&self) -> LinkStatus {
        self.transport.status()
    }

    /// Observe link-state transitions (coalesced).
    pub fn set_state_callback(&self, callback: StateCallback) {
        self.transport.set_state_callback(callback);
    }

    /// Handle the host's bindings push editor events into.
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    pub fn instance_id(&self) -> &InstanceId {
        self.ids.instance_id()
    }

    /// Focus left this window: broadcast the full tab set so the partner can
    /// mirror it.
    fn on_focus_lost(&self) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        self.emit_workspace_sync();
    }

    fn emit_workspace_sync(&self) {
        let files: Vec<String> = self
            .adapter
            .opened_files()
            .iter()
            .filter_map(|path| local_file_path(path))
            .collect();
        let active = self
            .adapter
            .active_editor()
            .map(|snap| (snap.file_path, snap.caret, snap.selection));
        debug!(tabs = files.len(), "focus lost, broadcasting workspace snapshot");
        let state =
            EditorState::workspace_sync(files, active, self.config.ide_family, true);
        self.queue.push(state);
    }
}

impl Drop for SyncCore {
    fn drop(&mut self) {
        self.shutdown.lock().unwrap().cancel();
        self.transport.disable();
    }
}

async fn attach_with_retry(adapter: Arc<dyn HostAdapter>, sink: EventSink, token: ShutdownToken) {
    for attempt in 1..=FOCUS_ATTACH_RETRIES {
        if token.is_cancelled() {
            return;
        }
        if adapter.attach_listeners(sink.clone()) {
            debug!(attempt, "host listeners attached");
            return;
        }
        if token
            .sleep_unless_cancelled(Duration::from_millis(FOCUS_ATTACH_DELAY_MS))
            .await
        {
            return;
        }
    }
    warn!(
        attempts = FOCUS_ATTACH_RETRIES,
        "host window never became available, giving up on editor listeners"
    );
}
