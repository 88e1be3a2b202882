//! Outbound send queue and its drain worker.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, warn};

use tandem_protocol::defaults::{SEND_PACING_MS, SEND_QUEUE_CAPACITY};
use tandem_protocol::{EditorState, MessageIdGen, MessageWrapper};

use crate::shutdown::ShutdownToken;

/// Bounded FIFO of outbound editor states. `push` never blocks; overflow
/// drops the oldest entry. Clones share the same queue.
#[derive(Clone)]
pub struct SendQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    items: Mutex<VecDeque<EditorState>>,
    notify: Notify,
}

impl SendQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                items: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
            }),
        }
    }

    pub fn push(&self, state: EditorState) {
        {
            let mut items = self.inner.items.lock().unwrap();
            if items.len() >= SEND_QUEUE_CAPACITY {
                if let Some(dropped) = items.pop_front() {
                    warn!(
                        action = %dropped.action,
                        path = %dropped.file_path,
                        "send queue full, dropping oldest entry"
                    );
                }
            }
            items.push_back(state);
        }
        self.inner.notify.notify_one();
    }

    pub fn pop(&self) -> Option<EditorState> {
        self.inner.items.lock().unwrap().pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.items.lock().unwrap().clear();
    }

    async fn wait_nonempty(&self) {
        self.inner.notify.notified().await;
    }
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Single drain worker: wrap each state in an envelope, hand it to the
/// transport, pace between sends. A `false` send result is final; the next
/// focus-lost snapshot reconverges the peers.
pub(crate) async fn run_worker<S, Fut>(
    queue: SendQueue,
    ids: Arc<MessageIdGen>,
    send: S,
    shutdown: ShutdownToken,
) where
    S: Fn(MessageWrapper) -> Fut,
    Fut: Future<Output = bool>,
{
    loop {
        let state = loop {
            if shutdown.is_cancelled() {
                queue.clear();
                return;
            }
            if let Some(state) = queue.pop() {
                break state;
            }
            tokio::select! {
                _ = queue.wait_nonempty() => {}
                _ = shutdown.cancelled() => {}
            }
        };

        let wrapper = MessageWrapper::new(
            ids.next(),
            ids.instance_id().as_str().to_string(),
            state,
        );
        if !send(wrapper).await {
            debug!("partner not connected, message dropped");
        }
        tokio::time::sleep(Duration::from_millis(SEND_PACING_MS)).await;
    }
}
