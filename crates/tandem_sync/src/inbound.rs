//! Inbound message gate: self-filtering, dedup, liveness checks.
//!
//! The transport strips control traffic; everything arriving here is a sync
//! envelope. Payloads that survive the gate are handed to the applier.

use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use tandem_protocol::defaults::STALE_MESSAGE_MILLIS;
use tandem_protocol::{timefmt, DedupTable, InstanceId, MessageWrapper};

use crate::apply::Applier;

pub struct InboundProcessor {
    instance_id: InstanceId,
    dedup: Mutex<DedupTable>,
    applier: Arc<Applier>,
}

impl InboundProcessor {
    pub fn new(instance_id: InstanceId, applier: Arc<Applier>) -> Self {
        Self {
            instance_id,
            dedup: Mutex::new(DedupTable::new()),
            applier,
        }
    }

    pub fn process(&self, wrapper: MessageWrapper) {
        // Loop suppression for any future broadcast transport.
        if wrapper.sender_id == self.instance_id.as_str() {
            return;
        }
        if !self.dedup.lock().unwrap().insert(&wrapper.message_id) {
            return;
        }

        let payload = wrapper.payload;
        if !payload.is_active {
            debug!(action = %payload.action, "observational message, not applied");
            return;
        }
        match timefmt::age_millis(&payload.timestamp) {
            Ok(age) if age > STALE_MESSAGE_MILLIS => {
                debug!(action = %payload.action, age_ms = age, "stale message dropped");
                return;
            }
            Err(err) => {
                warn!("dropping payload with bad timestamp: {err}");
                return;
            }
            Ok(_) => {}
        }

        self.applier.apply(payload);
    }
}
