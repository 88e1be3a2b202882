//! Tandem synchronization engine.
//!
//! Sits between a host IDE (behind the [`HostAdapter`] seam) and the
//! loopback wire (`tandem_protocol`). One [`SyncCore`] per IDE process:
//! it ingests host editor events, debounces and queues them, ships them to
//! the partner instance over TCP, and applies the partner's events back
//! onto the host.
//!
//! Threading model: the transport, queue worker, and debounce timers are
//! tokio tasks; every host mutation is funneled through
//! [`HostAdapter::schedule`] so tab and caret state stay confined to the
//! host's own UI-like thread.

pub mod apply;
pub mod engine;
pub mod host;
pub mod inbound;
pub mod ingest;
pub mod queue;
pub mod shutdown;
pub mod transport;
pub mod window;

pub use engine::SyncCore;
pub use host::{EditorSnapshot, HostAdapter, HostTask};
pub use ingest::EventSink;
pub use shutdown::ShutdownToken;
pub use transport::{LinkState, LinkStatus, Transport};
