//! Per-instance runtime configuration.

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::state::IdeFamily;

/// Transport role, fixed per IDE family at startup. The asymmetry avoids
/// simultaneous-bind conflicts; there is no symmetric rendezvous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Binds a loopback port and accepts the partner.
    Listener,
    /// Scans the port range and connects.
    Scanner,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Listener => "listener",
            Role::Scanner => "scanner",
        }
    }
}

/// Everything the engine needs to know about this instance.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Workspace root, as the host reports it.
    pub project_path: String,
    pub ide_family: IdeFamily,
    /// Human-readable IDE name, exchanged in the handshake.
    pub ide_name: String,
    pub role: Role,
    /// When true, prefer `custom_port` over the automatic scan.
    pub use_custom_port: bool,
    pub custom_port: u16,
    /// Enable auto-reconnect as soon as the core is constructed.
    pub auto_start_sync: bool,
}

impl SyncConfig {
    pub fn new(project_path: String, ide_family: IdeFamily, ide_name: String, role: Role) -> Self {
        Self {
            project_path,
            ide_family,
            ide_name,
            role,
            use_custom_port: false,
            custom_port: defaults::PORT_SCAN_START,
            auto_start_sync: false,
        }
    }

    /// The custom port, if enabled and inside the permitted range.
    pub fn effective_custom_port(&self) -> Option<u16> {
        if self.use_custom_port && self.custom_port >= defaults::CUSTOM_PORT_MIN {
            Some(self.custom_port)
        } else {
            None
        }
    }
}
