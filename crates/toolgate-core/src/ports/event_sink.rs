//! Registry lifecycle events and the sink port they flow through.

use serde::{Deserialize, Serialize};

use crate::domain::ConnectionState;

/// Lifecycle events emitted by the server registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event")]
pub enum RegistryEvent {
    /// A server descriptor was registered.
    ServerRegistered {
        /// Server name.
        name: String,
    },
    /// A server's connection state changed.
    StateChanged {
        /// Server name.
        name: String,
        /// New state.
        state: ConnectionState,
    },
    /// A server was unregistered and its tools pruned.
    ServerUnregistered {
        /// Server name.
        name: String,
    },
    /// Tool discovery completed for a server.
    ToolsDiscovered {
        /// Server name.
        server: String,
        /// Number of tools discovered.
        count: usize,
    },
    /// Two servers exposed the same tool name; the higher-priority one won.
    CatalogCollision {
        /// Colliding tool name.
        tool: String,
        /// Server whose tool is in the catalog.
        winner: String,
        /// Server whose tool was shadowed.
        loser: String,
    },
}

/// Fire-and-forget sink for registry events.
///
/// Implementations must not block; the registry calls this inline.
pub trait EventSink: Send + Sync {
    /// Emit one event.
    fn emit(&self, event: RegistryEvent);
}

/// Sink that drops all events. Useful for tests and headless embedding.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl NoopSink {
    /// Create a noop sink.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EventSink for NoopSink {
    fn emit(&self, _event: RegistryEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = RegistryEvent::StateChanged {
            name: "calc".to_string(),
            state: ConnectionState::Ready,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"stateChanged\""));
        assert!(json.contains("\"state\":\"ready\""));
    }
}
