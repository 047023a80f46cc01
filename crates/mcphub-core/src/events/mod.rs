//! Canonical event union broadcast to hub consumers.
//!
//! # Wire Format
//!
//! Events are serialized with a `type` tag:
//!
//! ```json
//! { "type": "servers_updated", "servers": [ ... ] }
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::ServerSnapshot;

/// Events fanned out to registered consumers.
///
/// A full, ordered server-list snapshot is emitted after every
/// reconciliation, toggle, or restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// The server list changed; carries the complete ordered snapshot.
    ServersUpdated {
        /// All connections, in settings declaration order.
        servers: Vec<ServerSnapshot>,
    },
}

impl HubEvent {
    /// Create a server-list update event.
    pub const fn servers_updated(servers: Vec<ServerSnapshot>) -> Self {
        Self::ServersUpdated { servers }
    }

    /// Get the event name for wire protocols.
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::ServersUpdated { .. } => "mcp:servers_updated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = HubEvent::servers_updated(vec![]);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"servers_updated\""));
        assert!(json.contains("\"servers\":[]"));
    }

    #[test]
    fn test_event_name() {
        assert_eq!(
            HubEvent::servers_updated(vec![]).event_name(),
            "mcp:servers_updated"
        );
    }
}
