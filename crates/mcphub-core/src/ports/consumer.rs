//! Consumer handle trait for registry fan-out.

use crate::events::HubEvent;

/// A consumer context registered with the hub registry.
///
/// The registry holds a plain relation to consumers by id; it never
/// owns their lifetime. Consumers unregister explicitly on their own
/// teardown.
pub trait HubConsumer: Send + Sync {
    /// Stable identifier used for registration and unregistration.
    fn id(&self) -> &str;

    /// Deliver one event to this consumer.
    ///
    /// Must not block. A failure is logged by the caller and never
    /// prevents delivery to other consumers.
    fn deliver(&self, event: &HubEvent) -> anyhow::Result<()>;
}
