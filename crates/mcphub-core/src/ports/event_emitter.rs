//! Outbound event seam.

use crate::events::HubEvent;

/// Sink for [`HubEvent`]s produced by the supervisor.
///
/// The supervisor emits after every reconciliation pass, toggle, and
/// restart; where those events go (consumer fan-out, a channel, a test
/// buffer) is the implementor's concern. `emit` must not block.
pub trait HubEventEmitter: Send + Sync {
    /// Hand one event to the sink.
    fn emit(&self, event: HubEvent);

    /// Boxed clone, so `Arc<dyn HubEventEmitter>` can be duplicated
    /// without a `Clone` bound on the trait.
    fn clone_box(&self) -> Box<dyn HubEventEmitter>;
}

/// Emitter that discards everything; the default for headless use and
/// tests that don't assert on events.
#[derive(Debug, Clone, Default)]
pub struct NoopEmitter;

impl NoopEmitter {
    pub const fn new() -> Self {
        Self
    }
}

impl HubEventEmitter for NoopEmitter {
    fn emit(&self, _event: HubEvent) {}

    fn clone_box(&self) -> Box<dyn HubEventEmitter> {
        Box::new(self.clone())
    }
}
