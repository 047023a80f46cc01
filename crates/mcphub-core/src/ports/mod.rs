//! Port definitions: the seams between the hub and its collaborators.

mod consumer;
mod event_emitter;
mod hub_error;
mod transport;

pub use consumer::HubConsumer;
pub use event_emitter::{HubEventEmitter, NoopEmitter};
pub use hub_error::HubError;
pub use transport::{Transport, TransportError, TransportEvent, TransportFactory};
