//! `depot-events` — event mechanics shared by domain and infrastructure.
//!
//! Events are the audit trail of this system: every order status transition
//! is an appended event, never an in-place update.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
