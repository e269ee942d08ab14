//! Event mechanics: the event contract, envelopes, handlers and the
//! publish/subscribe dispatcher.
//!
//! Nothing in here knows about vending machines; the domain events live in
//! `vendstock-inventory`.

pub mod dispatcher;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod subscription;

pub use dispatcher::{DispatchError, DispatchStats, Dispatcher, DispatcherConfig, FaultPolicy};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::{EventHandler, HandlerError, SharedHandler};
pub use subscription::Subscription;
