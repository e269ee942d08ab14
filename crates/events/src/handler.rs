use std::sync::Arc;

use thiserror::Error;
use vendstock_core::DomainError;

use crate::{DispatchError, Dispatcher, Event, EventEnvelope};

/// Reacts to events of the kind it was subscribed for (handler abstraction).
///
/// The dispatcher only delivers envelopes whose payload kind matches the
/// subscription, so a handler may match on the one variant it cares about and
/// treat anything else as a no-op.
///
/// ## Reentrancy
///
/// `handle` receives the dispatcher that is delivering the event. A handler may
/// call [`Dispatcher::publish`] on it to emit derived events (they are queued
/// behind everything already pending, never delivered inline), and may
/// subscribe or unsubscribe handlers, itself included. Registration changes
/// take effect from the next event.
///
/// Passing the dispatcher in, rather than having handlers own a reference to
/// it, keeps the registry free of `Arc` cycles.
///
/// ## Errors
///
/// Returning `Err` reports a handler fault. What happens next is decided by
/// the dispatcher's [`FaultPolicy`](crate::FaultPolicy).
pub trait EventHandler<E: Event>: Send + Sync {
    fn handle(&self, envelope: &EventEnvelope<E>, dispatcher: &Dispatcher<E>) -> Result<(), HandlerError>;

    /// Name used in logs and fault reports.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }
}

/// Shared, type-erased handler as stored in the dispatcher registry.
pub type SharedHandler<E> = Arc<dyn EventHandler<E>>;

/// A handler fault.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The domain layer refused the operation (validation, invariant, ...).
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A nested dispatcher call failed.
    #[error("dispatch failed: {0}")]
    Dispatch(Box<DispatchError>),

    /// Anything else the handler wants to report.
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<DispatchError> for HandlerError {
    fn from(value: DispatchError) -> Self {
        Self::Dispatch(Box::new(value))
    }
}
