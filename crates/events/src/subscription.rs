//! Channel-backed taps on the dispatcher.
//!
//! A [`Subscription`] receives a copy of every envelope of one kind that the
//! dispatcher delivers. It is registered like any other handler, so it sits in
//! the kind's handler list at the position it was tapped and observes the same
//! FIFO order the other handlers do.
//!
//! ```ignore
//! let low_stock = dispatcher.tap(StockEventKind::LowStock);
//! dispatcher.publish(StockEvent::sale(machine_id, 9)?)?;
//! assert_eq!(low_stock.drain().len(), 1);
//! ```
//!
//! Dropping the subscription detaches the forwarder: it unsubscribes itself the
//! next time it is invoked.

use std::sync::mpsc::{self, Receiver, Sender};

use crate::{Dispatcher, Event, EventEnvelope, EventHandler, HandlerError};

/// Receiving side of a dispatcher tap.
///
/// Delivery happens synchronously inside `publish`, so after the outermost
/// `publish` returns everything delivered so far is already buffered here and
/// [`Subscription::drain`] never needs to block.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub(crate) fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Collect every message currently buffered, without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Handler that forwards delivered envelopes into a channel.
pub(crate) struct ChannelForwarder<E: Event> {
    kind: E::Kind,
    sender: Sender<EventEnvelope<E>>,
}

impl<E: Event> ChannelForwarder<E> {
    pub(crate) fn channel(kind: E::Kind) -> (Self, Subscription<EventEnvelope<E>>) {
        let (sender, receiver) = mpsc::channel();
        (Self { kind, sender }, Subscription::new(receiver))
    }
}

impl<E: Event> EventHandler<E> for ChannelForwarder<E> {
    fn handle(&self, envelope: &EventEnvelope<E>, dispatcher: &Dispatcher<E>) -> Result<(), HandlerError> {
        if self.sender.send(envelope.clone()).is_err() {
            // Receiver is gone; nobody is listening any more.
            dispatcher.unsubscribe(self.kind, self);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "tap"
    }
}
