//! Synchronous publish/subscribe dispatcher.
//!
//! The dispatcher owns a subscriber registry (event kind → ordered handler
//! list) and a FIFO queue of pending envelopes. Delivery happens on the
//! caller's stack: the first `publish` on an idle dispatcher becomes the
//! **drain loop** and only returns once the queue is empty.
//!
//! ## Ordering
//!
//! Handlers frequently publish derived events (a sale that drops stock below
//! the threshold publishes a low-stock warning). Those nested `publish` calls
//! only append to the queue; the running drain loop picks them up after
//! everything that was already pending. Delivery order is therefore strict
//! FIFO over publish order, and stack depth does not grow with the length of a
//! derived-event chain.
//!
//! ```text
//! publish(sale) ─▶ queue: [sale]            drain: sale ─▶ SaleHandler
//!                                                           └─ publish(low_stock) ─▶ queue: [low_stock]
//!                                           drain: low_stock ─▶ LowStockHandler
//!                                           queue empty ─▶ Idle, publish(sale) returns
//! ```
//!
//! ## Snapshots
//!
//! Before delivering an envelope the drain loop copies the handler list for its
//! kind (cloning `Arc`s, not handlers). Handlers may subscribe or unsubscribe
//! (themselves included) while being invoked; the change applies from the next
//! envelope, and the current one reaches exactly the handlers registered when
//! its delivery began.
//!
//! ## Locking
//!
//! No lock is held while a handler runs, so reentrant calls never deadlock.
//! Popping the head and going idle happen under one lock acquisition.
//!
//! ## Threads
//!
//! The drain loop belongs to the thread that started it. A `publish` from that
//! thread (a handler emitting a derived event) only enqueues. A `publish` from
//! any other thread blocks until the dispatcher is idle and then runs its own
//! drain loop, so every top-level `publish` returns only after its event and
//! everything derived from it have been delivered, and an aborted drain never
//! discards another caller's event. A handler must not wait on another thread
//! that publishes to the same dispatcher; that thread would wait for the
//! handler's drain to finish.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::subscription::ChannelForwarder;
use crate::{Event, EventEnvelope, EventHandler, HandlerError, SharedHandler, Subscription};

/// What the drain loop does when a handler returns an error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Log the fault and keep delivering (to the remaining handlers and the rest of the queue).
    #[default]
    Isolate,
    /// Stop the drain loop, discard whatever is still queued and report the
    /// fault to the outermost `publish` caller.
    Abort,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DispatcherConfig {
    pub fault_policy: FaultPolicy,
}

/// Counters since the dispatcher was created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DispatchStats {
    /// Envelopes enqueued.
    pub published: u64,
    /// Successful handler invocations.
    pub delivered: u64,
    /// Handler invocations that returned an error.
    pub handler_faults: u64,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// A handler failed under [`FaultPolicy::Abort`].
    #[error(
        "handler '{handler}' failed on {event_type} #{sequence_number} ({discarded} queued events discarded): {source}"
    )]
    HandlerFailed {
        handler: String,
        event_type: &'static str,
        sequence_number: u64,
        discarded: usize,
        #[source]
        source: HandlerError,
    },
}

struct DrainState<E> {
    queue: VecDeque<EventEnvelope<E>>,
    /// Thread running the drain loop, if any.
    drainer: Option<ThreadId>,
    next_sequence: u64,
    stats: DispatchStats,
}

/// In-process publish/subscribe dispatcher.
///
/// Each instance is independent: no global queue, no global registry. Create
/// one per simulation (or per test) and drop it when done.
pub struct Dispatcher<E: Event> {
    registry: RwLock<HashMap<E::Kind, Vec<SharedHandler<E>>>>,
    state: Mutex<DrainState<E>>,
    /// Signalled whenever the drain loop ends.
    idle: Condvar,
    config: DispatcherConfig,
}

impl<E: Event> Dispatcher<E> {
    pub fn new() -> Self {
        Self::with_config(DispatcherConfig::default())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
            state: Mutex::new(DrainState {
                queue: VecDeque::new(),
                drainer: None,
                next_sequence: 0,
                stats: DispatchStats::default(),
            }),
            idle: Condvar::new(),
            config,
        }
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// Append `handler` to the delivery list for `kind`.
    ///
    /// Subscribing the same handler twice means it is invoked twice per event.
    pub fn subscribe(&self, kind: E::Kind, handler: SharedHandler<E>) {
        tracing::debug!(kind = ?kind, handler = handler.name(), "handler subscribed");
        self.write_registry().entry(kind).or_default().push(handler);
    }

    /// Remove every occurrence of `handler` from the delivery list for `kind`.
    ///
    /// Handlers are compared by address, so pass the same instance that was
    /// subscribed (inside `handle`, pass `self`). Returns how many entries were
    /// removed; unknown kinds and handlers are a no-op.
    pub fn unsubscribe(&self, kind: E::Kind, handler: &dyn EventHandler<E>) -> usize {
        let target = core::ptr::from_ref(handler).cast::<()>();

        let mut registry = self.write_registry();
        let Some(handlers) = registry.get_mut(&kind) else {
            return 0;
        };

        let before = handlers.len();
        handlers.retain(|h| Arc::as_ptr(h).cast::<()>() != target);
        let removed = before - handlers.len();

        if handlers.is_empty() {
            registry.remove(&kind);
        }
        if removed > 0 {
            tracing::debug!(kind = ?kind, handler = handler.name(), removed, "handler unsubscribed");
        }
        removed
    }

    /// Number of registrations (duplicates included) for `kind`.
    pub fn subscriber_count(&self, kind: E::Kind) -> usize {
        self.read_registry().get(&kind).map_or(0, Vec::len)
    }

    /// Receive a copy of every envelope of `kind` delivered from now on.
    pub fn tap(&self, kind: E::Kind) -> Subscription<EventEnvelope<E>> {
        let (forwarder, subscription) = ChannelForwarder::channel(kind);
        self.subscribe(kind, Arc::new(forwarder));
        subscription
    }

    /// Queue `event` for delivery.
    ///
    /// On an idle dispatcher this runs the drain loop and returns once the
    /// queue (including everything handlers publish along the way) is empty.
    /// Called from inside a handler, it only enqueues and returns `Ok(())`
    /// immediately. Called from another thread while a drain is running, it
    /// waits for that drain to finish and then drains its own event.
    ///
    /// Errors only surface under [`FaultPolicy::Abort`], and only from the call
    /// that owns the drain loop.
    pub fn publish(&self, event: E) -> Result<(), DispatchError> {
        let caller = thread::current().id();
        {
            let mut state = self.lock_state();
            let nested = state.drainer == Some(caller);
            if !nested {
                while state.drainer.is_some() {
                    state = self.idle.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
            }

            state.next_sequence += 1;
            let sequence_number = state.next_sequence;
            let envelope = EventEnvelope::new(Uuid::now_v7(), sequence_number, event);

            tracing::trace!(
                event_id = %envelope.event_id(),
                event_type = envelope.payload().event_type(),
                sequence_number,
                nested,
                "event queued"
            );

            state.queue.push_back(envelope);
            state.stats.published += 1;

            if nested {
                return Ok(());
            }
            state.drainer = Some(caller);
        }

        self.drain()
    }

    /// Envelopes waiting for delivery.
    pub fn pending(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Whether a drain loop is currently running (on any thread).
    pub fn is_draining(&self) -> bool {
        self.lock_state().drainer.is_some()
    }

    pub fn stats(&self) -> DispatchStats {
        self.lock_state().stats
    }

    fn drain(&self) -> Result<(), DispatchError> {
        let mut guard = DrainGuard {
            dispatcher: self,
            armed: true,
        };

        while let Some(envelope) = self.next_pending() {
            let kind = envelope.payload().kind();
            let handlers = self.snapshot(kind);

            tracing::trace!(
                event_id = %envelope.event_id(),
                event_type = envelope.payload().event_type(),
                sequence_number = envelope.sequence_number(),
                occurred_at = %envelope.payload().occurred_at(),
                handlers = handlers.len(),
                "delivering"
            );

            for handler in &handlers {
                match handler.handle(&envelope, self) {
                    Ok(()) => self.lock_state().stats.delivered += 1,
                    Err(source) => {
                        self.lock_state().stats.handler_faults += 1;

                        match self.config.fault_policy {
                            FaultPolicy::Isolate => {
                                tracing::warn!(
                                    handler = handler.name(),
                                    event_id = %envelope.event_id(),
                                    event_type = envelope.payload().event_type(),
                                    sequence_number = envelope.sequence_number(),
                                    error = %source,
                                    "handler failed; continuing"
                                );
                            }
                            FaultPolicy::Abort => {
                                let discarded = self.abort_drain();
                                guard.armed = false;

                                tracing::error!(
                                    handler = handler.name(),
                                    event_id = %envelope.event_id(),
                                    event_type = envelope.payload().event_type(),
                                    sequence_number = envelope.sequence_number(),
                                    discarded,
                                    error = %source,
                                    "handler failed; drain aborted"
                                );

                                return Err(DispatchError::HandlerFailed {
                                    handler: handler.name().to_string(),
                                    event_type: envelope.payload().event_type(),
                                    sequence_number: envelope.sequence_number(),
                                    discarded,
                                    source,
                                });
                            }
                        }
                    }
                }
            }
        }

        // `next_pending` went idle under the lock.
        guard.armed = false;
        Ok(())
    }

    /// Pop the head of the queue, or leave the draining state if it is empty.
    fn next_pending(&self) -> Option<EventEnvelope<E>> {
        let mut state = self.lock_state();
        let next = state.queue.pop_front();
        if next.is_none() {
            self.go_idle(&mut state);
        }
        next
    }

    fn abort_drain(&self) -> usize {
        let mut state = self.lock_state();
        let discarded = state.queue.len();
        state.queue.clear();
        self.go_idle(&mut state);
        discarded
    }

    fn go_idle(&self, state: &mut DrainState<E>) {
        state.drainer = None;
        self.idle.notify_all();
    }

    fn snapshot(&self, kind: E::Kind) -> Vec<SharedHandler<E>> {
        self.read_registry().get(&kind).cloned().unwrap_or_default()
    }

    // Locks are never held across handler code, so a poisoned lock still
    // guards consistent data.
    fn lock_state(&self) -> MutexGuard<'_, DrainState<E>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, HashMap<E::Kind, Vec<SharedHandler<E>>>> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, HashMap<E::Kind, Vec<SharedHandler<E>>>> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Event> Default for Dispatcher<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> core::fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("kinds", &self.read_registry().len())
            .field("pending", &state.queue.len())
            .field("drainer", &state.drainer)
            .field("stats", &state.stats)
            .finish()
    }
}

/// Leaves the draining state if a handler panics mid-drain.
///
/// Envelopes still queued stay queued and go out with the next `publish`.
struct DrainGuard<'a, E: Event> {
    dispatcher: &'a Dispatcher<E>,
    armed: bool,
}

impl<E: Event> Drop for DrainGuard<'_, E> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.dispatcher.lock_state();
            self.dispatcher.go_idle(&mut state);
        }
    }
}
