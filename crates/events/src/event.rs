use chrono::{DateTime, Utc};

/// A domain-agnostic event.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - **routed by kind**: the dispatcher keys its registry on [`Event::Kind`]
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Closed set of routing keys (usually a fieldless enum mirroring the event variants).
    type Kind: Copy + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static;

    /// Routing key of this event.
    fn kind(&self) -> Self::Kind;

    /// Stable event name/type identifier (e.g. "vending.machine.sale").
    fn event_type(&self) -> &'static str;

    /// When the event occurred (business time).
    fn occurred_at(&self) -> DateTime<Utc>;
}
