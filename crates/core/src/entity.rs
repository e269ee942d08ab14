//! Entity trait: objects whose identity outlives their state.

/// Something tracked by identity rather than by value.
///
/// A machine whose stock changes from 10 to 1 is still the same machine.
/// Stores key entities by [`Entity::id`] and list them in id order.
pub trait Entity {
    type Id: Clone + Eq + Ord + core::hash::Hash + core::fmt::Display + core::fmt::Debug;

    fn id(&self) -> &Self::Id;

    /// True when both refer to the same entity, whatever their current state.
    fn same_identity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
