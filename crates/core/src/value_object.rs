//! Value object trait: equality by value, not identity.
//!
//! Value objects have **no identity**; two value objects with the same values
//! are equal. In this workspace stock transitions (`StockChange`) and the
//! low-stock threshold are value objects, while machines are entities.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
///
/// ```ignore
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct StockChange { old_level: i64, new_level: i64 }
///
/// impl ValueObject for StockChange {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
