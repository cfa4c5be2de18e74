//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: two amounts of
/// `10.00` are interchangeable, whereas two stock items with the same name are
/// not. To "modify" a value object, create a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
