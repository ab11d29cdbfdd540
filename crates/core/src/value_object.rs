//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attributes. Two
/// `Money { minor: 30_000, currency: CLP }` values are the same amount, while two
/// offers with identical fields are still different offers.
///
/// Value objects are immutable: "changing" one means building a new one. An
/// offer's commission is recomputed into a fresh `Money` rather than edited in
/// place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
