//! Entity trait: domain objects with identity.
//!
//! Two entities with the same identifier are the same record, even when their other
//! fields differ (e.g. a `Track` before and after its owner pointer is reconciled).
//! Stores key their records by `Entity::id`.

/// Entity with a strongly-typed identifier.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
