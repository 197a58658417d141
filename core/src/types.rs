//! Shared primitive types used across the engine.

/// A stable, unique identifier for any entity (transaction, identity,
/// queue item). UUIDs for internally minted ids, provider ids elsewhere.
pub type EntityId = String;

/// A signed monetary amount in minor currency units (pence, cents).
pub type MinorUnits = i64;
