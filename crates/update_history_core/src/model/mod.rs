//! Typed update-history domain model.
//!
//! # Responsibility
//! - Define the immutable record shapes produced by marshaling.
//!
//! # Invariants
//! - Records are read-only once built; only their owned handle is released
//!   later.

pub mod record;
