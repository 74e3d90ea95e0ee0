//! Domain Layer - Core price stream types and aggregation logic.
//!
//! This layer contains the price update types and the merge policy that
//! folds them into chart rows. Nothing here performs I/O or depends on the
//! runtime.

/// Raw price updates and aggregated points.
pub mod streaming;

/// Keyed aggregate table and merge policies.
pub mod aggregation;
