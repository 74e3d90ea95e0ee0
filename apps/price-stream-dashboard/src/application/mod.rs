//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the polling and view services and the port
//! interfaces they use to reach the data source and the chart surface.

/// Port interfaces for external systems (data source, chart surface).
pub mod ports;

/// Application services for polling and view orchestration.
pub mod services;
