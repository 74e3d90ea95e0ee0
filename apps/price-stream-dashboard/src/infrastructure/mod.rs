//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Price feed adapters (simulated random walk, HTTP JSON).
pub mod feed;

/// In-memory chart board backing the chart surface port.
pub mod chart;

/// Dashboard HTTP server (chart, control, health, metrics).
pub mod server;

/// Configuration loaded from the environment.
pub mod config;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging initialisation.
pub mod telemetry;
