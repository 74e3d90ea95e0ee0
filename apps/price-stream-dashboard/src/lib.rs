#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Stream Dashboard - Live Bid/Ask Chart Service
//!
//! Polls a price-update feed on a fixed cadence, folds every batch into a
//! table keyed by `(stock, timestamp)` and pushes the whole table to a chart
//! surface after each non-empty tick.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types and merge rules
//!   - `streaming`: Price update records and aggregated points
//!   - `aggregation`: Keyed merge of batches into the aggregate table
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Data source and chart surface interfaces
//!   - `services`: Poller state machine, view controller
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `feed`: Simulated and HTTP data sources
//!   - `chart`: In-memory chart board
//!   - `server`: Dashboard HTTP endpoints
//!   - `config`: Configuration from the environment
//!   - `metrics`, `telemetry`: Observability
//!
//! # Data Flow
//!
//! ```text
//!  DataSource ──► Poller ──(PollerEvent)──► forwarder ──► ChartSurface
//!                   │                                         │
//!             AggregateTable                              ChartBoard ──► GET /chart
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::aggregation::{AggregateTable, MergePolicy, MergeSummary, merge};
pub use domain::streaming::{AggregatedPoint, PointKey, PriceQuote, PriceUpdateRecord, QuoteSide};

// Ports
pub use application::ports::{
    ChartConfig, ChartSchema, ChartSurface, ChartSurfaceFactory, DataSource, DataSourceError,
};

// Services
pub use application::services::{
    Poller, PollerEvent, PollerState, SessionStats, StreamStatus, ViewController,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, DashboardConfig, FeedKind, FeedSettings, PollSettings, ServerSettings,
    SimulatedFeedSettings,
};

// Adapters
pub use infrastructure::chart::{ChartBoard, ChartSnapshot};
pub use infrastructure::feed::{HttpDataSource, SimulatedDataSource, build_data_source};
pub use infrastructure::server::{DashboardServer, DashboardServerError, DashboardServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, init as init_telemetry};
