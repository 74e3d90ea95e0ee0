//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `DataSource`: pull interface yielding batches of price updates
//! - `ChartSurface`: upsert sink for aggregated rows
//! - `ChartSurfaceFactory`: constructs a chart surface from schema and config

mod chart_surface;
mod data_source;

pub use chart_surface::{
    AggregateFn, ChartConfig, ChartSchema, ChartSurface, ChartSurfaceFactory, ColumnType,
    SchemaColumn,
};
#[cfg(test)]
pub use data_source::MockDataSource;
pub use data_source::{DataSource, DataSourceError};
