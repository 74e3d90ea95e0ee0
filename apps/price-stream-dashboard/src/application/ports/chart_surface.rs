//! Chart Surface Port (Driven Port)
//!
//! A chart surface is bound to a fixed schema and presentation config when
//! it is created and afterwards only receives upserts keyed by
//! `(stock, timestamp)`. The presentation config is opaque to the pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::streaming::AggregatedPoint;

// =============================================================================
// Schema
// =============================================================================

/// Column type understood by a chart surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// UTF-8 string.
    String,
    /// 64-bit float.
    Float,
    /// Timestamp.
    Date,
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaColumn {
    /// Column name.
    pub name: String,
    /// Column type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl SchemaColumn {
    fn new(name: &str, column_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            column_type,
        }
    }
}

/// Ordered column list a chart surface is constructed with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartSchema {
    /// Columns in display order.
    pub columns: Vec<SchemaColumn>,
}

impl ChartSchema {
    /// Schema of the bid/ask price chart.
    #[must_use]
    pub fn price_updates() -> Self {
        Self {
            columns: vec![
                SchemaColumn::new("stock", ColumnType::String),
                SchemaColumn::new("top_ask_price", ColumnType::Float),
                SchemaColumn::new("top_bid_price", ColumnType::Float),
                SchemaColumn::new("timestamp", ColumnType::Date),
            ],
        }
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// =============================================================================
// Presentation Config
// =============================================================================

/// Per-column aggregate applied by the chart when pivoting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFn {
    /// Count of distinct values.
    #[serde(rename = "distinct count")]
    DistinctCount,
    /// Arithmetic mean.
    #[serde(rename = "avg")]
    Avg,
}

/// Presentation hints passed to the chart surface once, at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartConfig {
    /// Chart type.
    pub view: String,
    /// Columns split into separate series.
    pub column_pivots: Vec<String>,
    /// Columns used as the x axis.
    pub row_pivots: Vec<String>,
    /// Columns plotted.
    pub columns: Vec<String>,
    /// Aggregate per column.
    pub aggregates: BTreeMap<String, AggregateFn>,
}

impl ChartConfig {
    /// One ask-price line per stock over time.
    #[must_use]
    pub fn ask_price_lines() -> Self {
        let aggregates = BTreeMap::from([
            ("stock".to_string(), AggregateFn::DistinctCount),
            ("top_ask_price".to_string(), AggregateFn::Avg),
            ("top_bid_price".to_string(), AggregateFn::Avg),
            ("timestamp".to_string(), AggregateFn::DistinctCount),
        ]);

        Self {
            view: "y_line".to_string(),
            column_pivots: vec!["stock".to_string()],
            row_pivots: vec!["timestamp".to_string()],
            columns: vec!["top_ask_price".to_string()],
            aggregates,
        }
    }
}

// =============================================================================
// Ports
// =============================================================================

/// Sink for aggregated rows.
pub trait ChartSurface: Send {
    /// Upsert rows by `(stock, timestamp)`.
    fn update(&mut self, rows: &[AggregatedPoint]);
}

/// Constructs chart surfaces.
pub trait ChartSurfaceFactory: Send + Sync {
    /// Build a surface bound to `schema` and `config`.
    fn create(&self, schema: &ChartSchema, config: &ChartConfig) -> Box<dyn ChartSurface>;
}
