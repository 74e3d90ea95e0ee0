//! In-Memory Chart Board
//!
//! A [`ChartSurfaceFactory`] whose surfaces write into a shared table the
//! HTTP server reads from. At most one chart is mounted at a time; dropping
//! the surface unmounts it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::application::ports::{ChartConfig, ChartSchema, ChartSurface, ChartSurfaceFactory};
use crate::domain::streaming::AggregatedPoint;

#[derive(Debug)]
struct ChartTable {
    mount_id: u64,
    schema: ChartSchema,
    config: ChartConfig,
    // (timestamp, stock) so rows come out in time order.
    rows: BTreeMap<(DateTime<Utc>, String), AggregatedPoint>,
    updates: u64,
}

/// Point-in-time copy of the mounted chart.
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    /// Schema the chart was built with.
    pub schema: ChartSchema,
    /// Presentation config the chart was built with.
    pub config: ChartConfig,
    /// Rows sorted by timestamp, then stock.
    pub rows: Vec<AggregatedPoint>,
    /// Number of update calls received.
    pub updates: u64,
}

/// Shared handle to the chart table.
#[derive(Debug, Clone, Default)]
pub struct ChartBoard {
    table: Arc<RwLock<Option<ChartTable>>>,
    next_mount: Arc<AtomicU64>,
}

impl ChartBoard {
    /// Create an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a chart is currently mounted.
    #[must_use]
    pub fn is_mounted(&self) -> bool {
        self.table.read().is_some()
    }

    /// Copy of the mounted chart, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<ChartSnapshot> {
        self.table.read().as_ref().map(|table| ChartSnapshot {
            schema: table.schema.clone(),
            config: table.config.clone(),
            rows: table.rows.values().cloned().collect(),
            updates: table.updates,
        })
    }
}

impl ChartSurfaceFactory for ChartBoard {
    fn create(&self, schema: &ChartSchema, config: &ChartConfig) -> Box<dyn ChartSurface> {
        let mount_id = self.next_mount.fetch_add(1, Ordering::Relaxed);
        let replaced = self
            .table
            .write()
            .replace(ChartTable {
                mount_id,
                schema: schema.clone(),
                config: config.clone(),
                rows: BTreeMap::new(),
                updates: 0,
            })
            .is_some();

        if replaced {
            tracing::warn!(mount_id, "Replaced a chart that was still mounted");
        }
        tracing::debug!(mount_id, view = %config.view, "Chart mounted");

        Box::new(MountedChart {
            mount_id,
            table: Arc::clone(&self.table),
        })
    }
}

/// Surface writing into a [`ChartBoard`].
#[derive(Debug)]
pub struct MountedChart {
    mount_id: u64,
    table: Arc<RwLock<Option<ChartTable>>>,
}

impl ChartSurface for MountedChart {
    fn update(&mut self, rows: &[AggregatedPoint]) {
        let mut guard = self.table.write();
        let Some(table) = guard.as_mut().filter(|t| t.mount_id == self.mount_id) else {
            return;
        };

        for row in rows {
            table
                .rows
                .insert((row.timestamp, row.stock.clone()), row.clone());
        }
        table.updates += 1;
    }
}

impl Drop for MountedChart {
    fn drop(&mut self) {
        let mut guard = self.table.write();
        if guard.as_ref().is_some_and(|t| t.mount_id == self.mount_id) {
            *guard = None;
            tracing::debug!(mount_id = self.mount_id, "Chart unmounted");
        }
    }
}
