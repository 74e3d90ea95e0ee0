//! Aggregate Table
//!
//! Merges batches of raw price updates into a deduplicated table keyed by
//! `(stock, timestamp)`.
//!
//! # Merge Policies
//!
//! - [`MergePolicy::PairwiseAverage`] (default): when a record hits an
//!   existing key, each price becomes `(old + new) / 2`. Later contributions
//!   therefore weigh more than earlier ones; this is the historical
//!   behavior of the dashboard and is kept bit-for-bit.
//! - [`MergePolicy::RunningMean`]: each price is the arithmetic mean of every
//!   contribution seen for the key.
//!
//! Under both policies an absent quote side contributes a price of 0, and
//! records are applied strictly in arrival order, so a duplicate later in a
//! batch merges against the point created earlier in that same batch.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::streaming::{AggregatedPoint, PointKey, PriceUpdateRecord};

// =============================================================================
// Policy
// =============================================================================

/// How a record is folded into an existing point with the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// `new = (old + incoming) / 2`.
    #[default]
    PairwiseAverage,
    /// True mean over all contributions to the key.
    RunningMean,
}

impl MergePolicy {
    /// Parse a policy name. Returns `None` for unknown names.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "pairwise" | "pairwise_average" => Some(Self::PairwiseAverage),
            "running_mean" | "mean" => Some(Self::RunningMean),
            _ => None,
        }
    }

    /// Get the policy name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PairwiseAverage => "pairwise",
            Self::RunningMean => "running_mean",
        }
    }

    /// Fold `incoming` into `current`, where `count` is the number of
    /// contributions already folded into `current`.
    #[allow(clippy::cast_precision_loss)]
    fn fold(self, current: f64, incoming: f64, count: u64) -> f64 {
        match self {
            Self::PairwiseAverage => (current + incoming) / 2.0,
            Self::RunningMean => {
                let n = (count + 1) as f64;
                current + (incoming - current) / n
            }
        }
    }
}

// =============================================================================
// Merge Summary
// =============================================================================

/// Outcome of merging one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Records consumed from the batch.
    pub records: usize,
    /// Points created for previously unseen keys.
    pub inserted: usize,
    /// Existing points updated in place.
    pub updated: usize,
}

impl MergeSummary {
    /// Whether the batch changed the table.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records == 0
    }
}

// =============================================================================
// Aggregate Table
// =============================================================================

#[derive(Debug, Clone)]
struct Slot {
    point: AggregatedPoint,
    contributions: u64,
}

/// Session-lifetime table of aggregated points.
///
/// Rows keep the order in which their keys were first seen. Points are never
/// removed; the table is discarded with the session that owns it.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use price_stream_dashboard::domain::aggregation::{AggregateTable, MergePolicy};
/// use price_stream_dashboard::domain::streaming::PriceUpdateRecord;
///
/// let t = Utc::now();
/// let mut table = AggregateTable::new(MergePolicy::PairwiseAverage);
///
/// table.merge_batch(&[
///     PriceUpdateRecord::with_sides("A", t, Some(10.0), None),
///     PriceUpdateRecord::with_sides("A", t, Some(20.0), None),
/// ]);
///
/// assert_eq!(table.len(), 1);
/// assert_eq!(table.points()[0].top_ask_price, 15.0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct AggregateTable {
    policy: MergePolicy,
    slots: Vec<Slot>,
    index: HashMap<PointKey, usize>,
}

impl AggregateTable {
    /// Create an empty table.
    #[must_use]
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            policy,
            slots: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Seed a table from previously aggregated points.
    ///
    /// Each seeded point counts as a single contribution. Should `points`
    /// repeat a key, the first occurrence wins.
    #[must_use]
    pub fn from_points(policy: MergePolicy, points: &[AggregatedPoint]) -> Self {
        let mut table = Self::new(policy);
        for point in points {
            let key = point.key();
            if table.index.contains_key(&key) {
                continue;
            }
            table.index.insert(key, table.slots.len());
            table.slots.push(Slot {
                point: point.clone(),
                contributions: 1,
            });
        }
        table
    }

    /// The merge policy in use.
    #[must_use]
    pub const fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table has no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Look up a point by key.
    #[must_use]
    pub fn get(&self, key: &PointKey) -> Option<&AggregatedPoint> {
        self.index.get(key).map(|&i| &self.slots[i].point)
    }

    /// Number of records folded into the point for `key`.
    #[must_use]
    pub fn contributions(&self, key: &PointKey) -> Option<u64> {
        self.index.get(key).map(|&i| self.slots[i].contributions)
    }

    /// Copy of all points in first-seen order.
    #[must_use]
    pub fn points(&self) -> Vec<AggregatedPoint> {
        self.slots.iter().map(|s| s.point.clone()).collect()
    }

    /// Consume the table, returning its points in first-seen order.
    #[must_use]
    pub fn into_points(self) -> Vec<AggregatedPoint> {
        self.slots.into_iter().map(|s| s.point).collect()
    }

    /// Merge a batch of records in arrival order.
    pub fn merge_batch(&mut self, records: &[PriceUpdateRecord]) -> MergeSummary {
        let mut summary = MergeSummary {
            records: records.len(),
            ..MergeSummary::default()
        };

        for record in records {
            if self.merge_record(record) {
                summary.inserted += 1;
            } else {
                summary.updated += 1;
            }
        }

        summary
    }

    /// Merge a single record. Returns `true` if a new point was created.
    fn merge_record(&mut self, record: &PriceUpdateRecord) -> bool {
        let key = record.key();

        if let Some(&i) = self.index.get(&key) {
            let policy = self.policy;
            let slot = &mut self.slots[i];
            slot.point.top_ask_price = policy.fold(
                slot.point.top_ask_price,
                record.ask_price_or_zero(),
                slot.contributions,
            );
            slot.point.top_bid_price = policy.fold(
                slot.point.top_bid_price,
                record.bid_price_or_zero(),
                slot.contributions,
            );
            slot.contributions += 1;
            return false;
        }

        self.index.insert(key, self.slots.len());
        self.slots.push(Slot {
            point: AggregatedPoint::from_record(record),
            contributions: 1,
        });
        true
    }
}

/// Merge `new_records` into a copy of `existing` using pairwise averaging.
///
/// Inputs are left untouched; the merged table is returned with existing
/// points first, followed by newly created points in arrival order.
#[must_use]
pub fn merge(
    existing: &[AggregatedPoint],
    new_records: &[PriceUpdateRecord],
) -> Vec<AggregatedPoint> {
    let mut table = AggregateTable::from_points(MergePolicy::PairwiseAverage, existing);
    table.merge_batch(new_records);
    table.into_points()
}
