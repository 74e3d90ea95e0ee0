//! Price Update Types
//!
//! Core domain types for the price stream: raw top-of-book updates as they
//! arrive from a feed, and the aggregated points derived from them. These
//! types are transport-agnostic; feed adapters decode into them and chart
//! adapters read from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Quotes
// =============================================================================

/// Side of a top-of-book quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSide {
    /// Offer to sell.
    Ask,
    /// Offer to buy.
    Bid,
}

impl QuoteSide {
    /// Get the side name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Bid => "bid",
        }
    }
}

/// One side of a market quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Which side of the book this quote is on.
    pub side: QuoteSide,
    /// Quoted price.
    pub price: f64,
}

impl PriceQuote {
    /// Create an ask quote.
    #[must_use]
    pub const fn ask(price: f64) -> Self {
        Self {
            side: QuoteSide::Ask,
            price,
        }
    }

    /// Create a bid quote.
    #[must_use]
    pub const fn bid(price: f64) -> Self {
        Self {
            side: QuoteSide::Bid,
            price,
        }
    }
}

// =============================================================================
// Raw Records
// =============================================================================

/// A raw price update as produced by a data source.
///
/// Either side may be absent when there was no quote on that side at the
/// record's timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdateRecord {
    /// Stock ticker.
    pub stock: String,
    /// Time the quote was observed.
    pub timestamp: DateTime<Utc>,
    /// Best ask, if any.
    pub top_ask: Option<PriceQuote>,
    /// Best bid, if any.
    pub top_bid: Option<PriceQuote>,
}

impl PriceUpdateRecord {
    /// Create a record with both sides quoted.
    #[must_use]
    pub fn new(stock: impl Into<String>, timestamp: DateTime<Utc>, ask: f64, bid: f64) -> Self {
        Self {
            stock: stock.into(),
            timestamp,
            top_ask: Some(PriceQuote::ask(ask)),
            top_bid: Some(PriceQuote::bid(bid)),
        }
    }

    /// Create a record with explicitly optional sides.
    #[must_use]
    pub fn with_sides(
        stock: impl Into<String>,
        timestamp: DateTime<Utc>,
        ask: Option<f64>,
        bid: Option<f64>,
    ) -> Self {
        Self {
            stock: stock.into(),
            timestamp,
            top_ask: ask.map(PriceQuote::ask),
            top_bid: bid.map(PriceQuote::bid),
        }
    }

    /// The aggregation key of this record.
    #[must_use]
    pub fn key(&self) -> PointKey {
        PointKey::new(self.stock.clone(), self.timestamp)
    }

    /// Ask price, or 0 when the ask side is absent.
    #[must_use]
    pub fn ask_price_or_zero(&self) -> f64 {
        self.top_ask.map_or(0.0, |q| q.price)
    }

    /// Bid price, or 0 when the bid side is absent.
    #[must_use]
    pub fn bid_price_or_zero(&self) -> f64 {
        self.top_bid.map_or(0.0, |q| q.price)
    }
}

// =============================================================================
// Aggregated Points
// =============================================================================

/// Unique key of an aggregated point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointKey {
    /// Stock ticker.
    pub stock: String,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
}

impl PointKey {
    /// Create a new key.
    #[must_use]
    pub const fn new(stock: String, timestamp: DateTime<Utc>) -> Self {
        Self { stock, timestamp }
    }
}

/// A deduplicated chart row for one `(stock, timestamp)` pair.
///
/// Field names match the chart schema columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoint {
    /// Stock ticker.
    pub stock: String,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
    /// Aggregated best ask.
    pub top_ask_price: f64,
    /// Aggregated best bid.
    pub top_bid_price: f64,
}

impl AggregatedPoint {
    /// Build a fresh point from a record, defaulting absent sides to 0.
    #[must_use]
    pub fn from_record(record: &PriceUpdateRecord) -> Self {
        Self {
            stock: record.stock.clone(),
            timestamp: record.timestamp,
            top_ask_price: record.ask_price_or_zero(),
            top_bid_price: record.bid_price_or_zero(),
        }
    }

    /// The aggregation key of this point.
    #[must_use]
    pub fn key(&self) -> PointKey {
        PointKey::new(self.stock.clone(), self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap()
    }

    #[test]
    fn absent_sides_default_to_zero() {
        let record = PriceUpdateRecord::with_sides("X", t1(), Some(101.5), None);
        assert_eq!(record.ask_price_or_zero(), 101.5);
        assert_eq!(record.bid_price_or_zero(), 0.0);

        let point = AggregatedPoint::from_record(&record);
        assert_eq!(point.top_ask_price, 101.5);
        assert_eq!(point.top_bid_price, 0.0);
    }

    #[test]
    fn record_and_point_share_key() {
        let record = PriceUpdateRecord::new("AAPL", t1(), 100.0, 99.0);
        let point = AggregatedPoint::from_record(&record);
        assert_eq!(record.key(), point.key());
        assert_eq!(point.key(), PointKey::new("AAPL".to_string(), t1()));
    }

    #[test]
    fn quote_constructors_set_side() {
        assert_eq!(PriceQuote::ask(1.0).side, QuoteSide::Ask);
        assert_eq!(PriceQuote::bid(1.0).side, QuoteSide::Bid);
        assert_eq!(QuoteSide::Bid.as_str(), "bid");
    }

    #[test]
    fn point_serializes_with_schema_column_names() {
        let point = AggregatedPoint::from_record(&PriceUpdateRecord::new("ABC", t1(), 2.0, 1.0));
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["stock"], "ABC");
        assert_eq!(json["top_ask_price"], 2.0);
        assert_eq!(json["top_bid_price"], 1.0);
        assert!(json["timestamp"].is_string());
    }
}
