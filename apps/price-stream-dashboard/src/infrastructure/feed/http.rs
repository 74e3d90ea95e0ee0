//! HTTP Price Feed
//!
//! Pulls a JSON array of price updates from a remote endpoint:
//!
//! ```json
//! [
//!   {
//!     "stock": "ABC",
//!     "timestamp": "2019-02-01 14:30:03.123",
//!     "top_ask": { "price": 120.48, "size": 109 },
//!     "top_bid": { "price": 118.27, "size": 88 }
//!   }
//! ]
//! ```
//!
//! Either side may be `null` or absent. Timestamps are RFC 3339 or the
//! space-separated `YYYY-MM-DD HH:MM:SS[.fff]` form, read as UTC.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::application::ports::{DataSource, DataSourceError};
use crate::domain::streaming::PriceUpdateRecord;

/// Remote JSON feed adapter.
#[derive(Debug, Clone)]
pub struct HttpDataSource {
    client: reqwest::Client,
    url: String,
}

impl HttpDataSource {
    /// Create a feed that pulls from `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DataSourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataSourceError::Transport {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Endpoint being polled.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    async fn request_batch(&self) -> Result<Vec<PriceUpdateRecord>, DataSourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| DataSourceError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataSourceError::Status {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| DataSourceError::Transport {
                message: e.to_string(),
            })?;

        decode_batch(&body)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Decode a JSON payload into price update records.
///
/// # Errors
///
/// Returns [`DataSourceError::Decode`] if the payload is not an array of
/// well-formed updates.
pub fn decode_batch(body: &[u8]) -> Result<Vec<PriceUpdateRecord>, DataSourceError> {
    let wire: Vec<WireRecord> =
        serde_json::from_slice(body).map_err(|e| DataSourceError::Decode {
            message: e.to_string(),
        })?;

    Ok(wire.into_iter().map(WireRecord::into_record).collect())
}

#[derive(Debug, Deserialize)]
struct WireQuote {
    price: f64,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    stock: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    top_ask: Option<WireQuote>,
    #[serde(default)]
    top_bid: Option<WireQuote>,
}

impl WireRecord {
    fn into_record(self) -> PriceUpdateRecord {
        PriceUpdateRecord::with_sides(
            self.stock,
            self.timestamp,
            self.top_ask.map(|q| q.price),
            self.top_bid.map(|q| q.price),
        )
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp: {raw}")))
}
