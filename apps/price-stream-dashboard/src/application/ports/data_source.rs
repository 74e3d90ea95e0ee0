//! Data Source Port (Driven Port)
//!
//! Pull interface for raw price updates.

use async_trait::async_trait;

use crate::domain::streaming::PriceUpdateRecord;

/// Data source error.
///
/// The poller treats every variant as "no data this tick".
#[derive(Debug, Clone, thiserror::Error)]
pub enum DataSourceError {
    /// Request could not be sent or the connection failed.
    #[error("data source transport error: {message}")]
    Transport {
        /// Error details.
        message: String,
    },

    /// Source answered with a non-success status.
    #[error("data source returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Payload could not be decoded into price updates.
    #[error("data source payload could not be decoded: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

impl DataSourceError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Status { .. } => "status",
            Self::Decode { .. } => "decode",
        }
    }
}

/// Port for pulling batches of price updates.
///
/// Each call yields zero or more records. There is no end-of-stream signal;
/// an empty batch means nothing new arrived since the previous pull.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Request the next batch of records.
    async fn request_batch(&self) -> Result<Vec<PriceUpdateRecord>, DataSourceError>;

    /// Get the name of this data source.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages() {
        let err = DataSourceError::Status { status: 503 };
        assert_eq!(err.to_string(), "data source returned status 503");

        let err = DataSourceError::Decode {
            message: "expected array".to_string(),
        };
        assert!(err.to_string().contains("expected array"));
    }

    #[tokio::test]
    async fn mock_source_yields_configured_batch() {
        let mut source = MockDataSource::new();
        source.expect_request_batch().returning(|| Ok(vec![]));
        source.expect_name().return_const("mock");

        let batch = source.request_batch().await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(source.name(), "mock");
    }
}
