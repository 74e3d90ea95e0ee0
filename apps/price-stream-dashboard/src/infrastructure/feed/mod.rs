//! Price Feed Adapters
//!
//! Implementations of the [`DataSource`] port.

mod http;
mod simulated;

use std::sync::Arc;

use chrono::Utc;

pub use http::{HttpDataSource, decode_batch};
pub use simulated::SimulatedDataSource;

use crate::application::ports::{DataSource, DataSourceError};
use crate::infrastructure::config::{FeedKind, FeedSettings};

/// Build the data source selected by configuration.
///
/// # Errors
///
/// Returns an error if the HTTP feed is selected without a URL or its
/// client cannot be built.
pub fn build_data_source(settings: &FeedSettings) -> Result<Arc<dyn DataSource>, DataSourceError> {
    match settings.kind {
        FeedKind::Simulated => Ok(Arc::new(SimulatedDataSource::new(
            &settings.simulated,
            Utc::now(),
        ))),
        FeedKind::Http => {
            let url = settings
                .url
                .as_deref()
                .ok_or_else(|| DataSourceError::Transport {
                    message: "no feed URL configured".to_string(),
                })?;
            Ok(Arc::new(HttpDataSource::new(url, settings.timeout)?))
        }
    }
}
