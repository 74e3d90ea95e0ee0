//! Logging Initialisation
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: filter directives (default: `price_stream_dashboard=info`)
//! - `DASHBOARD_LOG_ANSI`: set to "false" to disable coloured output
//!
//! # Usage
//!
//! ```ignore
//! use price_stream_dashboard::infrastructure::telemetry;
//!
//! telemetry::init();
//! tracing::info!(tick = 1, "Tick processed");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive used when `RUST_LOG` is unset or invalid.
const DEFAULT_DIRECTIVE: &str = "price_stream_dashboard=info";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directives in `RUST_LOG` syntax.
    pub filter: String,
    /// Whether to emit ANSI colour codes.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_DIRECTIVE.to_string(),
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let filter = lookup("RUST_LOG")
            .filter(|f| !f.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DIRECTIVE.to_string());

        let ansi =
            lookup("DASHBOARD_LOG_ANSI").is_none_or(|v| !v.trim().eq_ignore_ascii_case("false"));

        Self { filter, ansi }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{}': {e}; using {DEFAULT_DIRECTIVE}", self.filter);
            EnvFilter::new(DEFAULT_DIRECTIVE)
        })
    }
}

/// Initialise logging from the environment.
pub fn init() {
    init_with_config(&TelemetryConfig::from_env());
}

/// Initialise logging with an explicit configuration.
///
/// A second call is a no-op.
pub fn init_with_config(config: &TelemetryConfig) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(config.ansi)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("Tracing subscriber already installed");
    }
}
