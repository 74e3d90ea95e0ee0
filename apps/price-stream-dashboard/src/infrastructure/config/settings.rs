//! Dashboard Configuration Settings
//!
//! Configuration types for the dashboard, loaded from environment variables.

use std::time::Duration;

use crate::domain::aggregation::MergePolicy;

/// Which data source feeds the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedKind {
    /// In-process random walk.
    #[default]
    Simulated,
    /// Remote JSON endpoint.
    Http,
}

impl FeedKind {
    /// Parse feed kind from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "http" => Self::Http,
            _ => Self::Simulated,
        }
    }

    /// Get the feed name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Simulated => "simulated",
            Self::Http => "http",
        }
    }
}

/// Polling settings.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Tick interval.
    pub interval: Duration,
    /// How duplicate keys are merged.
    pub merge_policy: MergePolicy,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            merge_policy: MergePolicy::PairwiseAverage,
        }
    }
}

/// Simulated feed settings.
#[derive(Debug, Clone)]
pub struct SimulatedFeedSettings {
    /// Stocks to quote.
    pub stocks: Vec<String>,
    /// RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    /// Chance a batch reuses the previous timestamp.
    pub duplicate_probability: f64,
    /// Chance a quote side is left out.
    pub missing_side_probability: f64,
}

impl Default for SimulatedFeedSettings {
    fn default() -> Self {
        Self {
            stocks: vec!["ABC".to_string(), "DEF".to_string()],
            seed: None,
            duplicate_probability: 0.3,
            missing_side_probability: 0.05,
        }
    }
}

/// Feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Selected feed.
    pub kind: FeedKind,
    /// Endpoint for the HTTP feed.
    pub url: Option<String>,
    /// Request timeout for the HTTP feed.
    pub timeout: Duration,
    /// Simulated feed parameters.
    pub simulated: SimulatedFeedSettings,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            kind: FeedKind::default(),
            url: None,
            timeout: DEFAULT_FEED_TIMEOUT,
            simulated: SimulatedFeedSettings::default(),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Dashboard HTTP port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Complete dashboard configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Polling settings.
    pub poll: PollSettings,
    /// Feed settings.
    pub feed: FeedSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Start streaming without waiting for the control endpoint.
    pub auto_start: bool,
}

const DEFAULT_FEED_TIMEOUT: Duration = Duration::from_millis(2000);

impl DashboardConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is
    /// out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is
    /// out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let poll = PollSettings {
            interval: env.duration_millis(
                "DASHBOARD_POLL_INTERVAL_MS",
                PollSettings::default().interval,
            ),
            merge_policy: env.merge_policy("DASHBOARD_MERGE_POLICY")?,
        };

        if poll.interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "DASHBOARD_POLL_INTERVAL_MS".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        let kind = env
            .get("DASHBOARD_FEED")
            .map(|s| FeedKind::from_str_case_insensitive(&s))
            .unwrap_or_default();

        let url = env.get("DASHBOARD_FEED_URL").filter(|u| !u.is_empty());
        if kind == FeedKind::Http && url.is_none() {
            return Err(ConfigError::MissingEnvVar("DASHBOARD_FEED_URL".to_string()));
        }

        let defaults = SimulatedFeedSettings::default();
        let simulated = SimulatedFeedSettings {
            stocks: env
                .get("DASHBOARD_SIM_STOCKS")
                .map(|s| parse_list(&s))
                .filter(|l| !l.is_empty())
                .unwrap_or(defaults.stocks),
            seed: env.parse("DASHBOARD_SIM_SEED"),
            duplicate_probability: env.probability(
                "DASHBOARD_SIM_DUPLICATE_PROBABILITY",
                defaults.duplicate_probability,
            )?,
            missing_side_probability: env.probability(
                "DASHBOARD_SIM_MISSING_SIDE_PROBABILITY",
                defaults.missing_side_probability,
            )?,
        };

        let feed = FeedSettings {
            kind,
            url,
            timeout: env.duration_millis("DASHBOARD_FEED_TIMEOUT_MS", DEFAULT_FEED_TIMEOUT),
            simulated,
        };

        let server = ServerSettings {
            http_port: env
                .parse("DASHBOARD_HTTP_PORT")
                .unwrap_or(ServerSettings::default().http_port),
        };

        let auto_start = env
            .get("DASHBOARD_AUTO_START")
            .is_some_and(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"));

        Ok(Self {
            poll,
            feed,
            server,
            auto_start,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable holds an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(|v| v.trim().parse().ok())
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.parse::<u64>(key).map_or(default, Duration::from_millis)
    }

    fn merge_policy(&self, key: &str) -> Result<MergePolicy, ConfigError> {
        let Some(raw) = self.get(key).filter(|v| !v.trim().is_empty()) else {
            return Ok(MergePolicy::default());
        };
        MergePolicy::from_str_case_insensitive(&raw).ok_or_else(|| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: format!("unknown merge policy '{raw}', expected pairwise or running_mean"),
        })
    }

    fn probability(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        let Some(p) = self.parse::<f64>(key) else {
            return Ok(default);
        };
        if (0.0..=1.0).contains(&p) {
            Ok(p)
        } else {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("{p} is not within 0..=1"),
            })
        }
    }
}

fn parse_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect()
}
