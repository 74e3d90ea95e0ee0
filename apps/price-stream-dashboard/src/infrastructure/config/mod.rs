//! Configuration Module
//!
//! Configuration loading for the dashboard service.

mod settings;

pub use settings::{
    ConfigError, DashboardConfig, FeedKind, FeedSettings, PollSettings, ServerSettings,
    SimulatedFeedSettings,
};
