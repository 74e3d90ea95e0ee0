//! Simulated Price Feed
//!
//! In-process random walk standing in for a market data server. Each pull
//! yields one record per configured stock, stamped with a simulated clock
//! that advances between batches. Some batches reuse the previous timestamp
//! and some records leave a quote side out, so the aggregator's duplicate
//! and missing-side paths see regular traffic.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::application::ports::{DataSource, DataSourceError};
use crate::domain::streaming::PriceUpdateRecord;
use crate::infrastructure::config::SimulatedFeedSettings;

/// Starting mid price for every stock.
const START_PRICE: f64 = 100.0;

/// Largest single-step move of the mid price.
const MAX_STEP: f64 = 1.5;

/// Largest half-spread around the mid price.
const MAX_HALF_SPREAD: f64 = 0.25;

/// Simulated time between batches.
const CLOCK_STEP_MILLIS: i64 = 1_000;

#[derive(Debug)]
struct WalkState {
    rng: StdRng,
    clock: DateTime<Utc>,
    mids: Vec<f64>,
    batches: u64,
}

/// Random-walk data source.
#[derive(Debug)]
pub struct SimulatedDataSource {
    stocks: Vec<String>,
    duplicate_probability: f64,
    missing_side_probability: f64,
    state: Mutex<WalkState>,
}

impl SimulatedDataSource {
    /// Create a feed whose clock starts at `start`.
    #[must_use]
    pub fn new(settings: &SimulatedFeedSettings, start: DateTime<Utc>) -> Self {
        let rng = settings
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);

        Self {
            stocks: settings.stocks.clone(),
            duplicate_probability: settings.duplicate_probability.clamp(0.0, 1.0),
            missing_side_probability: settings.missing_side_probability.clamp(0.0, 1.0),
            state: Mutex::new(WalkState {
                rng,
                clock: start,
                mids: vec![START_PRICE; settings.stocks.len()],
                batches: 0,
            }),
        }
    }

    /// Produce the next batch synchronously.
    #[must_use]
    pub fn next_batch(&self) -> Vec<PriceUpdateRecord> {
        let mut state = self.state.lock();
        let WalkState {
            rng,
            clock,
            mids,
            batches,
        } = &mut *state;

        let repeat = *batches > 0 && rng.random_bool(self.duplicate_probability);
        if !repeat && *batches > 0 {
            *clock += Duration::milliseconds(CLOCK_STEP_MILLIS);
        }
        *batches += 1;

        self.stocks
            .iter()
            .zip(mids.iter_mut())
            .map(|(stock, mid)| {
                *mid = (*mid + rng.random_range(-MAX_STEP..=MAX_STEP)).max(1.0);
                let half_spread = rng.random_range(0.0..=MAX_HALF_SPREAD);
                let ask = round_cents(*mid + half_spread);
                let bid = round_cents(*mid - half_spread);

                let ask = (!rng.random_bool(self.missing_side_probability)).then_some(ask);
                let bid = (!rng.random_bool(self.missing_side_probability)).then_some(bid);

                PriceUpdateRecord::with_sides(stock.clone(), *clock, ask, bid)
            })
            .collect()
    }
}

#[async_trait]
impl DataSource for SimulatedDataSource {
    async fn request_batch(&self) -> Result<Vec<PriceUpdateRecord>, DataSourceError> {
        Ok(self.next_batch())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

fn round_cents(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}
