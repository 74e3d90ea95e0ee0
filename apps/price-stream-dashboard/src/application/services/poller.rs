//! Poller
//!
//! Pulls batches from a [`DataSource`] on a fixed cadence and folds them
//! into the session's aggregate table.
//!
//! # Lifecycle
//!
//! ```text
//!          start(interval)
//!   Idle ───────────────────► Polling ──┐
//!    ▲                          │  ▲    │ start(interval): cancel timer, re-arm
//!    └──────── stop() ──────────┘  └────┘
//! ```
//!
//! At most one timer loop is alive at any time. Ticks are serialized: while
//! a pull is outstanding the timer is held, and ticks that elapse meanwhile
//! are skipped rather than queued, so batches always merge in pull order.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{DataSource, DataSourceError};
use crate::domain::aggregation::{AggregateTable, MergePolicy, MergeSummary};
use crate::domain::streaming::{AggregatedPoint, PriceUpdateRecord};
use crate::infrastructure::metrics;

/// Shortest accepted tick interval.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

// =============================================================================
// Public Types
// =============================================================================

/// Poller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollerState {
    /// No timer armed.
    Idle,
    /// Timer armed and ticking.
    Polling,
}

/// Events published by the poller after each tick.
#[derive(Debug, Clone)]
pub enum PollerEvent {
    /// A non-empty batch was merged. `rows` is the full table to date.
    TableUpdated {
        /// Tick sequence number, starting at 1.
        tick: u64,
        /// How the batch merged.
        summary: MergeSummary,
        /// Accumulated aggregate table.
        rows: Arc<[AggregatedPoint]>,
    },
    /// The batch held no records; nothing changed.
    EmptyTick {
        /// Tick sequence number.
        tick: u64,
    },
    /// The pull failed; nothing changed.
    PullFailed {
        /// Tick sequence number.
        tick: u64,
        /// What went wrong.
        error: DataSourceError,
    },
}

/// Counters for the current session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    /// Ticks completed.
    pub ticks: u64,
    /// Ticks whose batch was empty.
    pub empty_ticks: u64,
    /// Ticks whose pull failed.
    pub failed_pulls: u64,
    /// Raw records in the session log.
    pub raw_records: usize,
    /// Points in the aggregate table.
    pub points: usize,
}

// =============================================================================
// Session State
// =============================================================================

/// Everything accumulated since the poller was created.
#[derive(Debug)]
struct Session {
    raw_log: Vec<PriceUpdateRecord>,
    table: AggregateTable,
    stats: SessionStats,
}

impl Session {
    fn new(policy: MergePolicy) -> Self {
        Self {
            raw_log: Vec::new(),
            table: AggregateTable::new(policy),
            stats: SessionStats::default(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.stats.ticks += 1;
        self.stats.ticks
    }

    /// Fold one pull outcome into the session and describe what happened.
    fn apply(&mut self, outcome: Result<Vec<PriceUpdateRecord>, DataSourceError>) -> PollerEvent {
        let tick = self.next_tick();

        match outcome {
            Ok(batch) if batch.is_empty() => {
                self.stats.empty_ticks += 1;
                PollerEvent::EmptyTick { tick }
            }
            Ok(batch) => {
                let summary = self.table.merge_batch(&batch);
                self.raw_log.extend(batch);
                self.stats.raw_records = self.raw_log.len();
                self.stats.points = self.table.len();

                PollerEvent::TableUpdated {
                    tick,
                    summary,
                    rows: self.table.points().into(),
                }
            }
            Err(error) => {
                self.stats.failed_pulls += 1;
                PollerEvent::PullFailed { tick, error }
            }
        }
    }
}

/// Keeps the live timer count accurate however the loop exits.
struct TimerGuard {
    active: Arc<AtomicUsize>,
}

impl TimerGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        let count = active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_timers(count);
        Self { active }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        let count = self.active.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_active_timers(count);
    }
}

struct Timer {
    interval: Duration,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

// =============================================================================
// Poller
// =============================================================================

/// Drives the aggregator on a fixed cadence.
///
/// Owns the session's raw-record log and aggregate table. After every tick a
/// [`PollerEvent`] is sent on the channel supplied at construction.
///
/// Dropping the poller stops it.
pub struct Poller {
    source: Arc<dyn DataSource>,
    session: Arc<Mutex<Session>>,
    events: mpsc::Sender<PollerEvent>,
    active_timers: Arc<AtomicUsize>,
    timer: Option<Timer>,
}

impl Poller {
    /// Create an idle poller.
    #[must_use]
    pub fn new(
        source: Arc<dyn DataSource>,
        policy: MergePolicy,
        events: mpsc::Sender<PollerEvent>,
    ) -> Self {
        Self {
            source,
            session: Arc::new(Mutex::new(Session::new(policy))),
            events,
            active_timers: Arc::new(AtomicUsize::new(0)),
            timer: None,
        }
    }

    /// Arm the timer, cancelling any timer already armed.
    ///
    /// Must be called from within a tokio runtime. The first tick fires one
    /// `interval` after the call.
    pub fn start(&mut self, interval: Duration) {
        self.stop();

        let interval = interval.max(MIN_INTERVAL);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_timer(
            Arc::clone(&self.source),
            Arc::clone(&self.session),
            self.events.clone(),
            Arc::clone(&self.active_timers),
            interval,
            cancel.clone(),
        ));

        tracing::info!(
            source = self.source.name(),
            interval_ms = interval.as_millis(),
            "Poller started"
        );

        self.timer = Some(Timer {
            interval,
            cancel,
            task,
        });
    }

    /// Cancel the timer. Calling this while idle does nothing.
    pub fn stop(&mut self) {
        let Some(timer) = self.timer.take() else {
            return;
        };

        timer.cancel.cancel();
        timer.task.abort();
        tracing::info!(source = self.source.name(), "Poller stopped");
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PollerState {
        if self.timer.is_some() {
            PollerState::Polling
        } else {
            PollerState::Idle
        }
    }

    /// Interval of the armed timer, if any.
    #[must_use]
    pub fn interval(&self) -> Option<Duration> {
        self.timer.as_ref().map(|t| t.interval)
    }

    /// Number of timer loops currently alive.
    ///
    /// A cancelled loop is counted until the runtime has dropped it.
    #[must_use]
    pub fn active_timers(&self) -> usize {
        self.active_timers.load(Ordering::SeqCst)
    }

    /// Copy of the aggregate table.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AggregatedPoint> {
        self.session.lock().table.points()
    }

    /// Copy of the raw-record log.
    #[must_use]
    pub fn raw_records(&self) -> Vec<PriceUpdateRecord> {
        self.session.lock().raw_log.clone()
    }

    /// Session counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.session.lock().stats
    }

    /// Merge policy of the session table.
    #[must_use]
    pub fn policy(&self) -> MergePolicy {
        self.session.lock().table.policy()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Timer loop. Runs until `cancel` fires or the task is aborted.
async fn run_timer(
    source: Arc<dyn DataSource>,
    session: Arc<Mutex<Session>>,
    events: mpsc::Sender<PollerEvent>,
    active_timers: Arc<AtomicUsize>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let _guard = TimerGuard::new(active_timers);
    let source_name = source.name();

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        let outcome = tokio::select! {
            () = cancel.cancelled() => break,
            outcome = source.request_batch() => outcome,
        };
        let elapsed = started.elapsed();
        metrics::record_pull_duration(source_name, elapsed);

        if elapsed > interval {
            tracing::debug!(
                elapsed_ms = elapsed.as_millis(),
                interval_ms = interval.as_millis(),
                "Pull overran tick interval, skipping missed ticks"
            );
        }

        let event = {
            let mut session = session.lock();
            let event = session.apply(outcome);
            metrics::set_aggregate_points(session.stats.points);
            event
        };

        metrics::record_tick(source_name);
        match &event {
            PollerEvent::TableUpdated { tick, summary, rows } => {
                metrics::record_merge(source_name, summary);
                tracing::debug!(
                    tick,
                    records = summary.records,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    points = rows.len(),
                    "Batch merged"
                );
            }
            PollerEvent::EmptyTick { tick } => {
                metrics::record_empty_tick(source_name);
                tracing::trace!(tick, "Empty batch");
            }
            PollerEvent::PullFailed { tick, error } => {
                metrics::record_pull_failure(source_name, error.kind());
                tracing::warn!(tick, source = source_name, error = %error, "Pull failed");
            }
        }

        if events.send(event).await.is_err() {
            tracing::trace!("Poller event receiver dropped");
        }
    }

    tracing::debug!(source = source_name, "Poll timer exited");
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU64;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;
    use crate::application::ports::MockDataSource;

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap()
    }

    /// Replays scripted batches, then yields empty batches forever.
    #[derive(Default)]
    struct ScriptedSource {
        batches: Mutex<VecDeque<Vec<PriceUpdateRecord>>>,
        delay: Duration,
        calls: AtomicU64,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Vec<PriceUpdateRecord>>) -> Self {
            Self {
                batches: Mutex::new(batches.into()),
                ..Self::default()
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        async fn request_batch(&self) -> Result<Vec<PriceUpdateRecord>, DataSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(self.batches.lock().pop_front().unwrap_or_default())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn poller_for(source: Arc<dyn DataSource>) -> (Poller, mpsc::Receiver<PollerEvent>) {
        let (tx, rx) = mpsc::channel(256);
        (Poller::new(source, MergePolicy::PairwiseAverage, tx), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn new_poller_is_idle() {
        let source = Arc::new(ScriptedSource::default());
        let (poller, _rx) = poller_for(source.clone());

        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(poller.active_timers(), 0);
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_fixed_cadence() {
        let source = Arc::new(ScriptedSource::default());
        let (mut poller, _rx) = poller_for(source.clone());

        poller.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1050)).await;

        assert_eq!(poller.state(), PollerState::Polling);
        assert_eq!(source.calls(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_leaves_one_timer() {
        let source = Arc::new(ScriptedSource::default());
        let (mut poller, _rx) = poller_for(source.clone());

        poller.start(Duration::from_millis(100));
        poller.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1050)).await;

        assert_eq!(poller.active_timers(), 1);
        assert_eq!(source.calls(), 10, "a duplicate timer would double the pulls");
    }

    #[tokio::test(start_paused = true)]
    async fn restart_adopts_new_interval() {
        let source = Arc::new(ScriptedSource::default());
        let (mut poller, _rx) = poller_for(source.clone());

        poller.start(Duration::from_millis(100));
        poller.start(Duration::from_millis(250));
        tokio::time::sleep(Duration::from_millis(1050)).await;

        assert_eq!(poller.interval(), Some(Duration::from_millis(250)));
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_twice_is_harmless() {
        let source = Arc::new(ScriptedSource::default());
        let (mut poller, _rx) = poller_for(source.clone());

        poller.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;
        poller.stop();
        poller.stop();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(poller.active_timers(), 0);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_while_idle_is_a_no_op() {
        let (mut poller, _rx) = poller_for(Arc::new(ScriptedSource::default()));
        poller.stop();
        assert_eq!(poller.state(), PollerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn merges_batch_at_a_time_into_session_table() {
        let source = Arc::new(ScriptedSource::new(vec![
            vec![PriceUpdateRecord::new("AAPL", t1(), 100.0, 99.0)],
            vec![PriceUpdateRecord::with_sides("AAPL", t1(), Some(104.0), None)],
        ]));
        let (mut poller, mut rx) = poller_for(source);

        poller.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;

        let table = poller.snapshot();
        assert_eq!(table.len(), 1);
        assert_eq!(table[0].top_ask_price, 102.0);
        assert_eq!(table[0].top_bid_price, 49.5);
        assert_eq!(poller.raw_records().len(), 2);

        match rx.recv().await {
            Some(PollerEvent::TableUpdated { tick, summary, rows }) => {
                assert_eq!(tick, 1);
                assert_eq!(summary.inserted, 1);
                assert_eq!(rows[0].top_ask_price, 100.0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.recv().await {
            Some(PollerEvent::TableUpdated { tick, summary, rows }) => {
                assert_eq!(tick, 2);
                assert_eq!(summary.updated, 1);
                assert_eq!(rows.len(), 1);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_leaves_table_unchanged() {
        let source = Arc::new(ScriptedSource::new(vec![
            vec![PriceUpdateRecord::new("A", t1(), 1.0, 2.0)],
            vec![],
        ]));
        let (mut poller, mut rx) = poller_for(source);

        poller.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(150)).await;
        let after_first = poller.snapshot();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(poller.snapshot(), after_first);
        assert_eq!(poller.stats().empty_ticks, 1);
        assert!(matches!(rx.recv().await, Some(PollerEvent::TableUpdated { .. })));
        assert!(matches!(
            rx.recv().await,
            Some(PollerEvent::EmptyTick { tick: 2 })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pull_is_no_data_this_tick() {
        let mut source = MockDataSource::new();
        let mut calls = 0;
        source.expect_request_batch().returning(move || {
            calls += 1;
            if calls == 1 {
                Err(DataSourceError::Transport {
                    message: "connection refused".to_string(),
                })
            } else {
                Ok(vec![PriceUpdateRecord::new("A", t1(), 1.0, 2.0)])
            }
        });
        source.expect_name().return_const("mock");

        let (mut poller, mut rx) = poller_for(Arc::new(source));
        poller.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(matches!(
            rx.recv().await,
            Some(PollerEvent::PullFailed { tick: 1, .. })
        ));
        assert!(matches!(
            rx.recv().await,
            Some(PollerEvent::TableUpdated { tick: 2, .. })
        ));

        let stats = poller.stats();
        assert_eq!(stats.failed_pulls, 1);
        assert_eq!(stats.points, 1);
        assert_eq!(poller.state(), PollerState::Polling);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_pulls_never_overlap() {
        let source = Arc::new(ScriptedSource::default().with_delay(Duration::from_millis(250)));
        let (mut poller, _rx) = poller_for(source.clone());

        poller.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(1050)).await;

        assert_eq!(source.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(source.calls() < 10, "overrun ticks must be skipped");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_poller_stops_the_timer() {
        let source = Arc::new(ScriptedSource::default());
        let (mut poller, _rx) = poller_for(source.clone());
        let active = Arc::clone(&poller.active_timers);

        poller.start(Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(150)).await;
        drop(poller);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(active.load(Ordering::SeqCst), 0);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_clamped() {
        let (mut poller, _rx) = poller_for(Arc::new(ScriptedSource::default()));
        poller.start(Duration::ZERO);
        assert_eq!(poller.interval(), Some(MIN_INTERVAL));
        poller.stop();
    }

    #[test]
    fn session_apply_counts_outcomes() {
        let mut session = Session::new(MergePolicy::RunningMean);

        session.apply(Ok(vec![]));
        session.apply(Err(DataSourceError::Status { status: 500 }));
        let event = session.apply(Ok(vec![
            PriceUpdateRecord::new("A", t1(), 10.0, 10.0),
            PriceUpdateRecord::new("A", t1(), 20.0, 20.0),
        ]));

        assert!(matches!(event, PollerEvent::TableUpdated { tick: 3, .. }));
        assert_eq!(
            session.stats,
            SessionStats {
                ticks: 3,
                empty_ticks: 1,
                failed_pulls: 1,
                raw_records: 2,
                points: 1,
            }
        );
        assert_eq!(session.table.points()[0].top_ask_price, 15.0);
    }
}
