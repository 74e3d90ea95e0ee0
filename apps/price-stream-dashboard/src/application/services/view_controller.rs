//! View Controller
//!
//! Owns the chart's visibility and wires the poller's output into the chart
//! surface.
//!
//! The chart surface is built lazily on the first `show_and_stream` call,
//! before the poller is armed, so it exists by the time the first tick
//! publishes. Updates that reach the forwarder while no surface is mounted
//! are dropped.
//!
//! [`ViewController::shutdown`] tears the view down: the poller stops, the
//! forwarder is cancelled and the chart surface is released. Dropping the
//! controller runs the same teardown.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::poller::{Poller, PollerEvent, PollerState, SessionStats};
use crate::application::ports::{
    ChartConfig, ChartSchema, ChartSurface, ChartSurfaceFactory, DataSource,
};
use crate::domain::aggregation::MergePolicy;
use crate::infrastructure::metrics;

/// Capacity of the poller → forwarder channel.
const EVENT_CHANNEL_CAPACITY: usize = 64;

type ChartSlot = Arc<Mutex<Option<Box<dyn ChartSurface>>>>;

/// Snapshot of the controller's state.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    /// Session identifier, fixed for the controller's lifetime.
    pub session_id: Uuid,
    /// Whether the chart has been shown.
    pub visible: bool,
    /// Whether a chart surface is mounted.
    pub chart_mounted: bool,
    /// Poller state.
    pub state: PollerState,
    /// Configured tick interval in milliseconds.
    pub interval_ms: u64,
    /// Merge policy name.
    pub merge_policy: &'static str,
    /// Session counters.
    pub stats: SessionStats,
}

struct Forwarder {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Orchestrates visibility, lazy chart construction, and forwarding.
pub struct ViewController {
    session_id: Uuid,
    visible: bool,
    interval: Duration,
    poller: Poller,
    factory: Arc<dyn ChartSurfaceFactory>,
    chart: ChartSlot,
    events_rx: Option<mpsc::Receiver<PollerEvent>>,
    forwarder: Option<Forwarder>,
    shut_down: bool,
}

impl ViewController {
    /// Create a hidden controller. Nothing is polled or charted until
    /// [`show_and_stream`](Self::show_and_stream) is called.
    #[must_use]
    pub fn new(
        source: Arc<dyn DataSource>,
        factory: Arc<dyn ChartSurfaceFactory>,
        interval: Duration,
        policy: MergePolicy,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            session_id: Uuid::new_v4(),
            visible: false,
            interval,
            poller: Poller::new(source, policy, events_tx),
            factory,
            chart: Arc::new(Mutex::new(None)),
            events_rx: Some(events_rx),
            forwarder: None,
            shut_down: false,
        }
    }

    /// Show the chart and (re)start streaming.
    ///
    /// The first call mounts the chart surface. Later calls only re-arm the
    /// poller, which leaves exactly one timer running.
    ///
    /// Must be called from within a tokio runtime. Ignored after
    /// [`shutdown`](Self::shutdown).
    pub fn show_and_stream(&mut self) {
        if self.shut_down {
            tracing::warn!(session_id = %self.session_id, "Ignoring start after shutdown");
            return;
        }

        if !self.visible {
            self.mount_chart();
            self.visible = true;
            tracing::info!(session_id = %self.session_id, "Chart shown");
        }

        self.spawn_forwarder();
        self.poller.start(self.interval);
    }

    /// Whether the chart has been shown.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether a chart surface is mounted.
    #[must_use]
    pub fn is_chart_mounted(&self) -> bool {
        self.chart.lock().is_some()
    }

    /// The poller driving this view.
    #[must_use]
    pub const fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            session_id: self.session_id,
            visible: self.visible,
            chart_mounted: self.is_chart_mounted(),
            state: self.poller.state(),
            interval_ms: u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            merge_policy: self.poller.policy().as_str(),
            stats: self.poller.stats(),
        }
    }

    fn mount_chart(&self) {
        let mut slot = self.chart.lock();
        if slot.is_none() {
            let schema = ChartSchema::price_updates();
            let config = ChartConfig::ask_price_lines();
            *slot = Some(self.factory.create(&schema, &config));
            tracing::debug!(view = %config.view, "Chart surface mounted");
        }
    }

    fn spawn_forwarder(&mut self) {
        let Some(rx) = self.events_rx.take() else {
            return;
        };

        let cancel = CancellationToken::new();
        let task = tokio::spawn(forward_events(rx, Arc::clone(&self.chart), cancel.clone()));
        self.forwarder = Some(Forwarder { cancel, task });
    }

    /// Stop polling, stop forwarding and release the chart surface.
    ///
    /// Idempotent. The controller cannot be shown again afterwards.
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        self.poller.stop();

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.cancel.cancel();
            forwarder.task.abort();
        }

        if self.chart.lock().take().is_some() {
            tracing::info!(
                session_id = %self.session_id,
                stats = ?self.poller.stats(),
                "View torn down"
            );
        }
    }
}

impl Drop for ViewController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Route poller output to the chart surface until cancelled.
async fn forward_events(
    mut rx: mpsc::Receiver<PollerEvent>,
    chart: ChartSlot,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = cancel.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        if let PollerEvent::TableUpdated { tick, rows, .. } = event {
            let mut slot = chart.lock();
            if let Some(surface) = slot.as_mut() {
                surface.update(&rows);
                metrics::record_chart_update();
            } else {
                tracing::debug!(tick, "No chart surface mounted, dropping update");
                metrics::record_chart_update_dropped();
            }
        }
    }
}
