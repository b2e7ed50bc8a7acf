//! Fixed-interval collection loop.
//!
//! One task owns the interval and awaits every cycle inline, so cycles never
//! overlap. Fetch, extract and write failures end only the current cycle; a panic
//! or a [`CycleError::Defect`] stops the schedule.

use crate::error::CycleError;
use crate::extract::extract;
use crate::gateway::ModuleSource;
use crate::reading::Reading;
use crate::sink::PointSink;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectorState {
    Idle,
    Running,
    Fetching,
    Extracting,
    Writing,
    Stopped,
}

#[derive(Debug)]
pub struct CollectorStats {
    pub ticks: AtomicU64,
    pub points_written: AtomicU64,
    pub failed_cycles: AtomicU64,
    pub last_write_unix_ms: AtomicI64,
    pub last_error: Mutex<Option<String>>,
}

impl CollectorStats {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            points_written: AtomicU64::new(0),
            failed_cycles: AtomicU64::new(0),
            last_write_unix_ms: AtomicI64::new(0),
            last_error: Mutex::new(None),
        }
    }

    pub fn record_error(&self, err: impl Into<String>) {
        self.failed_cycles.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = Some(err.into());
        }
    }

    pub fn record_write(&self, reading: &Reading) {
        self.points_written.fetch_add(1, Ordering::Relaxed);
        self.last_write_unix_ms
            .store(reading.timestamp_millis(), Ordering::Relaxed);
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = None;
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Default for CollectorStats {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Collector<G, S> {
    gateway: G,
    sink: S,
    interval: Duration,
    stats: Arc<CollectorStats>,
    state: watch::Sender<CollectorState>,
}

impl<G, S> Collector<G, S>
where
    G: ModuleSource,
    S: PointSink,
{
    pub fn new(gateway: G, sink: S, interval: Duration) -> Self {
        let (state, _) = watch::channel(CollectorState::Idle);
        Self {
            gateway,
            sink,
            interval,
            stats: Arc::new(CollectorStats::new()),
            state,
        }
    }

    pub fn stats(&self) -> Arc<CollectorStats> {
        self.stats.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<CollectorState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: CollectorState) {
        self.state.send_replace(state);
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    ///
    /// The flag is only observed between cycles; a cycle that has started always
    /// runs to completion. Returns `Err` when the schedule stopped on a defect.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), CycleError> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.set_state(CollectorState::Running);
        tracing::info!(interval_secs = self.interval.as_secs_f64(), "collector started");

        let result = loop {
            if *shutdown.borrow_and_update() {
                break Ok(());
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let tick = self.stats.ticks.fetch_add(1, Ordering::Relaxed) + 1;
            let span = tracing::info_span!("collect_cycle", tick);
            let outcome = AssertUnwindSafe(self.run_cycle().instrument(span))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(CycleError::Defect(panic_message(panic))));

            match outcome {
                Ok(_) => {}
                Err(err) if !err.is_fatal() => {
                    tracing::warn!(tick, stage = err.stage(), error = %err, "collection cycle failed");
                    self.stats.record_error(err.to_string());
                }
                Err(err) => {
                    tracing::error!(tick, error = %err, "unexpected collector failure; stopping schedule");
                    self.stats.record_error(err.to_string());
                    break Err(err);
                }
            }
        };

        self.set_state(CollectorState::Stopped);
        tracing::info!(
            ticks = self.stats.ticks.load(Ordering::Relaxed),
            points_written = self.stats.points_written.load(Ordering::Relaxed),
            failed_cycles = self.stats.failed_cycles.load(Ordering::Relaxed),
            last_write_unix_ms = self.stats.last_write_unix_ms.load(Ordering::Relaxed),
            "collector stopped"
        );
        result
    }

    /// One fetch → extract → write pass. Returns the reading that was written.
    pub async fn run_cycle(&self) -> Result<Reading, CycleError> {
        let result = self.pipeline().await;
        self.set_state(CollectorState::Idle);
        result
    }

    async fn pipeline(&self) -> Result<Reading, CycleError> {
        self.set_state(CollectorState::Fetching);
        let body = self.gateway.fetch_modules().await?;

        self.set_state(CollectorState::Extracting);
        let reading = extract(&body)?;
        tracing::info!(
            electricity_consumed = reading.electricity_consumed,
            electricity_produced = reading.electricity_produced,
            gas_consumed_cumulative = reading.gas_consumed_cumulative,
            "extracted reading"
        );

        self.set_state(CollectorState::Writing);
        self.sink.write(&reading).await?;
        self.stats.record_write(&reading);
        Ok(reading)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("cycle panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("cycle panicked: {message}")
    } else {
        "cycle panicked".to_string()
    }
}
