//! Background polling of the telemetry source.
//!
//! A [`Poller`] reads the latest report on a fixed interval, appends a
//! [`PositionSample`](crate::model::PositionSample) for the tracked bus and
//! hands the position to the [`StopMatcher`]. Each tick returns an explicit
//! outcome; failures are logged and retried on a bounded backoff, and never
//! end the loop. The loop stops only when its shutdown signal fires.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::matcher::{MatchOutcome, StopMatcher};
use crate::model::{BusId, NewSample};
use crate::services::telemetry_api::TelemetrySource;
use crate::stats::PollStats;
use crate::store::Store;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("telemetry read failed: {0:#}")]
    Telemetry(anyhow::Error),
    #[error("storage operation failed: {0:#}")]
    Storage(anyhow::Error),
    #[error("tracked bus {0} does not exist")]
    UnknownBus(BusId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NoReport,
    IncompleteReport,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Nothing usable was published; no sample written.
    Skipped(SkipReason),
    Recorded { seq: u64, matched: MatchOutcome },
}

/// Tick cadence and how far consecutive failures may stretch it.
///
/// After `n` consecutive failures the next tick waits
/// `interval * 2^(n-1)`, clamped to `[interval, max_backoff]`. With
/// `max_backoff == interval` the cadence never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_backoff: DEFAULT_INTERVAL,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_backoff: interval,
        }
    }

    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.interval;
        }
        let factor = 1u32
            .checked_shl(consecutive_failures - 1)
            .unwrap_or(u32::MAX);
        self.interval
            .saturating_mul(factor)
            .min(self.max_backoff)
            .max(self.interval)
    }
}

pub struct Poller<T, S: ?Sized> {
    source: T,
    store: Arc<S>,
    bus_id: BusId,
    matcher: StopMatcher,
    policy: PollPolicy,
    stats: PollStats,
    consecutive_failures: u32,
}

impl<T: TelemetrySource, S: Store + ?Sized> Poller<T, S> {
    pub fn new(source: T, store: Arc<S>, bus_id: BusId) -> Self {
        Self {
            source,
            store,
            bus_id,
            matcher: StopMatcher::default(),
            policy: PollPolicy::default(),
            stats: PollStats::started(Utc::now()),
            consecutive_failures: 0,
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_matcher(mut self, matcher: StopMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// One read → validate → match → record pass.
    #[tracing::instrument(skip(self), fields(bus = %self.bus_id))]
    pub async fn tick(&mut self) -> Result<TickOutcome, PollError> {
        let Some(report) = self.source.latest().await.map_err(PollError::Telemetry)? else {
            return Ok(TickOutcome::Skipped(SkipReason::NoReport));
        };
        let Some(reading) = report.complete() else {
            return Ok(TickOutcome::Skipped(SkipReason::IncompleteReport));
        };

        let bus = self
            .store
            .bus(&self.bus_id)
            .map_err(PollError::Storage)?
            .ok_or_else(|| PollError::UnknownBus(self.bus_id.clone()))?;

        let matched = self
            .matcher
            .apply(
                self.store.as_ref(),
                &bus,
                NewSample {
                    bus_id: bus.id.clone(),
                    latitude: reading.latitude,
                    longitude: reading.longitude,
                    speed: reading.speed,
                    received_at: Utc::now(),
                },
            )
            .map_err(PollError::Storage)?;

        Ok(TickOutcome::Recorded {
            seq: matched.sample.seq,
            matched: matched.outcome,
        })
    }

    /// Runs one tick, records its outcome and returns how long to wait
    /// before the next one.
    pub async fn step(&mut self) -> Duration {
        let started = tokio::time::Instant::now();
        let result = self.tick().await;
        let elapsed = started.elapsed();
        if elapsed > self.policy.interval {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "Poll tick was slow");
        }

        match result {
            Ok(outcome) => {
                self.consecutive_failures = 0;
                self.stats.record(&outcome, Utc::now());
                match outcome {
                    TickOutcome::Skipped(reason) => debug!(?reason, "Tick skipped"),
                    TickOutcome::Recorded { seq, matched } => {
                        debug!(seq, ?matched, "Position recorded")
                    }
                }
                self.policy.interval
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.stats.record_failure(&e, Utc::now());
                let delay = self.policy.delay_after(self.consecutive_failures);
                error!(
                    error = %e,
                    consecutive = self.consecutive_failures,
                    retry_in_ms = delay.as_millis() as u64,
                    "Poll tick failed"
                );
                delay
            }
        }
    }

    /// Ticks until `shutdown` carries `true` or its sender is dropped, then
    /// returns the accumulated statistics.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PollStats {
        info!(
            bus = %self.bus_id,
            interval_ms = self.policy.interval.as_millis() as u64,
            max_backoff_ms = self.policy.max_backoff.as_millis() as u64,
            "Poller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let delay = self.step().await;

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!(
            bus = %self.bus_id,
            ticks = self.stats.ticks,
            recorded = self.stats.recorded,
            skipped = self.stats.skipped(),
            failures = self.stats.failures,
            stop_changes = self.stats.stop_changes,
            recorded_pct = self.stats.recorded_pct(),
            "Poller stopped"
        );
        self.stats
    }
}

impl<T, S> Poller<T, S>
where
    T: TelemetrySource + 'static,
    S: Store + ?Sized + 'static,
{
    /// Starts [`Poller::run`] on the tokio runtime.
    pub fn spawn(self) -> PollerHandle {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(rx));
        PollerHandle { shutdown: tx, task }
    }
}

/// Owner of a spawned poller.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<PollStats>,
}

impl PollerHandle {
    /// Signals the poller to stop after its current tick and waits for it.
    pub async fn shutdown(self) -> anyhow::Result<PollStats> {
        let _ = self.shutdown.send(true);
        Ok(self.task.await?)
    }
}
