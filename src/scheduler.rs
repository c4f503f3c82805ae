// ============================================================================
// SCHEDULER
// ============================================================================
// Drives a CycleRunner on a fixed interval:
// - first cycle fires one full interval after start
// - cycles are strictly serialised; an overrun delays the next tick
// - cancellation stops scheduling; an in-flight cycle gets a bounded grace
//   period and is abandoned (not killed) when it runs over
// ============================================================================

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinError;
use tokio::time::{interval_at, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::collect::{CycleResult, CycleRunner};
use crate::error::SchedulerError;
use crate::metrics::{catalog, MetricsStore};
use crate::COLLECTOR_SERVICE;

// ----------------------------------------------------------------------------
// State
// ----------------------------------------------------------------------------

/// Lifecycle of a scheduler: `Idle -> Running -> ShuttingDown -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Running = 1,
    ShuttingDown = 2,
    Stopped = 3,
}

impl SchedulerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SchedulerState::Idle,
            1 => SchedulerState::Running,
            2 => SchedulerState::ShuttingDown,
            _ => SchedulerState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::ShuttingDown => "shutting_down",
            SchedulerState::Stopped => "stopped",
        }
    }
}

impl Display for SchedulerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of a scheduler, shared with the readiness probe.
#[derive(Debug)]
pub struct SchedulerStatus {
    state: AtomicU8,
    origin: Instant,
    /// Millis since `origin` at which the last cycle completed, plus one;
    /// zero when no cycle has completed.
    last_cycle_ms: AtomicU64,
    interval_ms: AtomicU64,
    cycles_run: AtomicU64,
}

impl SchedulerStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SchedulerState::Idle as u8),
            origin: Instant::now(),
            last_cycle_ms: AtomicU64::new(0),
            interval_ms: AtomicU64::new(0),
            cycles_run: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(AtomicOrdering::Acquire))
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles_run.load(AtomicOrdering::Relaxed)
    }

    /// Time since the last completed cycle.
    pub fn since_last_cycle(&self) -> Option<Duration> {
        match self.last_cycle_ms.load(AtomicOrdering::Acquire) {
            0 => None,
            stamp => {
                let now = self.origin.elapsed().as_millis() as u64;
                Some(Duration::from_millis(now.saturating_sub(stamp - 1)))
            }
        }
    }

    /// Running, or shutting down with a cycle completed within the last two
    /// intervals.
    pub fn is_ready(&self) -> bool {
        match self.state() {
            SchedulerState::Running => true,
            SchedulerState::ShuttingDown => {
                let window = Duration::from_millis(
                    self.interval_ms.load(AtomicOrdering::Relaxed).saturating_mul(2),
                );
                self.since_last_cycle().is_some_and(|since| since <= window)
            }
            SchedulerState::Idle | SchedulerState::Stopped => false,
        }
    }

    fn transition(&self, from: SchedulerState, to: SchedulerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
            .is_ok()
    }

    fn set(&self, state: SchedulerState) {
        self.state.store(state as u8, AtomicOrdering::Release);
    }

    fn record_cycle(&self) {
        let stamp = self.origin.elapsed().as_millis() as u64 + 1;
        self.last_cycle_ms.store(stamp, AtomicOrdering::Release);
        self.cycles_run.fetch_add(1, AtomicOrdering::Relaxed);
    }
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Summary returned once the scheduler has stopped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Cycles that ran to completion.
    pub cycles_run: u64,
    /// Completed cycles that reported failures, plus cycles that panicked.
    pub cycles_failed: u64,
    /// Whether shutdown proceeded without waiting for an in-flight cycle.
    pub abandoned_in_flight: bool,
}

// ----------------------------------------------------------------------------
// Scheduler
// ----------------------------------------------------------------------------

pub struct Scheduler {
    runner: Arc<dyn CycleRunner>,
    store: Arc<MetricsStore>,
    grace: Duration,
    status: Arc<SchedulerStatus>,
}

impl Scheduler {
    /// Create a scheduler. `grace` bounds how long shutdown waits for an
    /// in-flight cycle.
    pub fn new(runner: Arc<dyn CycleRunner>, store: Arc<MetricsStore>, grace: Duration) -> Self {
        Self {
            runner,
            store,
            grace,
            status: Arc::new(SchedulerStatus::new()),
        }
    }

    pub fn status(&self) -> Arc<SchedulerStatus> {
        self.status.clone()
    }

    /// Run cycles every `interval` until `cancel` fires.
    ///
    /// Fails before entering `Running` when the interval is zero or the
    /// scheduler has already been started.
    pub async fn start(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<SchedulerReport, SchedulerError> {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }
        if !self.status.transition(SchedulerState::Idle, SchedulerState::Running) {
            return Err(SchedulerError::AlreadyStarted);
        }
        self.status
            .interval_ms
            .store(interval.as_millis() as u64, AtomicOrdering::Relaxed);

        info!(
            target: "snaproom::scheduler",
            interval_seconds = interval.as_secs_f64(),
            grace_seconds = self.grace.as_secs_f64(),
            "Starting log collection service"
        );

        let mut report = SchedulerReport::default();
        let mut ticker = interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(target: "snaproom::scheduler", "Cancellation received, stopping log collection");
                    break;
                }
                _ = ticker.tick() => {}
            }

            debug!(target: "snaproom::scheduler", "Starting collect cycle");
            let runner = self.runner.clone();
            let mut cycle = tokio::task::spawn_blocking(move || runner.run_cycle());

            let joined = tokio::select! {
                biased;
                joined = &mut cycle => Some(joined),
                _ = cancel.cancelled() => None,
            };

            match joined {
                Some(joined) => self.finish_cycle(joined, &mut report),
                None => {
                    self.status.set(SchedulerState::ShuttingDown);
                    info!(
                        target: "snaproom::scheduler",
                        grace_seconds = self.grace.as_secs_f64(),
                        "Cancellation received mid-cycle, waiting for it to finish"
                    );
                    match tokio::time::timeout(self.grace, &mut cycle).await {
                        Ok(joined) => self.finish_cycle(joined, &mut report),
                        Err(_) => {
                            warn!(
                                target: "snaproom::scheduler",
                                grace_seconds = self.grace.as_secs_f64(),
                                "In-flight cycle exceeded the grace period, abandoning it"
                            );
                            report.abandoned_in_flight = true;
                        }
                    }
                    break;
                }
            }
        }

        self.status.set(SchedulerState::ShuttingDown);
        self.status.set(SchedulerState::Stopped);
        info!(
            target: "snaproom::scheduler",
            cycles_run = report.cycles_run,
            cycles_failed = report.cycles_failed,
            abandoned_in_flight = report.abandoned_in_flight,
            "Log collection stopped"
        );
        Ok(report)
    }

    fn finish_cycle(&self, joined: Result<CycleResult, JoinError>, report: &mut SchedulerReport) {
        match joined {
            Ok(result) => {
                report.cycles_run += 1;
                self.status.record_cycle();
                if let Err(err) = result.into_result() {
                    report.cycles_failed += 1;
                    warn!(
                        target: "snaproom::scheduler",
                        error = %err,
                        "Log collection completed with errors"
                    );
                    self.record_cycle_error();
                }
            }
            Err(err) => {
                report.cycles_failed += 1;
                error!(target: "snaproom::scheduler", error = %err, "Collection cycle failed");
                self.record_cycle_error();
            }
        }
    }

    fn record_cycle_error(&self) {
        if let Err(err) = self.store.add_counter(
            &catalog::LOG_ERRORS,
            &[COLLECTOR_SERVICE, catalog::ERROR_CYCLE],
            1.0,
        ) {
            warn!(target: "snaproom::scheduler", error = %err, "Rejected metrics write");
        }
    }
}
