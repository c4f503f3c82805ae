// ============================================================================
// PROCESS WIRING
// ============================================================================
// Builds the shared store, the collection unit and the serving unit, runs
// both under one cancellation token, and joins them with a bounded timeout
// once SIGINT/SIGTERM arrives or either unit ends on its own.
// ============================================================================

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::TcpListener;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::collect::{CollectionCycle, SimulatedDeriver};
use crate::config::Settings;
use crate::error::{CollectorResult, ConfigError, SchedulerError, ServerError};
use crate::metrics::{catalog, MetricsStore};
use crate::scheduler::{Scheduler, SchedulerReport};
use crate::server::{self, AppState};
use crate::source::{SubstringClassifier, WalkDirEnumerator};
use crate::{SERVICE_NAME, SERVICE_VERSION};

/// Time the units get, past the grace period, to report back once cancelled.
const JOIN_SLACK: Duration = Duration::from_millis(100);

/// Build the collection pass described by `settings`.
pub fn build_cycle(
    settings: &Settings,
    store: Arc<MetricsStore>,
    started_at: Instant,
) -> CollectorResult<CollectionCycle> {
    let classifier = SubstringClassifier::snaproom()
        .map_err(|e| ConfigError::invalid_value("classifier", e.to_string()))?;

    let cycle = CollectionCycle::new(
        store,
        Arc::new(WalkDirEnumerator::with_suffix(settings.log_suffix.as_str())),
        Arc::new(SimulatedDeriver::new()),
        Arc::new(classifier),
    )
    .with_sources(settings.sources())
    .with_started_at(started_at)
    .with_dedupe(settings.dedupe_sources);

    Ok(cycle)
}

/// How the units stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Every unit reported back and no cycle was left running.
    Clean,
    /// A cycle or unit was still running when the grace period ran out.
    Abandoned,
}

/// Drive `future` on a fresh multi-thread runtime.
///
/// The runtime is dropped without waiting for blocking threads: every wait
/// inside the application is already bounded by the grace period, so a cycle
/// still running at this point has been abandoned and must not hold the
/// process.
pub fn block_on<T, F>(future: F) -> CollectorResult<T>
where
    F: Future<Output = CollectorResult<T>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("snaproom-worker")
        .build()?;

    let outcome = runtime.block_on(future);
    runtime.shutdown_background();
    outcome
}

/// Run the collector until a termination signal, then shut down within the
/// configured grace period.
pub async fn run(settings: Settings, started_at: Instant) -> CollectorResult<Shutdown> {
    let mut signals = ShutdownSignals::install()?;
    run_until(settings, started_at, async move { signals.recv().await }).await
}

/// Run the collector until `shutdown` resolves with the name of its trigger.
pub async fn run_until<S>(
    settings: Settings,
    started_at: Instant,
    shutdown: S,
) -> CollectorResult<Shutdown>
where
    S: Future<Output = &'static str>,
{
    info!(
        target: "snaproom::app",
        service = SERVICE_NAME,
        version = SERVICE_VERSION,
        port = settings.port,
        interval_seconds = settings.cycle_interval_secs,
        "Starting log collector"
    );

    let store = Arc::new(MetricsStore::new());
    if let Err(err) = catalog::seed(&store) {
        warn!(target: "snaproom::app", error = %err, "Failed to seed self metrics");
    }

    let cycle = build_cycle(&settings, store.clone(), started_at)?;
    for source in cycle.sources() {
        info!(target: "snaproom::app", source = %source, "Configured source");
    }

    let scheduler = Arc::new(Scheduler::new(
        Arc::new(cycle),
        store.clone(),
        settings.shutdown_grace,
    ));
    let state = AppState::new(store, scheduler.status());

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, settings.port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    run_units(
        scheduler,
        state,
        listener,
        settings.cycle_interval(),
        settings.shutdown_grace,
        shutdown,
    )
    .await
}

/// Run the collection and serving units on one token until `shutdown`
/// resolves or either unit exits, then join both before `grace` runs out.
pub async fn run_units<S>(
    scheduler: Arc<Scheduler>,
    state: AppState,
    listener: TcpListener,
    interval: Duration,
    grace: Duration,
    shutdown: S,
) -> CollectorResult<Shutdown>
where
    S: Future<Output = &'static str>,
{
    let cancel = CancellationToken::new();

    let mut collector = {
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { scheduler.start(interval, cancel).await })
    };
    let mut serving = tokio::spawn(server::serve(listener, state, cancel.clone()));

    let mut collector_done = None;
    let mut serving_done = None;
    tokio::select! {
        name = shutdown => {
            info!(target: "snaproom::app", signal = name, "Shutdown signal received");
        }
        joined = &mut collector => {
            warn!(target: "snaproom::app", "Collection unit exited before shutdown");
            collector_done = Some(joined);
        }
        joined = &mut serving => {
            warn!(target: "snaproom::app", "Metrics server exited before shutdown");
            serving_done = Some(joined);
        }
    }

    cancel.cancel();
    let shutdown_started = Instant::now();
    let deadline = tokio::time::Instant::now() + grace + JOIN_SLACK;

    let joins = async move {
        let collector = match collector_done {
            Some(joined) => joined,
            None => collector.await,
        };
        let serving = match serving_done {
            Some(joined) => joined,
            None => serving.await,
        };
        (collector, serving)
    };

    let outcome = match tokio::time::timeout_at(deadline, joins).await {
        Ok((collector, serving)) => {
            let collected = report_collector(collector);
            let served = report_serving(serving);
            match (collected, served) {
                (Ok(report), Ok(())) => {
                    let abandoned = report.is_some_and(|r| r.abandoned_in_flight);
                    Ok(if abandoned {
                        Shutdown::Abandoned
                    } else {
                        Shutdown::Clean
                    })
                }
                (Err(err), _) | (_, Err(err)) => Err(err),
            }
        }
        Err(_) => {
            warn!(
                target: "snaproom::app",
                grace_seconds = grace.as_secs_f64(),
                "Units did not stop within the grace period, abandoning them"
            );
            Ok(Shutdown::Abandoned)
        }
    };

    info!(
        target: "snaproom::app",
        duration_ms = shutdown_started.elapsed().as_millis() as u64,
        "Log collector stopped"
    );
    outcome
}

fn report_collector(
    joined: Result<Result<SchedulerReport, SchedulerError>, JoinError>,
) -> CollectorResult<Option<SchedulerReport>> {
    match joined {
        Ok(Ok(report)) => {
            info!(
                target: "snaproom::app",
                cycles_run = report.cycles_run,
                cycles_failed = report.cycles_failed,
                abandoned_in_flight = report.abandoned_in_flight,
                "Collection unit finished"
            );
            Ok(Some(report))
        }
        Ok(Err(err)) => {
            error!(target: "snaproom::app", error = %err, "Collection unit failed to start");
            Err(err.into())
        }
        Err(err) => {
            error!(target: "snaproom::app", error = %err, "Collection unit panicked");
            Ok(None)
        }
    }
}

fn report_serving(joined: Result<Result<(), ServerError>, JoinError>) -> CollectorResult<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!(target: "snaproom::app", error = %err, "Metrics server failed");
            Err(err.into())
        }
        Err(err) => {
            error!(target: "snaproom::app", error = %err, "Metrics server panicked");
            Ok(())
        }
    }
}

/// SIGINT and SIGTERM, registered before the units start.
struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}
