// ============================================================================
// SNAPROOM LOG COLLECTOR
// ============================================================================
// Periodically scans log directories, derives metrics about the log files it
// finds, and exposes them to a Prometheus scraper together with health and
// readiness probes.
//
// Layout:
// - metrics:    concurrency-safe counter/gauge/histogram store
// - exposition: Prometheus text rendering of a store snapshot
// - source:     log-file enumeration and path-based service attribution
// - collect:    one collection pass over every configured source
// - scheduler:  cancellable fixed-interval driver with bounded shutdown
// - server:     /metrics, /health and /ready over HTTP
// - config:     layered settings (defaults, TOML file, env/CLI overrides)
// - logging:    tracing subscriber for stdout and the collector log file
// - app:        process wiring and graceful shutdown
// - cli:        command line flags and subcommands
// ============================================================================

pub mod app;
pub mod cli;
pub mod collect;
pub mod config;
pub mod error;
pub mod exposition;
pub mod logging;
pub mod metrics;
pub mod scheduler;
pub mod server;
pub mod source;

pub use collect::{CollectionCycle, CycleResult, CycleRunner};
pub use config::Settings;
pub use error::{CollectorError, CollectorResult};
pub use metrics::{MetricsSnapshot, MetricsStore};
pub use scheduler::{Scheduler, SchedulerReport, SchedulerState, SchedulerStatus};

// ============================================================================
// CONSTANTS & VERSION INFORMATION
// ============================================================================

/// Service identity reported by the health and readiness probes.
pub const SERVICE_NAME: &str = "snaproom-logging-collector";

/// Version reported by the health probe.
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Logical service name the collector uses for its own self-observation.
pub const COLLECTOR_SERVICE: &str = "collector";

/// Service attributed to files no classifier rule matches.
pub const UNKNOWN_SERVICE: &str = "unknown";

/// Default exposition port.
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default collection interval in seconds.
pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 10;

/// Default bound on shutdown of in-flight work.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

/// Suffix identifying a log file.
pub const DEFAULT_LOG_SUFFIX: &str = ".log";
