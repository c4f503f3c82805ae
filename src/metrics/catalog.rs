//! Metric families published by the collector.

use super::{MetricDesc, MetricsStore, DEFAULT_BUCKETS};
use crate::error::MetricsResult;

/// Simulated log lines collected, by service and severity.
pub static LOGS_COLLECTED: MetricDesc = MetricDesc::counter(
    "snaproom_logs_collected_total",
    "Total number of logs collected by service and level",
    &["service", "level"],
);

/// Duration of one collection cycle, observed under service "collector".
pub static PROCESSING_DURATION: MetricDesc = MetricDesc::histogram(
    "snaproom_log_processing_duration_seconds",
    "Time spent processing logs by service",
    &["service"],
    DEFAULT_BUCKETS,
);

/// Last observed size of a log file.
pub static FILE_SIZE: MetricDesc = MetricDesc::gauge(
    "snaproom_log_file_size_bytes",
    "Current size of log files in bytes",
    &["service", "filename"],
);

/// Collection failures, by service and error type.
pub static LOG_ERRORS: MetricDesc = MetricDesc::counter(
    "snaproom_log_errors_total",
    "Total number of log processing errors",
    &["service", "error_type"],
);

pub static UPTIME: MetricDesc = MetricDesc::gauge(
    "snaproom_collector_uptime_seconds",
    "Time the collector has been running",
    &[],
);

pub static CYCLES: MetricDesc = MetricDesc::counter(
    "snaproom_collector_cycles_total",
    "Total number of collection cycles",
    &[],
);

// Values of the `error_type` label on LOG_ERRORS.
pub const ERROR_COLLECTION: &str = "collection_error";
pub const ERROR_DIRECTORY: &str = "directory_error";
pub const ERROR_CYCLE: &str = "cycle_error";

/// Every family the collector writes.
pub fn all() -> [&'static MetricDesc; 6] {
    [
        &LOGS_COLLECTED,
        &PROCESSING_DURATION,
        &FILE_SIZE,
        &LOG_ERRORS,
        &UPTIME,
        &CYCLES,
    ]
}

/// Publish the unlabeled families at zero so a scrape before the first
/// cycle already sees them.
pub fn seed(store: &MetricsStore) -> MetricsResult<()> {
    store.set_gauge(&UPTIME, &[], 0.0)?;
    store.add_counter(&CYCLES, &[], 0.0)
}
