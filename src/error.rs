// ============================================================================
// ERROR HANDLING FRAMEWORK
// ============================================================================
// One error enum per subsystem, all convertible into `CollectorError`.
// - InvalidArgument: structural misuse, surfaced synchronously to the caller
// - IOError: traversal failures, counted and logged but never fatal
// - CycleAggregateFailure: per-cycle summary of IOErrors
// ============================================================================

use std::path::PathBuf;

use thiserror::Error;

// ----------------------------------------------------------------------------
// Top-level Error
// ----------------------------------------------------------------------------

/// The main error type of the collector.
/// All subsystem errors can be converted to this type.
#[derive(Error, Debug)]
pub enum CollectorError {
    // ---- Configuration Errors ----
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // ---- Metrics Errors ----
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    // ---- Source Errors ----
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    // ---- Cycle Errors ----
    #[error("Cycle error: {0}")]
    Cycle(#[from] CycleError),

    // ---- Scheduler Errors ----
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    // ---- Server Errors ----
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    // ---- Logging Errors ----
    #[error("Logging error: {0}")]
    Logging(String),

    // ---- IO Errors ----
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CollectorError {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            CollectorError::Config(_) => false,
            CollectorError::Metrics(_) => false,
            CollectorError::Source(_) => true,
            CollectorError::Cycle(_) => true,
            CollectorError::Scheduler(_) => false,
            CollectorError::Server(e) => e.is_recoverable(),
            CollectorError::Logging(_) => false,
            CollectorError::Io(_) => true,
        }
    }

    /// Get the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            CollectorError::Config(_) => "config",
            CollectorError::Metrics(_) => "metrics",
            CollectorError::Source(_) => "source",
            CollectorError::Cycle(_) => "cycle",
            CollectorError::Scheduler(_) => "scheduler",
            CollectorError::Server(_) => "server",
            CollectorError::Logging(_) => "logging",
            CollectorError::Io(_) => "io",
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration Errors
// ----------------------------------------------------------------------------

/// Errors related to configuration loading and validation
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Metrics Errors
// ----------------------------------------------------------------------------

/// Structural misuse of the metrics store. Every variant is an
/// invalid-argument condition: the store is left unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetricsError {
    #[error("Counter '{metric}' cannot be decreased (delta {delta})")]
    NegativeDelta { metric: &'static str, delta: f64 },

    #[error("Metric '{metric}' expects {expected} label values, got {actual}")]
    LabelArity {
        metric: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Metric '{metric}' is registered as {registered}, not {requested}")]
    KindMismatch {
        metric: &'static str,
        registered: &'static str,
        requested: &'static str,
    },
}

// ----------------------------------------------------------------------------
// Source Errors
// ----------------------------------------------------------------------------

/// Failures while enumerating an existing source root.
/// A missing root is not an error: the collection pass skips it.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Traversal of {root} failed: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl SourceError {
    /// The source root the failure belongs to.
    pub fn root(&self) -> &std::path::Path {
        match self {
            SourceError::Walk { root, .. } => root,
        }
    }
}

// ----------------------------------------------------------------------------
// Cycle Errors
// ----------------------------------------------------------------------------

/// Aggregate outcome of a collection pass that completed with errors.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error("{failed} of {attempted} sources failed; last error: {last}")]
    PartialFailure {
        failed: usize,
        attempted: usize,
        last: Box<SourceError>,
    },
}

// ----------------------------------------------------------------------------
// Scheduler Errors
// ----------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Collection interval must be greater than zero")]
    InvalidInterval,

    #[error("Scheduler has already been started")]
    AlreadyStarted,
}

// ----------------------------------------------------------------------------
// Server Errors
// ----------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP server failed: {0}")]
    Serve(#[source] std::io::Error),
}

impl ServerError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ServerError::Serve(_))
    }
}

// ----------------------------------------------------------------------------
// Result Type Aliases
// ----------------------------------------------------------------------------

/// Standard result type for collector operations
pub type CollectorResult<T> = Result<T, CollectorError>;

/// Result type for metrics store writes
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Result type for source enumeration
pub type SourceResult<T> = Result<T, SourceError>;

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        let err: CollectorError = SchedulerError::InvalidInterval.into();
        assert_eq!(err.category(), "scheduler");
        assert!(!err.is_recoverable());

        let err: CollectorError = ConfigError::invalid_value("port", "must be > 0").into();
        assert_eq!(err.category(), "config");
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_metrics_error_display() {
        let err = MetricsError::NegativeDelta {
            metric: "snaproom_logs_collected_total",
            delta: -1.0,
        };
        assert_eq!(
            err.to_string(),
            "Counter 'snaproom_logs_collected_total' cannot be decreased (delta -1)"
        );
    }

    #[test]
    fn test_io_errors_are_recoverable() {
        let err: CollectorError =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied").into();
        assert!(err.is_recoverable());
        assert_eq!(err.category(), "io");
    }
}
