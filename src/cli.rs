// ============================================================================
// COMMAND LINE INTERFACE
// ============================================================================
// Flags double as the environment overrides the deployment sets
// (METRICS_PORT, CYCLE_INTERVAL, LOG_LEVEL, LOG_FORMAT). They are kept as
// raw strings so a bad value downgrades to a warning instead of a usage error.
// ============================================================================

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Overrides;

/// Snaproom log collector CLI
#[derive(Parser, Debug)]
#[command(
    name = "snaproom-collector",
    author = "Snaproom Platform Team",
    version,
    about = "Log-directory metrics collector for the Snaproom logging stack",
    long_about = "Periodically scans the Snaproom service log directories, derives metrics \
                  about the log files it finds, and serves them in Prometheus text format \
                  together with health and readiness probes."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "COLLECTOR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port of the metrics server
    #[arg(short, long, env = "METRICS_PORT")]
    pub port: Option<String>,

    /// Seconds between collection cycles
    #[arg(short, long, env = "CYCLE_INTERVAL")]
    pub interval: Option<String>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Log format override (pretty, compact, json)
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start collecting and serving metrics (default)
    Run,

    /// Validate the effective configuration and print a summary
    CheckConfig,

    /// Print the effective configuration as TOML
    PrintConfig,

    /// Show version information
    Version,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            metrics_port: self.port.clone(),
            cycle_interval: self.interval.clone(),
            log_level: self.log_level.clone(),
            log_format: self.log_format.clone(),
        }
    }

    /// The selected subcommand, `run` when none was given.
    pub fn subcommand(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run)
    }
}
