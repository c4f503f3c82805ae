use std::fmt::{self, Display, Formatter};

use parking_lot::Mutex;

use crate::source::{LogFile, SourceKind};

/// Severity label attached to collected lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Info,
    Warn,
    Error,
    Debug,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Info,
        Severity::Warn,
        Severity::Error,
        Severity::Debug,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
            Severity::Debug => "debug",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the collector records for one log file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileEstimate {
    /// Lines attributed to the file this cycle. Never negative.
    pub lines: f64,
    pub severity: Severity,
}

/// Turns a discovered log file into a line estimate and severity.
///
/// This is the seam where real log-content parsing plugs in.
pub trait FileMetricsDeriver: Send + Sync {
    fn derive(&self, file: &LogFile, kind: SourceKind) -> FileEstimate;
}

/// Placeholder deriver producing pseudo-random values.
///
/// Named services get up to 10 lines at a random severity; raw directories
/// get up to 5 lines at `info`.
#[derive(Debug)]
pub struct SimulatedDeriver {
    rng: Mutex<fastrand::Rng>,
}

impl SimulatedDeriver {
    pub const SERVICE_MAX_LINES: f64 = 10.0;
    pub const DIRECTORY_MAX_LINES: f64 = 5.0;

    pub fn new() -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::new()),
        }
    }

    /// Deterministic sequence for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(fastrand::Rng::with_seed(seed)),
        }
    }
}

impl Default for SimulatedDeriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FileMetricsDeriver for SimulatedDeriver {
    fn derive(&self, _file: &LogFile, kind: SourceKind) -> FileEstimate {
        let mut rng = self.rng.lock();
        match kind {
            SourceKind::Service => FileEstimate {
                lines: rng.f64() * Self::SERVICE_MAX_LINES,
                severity: Severity::ALL[rng.usize(..Severity::ALL.len())],
            },
            SourceKind::Directory => FileEstimate {
                lines: rng.f64() * Self::DIRECTORY_MAX_LINES,
                severity: Severity::Info,
            },
        }
    }
}
