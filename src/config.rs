// ============================================================================
// CONFIGURATION SYSTEM
// ============================================================================
// Settings are layered:
// - built-in serde defaults for every missing field
// - optional TOML file, then COLLECTOR_* environment keys (figment)
// - METRICS_PORT / CYCLE_INTERVAL / LOG_LEVEL / LOG_FORMAT overrides, which
//   fall back with a warning instead of failing
// ============================================================================

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::logging::{LogFormat, LogLevel};
use crate::source::Source;
use crate::{
    DEFAULT_CYCLE_INTERVAL_SECS, DEFAULT_LOG_SUFFIX, DEFAULT_METRICS_PORT,
    DEFAULT_SHUTDOWN_GRACE_SECS,
};

// ----------------------------------------------------------------------------
// Main Configuration Structure
// ----------------------------------------------------------------------------

/// Root configuration of the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Port of the metrics/health HTTP listener
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds between collection cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Upper bound on waiting for in-flight work at shutdown
    #[serde(default = "default_shutdown_grace", with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// File-name suffix identifying log files
    #[serde(default = "default_log_suffix")]
    pub log_suffix: String,

    /// Skip raw-directory files that live under a named service root
    #[serde(default)]
    pub dedupe_sources: bool,

    #[serde(default)]
    pub sources: SourcesConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: default_port(),
            cycle_interval_secs: default_cycle_interval(),
            shutdown_grace: default_shutdown_grace(),
            log_suffix: default_log_suffix(),
            dedupe_sources: false,
            sources: SourcesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Settings {
    /// Load the optional TOML file and `COLLECTOR_*` environment keys
    /// (nested with `__`, e.g. `COLLECTOR_LOGGING__FORMAT`). Missing fields
    /// take their serde defaults, so a configured table replaces the default
    /// one instead of merging into it.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut figment = Figment::new();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.to_path_buf(),
                });
            }
            figment = figment.merge(Toml::file(path));
        }

        Self::extract(figment.merge(Env::prefixed("COLLECTOR_").split("__")))
    }

    /// Load from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> ConfigResult<Self> {
        Self::extract(Figment::new().merge(Toml::string(toml_str)))
    }

    fn extract(figment: Figment) -> ConfigResult<Self> {
        let settings: Self = figment.extract().map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.port == 0 {
            return Err(ConfigError::invalid_value("port", "must be between 1 and 65535"));
        }
        if self.cycle_interval_secs == 0 {
            return Err(ConfigError::invalid_value(
                "cycle_interval_secs",
                "must be greater than zero",
            ));
        }
        if self.shutdown_grace.is_zero() {
            return Err(ConfigError::invalid_value(
                "shutdown_grace",
                "must be greater than zero",
            ));
        }
        if self.log_suffix.is_empty() {
            return Err(ConfigError::invalid_value("log_suffix", "must not be empty"));
        }
        if self.logging.to_file && self.logging.file_name.is_empty() {
            return Err(ConfigError::invalid_value(
                "logging.file_name",
                "must not be empty when file logging is enabled",
            ));
        }
        Ok(())
    }

    /// Apply raw override values. Invalid values keep the setting already in
    /// effect and are reported back as warnings.
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if let Some(raw) = &overrides.metrics_port {
            match raw.trim().parse::<u16>() {
                Ok(port) if port > 0 => self.port = port,
                _ => warnings.push(ConfigWarning::new("METRICS_PORT", raw, self.port)),
            }
        }

        if let Some(raw) = &overrides.cycle_interval {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.cycle_interval_secs = secs,
                _ => warnings.push(ConfigWarning::new(
                    "CYCLE_INTERVAL",
                    raw,
                    self.cycle_interval_secs,
                )),
            }
        }

        if let Some(raw) = &overrides.log_level {
            match raw.parse::<LogLevel>() {
                Ok(level) => self.logging.level = level,
                Err(_) => warnings.push(ConfigWarning::new("LOG_LEVEL", raw, self.logging.level)),
            }
        }

        if let Some(raw) = &overrides.log_format {
            match raw.parse::<LogFormat>() {
                Ok(format) => self.logging.format = format,
                Err(_) => {
                    warnings.push(ConfigWarning::new("LOG_FORMAT", raw, self.logging.format))
                }
            }
        }

        warnings
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    /// Named services (sorted by service id) followed by raw directories.
    pub fn sources(&self) -> Vec<Source> {
        let services = self
            .sources
            .services
            .iter()
            .map(|(service, root)| Source::service(service.as_str(), root.clone()));
        let directories = self.sources.directories.iter().cloned().map(Source::directory);
        services.chain(directories).collect()
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn default_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_cycle_interval() -> u64 {
    DEFAULT_CYCLE_INTERVAL_SECS
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS)
}

fn default_log_suffix() -> String {
    DEFAULT_LOG_SUFFIX.into()
}

fn default_true() -> bool {
    true
}

// ----------------------------------------------------------------------------
// Sources Configuration
// ----------------------------------------------------------------------------

/// Where the collector looks for log files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Service id -> root directory
    #[serde(default = "default_services")]
    pub services: BTreeMap<String, PathBuf>,

    /// Roots scanned with path-based service attribution
    #[serde(default = "default_directories")]
    pub directories: Vec<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            services: default_services(),
            directories: default_directories(),
        }
    }
}

fn default_services() -> BTreeMap<String, PathBuf> {
    BTreeMap::from([
        ("snaproom-laravel".to_string(), PathBuf::from("/logs/laravel")),
        ("snaproom-react".to_string(), PathBuf::from("/logs/react")),
        ("collector".to_string(), PathBuf::from("./logs")),
    ])
}

fn default_directories() -> Vec<PathBuf> {
    vec![PathBuf::from("./logs"), PathBuf::from("/logs")]
}

// ----------------------------------------------------------------------------
// Logging Configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Output format of stdout (json, pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: LogFormat,

    /// Log to stdout
    #[serde(default = "default_true")]
    pub stdout: bool,

    /// Also write to `directory/file_name`
    #[serde(default = "default_true")]
    pub to_file: bool,

    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,

    #[serde(default = "default_log_file_name")]
    pub file_name: String,

    /// Enable ANSI colors on stdout
    #[serde(default = "default_true")]
    pub colors: bool,

    /// Include source location
    #[serde(default)]
    pub source_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            stdout: true,
            to_file: true,
            directory: default_log_directory(),
            file_name: default_log_file_name(),
            colors: true,
            source_location: false,
        }
    }
}

impl LoggingConfig {
    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_file_name() -> String {
    "collector.log".into()
}

// ----------------------------------------------------------------------------
// Overrides
// ----------------------------------------------------------------------------

/// Raw override values as read from flags or the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub metrics_port: Option<String>,
    pub cycle_interval: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

/// An override that was ignored. Logged once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub key: &'static str,
    pub value: String,
    pub fallback: String,
}

impl ConfigWarning {
    fn new(key: &'static str, value: &str, fallback: impl Display) -> Self {
        Self {
            key,
            value: value.to_string(),
            fallback: fallback.to_string(),
        }
    }
}

impl Display for ConfigWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid {} value '{}', using {}",
            self.key, self.value, self.fallback
        )
    }
}
