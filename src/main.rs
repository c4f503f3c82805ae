// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

use std::time::Instant;

use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use tracing::{info, warn};

use snaproom_collector::cli::{Cli, Commands};
use snaproom_collector::config::{ConfigWarning, Settings};
use snaproom_collector::logging::init_logging;
use snaproom_collector::{app, SERVICE_NAME, SERVICE_VERSION};

fn main() -> AnyhowResult<()> {
    let started_at = Instant::now();
    let cli = Cli::parse();

    if cli.subcommand() == Commands::Version {
        println!("{SERVICE_NAME} v{SERVICE_VERSION}");
        return Ok(());
    }

    let mut settings = match &cli.config {
        Some(path) => Settings::load(Some(path.as_path()))
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Settings::load(None).context("Failed to load configuration")?,
    };
    let warnings = settings.apply_overrides(&cli.overrides());

    match cli.subcommand() {
        Commands::PrintConfig => {
            print_warnings(&warnings);
            print!("{}", settings.to_toml().context("Failed to render configuration")?);
            Ok(())
        }
        Commands::CheckConfig => {
            print_warnings(&warnings);
            print_summary(&settings);
            Ok(())
        }
        Commands::Run | Commands::Version => run(settings, &warnings, started_at),
    }
}

fn run(settings: Settings, warnings: &[ConfigWarning], started_at: Instant) -> AnyhowResult<()> {
    let _logging = init_logging(&settings.logging).context("Failed to initialize logging")?;
    for warning in warnings {
        warn!(
            target: "snaproom::init",
            key = warning.key,
            value = %warning.value,
            fallback = %warning.fallback,
            "Ignoring invalid override"
        );
    }

    let outcome = app::block_on(app::run(settings, started_at));
    if let Ok(shutdown) = &outcome {
        info!(target: "snaproom::init", outcome = ?shutdown, "Shutdown complete");
    }

    outcome
        .map(|_| ())
        .context("Collector terminated with an error")
}

fn print_warnings(warnings: &[ConfigWarning]) {
    for warning in warnings {
        eprintln!("warning: {warning}");
    }
}

fn print_summary(settings: &Settings) {
    println!("Configuration OK");
    println!("  port:            {}", settings.port);
    println!("  cycle interval:  {}s", settings.cycle_interval_secs);
    println!(
        "  shutdown grace:  {}",
        humantime::format_duration(settings.shutdown_grace)
    );
    println!("  log suffix:      {}", settings.log_suffix);
    println!("  dedupe sources:  {}", settings.dedupe_sources);
    println!(
        "  logging:         {} ({}), file {}",
        settings.logging.level,
        settings.logging.format,
        if settings.logging.to_file {
            settings.logging.file_path().display().to_string()
        } else {
            "disabled".to_string()
        }
    );
    println!("  sources:");
    for source in settings.sources() {
        println!("    - {source}");
    }
}
