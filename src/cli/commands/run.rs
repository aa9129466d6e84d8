//! `run` command: load, publish and mirror a range of periods

use std::path::PathBuf;

use super::{DateArgs, load_config, open_store};
use crate::bundle::default_fetcher;
use crate::cli::error::CliError;
use crate::orchestrator::LoadOrchestrator;
use crate::period::Period;
use crate::source::ConfiguredSource;

/// Run command arguments
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub config: PathBuf,
    pub dates: DateArgs,
    /// Reload periods that were already loaded
    pub overwrite: bool,
}

/// Process every period of the selected range
pub fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let range = args.dates.resolve(Period::today())?;

    let fetcher = default_fetcher(&config.http)
        .map_err(|e| CliError::InvalidArgument(format!("HTTP settings: {}", e)))?;

    let store = if config.control.enabled {
        Some(open_store(&config)?)
    } else {
        None
    };
    let source = match &store {
        Some(store) => ConfiguredSource::from_config_sharing(&config, store)?,
        None => ConfiguredSource::from_config(&config)?,
    };

    let mut orchestrator =
        LoadOrchestrator::new(&config, &source, fetcher.as_ref()).with_overwrite(args.overwrite);
    if let Some(store) = &store {
        orchestrator = orchestrator.with_store(store);
    }

    let stats = orchestrator.run(range)?;

    println!(
        "Processed {} period(s), skipped {}, resumed {}, reloaded {}",
        stats.periods_processed,
        stats.periods_skipped,
        stats.periods_resumed,
        stats.periods_reloaded
    );
    for (table, rows) in &stats.table_rows {
        println!("  {}: {} row(s)", table, rows);
    }
    if !stats.bundles.is_empty() {
        println!(
            "Published {} bundle(s), {} bytes",
            stats.bundles.len(),
            stats.bytes_published()
        );
    }
    if stats.files_mirrored > 0 {
        println!("Mirrored {} file(s)", stats.files_mirrored);
    }
    println!(
        "Finished in {} ({:.1} rows/s)",
        stats.duration_string(),
        stats.throughput()
    );
    if stats.errors_count > 0 {
        eprintln!("{} error(s) were logged:", stats.errors_count);
        for error in &stats.errors {
            eprintln!("  - {}", error);
        }
    }
    Ok(())
}
