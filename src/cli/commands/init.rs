//! `init` command: write a sample configuration and create the control table

use std::path::PathBuf;

use super::load_config;
use crate::cli::error::CliError;
use crate::config::sample_config;
use crate::database::{ControlStore, DuckDbStore};

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    pub config: PathBuf,
    /// Replace an existing configuration file with the sample
    pub force: bool,
}

/// Create the configuration file if missing, otherwise the control table
pub fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    if !args.config.exists() || args.force {
        std::fs::write(&args.config, sample_config())
            .map_err(|e| CliError::FileWriteError(args.config.clone(), e.to_string()))?;
        println!("Wrote sample configuration to {}", args.config.display());
        println!("Edit it, then run 'period-ingest init' again to create the control table.");
        return Ok(());
    }

    let config = load_config(&args.config)?;
    if !config.control.enabled {
        println!("Control store is disabled in {}; nothing to do.", args.config.display());
        return Ok(());
    }

    let db_path = config.control_db_path();
    let store = DuckDbStore::new(&db_path, &config.control.table)?;
    store.initialize()?;
    println!(
        "Control table '{}' ready in {}",
        config.control.table,
        db_path.display()
    );
    Ok(())
}
