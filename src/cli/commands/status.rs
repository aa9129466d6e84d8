//! `status` command: list control records for a range of periods

use std::path::PathBuf;

use super::{DateArgs, load_config, open_store};
use crate::cli::error::CliError;
use crate::database::transaction;
use crate::period::Period;

/// Status command arguments
#[derive(Debug, Clone)]
pub struct StatusArgs {
    pub config: PathBuf,
    pub dates: DateArgs,
}

pub fn handle_status(args: &StatusArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let range = args.dates.resolve(Period::today())?;
    let store = open_store(&config)?;

    let records = transaction(&store, |tx| tx.records_between(range.start(), range.end()))?;
    if records.is_empty() {
        println!(
            "No loads recorded between {} and {}",
            range.start().display_date(),
            range.end().display_date()
        );
        return Ok(());
    }

    println!(
        "{:>8}  {:<10}  {:<19}  {:<19}  STATUS",
        "ID", "PERIOD", "STARTED", "FINISHED"
    );
    for record in &records {
        let finished = record
            .finished_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>8}  {:<10}  {:<19}  {:<19}  {}",
            record.id,
            record.period.display_date(),
            record.started_at.format("%Y-%m-%d %H:%M:%S"),
            finished,
            record.status_label()
        );
    }
    Ok(())
}
