//! `validate` command: fetch and validate periods without writing anything

use std::path::PathBuf;

use super::{DateArgs, load_config};
use crate::bundle::DisabledFetcher;
use crate::cli::error::CliError;
use crate::error::LoadError;
use crate::orchestrator::LoadOrchestrator;
use crate::period::Period;
use crate::source::ConfiguredSource;

/// Validate command arguments
#[derive(Debug, Clone)]
pub struct ValidateArgs {
    pub config: PathBuf,
    pub dates: DateArgs,
}

pub fn handle_validate(args: &ValidateArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let range = args.dates.resolve(Period::today())?;
    let source = ConfiguredSource::from_config(&config)?;
    let fetcher = DisabledFetcher;
    let orchestrator = LoadOrchestrator::new(&config, &source, &fetcher);

    let mut failed = 0;
    for period in range {
        println!("{}", period.display_date());
        match orchestrator.validate_day(period) {
            Ok(batch) => {
                for outcome in &batch.outcomes {
                    let status = if outcome.accepted { "ok" } else { "REJECTED" };
                    println!(
                        "  {:<24} {:>8} row(s)  {:<8}  {} warning(s)  {} error(s)",
                        outcome.table, outcome.rows, status, outcome.warnings, outcome.diagnostics
                    );
                }
                failed += batch.rejected().count();
            }
            Err(LoadError::Validation { table, diagnostics }) => {
                println!("  {:<24} FAILED", table);
                for diagnostic in &diagnostics {
                    println!("    - {}", diagnostic);
                }
                failed += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if failed > 0 {
        return Err(CliError::ValidationFailed(failed));
    }
    println!("All tables passed validation");
    Ok(())
}
