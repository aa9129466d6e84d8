//! CLI binary entry point for period-ingest

#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};
#[cfg(feature = "cli")]
use period_ingest::cli::commands::{
    DateArgs,
    init::{InitArgs, handle_init},
    run::{RunArgs, handle_run},
    status::{StatusArgs, handle_status},
    validate::{ValidateArgs, handle_validate},
};
#[cfg(feature = "cli")]
use period_ingest::config::CONFIG_FILENAME;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "period-ingest")]
#[command(about = "Idempotent daily batch loader")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILENAME)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Load, publish and mirror the selected periods
    Run {
        #[command(flatten)]
        dates: DateFlags,
        /// Reload periods that were already loaded or published
        #[arg(long)]
        overwrite: bool,
    },
    /// Write a sample configuration, or create the control table
    Init {
        /// Overwrite an existing configuration file with the sample
        #[arg(short, long)]
        force: bool,
    },
    /// List control records of the selected periods
    Status {
        #[command(flatten)]
        dates: DateFlags,
    },
    /// Fetch and validate the selected periods without writing anything
    Validate {
        #[command(flatten)]
        dates: DateFlags,
    },
}

// Dates accept dd/mm/yyyy, yyyy-mm-dd, yyyymmdd or a number of days ago.
#[cfg(feature = "cli")]
#[derive(Args)]
struct DateFlags {
    /// Single period (default: today). 0 is today, 1 yesterday
    #[arg(long, conflicts_with_all = ["start_date", "end_date"])]
    date: Option<String>,
    /// First period of a range
    #[arg(long)]
    start_date: Option<String>,
    /// Last period of a range (default: today)
    #[arg(long, requires = "start_date")]
    end_date: Option<String>,
}

#[cfg(feature = "cli")]
impl From<DateFlags> for DateArgs {
    fn from(flags: DateFlags) -> Self {
        DateArgs {
            date: flags.date,
            start_date: flags.start_date,
            end_date: flags.end_date,
        }
    }
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    let config = cli.config;

    let result = match cli.command {
        Commands::Run { dates, overwrite } => {
            let args = RunArgs {
                config,
                dates: dates.into(),
                overwrite,
            };
            handle_run(&args)
        }
        Commands::Init { force } => {
            let args = InitArgs { config, force };
            handle_init(&args)
        }
        Commands::Status { dates } => {
            let args = StatusArgs {
                config,
                dates: dates.into(),
            };
            handle_status(&args)
        }
        Commands::Validate { dates } => {
            let args = ValidateArgs {
                config,
                dates: dates.into(),
            };
            handle_validate(&args)
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
