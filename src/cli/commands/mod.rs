//! CLI command implementations

pub mod init;
pub mod run;
pub mod status;
pub mod validate;

use std::path::Path;

use crate::cli::error::CliError;
use crate::cli::logging;
use crate::config::LoaderConfig;
use crate::database::{ControlStore, DatabaseError, DuckDbStore};
use crate::period::{Period, PeriodRange};

/// Date selection shared by the period commands
#[derive(Debug, Clone, Default)]
pub struct DateArgs {
    /// Single period
    pub date: Option<String>,
    /// First period of a range
    pub start_date: Option<String>,
    /// Last period of a range; defaults to today
    pub end_date: Option<String>,
}

impl DateArgs {
    /// Resolve the flags against `today`
    pub fn resolve(&self, today: Period) -> Result<PeriodRange, CliError> {
        let parse = |raw: &Option<String>| {
            raw.as_deref()
                .map(|s| Period::parse_relative(s, today))
                .transpose()
        };
        Ok(PeriodRange::resolve(
            parse(&self.date)?,
            parse(&self.start_date)?,
            parse(&self.end_date)?,
            today,
        )?)
    }
}

/// Load the configuration file and start logging as it configures
pub(crate) fn load_config(path: &Path) -> Result<LoaderConfig, CliError> {
    if !path.exists() {
        return Err(CliError::ConfigNotFound(path.to_path_buf()));
    }
    let config = LoaderConfig::load(path)?;
    let log_file = config
        .logging
        .file
        .as_ref()
        .map(|file| config.resolve_path(file));
    logging::init(&config.logging.level, log_file.as_deref())?;
    Ok(config)
}

/// Open the control database and require an initialized control table
pub(crate) fn open_store(config: &LoaderConfig) -> Result<DuckDbStore, CliError> {
    let store = DuckDbStore::new(config.control_db_path(), &config.control.table)?;
    if !store.is_initialized()? {
        return Err(DatabaseError::NotInitialized(config.control.table.clone()).into());
    }
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn test_date_args_resolution() {
        let today = day("20240310");

        let args = DateArgs {
            date: Some("1".to_string()),
            ..Default::default()
        };
        let range = args.resolve(today).unwrap();
        assert_eq!((range.start(), range.end()), (day("20240309"), day("20240309")));

        let args = DateArgs {
            start_date: Some("01/03/2024".to_string()),
            end_date: Some("2024-03-02".to_string()),
            ..Default::default()
        };
        assert_eq!(args.resolve(today).unwrap().len(), 2);

        let args = DateArgs {
            date: Some("ontem".to_string()),
            ..Default::default()
        };
        assert!(matches!(args.resolve(today), Err(CliError::Period(_))));
    }
}
