//! Period load orchestration
//!
//! Drives one period at a time through its lifecycle:
//! 1. `begin_period`: consult the control store and start, resume, reload or skip
//! 2. `validate_day`: fetch every table and validate it, referenced tables first
//! 3. `persist_day`: append accepted rows to their destination tables
//! 4. `publish_period`: deliver bundles and the metadata export
//! 5. `complete_period`: mark the control record finished
//! 6. `sync_files`: mirror the period directory from the results storage
//!
//! Validation and persistence errors end the run. Bundle entries that cannot
//! be gathered, and mirror failures for a single day, are logged and skipped.

pub mod stats;

pub use stats::RunStats;

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::bundle::{
    BundleError, BundleInfo, FileBundler, RemoteFetcher, group_manifest, mirror_tree, remove_tree,
};
use crate::config::{LoaderConfig, MirrorSection, PublishSection, TableConfig};
use crate::database::{ControlStore, transaction};
use crate::error::{LoadError, LoadResult};
use crate::export::MetadataExporter;
use crate::models::{ControlRecord, RowSet, Value};
use crate::period::{Period, PeriodRange};
use crate::source::{RowSource, SourceError};
use crate::storage::{FileSystemStorageBackend, StorageBackend, join_path};
use crate::validation::{ValidationContext, ValidationEngine};

/// How `begin_period` resolved the control record of a period
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeriodStart {
    /// First load of the period
    Started(ControlRecord),
    /// The previous load never finished; its rows were purged
    Resumed {
        previous: ControlRecord,
        record: ControlRecord,
    },
    /// The period was finished and overwrite was requested; its rows were purged
    Reloaded {
        previous: ControlRecord,
        record: ControlRecord,
    },
    /// The period is already loaded
    Skipped(ControlRecord),
}

impl PeriodStart {
    /// The fresh record to load under, `None` when skipped
    pub fn record(&self) -> Option<&ControlRecord> {
        match self {
            PeriodStart::Started(record)
            | PeriodStart::Resumed { record, .. }
            | PeriodStart::Reloaded { record, .. } => Some(record),
            PeriodStart::Skipped(_) => None,
        }
    }
}

/// Validation outcome of one table for one period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOutcome {
    pub table: String,
    pub rows: usize,
    pub accepted: bool,
    pub warnings: usize,
    pub diagnostics: usize,
}

/// Accepted batches of one period plus the per-table outcomes
#[derive(Debug, Clone, Default)]
pub struct DayBatch {
    /// Accepted batches, keyed by table name
    pub context: ValidationContext,
    /// One entry per configured table, in validation order
    pub outcomes: Vec<TableOutcome>,
}

impl DayBatch {
    /// Tables excluded after a failed non-required validation
    pub fn rejected(&self) -> impl Iterator<Item = &TableOutcome> {
        self.outcomes.iter().filter(|o| !o.accepted)
    }
}

/// Result of `publish_period`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// No `[publish]` section
    Disabled,
    /// Already published and overwrite was not requested
    Skipped,
    Published {
        bundles: Vec<BundleInfo>,
        records: usize,
    },
}

/// Result of `sync_files`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// No `[mirror]` section
    Disabled,
    /// The mirror already carries the period marker
    Skipped,
    /// The source has no directory for the period
    MissingSource,
    /// Number of files copied
    Copied(usize),
    /// The day's sync failed and was skipped
    Failed(String),
}

/// Storage used by the publish step
pub struct PublishTargets {
    /// Root that local manifest paths resolve against
    pub files: Box<dyn StorageBackend>,
    /// Where bundles are built
    pub scratch: Box<dyn StorageBackend>,
    /// Publish destination holding `<period>/` and `<period>.ok`
    pub destination: Box<dyn StorageBackend>,
}

impl PublishTargets {
    /// Local filesystem targets for a `[publish]` section
    pub fn from_section(section: &PublishSection, config: &LoaderConfig) -> Self {
        Self {
            files: Box::new(FileSystemStorageBackend::new(
                config.resolve_path(&section.files_root),
            )),
            scratch: Box::new(FileSystemStorageBackend::new(
                config.resolve_path(&section.scratch_dir),
            )),
            destination: Box::new(FileSystemStorageBackend::new(
                config.resolve_path(&section.destination),
            )),
        }
    }
}

/// Storage used by the mirror step
pub struct MirrorTargets {
    pub source: Box<dyn StorageBackend>,
    /// Directory below the source root that holds `<period>/`
    pub source_prefix: String,
    pub destination: Box<dyn StorageBackend>,
}

impl MirrorTargets {
    /// Local filesystem targets for a `[mirror]` section
    pub fn from_section(section: &MirrorSection, config: &LoaderConfig) -> Self {
        Self {
            source: Box::new(FileSystemStorageBackend::new(
                config.resolve_path(&section.source),
            )),
            source_prefix: section.source_prefix.clone(),
            destination: Box::new(FileSystemStorageBackend::new(
                config.resolve_path(&section.destination),
            )),
        }
    }
}

/// Runs periods against a control store, sources and storage targets
pub struct LoadOrchestrator<'a> {
    config: &'a LoaderConfig,
    source: &'a dyn RowSource,
    fetcher: &'a dyn RemoteFetcher,
    store: Option<&'a dyn ControlStore>,
    publish: Option<PublishTargets>,
    mirror: Option<MirrorTargets>,
    overwrite: bool,
    engine: ValidationEngine,
}

impl<'a> LoadOrchestrator<'a> {
    /// Orchestrator without a control store. Publish and mirror targets
    /// come from the configuration sections, when present.
    pub fn new(
        config: &'a LoaderConfig,
        source: &'a dyn RowSource,
        fetcher: &'a dyn RemoteFetcher,
    ) -> Self {
        Self {
            config,
            source,
            fetcher,
            store: None,
            publish: config
                .publish
                .as_ref()
                .map(|s| PublishTargets::from_section(s, config)),
            mirror: config
                .mirror
                .as_ref()
                .map(|s| MirrorTargets::from_section(s, config)),
            overwrite: false,
            engine: ValidationEngine::new(),
        }
    }

    pub fn with_store(mut self, store: &'a dyn ControlStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Replace the publish targets; requires a `[publish]` section
    pub fn with_publish_targets(mut self, targets: PublishTargets) -> Self {
        self.publish = Some(targets);
        self
    }

    /// Replace the mirror targets
    pub fn with_mirror_targets(mut self, targets: MirrorTargets) -> Self {
        self.mirror = Some(targets);
        self
    }

    fn store(&self) -> LoadResult<&'a dyn ControlStore> {
        self.store
            .ok_or_else(|| LoadError::Configuration("no control store configured".to_string()))
    }

    /// Resolve the control record for `period` in one transaction.
    ///
    /// A period with no record is started. A finished period is skipped
    /// unless overwrite is set. An unfinished period, or a finished one
    /// under overwrite, has its rows deleted from every destination table
    /// before a fresh record is inserted.
    pub fn begin_period(&self, period: Period) -> LoadResult<PeriodStart> {
        let store = self.store()?;
        let destinations = self.config.destination_tables();
        let period_column = self.config.control.period_column.as_str();
        let overwrite = self.overwrite;
        let now = Local::now().naive_local();

        let start = transaction(store, |tx| {
            let previous = match tx.latest_record(period)? {
                None => return Ok(PeriodStart::Started(tx.insert_record(period, now)?)),
                Some(previous) if previous.is_finished() && !overwrite => {
                    return Ok(PeriodStart::Skipped(previous));
                }
                Some(previous) => previous,
            };

            for table in &destinations {
                let deleted = tx.delete_period_rows(table, period_column, period)?;
                debug!("Deleted {} row(s) of {} from {}", deleted, period, table);
            }
            let record = tx.insert_record(period, now)?;
            Ok(if previous.is_finished() {
                PeriodStart::Reloaded { previous, record }
            } else {
                PeriodStart::Resumed { previous, record }
            })
        })?;

        match &start {
            PeriodStart::Started(record) => {
                info!("Loading {} (control id {})", period.display_date(), record.id)
            }
            PeriodStart::Resumed { previous, record } => warn!(
                "Load {} of {} never finished; its rows were removed and the period restarts as load {}",
                previous.id,
                period.display_date(),
                record.id
            ),
            PeriodStart::Reloaded { previous, record } => info!(
                "Overwriting load {} of {} with load {}",
                previous.id,
                period.display_date(),
                record.id
            ),
            PeriodStart::Skipped(previous) => warn!(
                "{} was already loaded (control id {}); skipping. Use --overwrite to reload it",
                period.display_date(),
                previous.id
            ),
        }
        Ok(start)
    }

    /// Mark `record` finished
    pub fn complete_period(&self, record: &ControlRecord) -> LoadResult<()> {
        let store = self.store()?;
        let now = Local::now().naive_local();
        transaction(store, |tx| tx.finish_record(record.id, now))?;
        info!(
            "Finished {} (control id {})",
            record.period.display_date(),
            record.id
        );
        Ok(())
    }

    /// Fetch and validate every configured table for `period`.
    ///
    /// Tables are visited so that referenced tables come first. A required
    /// table with diagnostics fails the run with all of them; a non-required
    /// one is logged and left out of the batch. An empty batch is accepted
    /// without validation.
    pub fn validate_day(&self, period: Period) -> LoadResult<DayBatch> {
        let order = self
            .config
            .schemas()
            .validation_order(&self.config.table_names())?;
        let mut batch = DayBatch::default();

        for name in &order {
            let Some(table) = self.config.table(name) else {
                continue;
            };
            let rows = self.source.fetch(table, period)?;

            let mut outcome = TableOutcome {
                table: table.name.clone(),
                rows: rows.len(),
                accepted: true,
                warnings: 0,
                diagnostics: 0,
            };

            if table.validate && rows.is_empty() {
                debug!(
                    "Table '{}' has no rows for {}; nothing to validate",
                    table.name,
                    period.display_date()
                );
            } else if table.validate
                && let Some(entry) = self.config.schemas().get(&table.name)
            {
                let report = self
                    .engine
                    .validate(&table.name, &rows, entry, &batch.context);
                for warning in &report.warnings {
                    warn!("[{}] {}", table.name, warning);
                }
                outcome.warnings = report.warnings.len();
                outcome.diagnostics = report.diagnostics.len();

                if !report.is_accepted() {
                    for diagnostic in &report.diagnostics {
                        error!("[{}] {}", table.name, diagnostic);
                    }
                    if table.required {
                        return Err(LoadError::Validation {
                            table: table.name.clone(),
                            diagnostics: report.diagnostics,
                        });
                    }
                    warn!(
                        "Table '{}' failed validation and will not be loaded for {}",
                        table.name,
                        period.display_date()
                    );
                    outcome.accepted = false;
                    batch.outcomes.push(outcome);
                    continue;
                }
            }

            batch.context.insert(table.name.clone(), rows);
            batch.outcomes.push(outcome);
        }
        Ok(batch)
    }

    /// Append every accepted table that has a destination, in one
    /// transaction. Returns the rows appended per destination.
    pub fn persist_day(
        &self,
        period: Period,
        record: &ControlRecord,
        batch: &DayBatch,
    ) -> LoadResult<Vec<(String, usize)>> {
        let store = self.store()?;

        let mut prepared: Vec<(String, RowSet)> = Vec::new();
        for table in &self.config.tables {
            let (Some(destination), Some(rows)) =
                (table.destination.as_ref(), batch.context.get(&table.name))
            else {
                continue;
            };
            prepared.push((
                destination.clone(),
                self.prepare_rows(table, rows, record, period)?,
            ));
        }

        let counts = transaction(store, |tx| {
            let mut counts = Vec::with_capacity(prepared.len());
            for (destination, rows) in &prepared {
                let appended = if rows.is_empty() {
                    0
                } else {
                    tx.append_rows(destination, rows)?
                };
                counts.push((destination.clone(), appended));
            }
            Ok(counts)
        })?;

        for (destination, appended) in &counts {
            info!(
                "Loaded {} row(s) into {} for {}",
                appended,
                destination,
                period.display_date()
            );
        }
        Ok(counts)
    }

    /// Reorder to the declared columns, rename them and stamp the control
    /// id and period
    fn prepare_rows(
        &self,
        table: &TableConfig,
        rows: &RowSet,
        record: &ControlRecord,
        period: Period,
    ) -> LoadResult<RowSet> {
        let rows_error = |source| SourceError::Rows {
            table: table.name.clone(),
            source,
        };

        let mut prepared = if table.columns.is_empty() {
            rows.clone()
        } else {
            let mut projected = rows.select(&table.source_columns()).map_err(rows_error)?;
            projected.rename(&table.columns).map_err(rows_error)?;
            projected
        };
        prepared.stamp(&self.config.control.control_id_column, Value::Int(record.id));
        prepared.stamp(
            &self.config.control.period_column,
            Value::Int(period.as_int()),
        );
        Ok(prepared)
    }

    /// Fetch, validate and persist one period under `record`
    pub fn load_day(&self, period: Period, record: &ControlRecord) -> LoadResult<DayBatch> {
        let batch = self.validate_day(period)?;
        self.persist_day(period, record, &batch)?;
        Ok(batch)
    }

    /// Deliver the bundles and metadata export of `period`.
    ///
    /// A destination that already holds the period marker or metadata file
    /// is left alone unless overwrite is set, in which case the marker and
    /// period directory are removed first.
    pub fn publish_period(&self, period: Period, batch: &DayBatch) -> LoadResult<PublishOutcome> {
        let (Some(section), Some(targets)) = (self.config.publish.as_ref(), self.publish.as_ref())
        else {
            return Ok(PublishOutcome::Disabled);
        };
        let key = period.key();
        let marker = marker_path(period);
        let metadata_path = join_path(&key, &section.metadata_file);
        let dest = targets.destination.as_ref();

        if !self.overwrite && (dest.file_exists(&marker)? || dest.file_exists(&metadata_path)?) {
            warn!(
                "{} was already published to {}; skipping. Use --overwrite to publish it again",
                period.display_date(),
                dest.describe()
            );
            return Ok(PublishOutcome::Skipped);
        }
        if self.overwrite {
            if dest.file_exists(&marker)? {
                dest.delete_file(&marker)?;
            }
            remove_tree(dest, &key)?;
        }

        let main = batch.context.get(&section.main_table).ok_or_else(|| {
            LoadError::Publish(format!(
                "main table '{}' has no accepted rows for {}",
                section.main_table,
                period.display_date()
            ))
        })?;

        let bundles = self.deliver_bundles(section, targets, batch, main, &key)?;

        let nested_names = self.nested_tables(section);
        let mut nested: Vec<(&str, &RowSet)> = Vec::new();
        for name in &nested_names {
            match batch.context.get(name) {
                Some(rows) => nested.push((name.as_str(), rows)),
                None => warn!("Table '{}' is not available and is left out of the export", name),
            }
        }
        let export = MetadataExporter::new(section.entity_column.as_str()).export(
            &section.main_table,
            main,
            &nested,
        )?;
        dest.write_file(&metadata_path, export.content.as_bytes())?;
        dest.write_file(&join_path("logs", &format!("{}.csv", key)), &period_log(batch)?)?;
        dest.write_file(&marker, b"")?;

        info!(
            "Published {} record(s) and {} bundle(s) for {} to {}",
            export.records,
            bundles.len(),
            period.display_date(),
            dest.describe()
        );
        Ok(PublishOutcome::Published {
            bundles,
            records: export.records,
        })
    }

    fn nested_tables(&self, section: &PublishSection) -> Vec<String> {
        if !section.nested_tables.is_empty() {
            return section.nested_tables.clone();
        }
        self.config
            .tables
            .iter()
            .map(|t| t.name.clone())
            .filter(|n| *n != section.main_table && Some(n) != section.manifest_table.as_ref())
            .collect()
    }

    fn deliver_bundles(
        &self,
        section: &PublishSection,
        targets: &PublishTargets,
        batch: &DayBatch,
        main: &RowSet,
        dest_dir: &str,
    ) -> LoadResult<Vec<BundleInfo>> {
        let Some(manifest_table) = &section.manifest_table else {
            return Ok(Vec::new());
        };
        let Some(manifest) = batch.context.get(manifest_table) else {
            warn!(
                "Manifest table '{}' is not available; no bundles built",
                manifest_table
            );
            return Ok(Vec::new());
        };

        let files = targets.files.as_ref();
        let scratch = targets.scratch.as_ref();
        let grouped = group_manifest(
            manifest,
            &section.entity_column,
            &section.locator_column,
            files,
        )?;

        // Only entities with a metadata record get an archive
        let entities = main.distinct_keys(&section.entity_column);
        let bundler = FileBundler::new(self.fetcher);
        let mut bundles = Vec::new();
        for (entity_id, entries) in &grouped {
            if !entities.contains(entity_id) {
                warn!(
                    "Entity {} has {} manifest entr(ies) but no row in '{}'; no archive built",
                    entity_id,
                    entries.len(),
                    section.main_table
                );
                continue;
            }
            if let Some(bundle) = bundler.build_bundle(entity_id, entries, files, scratch)? {
                bundler.deliver(&bundle, scratch, targets.destination.as_ref(), dest_dir)?;
                bundles.push(bundle);
            }
        }
        Ok(bundles)
    }

    /// Mirror the source period directory into the local destination.
    ///
    /// Never fails the run: errors are logged and reported as
    /// [`MirrorOutcome::Failed`].
    pub fn sync_files(&self, period: Period) -> MirrorOutcome {
        let Some(targets) = &self.mirror else {
            return MirrorOutcome::Disabled;
        };
        match self.try_sync(targets, period) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "File sync for {} failed: {}. Skipping the day",
                    period.display_date(),
                    e
                );
                MirrorOutcome::Failed(e.to_string())
            }
        }
    }

    fn try_sync(&self, targets: &MirrorTargets, period: Period) -> Result<MirrorOutcome, BundleError> {
        let key = period.key();
        let marker = marker_path(period);
        let dest = targets.destination.as_ref();

        if !self.overwrite && dest.file_exists(&marker)? {
            warn!(
                "Files of {} were already synchronized; skipping. Use --overwrite to copy them again",
                period.display_date()
            );
            return Ok(MirrorOutcome::Skipped);
        }

        let source_dir = join_path(&targets.source_prefix, &key);
        if !targets.source.dir_exists(&source_dir)? {
            warn!(
                "No files for {} in {}",
                period.display_date(),
                targets.source.describe()
            );
            return Ok(MirrorOutcome::MissingSource);
        }

        if dest.file_exists(&marker)? {
            dest.delete_file(&marker)?;
        }
        remove_tree(dest, &key)?;
        let copied = mirror_tree(targets.source.as_ref(), &source_dir, dest, &key)?;
        dest.write_file(&marker, b"")?;

        info!(
            "Synchronized {} file(s) for {} into {}",
            copied,
            period.display_date(),
            dest.describe()
        );
        Ok(MirrorOutcome::Copied(copied))
    }

    /// Process every period of `range` in ascending order
    pub fn run(&self, range: PeriodRange) -> LoadResult<RunStats> {
        let started = Instant::now();
        let mut stats = RunStats::new();
        info!(
            "Processing {} period(s) from {} to {}",
            range.len(),
            range.start().display_date(),
            range.end().display_date()
        );
        if let Some(store) = self.store {
            debug!("Control store backend: {}", store.backend_type());
        }

        for period in range {
            self.run_period(period, &mut stats)?;
        }

        stats.duration = started.elapsed();
        info!(
            "Run finished in {}: {} processed, {} skipped, {} row(s) loaded, {} bundle(s), {} file(s) mirrored",
            stats.duration_string(),
            stats.periods_processed,
            stats.periods_skipped,
            stats.rows_persisted,
            stats.bundles.len(),
            stats.files_mirrored
        );
        Ok(stats)
    }

    fn run_period(&self, period: Period, stats: &mut RunStats) -> LoadResult<()> {
        let record = match self.store {
            Some(_) => match self.begin_period(period)? {
                PeriodStart::Skipped(_) => {
                    stats.periods_skipped += 1;
                    self.mirror_into(period, stats);
                    return Ok(());
                }
                PeriodStart::Started(record) => Some(record),
                PeriodStart::Resumed { record, .. } => {
                    stats.periods_resumed += 1;
                    Some(record)
                }
                PeriodStart::Reloaded { record, .. } => {
                    stats.periods_reloaded += 1;
                    Some(record)
                }
            },
            None => None,
        };

        if record.is_some() || self.publish.is_some() {
            let batch = self.validate_day(period)?;
            for rejected in batch.rejected() {
                stats.tables_rejected += 1;
                stats.add_error(format!(
                    "{}: table '{}' rejected with {} error(s)",
                    period, rejected.table, rejected.diagnostics
                ));
            }

            if let Some(record) = &record {
                for (destination, appended) in self.persist_day(period, record, &batch)? {
                    stats.add_rows(&destination, appended);
                }
            }
            if let PublishOutcome::Published { bundles, .. } = self.publish_period(period, &batch)? {
                stats.bundles.extend(bundles);
            }
            if let Some(record) = &record {
                self.complete_period(record)?;
            }
            stats.periods_processed += 1;
        }

        self.mirror_into(period, stats);
        Ok(())
    }

    fn mirror_into(&self, period: Period, stats: &mut RunStats) {
        match self.sync_files(period) {
            MirrorOutcome::Copied(n) => stats.files_mirrored += n,
            MirrorOutcome::Failed(message) => stats.add_error(format!("{}: {}", period, message)),
            _ => {}
        }
    }
}

fn marker_path(period: Period) -> String {
    format!("{}.ok", period.key())
}

/// `table;rows;status;warnings;errors` per table
fn period_log(batch: &DayBatch) -> LoadResult<Vec<u8>> {
    let csv_error = |e: csv::Error| LoadError::Publish(format!("Failed to write period log: {}", e));

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_writer(Vec::new());
    writer
        .write_record(["table", "rows", "status", "warnings", "errors"])
        .map_err(csv_error)?;
    for outcome in &batch.outcomes {
        let status = if outcome.accepted { "accepted" } else { "rejected" };
        writer
            .write_record([
                outcome.table.clone(),
                outcome.rows.to_string(),
                status.to_string(),
                outcome.warnings.to_string(),
                outcome.diagnostics.to_string(),
            ])
            .map_err(csv_error)?;
    }
    writer
        .into_inner()
        .map_err(|e| LoadError::Publish(format!("Failed to write period log: {}", e)))
}
