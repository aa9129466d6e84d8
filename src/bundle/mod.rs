//! Per-entity file bundles
//!
//! For each entity the bundler gathers the files listed in the manifest
//! (local files, whole directories, HTTP resources) into a scratch folder,
//! zips the folder into `<entity_id>.zip` and removes the folder. Failures
//! on a single manifest entry are logged and the entry is skipped; only
//! storage and archive failures on the bundle itself are returned.

pub mod archive;
pub mod fetch;
pub mod tree;

pub use fetch::{DisabledFetcher, FetchError, HttpOptions, RemoteFetcher, default_fetcher};
#[cfg(feature = "http-fetch")]
pub use fetch::HttpFetcher;
pub use tree::{copy_dir, mirror_tree, remove_tree};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{FileManifestEntry, Locator, RowSet};
use crate::storage::{StorageBackend, StorageError, copy_file, join_path};

/// Error type for bundling and tree operations
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Invalid entity id '{0}' for a bundle name")]
    InvalidEntityId(String),

    #[error("Unexpected nested directory {0} in a flat period tree")]
    NestedDirectory(String),

    #[error("Manifest column '{0}' not found")]
    MissingManifestColumn(String),
}

/// A built archive waiting in the scratch area
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleInfo {
    pub entity_id: String,
    /// `<entity_id>.zip`
    pub file_name: String,
    /// Number of manifest entries that made it into the archive
    pub entries: usize,
    pub size: u64,
    pub sha256: String,
}

/// Builds per-entity archives
pub struct FileBundler<'a> {
    fetcher: &'a dyn RemoteFetcher,
}

impl<'a> FileBundler<'a> {
    pub fn new(fetcher: &'a dyn RemoteFetcher) -> Self {
        Self { fetcher }
    }

    /// Build `<entity_id>.zip` in the root of `scratch`.
    ///
    /// Returns `None` when no manifest entry could be materialized; no
    /// archive is written in that case.
    pub fn build_bundle(
        &self,
        entity_id: &str,
        entries: &[FileManifestEntry],
        source: &dyn StorageBackend,
        scratch: &dyn StorageBackend,
    ) -> Result<Option<BundleInfo>, BundleError> {
        validate_entity_id(entity_id)?;
        let folder = entity_id.to_string();
        remove_tree(scratch, &folder)?;
        scratch.create_dir(&folder)?;

        let mut materialized = 0;
        for entry in entries {
            if self.materialize(entry, source, scratch, &folder) {
                materialized += 1;
            }
        }

        if materialized == 0 {
            info!("No files could be gathered for entity {}; no archive built", entity_id);
            remove_tree(scratch, &folder)?;
            return Ok(None);
        }

        let bytes = archive::zip_tree(scratch, &folder)?;
        let file_name = format!("{}.zip", entity_id);
        scratch.write_file(&file_name, &bytes)?;
        remove_tree(scratch, &folder)?;

        let bundle = BundleInfo {
            entity_id: entity_id.to_string(),
            file_name,
            entries: materialized,
            size: bytes.len() as u64,
            sha256: archive::compute_hash(&bytes),
        };
        info!(
            "Built {} ({} entries, {} bytes, sha256 {})",
            bundle.file_name, bundle.entries, bundle.size, bundle.sha256
        );
        Ok(Some(bundle))
    }

    /// Move a built archive from `scratch` into `dest_dir` on `dest`.
    ///
    /// Returns the destination path.
    pub fn deliver(
        &self,
        bundle: &BundleInfo,
        scratch: &dyn StorageBackend,
        dest: &dyn StorageBackend,
        dest_dir: &str,
    ) -> Result<String, BundleError> {
        let target = join_path(dest_dir, &bundle.file_name);
        copy_file(scratch, &bundle.file_name, dest, &target)?;
        scratch.delete_file(&bundle.file_name)?;
        debug!("Delivered {} to {}", bundle.file_name, dest.describe());
        Ok(target)
    }

    /// Copy or download one entry into the entity folder. Returns whether
    /// anything was written.
    fn materialize(
        &self,
        entry: &FileManifestEntry,
        source: &dyn StorageBackend,
        scratch: &dyn StorageBackend,
        folder: &str,
    ) -> bool {
        let Some(name) = entry.locator.final_segment() else {
            warn!(
                "Cannot derive a file name from '{}' (entity {}); skipping",
                entry.locator, entry.entity_id
            );
            return false;
        };
        let target = join_path(folder, &name);

        let outcome: Result<bool, String> = match &entry.locator {
            Locator::Url(url) => match self.fetcher.fetch(url) {
                Ok(content) => scratch
                    .write_file(&target, &content)
                    .map(|_| true)
                    .map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            },
            Locator::Path(path) => copy_local(entry.is_directory, path, source, scratch, &target),
        };

        match outcome {
            Ok(true) => {
                debug!("Gathered {} for entity {}", entry.locator, entry.entity_id);
                true
            }
            Ok(false) => {
                warn!(
                    "File {} for entity {} not found; skipping",
                    entry.locator, entry.entity_id
                );
                false
            }
            Err(message) => {
                warn!(
                    "Failed to gather {} for entity {}: {}",
                    entry.locator, entry.entity_id, message
                );
                false
            }
        }
    }
}

fn copy_local(
    is_directory: bool,
    path: &str,
    source: &dyn StorageBackend,
    scratch: &dyn StorageBackend,
    target: &str,
) -> Result<bool, String> {
    let as_dir = is_directory || source.dir_exists(path).map_err(|e| e.to_string())?;
    if as_dir {
        if !source.dir_exists(path).map_err(|e| e.to_string())? {
            return Ok(false);
        }
        return copy_dir(source, path, scratch, target)
            .map(|_| true)
            .map_err(|e| e.to_string());
    }
    if !source.file_exists(path).map_err(|e| e.to_string())? {
        return Ok(false);
    }
    copy_file(source, path, scratch, target)
        .map(|_| true)
        .map_err(|e| e.to_string())
}

fn validate_entity_id(entity_id: &str) -> Result<(), BundleError> {
    let invalid = entity_id.is_empty()
        || entity_id == "."
        || entity_id == ".."
        || entity_id.contains(['/', '\\', ':']);
    if invalid {
        return Err(BundleError::InvalidEntityId(entity_id.to_string()));
    }
    Ok(())
}

/// Group manifest rows by entity.
///
/// `entity_column` and `locator_column` name the columns of the manifest
/// table; rows with a null entity or locator are ignored. Whether a path
/// entry is a directory is resolved against `source`.
pub fn group_manifest(
    rows: &RowSet,
    entity_column: &str,
    locator_column: &str,
    source: &dyn StorageBackend,
) -> Result<IndexMap<String, Vec<FileManifestEntry>>, BundleError> {
    let entity_idx = rows
        .column_index(entity_column)
        .ok_or_else(|| BundleError::MissingManifestColumn(entity_column.to_string()))?;
    let locator_idx = rows
        .column_index(locator_column)
        .ok_or_else(|| BundleError::MissingManifestColumn(locator_column.to_string()))?;

    let mut grouped: IndexMap<String, Vec<FileManifestEntry>> = IndexMap::new();
    for row in rows.rows() {
        let (Some(entity_id), Some(raw)) =
            (row[entity_idx].lookup_key(), row[locator_idx].lookup_key())
        else {
            continue;
        };
        let locator = Locator::parse(&raw);
        let is_directory = match &locator {
            Locator::Url(_) => false,
            Locator::Path(path) => source.dir_exists(path).unwrap_or(false),
        };
        grouped
            .entry(entity_id.clone())
            .or_default()
            .push(FileManifestEntry::new(entity_id, locator, is_directory));
    }
    Ok(grouped)
}
