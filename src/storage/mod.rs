//! Storage backends
//!
//! Every file operation performed by the loader (source files, scratch
//! bundles, publish destination and period mirror) goes through
//! [`StorageBackend`]. Paths are `/`-separated and relative to the backend
//! root; a leading `/` is accepted and ignored.

pub mod filesystem;

pub use filesystem::FileSystemStorageBackend;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// File or directory does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Path escapes the backend root or is otherwise unusable
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A file was expected but a directory was found (or the reverse)
    #[error("Unexpected entry type at {path}: expected {expected}")]
    UnexpectedEntry { path: String, expected: &'static str },

    /// Directory could not be removed because it still has children
    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Underlying IO failure
    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One child of a listed directory
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StorageEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Capability interface over a directory tree
pub trait StorageBackend {
    /// Check whether a regular file exists at `path`
    fn file_exists(&self, path: &str) -> StorageResult<bool>;

    /// Check whether a directory exists at `path`
    fn dir_exists(&self, path: &str) -> StorageResult<bool>;

    /// Immediate children of a directory, sorted by name
    fn list_entries(&self, path: &str) -> StorageResult<Vec<StorageEntry>>;

    /// Read a whole file
    fn read_file(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Write a whole file, creating missing parent directories
    fn write_file(&self, path: &str, content: &[u8]) -> StorageResult<()>;

    /// Create a directory and any missing parents
    fn create_dir(&self, path: &str) -> StorageResult<()>;

    /// Delete a single file
    fn delete_file(&self, path: &str) -> StorageResult<()>;

    /// Delete an empty directory
    fn delete_dir(&self, path: &str) -> StorageResult<()>;

    /// Human-readable location, for log lines
    fn describe(&self) -> String;

    /// Names of the regular files directly under `path`
    fn list_files(&self, path: &str) -> StorageResult<Vec<String>> {
        Ok(self
            .list_entries(path)?
            .into_iter()
            .filter(|e| !e.is_dir)
            .map(|e| e.name)
            .collect())
    }

    /// Check whether anything exists at `path`
    fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.file_exists(path)? || self.dir_exists(path)?)
    }
}

/// Join two storage path fragments with a single `/`
pub fn join_path(base: &str, child: &str) -> String {
    let base = base.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{}/{}", base, child),
    }
}

/// Copy one file between two backends
pub fn copy_file(
    source: &dyn StorageBackend,
    source_path: &str,
    dest: &dyn StorageBackend,
    dest_path: &str,
) -> StorageResult<u64> {
    let content = source.read_file(source_path)?;
    dest.write_file(dest_path, &content)?;
    Ok(content.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("20240101", "a.zip"), "20240101/a.zip");
        assert_eq!(join_path("/20240101/", "/a.zip"), "/20240101/a.zip");
        assert_eq!(join_path("", "a.zip"), "a.zip");
        assert_eq!(join_path("dir", ""), "dir");
    }
}
