//! Local filesystem storage backend

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use super::{StorageBackend, StorageEntry, StorageError, StorageResult};

/// Storage backend rooted at a local directory
#[derive(Debug, Clone)]
pub struct FileSystemStorageBackend {
    root: PathBuf,
}

impl FileSystemStorageBackend {
    /// Create a backend rooted at `root`. The directory need not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage path below the root, rejecting `..` components
    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }
        Ok(resolved)
    }

    fn io_error(path: &str, source: std::io::Error) -> StorageError {
        if source.kind() == ErrorKind::NotFound {
            StorageError::NotFound(path.to_string())
        } else {
            StorageError::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}

impl StorageBackend for FileSystemStorageBackend {
    fn file_exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    fn dir_exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.resolve(path)?.is_dir())
    }

    fn list_entries(&self, path: &str) -> StorageResult<Vec<StorageEntry>> {
        let dir = self.resolve(path)?;
        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| Self::io_error(path, e))? {
            let entry = entry.map_err(|e| Self::io_error(path, e))?;
            let is_dir = entry
                .file_type()
                .map_err(|e| Self::io_error(path, e))?
                .is_dir();
            entries.push(StorageEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort();
        Ok(entries)
    }

    fn read_file(&self, path: &str) -> StorageResult<Vec<u8>> {
        let file = self.resolve(path)?;
        if file.is_dir() {
            return Err(StorageError::UnexpectedEntry {
                path: path.to_string(),
                expected: "file",
            });
        }
        fs::read(&file).map_err(|e| Self::io_error(path, e))
    }

    fn write_file(&self, path: &str, content: &[u8]) -> StorageResult<()> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(path, e))?;
        }
        fs::write(&file, content).map_err(|e| Self::io_error(path, e))
    }

    fn create_dir(&self, path: &str) -> StorageResult<()> {
        let dir = self.resolve(path)?;
        fs::create_dir_all(&dir).map_err(|e| Self::io_error(path, e))
    }

    fn delete_file(&self, path: &str) -> StorageResult<()> {
        let file = self.resolve(path)?;
        fs::remove_file(&file).map_err(|e| Self::io_error(path, e))
    }

    fn delete_dir(&self, path: &str) -> StorageResult<()> {
        let dir = self.resolve(path)?;
        if !dir.is_dir() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        let has_children = fs::read_dir(&dir)
            .map_err(|e| Self::io_error(path, e))?
            .next()
            .is_some();
        if has_children {
            return Err(StorageError::DirectoryNotEmpty(path.to_string()));
        }
        fs::remove_dir(&dir).map_err(|e| Self::io_error(path, e))
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_creates_parents_and_lists_sorted() {
        let dir = tempdir().unwrap();
        let storage = FileSystemStorageBackend::new(dir.path());

        storage.write_file("/20240101/b.txt", b"b").unwrap();
        storage.write_file("20240101/a.txt", b"a").unwrap();
        storage.create_dir("20240101/sub").unwrap();

        let entries = storage.list_entries("20240101").unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert!(entries[2].is_dir);
        assert_eq!(storage.list_files("20240101").unwrap(), vec!["a.txt", "b.txt"]);
        assert_eq!(storage.read_file("20240101/a.txt").unwrap(), b"a");
    }

    #[test]
    fn test_parent_components_rejected() {
        let dir = tempdir().unwrap();
        let storage = FileSystemStorageBackend::new(dir.path());
        assert!(matches!(
            storage.read_file("../etc/passwd"),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_delete_dir_requires_empty() {
        let dir = tempdir().unwrap();
        let storage = FileSystemStorageBackend::new(dir.path());
        storage.write_file("d/f.txt", b"x").unwrap();

        assert!(matches!(
            storage.delete_dir("d"),
            Err(StorageError::DirectoryNotEmpty(_))
        ));
        storage.delete_file("d/f.txt").unwrap();
        storage.delete_dir("d").unwrap();
        assert!(!storage.dir_exists("d").unwrap());
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = FileSystemStorageBackend::new(dir.path());
        assert!(matches!(
            storage.read_file("nope.txt"),
            Err(StorageError::NotFound(_))
        ));
    }
}
