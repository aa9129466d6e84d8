//! Zip archive creation

use sha2::{Digest, Sha256};
use std::io::{Cursor, Write};
use zip::CompressionMethod;
use zip::write::{FileOptions, ZipWriter};

use super::BundleError;
use super::tree::list_tree;
use crate::storage::{StorageBackend, join_path};

/// Zip every file below `root` into an in-memory archive.
///
/// Entry names are relative to `root` and use `/` separators.
pub fn zip_tree(storage: &dyn StorageBackend, root: &str) -> Result<Vec<u8>, BundleError> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for relative in list_tree(storage, root)? {
        let content = storage.read_file(&join_path(root, &relative))?;
        writer
            .start_file(relative.as_str(), options)
            .map_err(|e| BundleError::Archive(format!("Failed to add {}: {}", relative, e)))?;
        writer
            .write_all(&content)
            .map_err(|e| BundleError::Archive(format!("Failed to write {}: {}", relative, e)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| BundleError::Archive(format!("Failed to finish archive: {}", e)))?;
    Ok(cursor.into_inner())
}

/// Hex-encoded SHA-256 of `content`
pub fn compute_hash(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemStorageBackend;
    use std::io::Read;
    use tempfile::tempdir;
    use zip::ZipArchive;

    #[test]
    fn test_zip_tree_uses_relative_names() {
        let dir = tempdir().unwrap();
        let storage = FileSystemStorageBackend::new(dir.path());
        storage.write_file("42/edital.pdf", b"pdf").unwrap();
        storage.write_file("42/anexos/planilha.csv", b"a;b").unwrap();

        let bytes = zip_tree(&storage, "42").unwrap();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["anexos/planilha.csv", "edital.pdf"]);

        let mut content = String::new();
        archive
            .by_name("anexos/planilha.csv")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "a;b");
    }

    #[test]
    fn test_compute_hash() {
        assert_eq!(
            compute_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
