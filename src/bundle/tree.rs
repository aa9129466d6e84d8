//! Directory tree operations over storage backends
//!
//! All walks use an explicit stack so deep trees cannot exhaust the call
//! stack.

use tracing::debug;

use super::BundleError;
use crate::storage::{StorageBackend, StorageResult, copy_file, join_path};

/// Copy the immediate child files of `source_path` into `dest_path`.
///
/// The source must be flat: a child directory is an error and nothing is
/// copied. Returns the number of files copied.
pub fn mirror_tree(
    source: &dyn StorageBackend,
    source_path: &str,
    dest: &dyn StorageBackend,
    dest_path: &str,
) -> Result<usize, BundleError> {
    let entries = source.list_entries(source_path)?;
    if let Some(nested) = entries.iter().find(|e| e.is_dir) {
        return Err(BundleError::NestedDirectory(join_path(
            source_path,
            &nested.name,
        )));
    }

    dest.create_dir(dest_path)?;
    for entry in &entries {
        let from = join_path(source_path, &entry.name);
        let to = join_path(dest_path, &entry.name);
        debug!("Copying {} to {}", from, to);
        copy_file(source, &from, dest, &to)?;
    }
    Ok(entries.len())
}

/// Recursively copy a directory, preserving relative paths.
///
/// Returns the number of files copied.
pub fn copy_dir(
    source: &dyn StorageBackend,
    source_path: &str,
    dest: &dyn StorageBackend,
    dest_path: &str,
) -> StorageResult<usize> {
    let mut copied = 0;
    let mut pending = vec![(source_path.to_string(), dest_path.to_string())];
    while let Some((from_dir, to_dir)) = pending.pop() {
        dest.create_dir(&to_dir)?;
        for entry in source.list_entries(&from_dir)? {
            let from = join_path(&from_dir, &entry.name);
            let to = join_path(&to_dir, &entry.name);
            if entry.is_dir {
                pending.push((from, to));
            } else {
                copy_file(source, &from, dest, &to)?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

/// Remove a file or a whole directory tree. A missing path is not an error.
///
/// Children are removed before their parent (post-order).
pub fn remove_tree(storage: &dyn StorageBackend, path: &str) -> StorageResult<()> {
    if storage.file_exists(path)? {
        return storage.delete_file(path);
    }
    if !storage.dir_exists(path)? {
        return Ok(());
    }

    let mut stack = vec![(path.to_string(), false)];
    while let Some((dir, expanded)) = stack.pop() {
        if expanded {
            storage.delete_dir(&dir)?;
            continue;
        }
        stack.push((dir.clone(), true));
        for entry in storage.list_entries(&dir)? {
            let child = join_path(&dir, &entry.name);
            if entry.is_dir {
                stack.push((child, false));
            } else {
                storage.delete_file(&child)?;
            }
        }
    }
    Ok(())
}

/// Every file below `root`, as paths relative to `root`, sorted
pub fn list_tree(storage: &dyn StorageBackend, root: &str) -> StorageResult<Vec<String>> {
    let mut files = Vec::new();
    let mut pending = vec![String::new()];
    while let Some(relative) = pending.pop() {
        let dir = join_path(root, &relative);
        for entry in storage.list_entries(&dir)? {
            let child = join_path(&relative, &entry.name);
            if entry.is_dir {
                pending.push(child);
            } else {
                files.push(child);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FileSystemStorageBackend;
    use tempfile::tempdir;

    #[test]
    fn test_mirror_flat_tree() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src = FileSystemStorageBackend::new(src_dir.path());
        let dst = FileSystemStorageBackend::new(dst_dir.path());
        src.write_file("20240101/a.zip", b"a").unwrap();
        src.write_file("20240101/b.json", b"{}").unwrap();

        let copied = mirror_tree(&src, "20240101", &dst, "20240101").unwrap();
        assert_eq!(copied, 2);
        assert_eq!(dst.read_file("20240101/b.json").unwrap(), b"{}");
    }

    #[test]
    fn test_mirror_rejects_nested_directory() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src = FileSystemStorageBackend::new(src_dir.path());
        let dst = FileSystemStorageBackend::new(dst_dir.path());
        src.write_file("20240101/sub/a.txt", b"a").unwrap();

        let err = mirror_tree(&src, "20240101", &dst, "20240101").unwrap_err();
        assert!(matches!(err, BundleError::NestedDirectory(_)));
        assert!(!dst.dir_exists("20240101").unwrap());
    }

    #[test]
    fn test_copy_dir_preserves_relative_paths() {
        let src_dir = tempdir().unwrap();
        let dst_dir = tempdir().unwrap();
        let src = FileSystemStorageBackend::new(src_dir.path());
        let dst = FileSystemStorageBackend::new(dst_dir.path());
        src.write_file("anexos/a.txt", b"a").unwrap();
        src.write_file("anexos/x/y/z.txt", b"z").unwrap();

        assert_eq!(copy_dir(&src, "anexos", &dst, "out/anexos").unwrap(), 2);
        assert_eq!(
            list_tree(&dst, "out").unwrap(),
            vec!["anexos/a.txt", "anexos/x/y/z.txt"]
        );
    }

    #[test]
    fn test_remove_deep_tree() {
        let dir = tempdir().unwrap();
        let storage = FileSystemStorageBackend::new(dir.path());
        let deep: String = (0..50).map(|i| format!("d{}/", i)).collect();
        storage.write_file(&format!("root/{}leaf.txt", deep), b"x").unwrap();
        storage.write_file("root/top.txt", b"x").unwrap();

        remove_tree(&storage, "root").unwrap();
        assert!(!storage.exists("root").unwrap());
        remove_tree(&storage, "root").unwrap();
    }
}
