//! Bundle building and delivery across storage backends

use std::io::Cursor;

use period_ingest::bundle::{FetchError, FileBundler, RemoteFetcher, group_manifest};
use period_ingest::models::{RowSet, Value};
use period_ingest::storage::{FileSystemStorageBackend, StorageBackend};
use tempfile::tempdir;
use zip::ZipArchive;

struct StaticFetcher;

impl RemoteFetcher for StaticFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if url.contains("missing") {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            });
        }
        Ok(format!("downloaded from {}", url).into_bytes())
    }
}

fn manifest(rows: Vec<(i64, &str)>) -> RowSet {
    RowSet::from_rows(
        vec!["id_licitacao".to_string(), "caminho".to_string()],
        rows.into_iter()
            .map(|(id, path)| vec![Value::Int(id), Value::from(path)])
            .collect(),
    )
    .unwrap()
}

fn archive_names(bytes: Vec<u8>) -> Vec<String> {
    let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
    names.sort();
    names
}

#[test]
fn test_bundle_mixes_local_directories_and_downloads() {
    let dir = tempdir().unwrap();
    let files = FileSystemStorageBackend::new(dir.path().join("files"));
    let scratch = FileSystemStorageBackend::new(dir.path().join("scratch"));
    let dest = FileSystemStorageBackend::new(dir.path().join("dest"));
    files.write_file("processos/7/edital.pdf", b"pdf").unwrap();
    files.write_file("processos/7/anexos/planilha.csv", b"a;b").unwrap();

    let rows = manifest(vec![
        (7, "processos/7"),
        (7, "https://example.org/docs/ata.pdf?versao=2"),
        (7, "https://example.org/missing.pdf"),
        (7, "processos/7/naoexiste.pdf"),
    ]);
    let grouped = group_manifest(&rows, "id_licitacao", "caminho", &files).unwrap();
    assert!(grouped["7"][0].is_directory);

    let bundler = FileBundler::new(&StaticFetcher);
    let bundle = bundler
        .build_bundle("7", &grouped["7"], &files, &scratch)
        .unwrap()
        .unwrap();
    assert_eq!(bundle.file_name, "7.zip");
    assert_eq!(bundle.entries, 2);

    let target = bundler.deliver(&bundle, &scratch, &dest, "20240105").unwrap();
    assert_eq!(target, "20240105/7.zip");
    assert!(!scratch.file_exists("7.zip").unwrap());
    assert!(!scratch.dir_exists("7").unwrap());

    let bytes = dest.read_file(&target).unwrap();
    assert_eq!(bytes.len() as u64, bundle.size);
    assert_eq!(
        archive_names(bytes),
        vec!["7/anexos/planilha.csv", "7/edital.pdf", "ata.pdf"]
    );
}

#[test]
fn test_entity_without_any_file_gets_no_archive() {
    let dir = tempdir().unwrap();
    let files = FileSystemStorageBackend::new(dir.path().join("files"));
    let scratch = FileSystemStorageBackend::new(dir.path().join("scratch"));
    files.create_dir("").unwrap();

    let rows = manifest(vec![(3, "ausente.pdf"), (3, "https://example.org/missing.pdf")]);
    let grouped = group_manifest(&rows, "id_licitacao", "caminho", &files).unwrap();

    let bundler = FileBundler::new(&StaticFetcher);
    let bundle = bundler
        .build_bundle("3", &grouped["3"], &files, &scratch)
        .unwrap();
    assert!(bundle.is_none());
    assert!(!scratch.file_exists("3.zip").unwrap());
    assert!(!scratch.dir_exists("3").unwrap());
}
