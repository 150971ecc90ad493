#[path = "../src/backup.rs"]
mod backup;

use chrono::Local;
use std::io::Read;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[test]
fn bundle_export_and_restore_round_trip() {
    let workspace = temp_dir("escolinha-bundle-src");
    let workspace2 = temp_dir("escolinha-bundle-dst");
    let out_dir = temp_dir("escolinha-bundle-out");

    let bytes = b"sqlite-test-payload";
    std::fs::write(workspace.join(backup::DB_FILE_NAME), bytes).expect("write source db");

    let bundle_path = out_dir.join("escolinha.backup.zip");
    let export = backup::export_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.sha256.len(), 64);

    let f = std::fs::File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.sha256));
    archive
        .by_name("db/escolinha.sqlite3")
        .expect("database entry in bundle");

    let import = backup::restore_backup(&workspace2, &bundle_path).expect("restore bundle");
    assert_eq!(import.format_detected, backup::BUNDLE_FORMAT_V1);
    let restored = std::fs::read(workspace2.join(backup::DB_FILE_NAME)).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn plain_sqlite_backups_are_supported() {
    let out_dir = temp_dir("escolinha-bundle-plain");
    let workspace = temp_dir("escolinha-bundle-plain-dst");

    let plain_file = out_dir.join("escolinha_20240301_120000.db");
    let bytes = b"plain-sqlite-copy";
    std::fs::write(&plain_file, bytes).expect("write plain backup");

    let import = backup::restore_backup(&workspace, &plain_file).expect("restore plain backup");
    assert_eq!(import.format_detected, "sqlite3");
    let restored = std::fs::read(workspace.join(backup::DB_FILE_NAME)).expect("read restored db");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tampered_bundles_fail_the_checksum() {
    let workspace = temp_dir("escolinha-bundle-tamper-src");
    let workspace2 = temp_dir("escolinha-bundle-tamper-dst");
    let out_dir = temp_dir("escolinha-bundle-tamper-out");

    std::fs::write(workspace.join(backup::DB_FILE_NAME), b"original").expect("write source db");
    let bundle_path = out_dir.join("escolinha.backup.zip");
    backup::export_bundle(&workspace, &bundle_path).expect("export bundle");

    // Rebuild the bundle with the same manifest but different payload.
    let f = std::fs::File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    drop(archive);

    let tampered_path = out_dir.join("tampered.backup.zip");
    let out = std::fs::File::create(&tampered_path).expect("create tampered bundle");
    let mut writer = zip::ZipWriter::new(out);
    let opts = zip::write::FileOptions::default();
    use std::io::Write;
    writer.start_file("manifest.json", opts).expect("manifest");
    writer.write_all(manifest.as_bytes()).expect("manifest body");
    writer
        .start_file("db/escolinha.sqlite3", opts)
        .expect("db entry");
    writer.write_all(b"not-the-original").expect("db body");
    writer.finish().expect("finish zip");

    let result = backup::restore_backup(&workspace2, &tampered_path);
    assert!(result.is_err());
    assert!(result
        .err()
        .map(|e| e.to_string().contains("checksum"))
        .unwrap_or(false));

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn backup_names_carry_a_timestamp() {
    let workspace = temp_dir("escolinha-bundle-name");
    std::fs::write(workspace.join(backup::DB_FILE_NAME), b"db").expect("write db");

    let nome = backup::create_backup(&workspace, Local::now()).expect("create backup");
    assert!(nome.starts_with("escolinha_"));
    assert!(nome.ends_with(".db"));
    assert!(backup::backups_dir(&workspace).join(&nome).is_file());

    let listed = backup::list_backups(&workspace, 8).expect("list backups");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].nome, nome);

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn resolve_rejects_paths_outside_the_backup_directory() {
    let workspace = temp_dir("escolinha-bundle-resolve");
    std::fs::write(workspace.join(backup::DB_FILE_NAME), b"db").expect("write db");
    let nome = backup::create_backup(&workspace, Local::now()).expect("create backup");

    assert!(backup::resolve_backup(&workspace, &nome).is_some());
    assert!(backup::resolve_backup(&workspace, "..").is_none());
    assert!(backup::resolve_backup(&workspace, "../escolinha.sqlite3").is_none());
    assert!(backup::resolve_backup(&workspace, "missing.db").is_none());
    // Directory components are stripped, so a prefixed valid name still works.
    assert!(backup::resolve_backup(&workspace, &format!("sub/dir/{nome}")).is_some());

    let _ = std::fs::remove_dir_all(workspace);
}
