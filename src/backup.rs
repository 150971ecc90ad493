use anyhow::{anyhow, Context};
use chrono::{DateTime, Local};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const DB_FILE_NAME: &str = "escolinha.sqlite3";
pub const BACKUPS_DIR_NAME: &str = "backups";
pub const BUNDLE_FORMAT_V1: &str = "escolinha-backup-v1";

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/escolinha.sqlite3";

#[derive(Debug, Clone)]
pub struct BackupEntry {
    pub nome: String,
    pub modificado_em: DateTime<Local>,
    pub tamanho: u64,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub sha256: String,
}

#[derive(Debug, Clone)]
pub struct RestoreSummary {
    pub format_detected: String,
}

pub fn backups_dir(workspace: &Path) -> PathBuf {
    workspace.join(BACKUPS_DIR_NAME)
}

fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

/// Copy the live database into the backup directory under a timestamped name.
/// Returns the backup filename.
pub fn create_backup(workspace: &Path, agora: DateTime<Local>) -> anyhow::Result<String> {
    let origem = db_path(workspace);
    if !origem.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            origem.to_string_lossy()
        ));
    }
    let dir = backups_dir(workspace);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create directory {}", dir.to_string_lossy()))?;
    let nome = format!("escolinha_{}.db", agora.format("%Y%m%d_%H%M%S"));
    std::fs::copy(&origem, dir.join(&nome))
        .with_context(|| format!("failed to copy database to backup {nome}"))?;
    Ok(nome)
}

/// Newest-first `.db` backups, capped at `limit` entries.
pub fn list_backups(workspace: &Path, limit: usize) -> anyhow::Result<Vec<BackupEntry>> {
    let dir = backups_dir(workspace);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<BackupEntry> = Vec::new();
    for ent in std::fs::read_dir(&dir)? {
        let ent = ent?;
        let path = ent.path();
        if !path.is_file() {
            continue;
        }
        let Some(nome) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !nome.ends_with(".db") {
            continue;
        }
        let meta = ent.metadata()?;
        entries.push(BackupEntry {
            nome: nome.to_string(),
            modificado_em: meta.modified().map(DateTime::<Local>::from)?,
            tamanho: meta.len(),
        });
    }
    entries.sort_by(|a, b| b.nome.cmp(&a.nome));
    entries.truncate(limit);
    Ok(entries)
}

/// Resolve a backup filename strictly inside the backup directory. Directory
/// components are stripped first, so traversal attempts degrade to plain
/// missing-file lookups and are indistinguishable from them.
pub fn resolve_backup(workspace: &Path, filename: &str) -> Option<PathBuf> {
    let safe_name = Path::new(filename).file_name()?;
    let dir = backups_dir(workspace);
    let path = dir.join(safe_name);
    if !path.is_file() {
        return None;
    }
    let canonical = path.canonicalize().ok()?;
    let canonical_dir = dir.canonicalize().ok()?;
    if canonical.parent() != Some(canonical_dir.as_path()) {
        return None;
    }
    Some(canonical)
}

/// Replace the workspace database with a backup file. Plain `.db` copies and
/// zip bundles are both accepted; bundles have their embedded database
/// extracted and checksum-verified.
pub fn restore_backup(workspace: &Path, backup_path: &Path) -> anyhow::Result<RestoreSummary> {
    let dst = db_path(workspace);

    if !is_zip_file(backup_path)? {
        std::fs::copy(backup_path, &dst).with_context(|| {
            format!(
                "failed to copy backup from {} to {}",
                backup_path.to_string_lossy(),
                dst.to_string_lossy()
            )
        })?;
        return Ok(RestoreSummary {
            format_detected: "sqlite3".to_string(),
        });
    }

    let in_file = File::open(backup_path)
        .with_context(|| format!("failed to open bundle {}", backup_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }
    let expected_sha = manifest
        .get("sha256")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/escolinha.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;

    if !expected_sha.is_empty() && sha256_hex(&db_bytes) != expected_sha {
        return Err(anyhow!("bundle checksum mismatch"));
    }

    let tmp_dst = workspace.join("escolinha.sqlite3.restoring");
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }
    std::fs::write(&tmp_dst, &db_bytes).with_context(|| {
        format!(
            "failed to write temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move restored database to {}",
            dst.to_string_lossy()
        )
    })?;

    Ok(RestoreSummary {
        format_detected: BUNDLE_FORMAT_V1.to_string(),
    })
}

/// Zip bundle of the live database: a manifest carrying the format tag and a
/// SHA-256 of the payload, then the database itself.
pub fn export_bundle(workspace: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let origem = db_path(workspace);
    if !origem.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            origem.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&origem)
        .with_context(|| format!("failed to read database {}", origem.to_string_lossy()))?;
    let checksum = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": Local::now().to_rfc3339(),
        "sha256": checksum,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        sha256: checksum,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
