use chrono::Local;
use serde_json::json;
use std::path::PathBuf;

use crate::auth::Capability;
use crate::backup;
use crate::db;
use crate::ipc::helpers::{require_capability, respond, trimmed_str, HandlerErr};
use crate::ipc::types::{AppState, Request};

const LISTA_LIMIT: usize = 8;

fn workspace_path(state: &AppState) -> Result<PathBuf, HandlerErr> {
    state
        .workspace
        .clone()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn create(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Config)?;
    let workspace = workspace_path(state)?;
    let nome = backup::create_backup(&workspace, Local::now())?;
    Ok(json!({ "nome": nome }))
}

fn list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Config)?;
    let workspace = workspace_path(state)?;
    let backups: Vec<serde_json::Value> = backup::list_backups(&workspace, LISTA_LIMIT)?
        .iter()
        .map(|entry| {
            json!({
                "nome": entry.nome,
                "modificadoEm": entry.modificado_em.to_rfc3339(),
                "tamanho": entry.tamanho,
            })
        })
        .collect();
    Ok(json!({ "backups": backups }))
}

fn restore(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Config)?;
    let workspace = workspace_path(state)?;
    let filename = trimmed_str(&req.params, "filename");

    // Traversal attempts resolve to None, indistinguishable from a missing file.
    let Some(backup_path) = backup::resolve_backup(&workspace, &filename) else {
        return Err(HandlerErr::not_found("backup not found"));
    };

    // The live connection must be closed before the file is swapped out.
    state.db = None;
    let summary = backup::restore_backup(&workspace, &backup_path)?;
    let conn = db::open_db(&workspace)
        .map_err(|e| HandlerErr::new("db_open_failed", format!("{e:?}")))?;
    state.db = Some(conn);

    Ok(json!({
        "restored": backup_path
            .file_name()
            .map(|s| s.to_string_lossy().to_string()),
        "formatDetected": summary.format_detected,
    }))
}

fn export_bundle(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Config)?;
    let workspace = workspace_path(state)?;
    let out_path = trimmed_str(&req.params, "outPath");
    if out_path.is_empty() {
        return Err(HandlerErr::bad_params("missing outPath"));
    }
    let summary = backup::export_bundle(&workspace, &PathBuf::from(&out_path))?;
    Ok(json!({
        "bundleFormat": summary.bundle_format,
        "sha256": summary.sha256,
        "path": out_path,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.create" => Some(respond(&req.id, create(state, req))),
        "backup.list" => Some(respond(&req.id, list(state, req))),
        "backup.restore" => Some(respond(&req.id, restore(state, req))),
        "backup.exportBundle" => Some(respond(&req.id, export_bundle(state, req))),
        _ => None,
    }
}
