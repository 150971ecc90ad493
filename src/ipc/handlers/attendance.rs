use serde_json::json;
use std::collections::HashSet;
use uuid::Uuid;

use crate::auth::Capability;
use crate::ipc::helpers::{
    db_conn, optional_str, require_capability, respond, str_list, trimmed_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store;
use crate::almanac;

const HISTORICO_LIMIT: i64 = 12;

fn sheet_open(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Presencas)?;
    let conn = db_conn(state)?;

    let data = almanac::parse_date(optional_str(&req.params, "data").as_deref())
        .unwrap_or_else(almanac::today);
    let turma_id = optional_str(&req.params, "turmaId").filter(|s| !s.is_empty());

    let turmas: Vec<serde_json::Value> = store::list_turmas(conn)?
        .iter()
        .map(|t| json!({ "turmaId": t.id, "nome": t.nome }))
        .collect();

    let mut turma_selecionada = serde_json::Value::Null;
    let mut registros: Vec<serde_json::Value> = Vec::new();
    if let Some(turma_id) = turma_id {
        let Some(turma) = store::get_turma(conn, &turma_id)? else {
            return Err(HandlerErr::not_found("turma not found"));
        };
        let marcadas = store::presencas_da_data(conn, data)?;
        registros = store::alunos_da_turma(conn, &turma.id)?
            .iter()
            .map(|aluno| {
                json!({
                    "alunoId": aluno.id,
                    "nome": aluno.nome,
                    "status": aluno.status,
                    "presente": marcadas.get(&aluno.id).copied().unwrap_or(false),
                })
            })
            .collect();
        turma_selecionada = json!({ "turmaId": turma.id, "nome": turma.nome });
    }

    let historico: Vec<serde_json::Value> = store::recent_presencas(conn, HISTORICO_LIMIT)?
        .iter()
        .map(|registro| {
            json!({
                "data": almanac::format_iso(registro.data),
                "turma": registro.turma,
                "aluno": registro.aluno,
                "presente": registro.presente,
            })
        })
        .collect();

    Ok(json!({
        "turmas": turmas,
        "turmaSelecionada": turma_selecionada,
        "data": almanac::format_iso(data),
        "registros": registros,
        "historico": historico,
    }))
}

/// One presenca row per student in the turma for the submitted date. Absence
/// is recorded explicitly (presente = false), so history can tell "marked
/// absent" apart from "never recorded".
fn record(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Presencas)?;
    let conn = db_conn(state)?;

    let turma_id = trimmed_str(&req.params, "turmaId");
    let Some(turma) = store::get_turma(conn, &turma_id)? else {
        return Err(HandlerErr::not_found("turma not found"));
    };
    let data = almanac::parse_date(optional_str(&req.params, "data").as_deref())
        .unwrap_or_else(almanac::today);
    let presentes: HashSet<String> = str_list(&req.params, "presentIds").into_iter().collect();

    let alunos = store::alunos_da_turma(conn, &turma.id)?;

    let tx = conn.unchecked_transaction()?;
    let mut gravados = 0usize;
    for aluno in &alunos {
        let presente = presentes.contains(&aluno.id);
        tx.execute(
            "INSERT INTO presencas(id, data, presente, aluno_id, turma_id, created_at)
             VALUES(?, ?, ?, ?, ?, datetime('now'))
             ON CONFLICT(data, aluno_id) DO UPDATE SET
               presente = excluded.presente,
               turma_id = excluded.turma_id",
            (
                Uuid::new_v4().to_string(),
                almanac::format_iso(data),
                presente as i64,
                &aluno.id,
                &turma.id,
            ),
        )
        .map_err(|_| {
            HandlerErr::new(
                "conflict",
                "Não foi possível salvar as presenças. Tente novamente.",
            )
        })?;
        gravados += 1;
    }
    tx.commit()?;

    Ok(json!({
        "turmaId": turma.id,
        "data": almanac::format_iso(data),
        "registros": gravados,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.sheetOpen" => Some(respond(&req.id, sheet_open(state, req))),
        "attendance.record" => Some(respond(&req.id, record(state, req))),
        _ => None,
    }
}
