use serde_json::json;
use uuid::Uuid;

use crate::auth::Capability;
use crate::ipc::helpers::{db_conn, require_capability, respond, trimmed_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;

struct TurmaForm {
    nome: String,
    categoria: String,
    dias_horario: String,
    local_treino: String,
}

fn parse_turma_form(params: &serde_json::Value) -> Result<TurmaForm, HandlerErr> {
    let nome = trimmed_str(params, "nome");
    let categoria = trimmed_str(params, "categoria");
    let dias_horario = trimmed_str(params, "diasHorario");
    let local_treino = trimmed_str(params, "localTreino");

    if nome.is_empty() || categoria.is_empty() || dias_horario.is_empty() || local_treino.is_empty()
    {
        return Err(HandlerErr::invalid("Preencha todos os campos."));
    }

    Ok(TurmaForm {
        nome,
        categoria,
        dias_horario,
        local_treino,
    })
}

fn classes_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Turmas)?;
    let conn = db_conn(state)?;

    // Correlated subquery keeps the roster count accurate without join fanout.
    let mut stmt = conn.prepare(
        "SELECT
           t.id,
           t.nome,
           t.categoria,
           t.dias_horario,
           t.local_treino,
           (SELECT COUNT(*) FROM alunos a WHERE a.turma_id = t.id) AS aluno_count
         FROM turmas t
         ORDER BY t.nome",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "turmaId": row.get::<_, String>(0)?,
                "nome": row.get::<_, String>(1)?,
                "categoria": row.get::<_, String>(2)?,
                "diasHorario": row.get::<_, String>(3)?,
                "localTreino": row.get::<_, String>(4)?,
                "alunoCount": row.get::<_, i64>(5)?,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(json!({ "turmas": rows }))
}

fn classes_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Turmas)?;
    let conn = db_conn(state)?;
    let form = parse_turma_form(&req.params)?;

    let turma_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO turmas(id, nome, categoria, dias_horario, local_treino, created_at)
         VALUES(?, ?, ?, ?, ?, datetime('now'))",
        (
            &turma_id,
            &form.nome,
            &form.categoria,
            &form.dias_horario,
            &form.local_treino,
        ),
    )?;
    Ok(json!({ "turmaId": turma_id, "nome": form.nome }))
}

fn classes_update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Turmas)?;
    let conn = db_conn(state)?;
    let turma_id = trimmed_str(&req.params, "turmaId");

    if store::get_turma(conn, &turma_id)?.is_none() {
        return Err(HandlerErr::not_found("turma not found"));
    }

    let form = parse_turma_form(&req.params)?;
    conn.execute(
        "UPDATE turmas SET nome = ?, categoria = ?, dias_horario = ?, local_treino = ? WHERE id = ?",
        (
            &form.nome,
            &form.categoria,
            &form.dias_horario,
            &form.local_treino,
            &turma_id,
        ),
    )?;
    Ok(json!({ "turmaId": turma_id }))
}

fn classes_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Turmas)?;
    let conn = db_conn(state)?;
    let turma_id = trimmed_str(&req.params, "turmaId");

    if store::get_turma(conn, &turma_id)?.is_none() {
        return Err(HandlerErr::not_found("turma not found"));
    }

    // Students survive the turma: detach them, then remove the turma and its
    // attendance history.
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE alunos SET turma_id = NULL WHERE turma_id = ?",
        [&turma_id],
    )?;
    tx.execute("DELETE FROM presencas WHERE turma_id = ?", [&turma_id])?;
    tx.execute("DELETE FROM turmas WHERE id = ?", [&turma_id])?;
    tx.commit()?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(respond(&req.id, classes_list(state, req))),
        "classes.create" => Some(respond(&req.id, classes_create(state, req))),
        "classes.update" => Some(respond(&req.id, classes_update(state, req))),
        "classes.delete" => Some(respond(&req.id, classes_delete(state, req))),
        _ => None,
    }
}
