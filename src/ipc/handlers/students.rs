use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::auth::Capability;
use crate::ipc::helpers::{
    db_conn, optional_str, require_capability, respond, trimmed_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, AlunoRow};
use crate::{almanac, csv_export, money};

const MIN_IDADE: i64 = 4;
const MAX_IDADE: i64 = 18;

/// Mirrors the roster form's phone rule: the value must start with at least
/// eight characters drawn from digits, whitespace, `+`, `-` and parentheses.
fn telefone_valido(telefone: &str) -> bool {
    telefone
        .chars()
        .take_while(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '+' | '(' | ')' | '-'))
        .count()
        >= 8
}

struct StudentForm {
    nome: String,
    idade: i64,
    responsavel: String,
    telefone: String,
    turma_id: String,
    status: String,
    observacoes: String,
    data_nascimento: Option<NaiveDate>,
    valor_mensalidade: Decimal,
    projeto_social: bool,
}

fn parse_student_form(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<StudentForm, HandlerErr> {
    let nome = trimmed_str(params, "nome");
    let responsavel = trimmed_str(params, "responsavel");
    let telefone = trimmed_str(params, "telefone");
    let turma_id = trimmed_str(params, "turmaId");
    let status = optional_str(params, "status").unwrap_or_else(|| "ativo".to_string());
    let observacoes = trimmed_str(params, "observacoes");
    let data_nascimento = almanac::parse_date(optional_str(params, "dataNascimento").as_deref());
    let mut valor_mensalidade = money::parse_brl(
        optional_str(params, "valorMensalidade").as_deref(),
        Decimal::ZERO,
    );
    let projeto_social = params
        .get("projetoSocial")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // The age field is free text on the form; accept a JSON number as well.
    let idade_raw = match params.get("idade") {
        Some(v) if v.is_string() => v.as_str().unwrap_or_default().trim().to_string(),
        Some(v) if v.is_i64() => v.to_string(),
        _ => String::new(),
    };

    if nome.is_empty()
        || responsavel.is_empty()
        || telefone.is_empty()
        || turma_id.is_empty()
        || (idade_raw.is_empty() && data_nascimento.is_none())
    {
        return Err(HandlerErr::invalid(
            "Preencha todos os campos obrigatórios.",
        ));
    }

    if !telefone_valido(&telefone) {
        return Err(HandlerErr::invalid(
            "Informe um telefone válido (apenas números, espaço, +, -, parênteses).",
        ));
    }

    if valor_mensalidade < Decimal::ZERO {
        return Err(HandlerErr::invalid(
            "O valor da mensalidade deve ser maior ou igual a zero.",
        ));
    }

    if projeto_social {
        valor_mensalidade = Decimal::ZERO;
    }

    let idade = match data_nascimento {
        Some(nascimento) => {
            let calculada = almanac::age_on(nascimento, almanac::today());
            if !(MIN_IDADE..=MAX_IDADE).contains(&calculada) {
                return Err(HandlerErr::invalid(format!(
                    "A idade calculada deve estar entre {MIN_IDADE} e {MAX_IDADE} anos."
                )));
            }
            calculada
        }
        None => {
            let informada: i64 = idade_raw
                .parse()
                .map_err(|_| HandlerErr::invalid("Idade inválida."))?;
            if !(MIN_IDADE..=MAX_IDADE).contains(&informada) {
                return Err(HandlerErr::invalid(format!(
                    "A idade deve estar entre {MIN_IDADE} e {MAX_IDADE} anos."
                )));
            }
            informada
        }
    };

    if status != "ativo" && status != "inativo" {
        return Err(HandlerErr::invalid("Status inválido."));
    }

    let turma_existe = conn
        .query_row("SELECT 1 FROM turmas WHERE id = ?", [&turma_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?
        .is_some();
    if !turma_existe {
        return Err(HandlerErr::invalid("Turma inválida."));
    }

    Ok(StudentForm {
        nome,
        idade,
        responsavel,
        telefone,
        turma_id,
        status,
        observacoes,
        data_nascimento,
        valor_mensalidade,
        projeto_social,
    })
}

fn aluno_json(aluno: &AlunoRow, turma_nome: Option<&String>) -> serde_json::Value {
    json!({
        "alunoId": aluno.id,
        "nome": aluno.nome,
        "idade": aluno.idade,
        "responsavel": aluno.responsavel,
        "telefone": aluno.telefone,
        "status": aluno.status,
        "observacoes": aluno.observacoes,
        "dataNascimento": aluno.data_nascimento.map(almanac::format_iso),
        "turmaId": aluno.turma_id,
        "turma": turma_nome.cloned(),
        "valorMensalidade": money::format_plain(aluno.valor_mensalidade),
        "projetoSocial": aluno.projeto_social,
    })
}

fn students_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Alunos)?;
    let conn = db_conn(state)?;
    let alunos = store::list_alunos(conn)?;
    let turmas = store::turma_nomes(conn)?;
    let rows: Vec<serde_json::Value> = alunos
        .iter()
        .map(|a| aluno_json(a, a.turma_id.as_ref().and_then(|id| turmas.get(id))))
        .collect();
    Ok(json!({ "alunos": rows }))
}

fn students_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Alunos)?;
    let conn = db_conn(state)?;

    let turma_count: i64 = conn.query_row("SELECT COUNT(*) FROM turmas", [], |r| r.get(0))?;
    if turma_count == 0 {
        return Err(HandlerErr::invalid(
            "Cadastre uma turma antes de incluir alunos.",
        ));
    }

    let form = parse_student_form(conn, &req.params)?;
    let aluno_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO alunos(id, nome, idade, responsavel, telefone, status, observacoes,
                            data_nascimento, turma_id, valor_mensalidade, projeto_social, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        (
            &aluno_id,
            &form.nome,
            form.idade,
            &form.responsavel,
            &form.telefone,
            &form.status,
            &form.observacoes,
            form.data_nascimento.map(almanac::format_iso),
            &form.turma_id,
            money::format_plain(form.valor_mensalidade),
            form.projeto_social as i64,
        ),
    )?;
    Ok(json!({ "alunoId": aluno_id, "nome": form.nome }))
}

fn students_update(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Alunos)?;
    let conn = db_conn(state)?;
    let aluno_id = trimmed_str(&req.params, "alunoId");

    if store::get_aluno(conn, &aluno_id)?.is_none() {
        return Err(HandlerErr::not_found("aluno not found"));
    }

    let form = parse_student_form(conn, &req.params)?;
    conn.execute(
        "UPDATE alunos
         SET nome = ?, idade = ?, responsavel = ?, telefone = ?, status = ?, observacoes = ?,
             data_nascimento = ?, turma_id = ?, valor_mensalidade = ?, projeto_social = ?
         WHERE id = ?",
        (
            &form.nome,
            form.idade,
            &form.responsavel,
            &form.telefone,
            &form.status,
            &form.observacoes,
            form.data_nascimento.map(almanac::format_iso),
            &form.turma_id,
            money::format_plain(form.valor_mensalidade),
            form.projeto_social as i64,
            &aluno_id,
        ),
    )?;
    Ok(json!({ "alunoId": aluno_id }))
}

fn students_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Alunos)?;
    let conn = db_conn(state)?;
    let aluno_id = trimmed_str(&req.params, "alunoId");

    if store::get_aluno(conn, &aluno_id)?.is_none() {
        return Err(HandlerErr::not_found("aluno not found"));
    }

    // Cascade by hand, children first.
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM presencas WHERE aluno_id = ?", [&aluno_id])?;
    tx.execute("DELETE FROM pagamentos WHERE aluno_id = ?", [&aluno_id])?;
    tx.execute("DELETE FROM alunos WHERE id = ?", [&aluno_id])?;
    tx.commit()?;
    Ok(json!({ "ok": true }))
}

fn students_export_csv(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Alunos)?;
    let conn = db_conn(state)?;
    let alunos = store::list_alunos(conn)?;
    let turmas = store::turma_nomes(conn)?;
    let content = csv_export::alunos_csv(&alunos, &turmas);
    Ok(json!({ "filename": "alunos.csv", "content": content }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(respond(&req.id, students_list(state, req))),
        "students.create" => Some(respond(&req.id, students_create(state, req))),
        "students.update" => Some(respond(&req.id, students_update(state, req))),
        "students.delete" => Some(respond(&req.id, students_delete(state, req))),
        "students.exportCsv" => Some(respond(&req.id, students_export_csv(state, req))),
        _ => None,
    }
}
