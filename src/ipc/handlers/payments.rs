use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::auth::Capability;
use crate::billing::{self, MonthSummary};
use crate::ipc::helpers::{
    db_conn, optional_str, require_capability, respond, trimmed_str, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use crate::store::{self, PagamentoRow};
use crate::{almanac, money};

const PENDENCIAS_LIMIT: i64 = 8;

pub fn summary_json(resumo: &MonthSummary) -> serde_json::Value {
    json!({
        "pagos": resumo.pagos,
        "pendentes": resumo.pendentes,
        "percentual": resumo.percentual,
        "valorPrevisto": money::format_plain(resumo.valor_previsto),
        "valorPago": money::format_plain(resumo.valor_pago),
        "valorPendente": money::format_plain(resumo.valor_pendente),
    })
}

pub fn pending_json(entries: &[store::PendingEntry]) -> Vec<serde_json::Value> {
    entries
        .iter()
        .map(|registro| {
            json!({
                "aluno": registro.aluno,
                "turma": registro.turma.clone().unwrap_or_else(|| "Sem turma".to_string()),
                "mes": registro.competencia.format("%m/%Y").to_string(),
                "valor": money::format_plain(registro.valor),
            })
        })
        .collect()
}

fn pagamento_json(
    pagamento: &PagamentoRow,
    alunos: &HashMap<String, (String, Option<String>)>,
) -> serde_json::Value {
    let (aluno_nome, turma_nome) = alunos
        .get(&pagamento.aluno_id)
        .cloned()
        .unwrap_or((String::new(), None));
    json!({
        "pagamentoId": pagamento.id,
        "alunoId": pagamento.aluno_id,
        "aluno": aluno_nome,
        "turma": turma_nome,
        "competencia": almanac::format_competencia(pagamento.competencia),
        "pago": pagamento.pago,
        "dataPagamento": pagamento.data_pagamento.map(almanac::format_iso),
        "valor": money::format_plain(pagamento.valor),
    })
}

fn aluno_index(
    conn: &rusqlite::Connection,
) -> Result<HashMap<String, (String, Option<String>)>, HandlerErr> {
    let turmas = store::turma_nomes(conn)?;
    let mut index = HashMap::new();
    for aluno in store::list_alunos(conn)? {
        let turma = aluno.turma_id.as_ref().and_then(|id| turmas.get(id).cloned());
        index.insert(aluno.id.clone(), (aluno.nome.clone(), turma));
    }
    Ok(index)
}

fn month_open(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Pagamentos)?;
    let conn = db_conn(state)?;

    let competencia = almanac::parse_month(
        optional_str(&req.params, "competencia").as_deref(),
        almanac::today(),
    );
    let (rows, resumo) = billing::reconcile_month(conn, competencia)?;

    let index = aluno_index(conn)?;
    let pagamentos: Vec<serde_json::Value> =
        rows.iter().map(|p| pagamento_json(p, &index)).collect();
    let historico = store::recent_pending(conn, PENDENCIAS_LIMIT)?;

    Ok(json!({
        "competencia": almanac::format_competencia(competencia),
        "pagamentos": pagamentos,
        "resumo": summary_json(&resumo),
        "historicoPendencias": pending_json(&historico),
    }))
}

fn set_status(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Pagamentos)?;
    let conn = db_conn(state)?;

    let aluno_id = trimmed_str(&req.params, "alunoId");
    let Some(aluno) = store::get_aluno(conn, &aluno_id)? else {
        return Err(HandlerErr::not_found("aluno not found"));
    };
    let competencia = almanac::parse_month(
        optional_str(&req.params, "competencia").as_deref(),
        almanac::today(),
    );
    let status = trimmed_str(&req.params, "status");
    let pago = status == "pago";

    let tx = conn.unchecked_transaction()?;
    let existente = store::pagamento_do_mes(&tx, &aluno.id, competencia)?;
    let pagamento_id = match existente {
        Some(p) => {
            store::update_pagamento_valor(&tx, &p.id, money::quantize(aluno.valor_mensalidade))?;
            p.id
        }
        None => {
            let novo = PagamentoRow {
                id: Uuid::new_v4().to_string(),
                competencia,
                pago: false,
                data_pagamento: None,
                observacao: String::new(),
                valor: money::quantize(aluno.valor_mensalidade),
                aluno_id: aluno.id.clone(),
            };
            store::insert_pagamento(&tx, &novo)?;
            novo.id
        }
    };
    let data_pagamento = pago.then(almanac::today);
    store::set_pagamento_status(&tx, &pagamento_id, pago, data_pagamento)?;
    tx.commit()?;

    let atualizado = store::pagamento_do_mes(conn, &aluno.id, competencia)?
        .ok_or_else(|| HandlerErr::not_found("pagamento not found"))?;
    let index = aluno_index(conn)?;
    Ok(json!({
        "pagamento": pagamento_json(&atualizado, &index),
        "competencia": almanac::format_competencia(competencia),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "payments.monthOpen" => Some(respond(&req.id, month_open(state, req))),
        "payments.setStatus" => Some(respond(&req.id, set_status(state, req))),
        _ => None,
    }
}
