use serde_json::json;
use std::collections::HashMap;

use super::payments::summary_json;
use crate::auth::Capability;
use crate::billing;
use crate::ipc::helpers::{db_conn, require_capability, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reports::{self, DueEntry, UnpaidEntry};
use crate::store;
use crate::{almanac, money};

const HISTORICO_MESES: i32 = 6;
const ENTRADAS_LIMIT: i64 = 8;

fn due_json(entries: &[DueEntry], overdue: bool) -> Vec<serde_json::Value> {
    entries
        .iter()
        .map(|item| {
            let mut value = json!({
                "aluno": item.aluno,
                "turma": item.turma,
                "valor": money::format_plain(item.valor),
                "vencimento": almanac::format_iso(item.vencimento),
                "competencia": almanac::format_competencia(item.competencia),
            });
            if overdue {
                value["diasAtraso"] = json!(item.dias);
            } else {
                value["dias"] = json!(item.dias);
            }
            value
        })
        .collect()
}

fn overview(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Pagamentos)?;
    let conn = db_conn(state)?;

    let hoje = almanac::today();
    let mes_atual = almanac::first_day_of_month(hoje);
    let (_, resumo_mes) = billing::reconcile_month(conn, mes_atual)?;

    // Every open row in the book, bucketed against its due date.
    let turmas = store::turma_nomes(conn)?;
    let alunos: HashMap<String, (String, Option<String>)> = store::list_alunos(conn)?
        .into_iter()
        .map(|a| {
            let turma = a.turma_id.as_ref().and_then(|id| turmas.get(id).cloned());
            (a.id, (a.nome, turma))
        })
        .collect();
    let pendencias: Vec<UnpaidEntry> = store::unpaid_pagamentos(conn)?
        .into_iter()
        .filter_map(|p| {
            let (aluno, turma) = alunos.get(&p.aluno_id).cloned()?;
            Some(UnpaidEntry {
                aluno,
                turma,
                competencia: p.competencia,
                valor: p.valor,
            })
        })
        .collect();
    let (vencendo_semana, vencidas) =
        reports::classify_due(&pendencias, billing::DIA_VENCIMENTO_PADRAO, hoje);

    // Current month plus its five predecessors, oldest first.
    let mut historico: Vec<serde_json::Value> = Vec::new();
    for offset in (0..HISTORICO_MESES).rev() {
        let referencia = almanac::add_months(mes_atual, -offset);
        let (_, resumo) = billing::reconcile_month(conn, referencia)?;
        historico.push(json!({
            "mes": almanac::format_competencia(referencia),
            "label": referencia.format("%m/%Y").to_string(),
            "valorPrevisto": money::format_plain(resumo.valor_previsto),
            "valorPago": money::format_plain(resumo.valor_pago),
            "valorPendente": money::format_plain(resumo.valor_pendente),
            "percentual": resumo.percentual,
        }));
    }

    let entradas_recentes: Vec<serde_json::Value> =
        store::recent_paid_entries(conn, ENTRADAS_LIMIT)?
            .iter()
            .map(|entrada| {
                json!({
                    "aluno": entrada.aluno,
                    "turma": entrada.turma.clone().unwrap_or_else(|| "Sem turma".to_string()),
                    "competencia": almanac::format_competencia(entrada.competencia),
                    "dataPagamento": almanac::format_iso(entrada.data_pagamento),
                    "valor": money::format_plain(entrada.valor),
                })
            })
            .collect();

    let alunos_projeto: Vec<serde_json::Value> = store::list_alunos(conn)?
        .iter()
        .filter(|a| a.projeto_social)
        .map(|a| {
            let turma = a
                .turma_id
                .as_ref()
                .and_then(|id| turmas.get(id).cloned())
                .unwrap_or_else(|| "Sem turma".to_string());
            json!({ "nome": a.nome, "turma": turma, "status": a.status })
        })
        .collect();

    Ok(json!({
        "mesAtual": almanac::format_competencia(mes_atual),
        "resumoMes": summary_json(&resumo_mes),
        "totalPrevisto": money::format_plain(resumo_mes.valor_previsto),
        "totalPago": money::format_plain(resumo_mes.valor_pago),
        "totalPendente": money::format_plain(resumo_mes.valor_pendente),
        "vencendoSemana": due_json(&vencendo_semana, false),
        "vencidas": due_json(&vencidas, true),
        "historico": historico,
        "entradasRecentes": entradas_recentes,
        "alunosProjeto": alunos_projeto,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "finance.overview" => Some(respond(&req.id, overview(state, req))),
        _ => None,
    }
}
