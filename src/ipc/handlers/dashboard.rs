use serde_json::json;

use super::payments::{pending_json, summary_json};
use crate::auth::Capability;
use crate::billing;
use crate::ipc::helpers::{db_conn, require_capability, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::reports;
use crate::store;
use crate::almanac;

const CHART_MESES: i32 = 6;
const PENDENCIAS_LIMIT: i64 = 5;

fn count(conn: &rusqlite::Connection, sql: &str) -> Result<i64, HandlerErr> {
    Ok(conn.query_row(sql, [], |r| r.get(0))?)
}

fn open(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Dashboard)?;
    let conn = db_conn(state)?;

    let total_alunos = count(conn, "SELECT COUNT(*) FROM alunos")?;
    let ativos = count(conn, "SELECT COUNT(*) FROM alunos WHERE status = 'ativo'")?;
    let inativos = count(conn, "SELECT COUNT(*) FROM alunos WHERE status = 'inativo'")?;
    let total_turmas = count(conn, "SELECT COUNT(*) FROM turmas")?;
    let turmas_sem_alunos = count(
        conn,
        "SELECT COUNT(*) FROM turmas t
         WHERE NOT EXISTS (SELECT 1 FROM alunos a WHERE a.turma_id = t.id)",
    )?;
    let projeto_social = count(conn, "SELECT COUNT(*) FROM alunos WHERE projeto_social = 1")?;

    let hoje = almanac::today();
    let mes_atual = almanac::first_day_of_month(hoje);
    let (_, resumo) = billing::reconcile_month(conn, mes_atual)?;

    let proximo_mes = almanac::add_months(mes_atual, 1);
    let total_registros = store::count_presencas_between(conn, mes_atual, proximo_mes, false)?;
    let total_presentes = store::count_presencas_between(conn, mes_atual, proximo_mes, true)?;
    let percentual_presencas = if total_registros > 0 {
        (total_presentes as f64 / total_registros as f64 * 1000.0).round() / 10.0
    } else {
        0.0
    };

    let mut pontos: Vec<(chrono::NaiveDate, i64, i64)> = Vec::new();
    for offset in (0..CHART_MESES).rev() {
        let inicio = almanac::add_months(mes_atual, -offset);
        let fim = almanac::add_months(inicio, 1);
        let presentes = store::count_presencas_between(conn, inicio, fim, true)?;
        let pagos = store::count_pagamentos_pagos_between(conn, inicio, fim)?;
        pontos.push((inicio, presentes, pagos));
    }
    let chart: Vec<serde_json::Value> = reports::scale_chart(&pontos)
        .iter()
        .map(|mes| {
            json!({
                "mes": almanac::format_competencia(mes.mes),
                "mesCurto": mes.mes_curto,
                "presentes": mes.presentes,
                "pagos": mes.pagos,
                "percentualPresencas": mes.percentual_presencas,
                "percentualPagamentos": mes.percentual_pagamentos,
            })
        })
        .collect();

    let alunos = store::list_alunos(conn)?;
    let turmas = store::turma_nomes(conn)?;
    let aniversarios: Vec<serde_json::Value> =
        reports::upcoming_birthdays(&alunos, &turmas, hoje)
            .iter()
            .map(|registro| {
                json!({
                    "nome": registro.nome,
                    "data": almanac::format_iso(registro.data),
                    "diasParaAniversario": registro.dias_para_aniversario,
                    "turma": registro.turma,
                })
            })
            .collect();

    let pendencias = store::recent_pending(conn, PENDENCIAS_LIMIT)?;

    Ok(json!({
        "stats": {
            "totalAlunos": total_alunos,
            "ativos": ativos,
            "inativos": inativos,
            "totalTurmas": total_turmas,
            "turmasSemAlunos": turmas_sem_alunos,
            "projetoSocial": projeto_social,
            "pagamentos": {
                "resumo": summary_json(&resumo),
                "ultimosPendentes": pending_json(&pendencias),
            },
            "presencas": {
                "totalPresentes": total_presentes,
                "percentual": percentual_presencas,
            },
        },
        "chartData": chart,
        "aniversarios": aniversarios,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.open" => Some(respond(&req.id, open(state, req))),
        _ => None,
    }
}
