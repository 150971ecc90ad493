use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::almanac;
use crate::store::AlunoRow;

const JANELA_ANIVERSARIO_DIAS: i64 = 45;
const MAX_ANIVERSARIOS: usize = 6;
const PISO_PERCENTUAL_GRAFICO: i64 = 16;
const JANELA_VENCIMENTO_DIAS: i64 = 7;

#[derive(Debug, Clone)]
pub struct BirthdayEntry {
    pub nome: String,
    pub data: NaiveDate,
    pub dias_para_aniversario: i64,
    pub turma: String,
}

/// Students whose next birthday falls within the 45-day window, soonest
/// first, capped at six entries.
pub fn upcoming_birthdays(
    alunos: &[AlunoRow],
    turmas: &HashMap<String, String>,
    hoje: NaiveDate,
) -> Vec<BirthdayEntry> {
    let mut proximos: Vec<BirthdayEntry> = alunos
        .iter()
        .filter_map(|aluno| {
            let nascimento = aluno.data_nascimento?;
            let dias = almanac::days_to_birthday(nascimento, hoje);
            if dias > JANELA_ANIVERSARIO_DIAS {
                return None;
            }
            let turma = aluno
                .turma_id
                .as_ref()
                .and_then(|id| turmas.get(id).cloned())
                .unwrap_or_else(|| "Sem turma".to_string());
            Some(BirthdayEntry {
                nome: aluno.nome.clone(),
                data: nascimento,
                dias_para_aniversario: dias,
                turma,
            })
        })
        .collect();
    proximos.sort_by_key(|registro| registro.dias_para_aniversario);
    proximos.truncate(MAX_ANIVERSARIOS);
    proximos
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartMonth {
    pub mes: NaiveDate,
    pub mes_curto: String,
    pub presentes: i64,
    pub pagos: i64,
    pub percentual_presencas: i64,
    pub percentual_pagamentos: i64,
}

/// Express each month's two activity counts as a percentage of the running
/// maximum across both series, floored at 16 so quiet months still render.
pub fn scale_chart(pontos: &[(NaiveDate, i64, i64)]) -> Vec<ChartMonth> {
    let mut valor_maximo: i64 = 1;
    for (_, presentes, pagos) in pontos {
        valor_maximo = valor_maximo.max(*presentes).max(*pagos);
    }
    pontos
        .iter()
        .map(|(mes, presentes, pagos)| ChartMonth {
            mes: *mes,
            mes_curto: mes.format("%b").to_string(),
            presentes: *presentes,
            pagos: *pagos,
            percentual_presencas: (presentes * 100 / valor_maximo).max(PISO_PERCENTUAL_GRAFICO),
            percentual_pagamentos: (pagos * 100 / valor_maximo).max(PISO_PERCENTUAL_GRAFICO),
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct UnpaidEntry {
    pub aluno: String,
    pub turma: Option<String>,
    pub competencia: NaiveDate,
    pub valor: Decimal,
}

#[derive(Debug, Clone)]
pub struct DueEntry {
    pub aluno: String,
    pub turma: String,
    pub valor: Decimal,
    pub vencimento: NaiveDate,
    pub competencia: NaiveDate,
    /// Days remaining for upcoming entries, days late for overdue ones.
    pub dias: i64,
}

/// Split unpaid rows into "due within a week" (soonest first) and "overdue"
/// (most overdue first). Rows due further than a week out are dropped.
pub fn classify_due(
    pendencias: &[UnpaidEntry],
    due_day: u32,
    hoje: NaiveDate,
) -> (Vec<DueEntry>, Vec<DueEntry>) {
    let mut vencendo: Vec<DueEntry> = Vec::new();
    let mut vencidas: Vec<DueEntry> = Vec::new();
    for registro in pendencias {
        let vencimento = almanac::due_date(registro.competencia, due_day);
        let dias = (vencimento - hoje).num_days();
        let turma = registro
            .turma
            .clone()
            .unwrap_or_else(|| "Sem turma".to_string());
        if (0..=JANELA_VENCIMENTO_DIAS).contains(&dias) {
            vencendo.push(DueEntry {
                aluno: registro.aluno.clone(),
                turma,
                valor: registro.valor,
                vencimento,
                competencia: registro.competencia,
                dias,
            });
        } else if dias < 0 {
            vencidas.push(DueEntry {
                aluno: registro.aluno.clone(),
                turma,
                valor: registro.valor,
                vencimento,
                competencia: registro.competencia,
                dias: dias.abs(),
            });
        }
    }
    vencendo.sort_by_key(|item| item.dias);
    vencidas.sort_by_key(|item| std::cmp::Reverse(item.dias));
    (vencendo, vencidas)
}
