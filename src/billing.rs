use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::collections::HashMap;
use uuid::Uuid;

use crate::money;
use crate::store::{self, AlunoRow, PagamentoRow};

pub const DIA_VENCIMENTO_PADRAO: u32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct MonthSummary {
    pub pagos: usize,
    pub pendentes: usize,
    pub percentual: f64,
    pub valor_previsto: Decimal,
    pub valor_pago: Decimal,
    pub valor_pendente: Decimal,
}

#[derive(Debug, Default)]
pub struct MonthPlan {
    /// Payment ids to delete (rows held by scholarship students).
    pub deletes: Vec<String>,
    /// Brand-new unpaid rows for students with no row this month.
    pub inserts: Vec<PagamentoRow>,
    /// Existing rows whose valor must be refreshed from the student record.
    pub updates: Vec<PagamentoRow>,
    /// The resulting row set for the month, in student-name order.
    pub rows: Vec<PagamentoRow>,
}

/// Decide, per student, what the month's payment rows must look like.
/// Scholarship students lose any existing row; everyone else gets exactly one
/// row with valor snapshotted from the current fee. Paid state on existing
/// rows is never touched here.
pub fn plan_month(
    alunos: &[AlunoRow],
    existentes: &HashMap<String, PagamentoRow>,
    competencia: NaiveDate,
) -> MonthPlan {
    let mut plan = MonthPlan::default();
    for aluno in alunos {
        let atual = existentes.get(&aluno.id);

        if aluno.projeto_social {
            if let Some(pagamento) = atual {
                plan.deletes.push(pagamento.id.clone());
            }
            continue;
        }

        let valor = money::quantize(aluno.valor_mensalidade);
        match atual {
            Some(pagamento) => {
                let mut row = pagamento.clone();
                row.valor = valor;
                if pagamento.valor != valor {
                    plan.updates.push(row.clone());
                }
                plan.rows.push(row);
            }
            None => {
                let row = PagamentoRow {
                    id: Uuid::new_v4().to_string(),
                    competencia,
                    pago: false,
                    data_pagamento: None,
                    observacao: String::new(),
                    valor,
                    aluno_id: aluno.id.clone(),
                };
                plan.inserts.push(row.clone());
                plan.rows.push(row);
            }
        }
    }
    plan
}

pub fn summarize(rows: &[PagamentoRow]) -> MonthSummary {
    let pagos = rows.iter().filter(|r| r.pago).count();
    let pendentes = rows.len() - pagos;
    let percentual = if rows.is_empty() {
        0.0
    } else {
        (pagos as f64 / rows.len() as f64 * 1000.0).round() / 10.0
    };
    let valor_previsto: Decimal = rows.iter().map(|r| money::quantize(r.valor)).sum();
    let valor_pago: Decimal = rows
        .iter()
        .filter(|r| r.pago)
        .map(|r| money::quantize(r.valor))
        .sum();
    MonthSummary {
        pagos,
        pendentes,
        percentual,
        valor_previsto,
        valor_pago,
        valor_pendente: valor_previsto - valor_pago,
    }
}

/// Synchronize the month's payment rows against the current roster and fees,
/// inside one transaction. Returns the month's rows plus the summary.
/// Running it twice with no intervening edits is a no-op on the second pass.
pub fn reconcile_month(
    conn: &Connection,
    competencia: NaiveDate,
) -> anyhow::Result<(Vec<PagamentoRow>, MonthSummary)> {
    let alunos = store::list_alunos(conn)?;
    let existentes: HashMap<String, PagamentoRow> = store::pagamentos_do_mes(conn, competencia)?
        .into_iter()
        .map(|p| (p.aluno_id.clone(), p))
        .collect();

    let plan = plan_month(&alunos, &existentes, competencia);

    let tx = conn.unchecked_transaction()?;
    for pagamento_id in &plan.deletes {
        store::delete_pagamento(&tx, pagamento_id)?;
    }
    for row in &plan.inserts {
        store::insert_pagamento(&tx, row)?;
    }
    for row in &plan.updates {
        store::update_pagamento_valor(&tx, &row.id, row.valor)?;
    }
    tx.commit()?;

    let resumo = summarize(&plan.rows);
    Ok((plan.rows, resumo))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("decimal literal")
    }

    fn mes() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).expect("date")
    }

    fn aluno(id: &str, nome: &str, valor: &str, projeto_social: bool) -> AlunoRow {
        AlunoRow {
            id: id.to_string(),
            nome: nome.to_string(),
            idade: 10,
            responsavel: "Responsável".to_string(),
            telefone: "11 99999-0000".to_string(),
            status: "ativo".to_string(),
            observacoes: String::new(),
            data_nascimento: None,
            turma_id: None,
            valor_mensalidade: dec(valor),
            projeto_social,
        }
    }

    fn pagamento(id: &str, aluno_id: &str, valor: &str, pago: bool) -> PagamentoRow {
        PagamentoRow {
            id: id.to_string(),
            competencia: mes(),
            pago,
            data_pagamento: pago.then(|| NaiveDate::from_ymd_opt(2024, 3, 5).expect("date")),
            observacao: String::new(),
            valor: dec(valor),
            aluno_id: aluno_id.to_string(),
        }
    }

    #[test]
    fn creates_unpaid_rows_for_students_without_one() {
        let alunos = vec![aluno("a1", "Ana", "150.00", false)];
        let plan = plan_month(&alunos, &HashMap::new(), mes());
        assert_eq!(plan.inserts.len(), 1);
        assert!(plan.deletes.is_empty());
        assert_eq!(plan.rows[0].valor, dec("150.00"));
        assert!(!plan.rows[0].pago);
    }

    #[test]
    fn scholarship_rows_are_deleted_not_charged() {
        let alunos = vec![aluno("a1", "Ana", "0.00", true)];
        let mut existentes = HashMap::new();
        existentes.insert("a1".to_string(), pagamento("p1", "a1", "150.00", false));
        let plan = plan_month(&alunos, &existentes, mes());
        assert_eq!(plan.deletes, vec!["p1".to_string()]);
        assert!(plan.rows.is_empty());
        assert!(plan.inserts.is_empty());
    }

    #[test]
    fn existing_rows_keep_paid_state_but_refresh_valor() {
        let alunos = vec![aluno("a1", "Ana", "180.00", false)];
        let mut existentes = HashMap::new();
        existentes.insert("a1".to_string(), pagamento("p1", "a1", "150.00", true));
        let plan = plan_month(&alunos, &existentes, mes());
        assert!(plan.inserts.is_empty());
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.rows[0].valor, dec("180.00"));
        assert!(plan.rows[0].pago);
        assert!(plan.rows[0].data_pagamento.is_some());
    }

    #[test]
    fn planning_twice_is_stable() {
        let alunos = vec![
            aluno("a1", "Ana", "150.00", false),
            aluno("a2", "Bruno", "120.00", false),
        ];
        let first = plan_month(&alunos, &HashMap::new(), mes());
        let apos: HashMap<String, PagamentoRow> = first
            .rows
            .iter()
            .cloned()
            .map(|p| (p.aluno_id.clone(), p))
            .collect();
        let second = plan_month(&alunos, &apos, mes());
        assert!(second.inserts.is_empty());
        assert!(second.updates.is_empty());
        assert!(second.deletes.is_empty());
        assert_eq!(summarize(&first.rows), summarize(&second.rows));
    }

    #[test]
    fn summary_balances_exactly() {
        let rows = vec![
            pagamento("p1", "a1", "150.00", true),
            pagamento("p2", "a2", "120.50", false),
            pagamento("p3", "a3", "99.90", true),
        ];
        let resumo = summarize(&rows);
        assert_eq!(resumo.pagos, 2);
        assert_eq!(resumo.pendentes, 1);
        assert_eq!(resumo.percentual, 66.7);
        assert_eq!(resumo.valor_previsto, dec("370.40"));
        assert_eq!(resumo.valor_pago, dec("249.90"));
        assert_eq!(
            resumo.valor_previsto - resumo.valor_pago,
            resumo.valor_pendente
        );
        assert_eq!(resumo.valor_pendente, dec("120.50"));
    }

    #[test]
    fn empty_month_summary_is_all_zeroes() {
        let resumo = summarize(&[]);
        assert_eq!(resumo.pagos, 0);
        assert_eq!(resumo.pendentes, 0);
        assert_eq!(resumo.percentual, 0.0);
        assert_eq!(resumo.valor_pendente, Decimal::ZERO);
    }
}
