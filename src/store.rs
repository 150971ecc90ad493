use chrono::NaiveDate;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::auth::Role;
use crate::{almanac, money};

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role_raw: String,
}

impl UserRow {
    pub fn role(&self) -> Option<Role> {
        Role::parse(&self.role_raw)
    }

    pub fn role_label(&self) -> String {
        self.role()
            .map(|r| r.label().to_string())
            .unwrap_or_else(|| self.role_raw.clone())
    }
}

#[derive(Debug, Clone)]
pub struct TurmaRow {
    pub id: String,
    pub nome: String,
    pub categoria: String,
    pub dias_horario: String,
    pub local_treino: String,
}

#[derive(Debug, Clone)]
pub struct AlunoRow {
    pub id: String,
    pub nome: String,
    pub idade: i64,
    pub responsavel: String,
    pub telefone: String,
    pub status: String,
    pub observacoes: String,
    pub data_nascimento: Option<NaiveDate>,
    pub turma_id: Option<String>,
    pub valor_mensalidade: Decimal,
    pub projeto_social: bool,
}

#[derive(Debug, Clone)]
pub struct PagamentoRow {
    pub id: String,
    pub competencia: NaiveDate,
    pub pago: bool,
    pub data_pagamento: Option<NaiveDate>,
    pub observacao: String,
    pub valor: Decimal,
    pub aluno_id: String,
}

#[derive(Debug, Clone)]
pub struct HistoricoPresenca {
    pub data: NaiveDate,
    pub turma: String,
    pub aluno: String,
    pub presente: bool,
}

#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub aluno: String,
    pub turma: Option<String>,
    pub competencia: NaiveDate,
    pub valor: Decimal,
}

#[derive(Debug, Clone)]
pub struct PaidEntry {
    pub aluno: String,
    pub turma: Option<String>,
    pub competencia: NaiveDate,
    pub data_pagamento: NaiveDate,
    pub valor: Decimal,
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_date_col(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(s) if s.is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

fn decimal_col(row: &Row, idx: usize) -> rusqlite::Result<Decimal> {
    let value: Value = row.get(idx)?;
    Ok(money::decimal_from_sql(&value))
}

const ALUNO_COLUMNS: &str = "id, nome, idade, responsavel, telefone, status, observacoes, \
     data_nascimento, turma_id, valor_mensalidade, projeto_social";

fn map_aluno(row: &Row) -> rusqlite::Result<AlunoRow> {
    Ok(AlunoRow {
        id: row.get(0)?,
        nome: row.get(1)?,
        idade: row.get(2)?,
        responsavel: row.get(3)?,
        telefone: row.get(4)?,
        status: row.get(5)?,
        observacoes: row.get(6)?,
        data_nascimento: opt_date_col(row, 7)?,
        turma_id: row.get(8)?,
        valor_mensalidade: decimal_col(row, 9)?,
        projeto_social: row.get::<_, i64>(10)? != 0,
    })
}

pub fn list_alunos(conn: &Connection) -> rusqlite::Result<Vec<AlunoRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALUNO_COLUMNS} FROM alunos ORDER BY nome"
    ))?;
    let rows = stmt.query_map([], map_aluno)?;
    rows.collect()
}

pub fn alunos_da_turma(conn: &Connection, turma_id: &str) -> rusqlite::Result<Vec<AlunoRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALUNO_COLUMNS} FROM alunos WHERE turma_id = ? ORDER BY nome"
    ))?;
    let rows = stmt.query_map([turma_id], map_aluno)?;
    rows.collect()
}

pub fn get_aluno(conn: &Connection, aluno_id: &str) -> rusqlite::Result<Option<AlunoRow>> {
    conn.query_row(
        &format!("SELECT {ALUNO_COLUMNS} FROM alunos WHERE id = ?"),
        [aluno_id],
        map_aluno,
    )
    .optional()
}

fn map_turma(row: &Row) -> rusqlite::Result<TurmaRow> {
    Ok(TurmaRow {
        id: row.get(0)?,
        nome: row.get(1)?,
        categoria: row.get(2)?,
        dias_horario: row.get(3)?,
        local_treino: row.get(4)?,
    })
}

const TURMA_COLUMNS: &str = "id, nome, categoria, dias_horario, local_treino";

pub fn list_turmas(conn: &Connection) -> rusqlite::Result<Vec<TurmaRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TURMA_COLUMNS} FROM turmas ORDER BY nome"
    ))?;
    let rows = stmt.query_map([], map_turma)?;
    rows.collect()
}

pub fn get_turma(conn: &Connection, turma_id: &str) -> rusqlite::Result<Option<TurmaRow>> {
    conn.query_row(
        &format!("SELECT {TURMA_COLUMNS} FROM turmas WHERE id = ?"),
        [turma_id],
        map_turma,
    )
    .optional()
}

pub fn turma_nomes(conn: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    let mut stmt = conn.prepare("SELECT id, nome FROM turmas")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
    rows.collect()
}

const PAGAMENTO_COLUMNS: &str =
    "id, competencia, pago, data_pagamento, observacao, valor, aluno_id";

fn map_pagamento(row: &Row) -> rusqlite::Result<PagamentoRow> {
    Ok(PagamentoRow {
        id: row.get(0)?,
        competencia: date_col(row, 1)?,
        pago: row.get::<_, i64>(2)? != 0,
        data_pagamento: opt_date_col(row, 3)?,
        observacao: row.get(4)?,
        valor: decimal_col(row, 5)?,
        aluno_id: row.get(6)?,
    })
}

pub fn pagamento_do_mes(
    conn: &Connection,
    aluno_id: &str,
    competencia: NaiveDate,
) -> rusqlite::Result<Option<PagamentoRow>> {
    conn.query_row(
        &format!("SELECT {PAGAMENTO_COLUMNS} FROM pagamentos WHERE aluno_id = ? AND competencia = ?"),
        (aluno_id, almanac::format_iso(competencia)),
        map_pagamento,
    )
    .optional()
}

pub fn pagamentos_do_mes(
    conn: &Connection,
    competencia: NaiveDate,
) -> rusqlite::Result<Vec<PagamentoRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAGAMENTO_COLUMNS} FROM pagamentos WHERE competencia = ?"
    ))?;
    let rows = stmt.query_map([almanac::format_iso(competencia)], map_pagamento)?;
    rows.collect()
}

pub fn insert_pagamento(conn: &Connection, pagamento: &PagamentoRow) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO pagamentos(id, competencia, pago, data_pagamento, observacao, valor, aluno_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, datetime('now'))",
        (
            &pagamento.id,
            almanac::format_iso(pagamento.competencia),
            pagamento.pago as i64,
            pagamento.data_pagamento.map(almanac::format_iso),
            &pagamento.observacao,
            money::format_plain(pagamento.valor),
            &pagamento.aluno_id,
        ),
    )?;
    Ok(())
}

pub fn update_pagamento_valor(
    conn: &Connection,
    pagamento_id: &str,
    valor: Decimal,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE pagamentos SET valor = ? WHERE id = ?",
        (money::format_plain(valor), pagamento_id),
    )?;
    Ok(())
}

pub fn set_pagamento_status(
    conn: &Connection,
    pagamento_id: &str,
    pago: bool,
    data_pagamento: Option<NaiveDate>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE pagamentos SET pago = ?, data_pagamento = ? WHERE id = ?",
        (
            pago as i64,
            data_pagamento.map(almanac::format_iso),
            pagamento_id,
        ),
    )?;
    Ok(())
}

pub fn delete_pagamento(conn: &Connection, pagamento_id: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM pagamentos WHERE id = ?", [pagamento_id])?;
    Ok(())
}

pub fn unpaid_pagamentos(conn: &Connection) -> rusqlite::Result<Vec<PagamentoRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAGAMENTO_COLUMNS} FROM pagamentos WHERE pago = 0 ORDER BY competencia ASC"
    ))?;
    let rows = stmt.query_map([], map_pagamento)?;
    rows.collect()
}

/// Most recent unpaid rows for non-scholarship students, newest competence
/// month first.
pub fn recent_pending(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<PendingEntry>> {
    let mut stmt = conn.prepare(
        "SELECT a.nome, t.nome, p.competencia, p.valor
         FROM pagamentos p
         JOIN alunos a ON a.id = p.aluno_id
         LEFT JOIN turmas t ON t.id = a.turma_id
         WHERE p.pago = 0 AND a.projeto_social = 0
         ORDER BY p.competencia DESC
         LIMIT ?",
    )?;
    let rows = stmt.query_map([limit], |r| {
        Ok(PendingEntry {
            aluno: r.get(0)?,
            turma: r.get(1)?,
            competencia: date_col(r, 2)?,
            valor: decimal_col(r, 3)?,
        })
    })?;
    rows.collect()
}

pub fn recent_paid_entries(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<PaidEntry>> {
    let mut stmt = conn.prepare(
        "SELECT a.nome, t.nome, p.competencia, p.data_pagamento, p.valor
         FROM pagamentos p
         JOIN alunos a ON a.id = p.aluno_id
         LEFT JOIN turmas t ON t.id = a.turma_id
         WHERE p.pago = 1 AND p.data_pagamento IS NOT NULL AND a.projeto_social = 0
         ORDER BY p.data_pagamento DESC
         LIMIT ?",
    )?;
    let rows = stmt.query_map([limit], |r| {
        Ok(PaidEntry {
            aluno: r.get(0)?,
            turma: r.get(1)?,
            competencia: date_col(r, 2)?,
            data_pagamento: date_col(r, 3)?,
            valor: decimal_col(r, 4)?,
        })
    })?;
    rows.collect()
}

pub fn count_presencas_between(
    conn: &Connection,
    inicio: NaiveDate,
    fim: NaiveDate,
    somente_presentes: bool,
) -> rusqlite::Result<i64> {
    let filtro = if somente_presentes { " AND presente = 1" } else { "" };
    conn.query_row(
        &format!("SELECT COUNT(*) FROM presencas WHERE data >= ? AND data < ?{filtro}"),
        (almanac::format_iso(inicio), almanac::format_iso(fim)),
        |r| r.get(0),
    )
}

pub fn count_pagamentos_pagos_between(
    conn: &Connection,
    inicio: NaiveDate,
    fim: NaiveDate,
) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM pagamentos WHERE competencia >= ? AND competencia < ? AND pago = 1",
        (almanac::format_iso(inicio), almanac::format_iso(fim)),
        |r| r.get(0),
    )
}

pub fn presencas_da_data(
    conn: &Connection,
    data: NaiveDate,
) -> rusqlite::Result<HashMap<String, bool>> {
    let mut stmt = conn.prepare("SELECT aluno_id, presente FROM presencas WHERE data = ?")?;
    let rows = stmt.query_map([almanac::format_iso(data)], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? != 0))
    })?;
    rows.collect()
}

pub fn recent_presencas(
    conn: &Connection,
    limit: i64,
) -> rusqlite::Result<Vec<HistoricoPresenca>> {
    let mut stmt = conn.prepare(
        "SELECT p.data, COALESCE(t.nome, ''), a.nome, p.presente
         FROM presencas p
         JOIN alunos a ON a.id = p.aluno_id
         LEFT JOIN turmas t ON t.id = p.turma_id
         ORDER BY p.data DESC
         LIMIT ?",
    )?;
    let rows = stmt.query_map([limit], |r| {
        Ok(HistoricoPresenca {
            data: date_col(r, 0)?,
            turma: r.get(1)?,
            aluno: r.get(2)?,
            presente: r.get::<_, i64>(3)? != 0,
        })
    })?;
    rows.collect()
}

const USER_COLUMNS: &str = "id, username, password_hash, role";

fn map_user(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        role_raw: row.get(3)?,
    })
}

pub fn list_users(conn: &Connection) -> rusqlite::Result<Vec<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY username"
    ))?;
    let rows = stmt.query_map([], map_user)?;
    rows.collect()
}

pub fn get_user(conn: &Connection, user_id: &str) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
        [user_id],
        map_user,
    )
    .optional()
}

pub fn get_user_by_username(
    conn: &Connection,
    username: &str,
) -> rusqlite::Result<Option<UserRow>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE LOWER(username) = LOWER(?)"),
        [username],
        map_user,
    )
    .optional()
}

pub fn count_admins(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM users WHERE role = 'admin'", [], |r| {
        r.get(0)
    })
}
