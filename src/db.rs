use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

use crate::auth;
use crate::backup::DB_FILE_NAME;

const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'admin',
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS turmas(
            id TEXT PRIMARY KEY,
            nome TEXT NOT NULL,
            categoria TEXT NOT NULL,
            dias_horario TEXT NOT NULL,
            local_treino TEXT NOT NULL,
            created_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS alunos(
            id TEXT PRIMARY KEY,
            nome TEXT NOT NULL,
            idade INTEGER NOT NULL,
            responsavel TEXT NOT NULL,
            telefone TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ativo',
            observacoes TEXT NOT NULL DEFAULT '',
            data_nascimento TEXT,
            turma_id TEXT,
            valor_mensalidade NUMERIC NOT NULL DEFAULT 0,
            projeto_social INTEGER NOT NULL DEFAULT 0,
            created_at TEXT,
            FOREIGN KEY(turma_id) REFERENCES turmas(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_alunos_turma ON alunos(turma_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS presencas(
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            presente INTEGER NOT NULL,
            aluno_id TEXT NOT NULL,
            turma_id TEXT NOT NULL,
            created_at TEXT,
            UNIQUE(data, aluno_id),
            FOREIGN KEY(aluno_id) REFERENCES alunos(id),
            FOREIGN KEY(turma_id) REFERENCES turmas(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_presencas_aluno ON presencas(aluno_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_presencas_data ON presencas(data)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pagamentos(
            id TEXT PRIMARY KEY,
            competencia TEXT NOT NULL,
            pago INTEGER NOT NULL DEFAULT 0,
            data_pagamento TEXT,
            observacao TEXT NOT NULL DEFAULT '',
            valor NUMERIC NOT NULL DEFAULT 0,
            aluno_id TEXT NOT NULL,
            created_at TEXT,
            UNIQUE(aluno_id, competencia),
            FOREIGN KEY(aluno_id) REFERENCES alunos(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pagamentos_aluno ON pagamentos(aluno_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_pagamentos_competencia ON pagamentos(competencia)",
        [],
    )?;

    // Databases created by earlier releases predate some of these columns.
    ensure_users_role(&conn)?;
    ensure_alunos_billing_columns(&conn)?;
    ensure_pagamentos_valor(&conn)?;

    seed_default_admin(&conn)?;
    backfill_missing_roles(&conn)?;

    Ok(conn)
}

fn ensure_users_role(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "users", "role")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE users ADD COLUMN role TEXT NOT NULL DEFAULT 'admin'",
        [],
    )?;
    Ok(())
}

fn ensure_alunos_billing_columns(conn: &Connection) -> anyhow::Result<()> {
    if !table_has_column(conn, "alunos", "valor_mensalidade")? {
        conn.execute(
            "ALTER TABLE alunos ADD COLUMN valor_mensalidade NUMERIC NOT NULL DEFAULT 0",
            [],
        )?;
    }
    if !table_has_column(conn, "alunos", "projeto_social")? {
        conn.execute(
            "ALTER TABLE alunos ADD COLUMN projeto_social INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

fn ensure_pagamentos_valor(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "pagamentos", "valor")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE pagamentos ADD COLUMN valor NUMERIC NOT NULL DEFAULT 0",
        [],
    )?;
    // Backfill the snapshot from each owning student's current fee.
    conn.execute(
        "UPDATE pagamentos
         SET valor = (
             SELECT COALESCE(valor_mensalidade, 0)
             FROM alunos WHERE alunos.id = pagamentos.aluno_id
         )",
        [],
    )?;
    Ok(())
}

fn seed_default_admin(conn: &Connection) -> anyhow::Result<()> {
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE LOWER(username) = ?",
        [DEFAULT_ADMIN_USERNAME],
        |r| r.get(0),
    )?;
    if existing > 0 {
        return Ok(());
    }
    let hash = auth::hash_password(DEFAULT_ADMIN_PASSWORD)?;
    conn.execute(
        "INSERT INTO users(id, username, password_hash, role, created_at)
         VALUES(?, ?, ?, 'admin', datetime('now'))",
        (Uuid::new_v4().to_string(), DEFAULT_ADMIN_USERNAME, hash),
    )?;
    Ok(())
}

fn backfill_missing_roles(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE users SET role = 'admin' WHERE role IS NULL OR role = ''",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
