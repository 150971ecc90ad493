use chrono::{Datelike, Days, Local, NaiveDate};
use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_escolinhad");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn escolinhad");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

struct Sidecar {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    fn start(workspace: &PathBuf) -> Sidecar {
        let (child, stdin, reader) = spawn_sidecar();
        let mut sidecar = Sidecar {
            _child: child,
            stdin,
            reader,
            next_id: 0,
        };
        sidecar.ok(
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        sidecar.ok(
            "auth.login",
            json!({ "username": "admin", "password": "admin123" }),
        );
        sidecar
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        let value: serde_json::Value =
            serde_json::from_str(line.trim()).expect("parse response json");
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    fn create_turma(&mut self, nome: &str) -> String {
        self.ok(
            "classes.create",
            json!({
                "nome": nome,
                "categoria": nome,
                "diasHorario": "Ter/Qui 18h",
                "localTreino": "Campo 1",
            }),
        )
        .get("turmaId")
        .and_then(|v| v.as_str())
        .expect("turmaId")
        .to_string()
    }

    fn create_aluno(&mut self, nome: &str, turma_id: &str, extra: serde_json::Value) -> String {
        let mut form = json!({
            "nome": nome,
            "idade": "10",
            "responsavel": "Responsável Teste",
            "telefone": "(11) 96666-0000",
            "turmaId": turma_id,
            "status": "ativo",
            "valorMensalidade": "150,00",
        });
        if let Some(extra) = extra.as_object() {
            for (k, v) in extra {
                form[k] = v.clone();
            }
        }
        self.ok("students.create", form)
            .get("alunoId")
            .and_then(|v| v.as_str())
            .expect("alunoId")
            .to_string()
    }
}

/// Birth date `offset` days before its next anniversary, for a student about
/// ten years old. Steps over Feb 29 so the date exists in every year.
fn birth_date_days_ahead(hoje: NaiveDate, offset: u64) -> (String, i64) {
    let mut offset = offset;
    let mut alvo = hoje.checked_add_days(Days::new(offset)).expect("date");
    if alvo.month() == 2 && alvo.day() == 29 {
        offset += 1;
        alvo = hoje.checked_add_days(Days::new(offset)).expect("date");
    }
    let nascimento = NaiveDate::from_ymd_opt(alvo.year() - 10, alvo.month(), alvo.day())
        .expect("birth date");
    (nascimento.format("%Y-%m-%d").to_string(), offset as i64)
}

#[test]
fn dashboard_counts_chart_and_birthdays() {
    let workspace = temp_dir("escolinha-dashboard");
    let mut sidecar = Sidecar::start(&workspace);
    let hoje = Local::now().date_naive();

    let turma_a = sidecar.create_turma("Sub-11");
    let _turma_vazia = sidecar.create_turma("Sub-17");

    let (nasc_perto, dias_perto) = birth_date_days_ahead(hoje, 10);
    let (nasc_longe, _) = birth_date_days_ahead(hoje, 100);
    let ana = sidecar.create_aluno(
        "Ana",
        &turma_a,
        json!({ "dataNascimento": nasc_perto, "idade": serde_json::Value::Null }),
    );
    sidecar.create_aluno("Bruno", &turma_a, json!({ "dataNascimento": nasc_longe }));
    sidecar.create_aluno(
        "Carla",
        &turma_a,
        json!({ "status": "inativo", "projetoSocial": true }),
    );

    sidecar.ok(
        "attendance.record",
        json!({
            "turmaId": turma_a,
            "data": hoje.format("%Y-%m-%d").to_string(),
            "presentIds": [ana],
        }),
    );
    sidecar.ok(
        "payments.setStatus",
        json!({
            "alunoId": ana,
            "competencia": hoje.format("%Y-%m").to_string(),
            "status": "pago",
        }),
    );

    let dashboard = sidecar.ok("dashboard.open", json!({}));
    let stats = dashboard.get("stats").expect("stats");
    assert_eq!(stats.get("totalAlunos").and_then(|v| v.as_u64()), Some(3));
    assert_eq!(stats.get("ativos").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(stats.get("inativos").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(stats.get("totalTurmas").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(stats.get("turmasSemAlunos").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(stats.get("projetoSocial").and_then(|v| v.as_u64()), Some(1));

    // The whole turma got a row for the session; only Ana was present.
    let presencas = stats.get("presencas").expect("presencas");
    assert_eq!(
        presencas.get("totalPresentes").and_then(|v| v.as_u64()),
        Some(1)
    );
    assert_eq!(
        presencas.get("percentual").and_then(|v| v.as_f64()),
        Some(33.3)
    );

    // Two billable students, one paid.
    let resumo = stats
        .get("pagamentos")
        .and_then(|p| p.get("resumo"))
        .expect("resumo");
    assert_eq!(resumo.get("pagos").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(resumo.get("pendentes").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(resumo.get("percentual").and_then(|v| v.as_f64()), Some(50.0));

    // Six chart points, oldest first; quiet months sit on the 16% floor and
    // the current month carries the maxima.
    let chart = dashboard
        .get("chartData")
        .and_then(|v| v.as_array())
        .expect("chartData");
    assert_eq!(chart.len(), 6);
    let atual = chart.last().expect("current month");
    assert_eq!(
        atual.get("mes").and_then(|v| v.as_str()),
        Some(hoje.format("%Y-%m").to_string().as_str())
    );
    assert_eq!(
        atual.get("percentualPresencas").and_then(|v| v.as_i64()),
        Some(100)
    );
    for ponto in &chart[..5] {
        assert_eq!(
            ponto.get("percentualPresencas").and_then(|v| v.as_i64()),
            Some(16)
        );
        assert_eq!(
            ponto.get("percentualPagamentos").and_then(|v| v.as_i64()),
            Some(16)
        );
    }

    // Only the birthday inside the 45-day window shows up.
    let aniversarios = dashboard
        .get("aniversarios")
        .and_then(|v| v.as_array())
        .expect("aniversarios");
    assert_eq!(aniversarios.len(), 1);
    assert_eq!(
        aniversarios[0].get("nome").and_then(|v| v.as_str()),
        Some("Ana")
    );
    assert_eq!(
        aniversarios[0]
            .get("diasParaAniversario")
            .and_then(|v| v.as_i64()),
        Some(dias_perto)
    );
    assert_eq!(
        aniversarios[0].get("turma").and_then(|v| v.as_str()),
        Some("Sub-11")
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn finance_overview_buckets_history_and_recent_entries() {
    let workspace = temp_dir("escolinha-finance");
    let mut sidecar = Sidecar::start(&workspace);
    let hoje = Local::now().date_naive();

    let turma = sidecar.create_turma("Sub-13");
    let ana = sidecar.create_aluno("Ana", &turma, json!({}));
    sidecar.create_aluno("Bolsista", &turma, json!({ "projetoSocial": true }));

    // A long-closed month is guaranteed overdue.
    sidecar.ok("payments.monthOpen", json!({ "competencia": "2024-01" }));
    sidecar.ok(
        "payments.setStatus",
        json!({
            "alunoId": ana,
            "competencia": hoje.format("%Y-%m").to_string(),
            "status": "pago",
        }),
    );

    let overview = sidecar.ok("finance.overview", json!({}));

    let vencidas = overview
        .get("vencidas")
        .and_then(|v| v.as_array())
        .expect("vencidas");
    assert!(vencidas.iter().any(|item| {
        item.get("competencia").and_then(|v| v.as_str()) == Some("2024-01")
            && item.get("diasAtraso").and_then(|v| v.as_i64()).unwrap_or(0) > 0
            && item.get("vencimento").and_then(|v| v.as_str()) == Some("2024-01-10")
    }));
    // Bucket membership is structural: a week at most for upcoming rows.
    for item in overview
        .get("vencendoSemana")
        .and_then(|v| v.as_array())
        .expect("vencendoSemana")
    {
        let dias = item.get("dias").and_then(|v| v.as_i64()).expect("dias");
        assert!((0..=7).contains(&dias));
    }

    // Six months of history, oldest first, ending in the current month.
    let historico = overview
        .get("historico")
        .and_then(|v| v.as_array())
        .expect("historico");
    assert_eq!(historico.len(), 6);
    assert_eq!(
        historico[5].get("mes").and_then(|v| v.as_str()),
        Some(hoje.format("%Y-%m").to_string().as_str())
    );
    let percentual_atual = historico[5]
        .get("percentual")
        .and_then(|v| v.as_f64())
        .expect("percentual");
    assert_eq!(percentual_atual, 100.0);

    let entradas = overview
        .get("entradasRecentes")
        .and_then(|v| v.as_array())
        .expect("entradasRecentes");
    assert_eq!(entradas.len(), 1);
    assert_eq!(
        entradas[0].get("aluno").and_then(|v| v.as_str()),
        Some("Ana")
    );

    let projeto = overview
        .get("alunosProjeto")
        .and_then(|v| v.as_array())
        .expect("alunosProjeto");
    assert_eq!(projeto.len(), 1);
    assert_eq!(
        projeto[0].get("nome").and_then(|v| v.as_str()),
        Some("Bolsista")
    );

    let _ = std::fs::remove_dir_all(workspace);
}
