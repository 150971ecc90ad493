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
        sidecar
    }

    fn raw(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        self.next_id += 1;
        let id = self.next_id.to_string();
        let payload = json!({ "id": id, "method": method, "params": params });
        writeln!(self.stdin, "{}", payload).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut line = String::new();
        self.reader.read_line(&mut line).expect("read response line");
        serde_json::from_str(line.trim()).expect("parse response json")
    }

    fn ok(&mut self, method: &str, params: serde_json::Value) -> serde_json::Value {
        let value = self.raw(method, params);
        assert!(
            value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or_else(|| json!({}))
    }

    fn error_code(&mut self, method: &str, params: serde_json::Value) -> String {
        let value = self.raw(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .expect("error code")
            .to_string()
    }

    fn create_user(&mut self, username: &str, role: &str) {
        self.ok(
            "users.create",
            json!({
                "username": username,
                "password": "senha123",
                "confirmPassword": "senha123",
                "role": role,
            }),
        );
    }
}

#[test]
fn login_is_case_insensitive_and_rejects_bad_credentials() {
    let workspace = temp_dir("escolinha-gate-login");
    let mut sidecar = Sidecar::start(&workspace);

    assert_eq!(
        sidecar.error_code(
            "auth.login",
            json!({ "username": "admin", "password": "errada" })
        ),
        "invalid_credentials"
    );
    assert_eq!(
        sidecar.error_code(
            "auth.login",
            json!({ "username": "fantasma", "password": "admin123" })
        ),
        "invalid_credentials"
    );

    // The seeded account logs in regardless of the username's casing.
    let result = sidecar.ok(
        "auth.login",
        json!({ "username": "  ADMIN  ", "password": "admin123" }),
    );
    assert_eq!(
        result.get("username").and_then(|v| v.as_str()),
        Some("admin")
    );

    let session = sidecar.ok("auth.session", json!({}));
    assert_eq!(
        session.get("authenticated").and_then(|v| v.as_bool()),
        Some(true)
    );
    sidecar.ok("auth.logout", json!({}));
    let session = sidecar.ok("auth.session", json!({}));
    assert_eq!(
        session.get("authenticated").and_then(|v| v.as_bool()),
        Some(false)
    );

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn protected_methods_require_a_session() {
    let workspace = temp_dir("escolinha-gate-unauthenticated");
    let mut sidecar = Sidecar::start(&workspace);

    for method in [
        "dashboard.open",
        "students.list",
        "classes.list",
        "attendance.sheetOpen",
        "payments.monthOpen",
        "finance.overview",
        "users.list",
        "backup.list",
    ] {
        assert_eq!(
            sidecar.error_code(method, json!({})),
            "not_authenticated",
            "{} should demand login",
            method
        );
    }

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn gestor_profile_covers_admin_pages_but_not_attendance() {
    let workspace = temp_dir("escolinha-gate-gestor");
    let mut sidecar = Sidecar::start(&workspace);
    sidecar.ok(
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
    );
    sidecar.create_user("gestora", "gestor");

    sidecar.ok(
        "auth.login",
        json!({ "username": "gestora", "password": "senha123" }),
    );
    sidecar.ok("dashboard.open", json!({}));
    sidecar.ok("students.list", json!({}));
    sidecar.ok("classes.list", json!({}));
    sidecar.ok("payments.monthOpen", json!({}));
    sidecar.ok("finance.overview", json!({}));

    assert_eq!(
        sidecar.error_code("attendance.sheetOpen", json!({})),
        "forbidden"
    );
    assert_eq!(sidecar.error_code("users.list", json!({})), "forbidden");
    assert_eq!(sidecar.error_code("backup.create", json!({})), "forbidden");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn instrutor_profile_is_limited_to_attendance() {
    let workspace = temp_dir("escolinha-gate-instrutor");
    let mut sidecar = Sidecar::start(&workspace);
    sidecar.ok(
        "auth.login",
        json!({ "username": "admin", "password": "admin123" }),
    );
    sidecar.create_user("instrutor1", "instrutor");

    sidecar.ok(
        "auth.login",
        json!({ "username": "instrutor1", "password": "senha123" }),
    );
    sidecar.ok("dashboard.open", json!({}));
    sidecar.ok("attendance.sheetOpen", json!({}));

    for method in [
        "students.list",
        "classes.list",
        "payments.monthOpen",
        "finance.overview",
        "users.list",
        "backup.list",
    ] {
        assert_eq!(
            sidecar.error_code(method, json!({})),
            "forbidden",
            "{} should be denied for instrutor",
            method
        );
    }

    // Any authenticated profile may change its own password.
    sidecar.ok(
        "settings.changePassword",
        json!({
            "currentPassword": "senha123",
            "newPassword": "outraSenha1",
            "confirmPassword": "outraSenha1",
        }),
    );
    sidecar.ok(
        "auth.login",
        json!({ "username": "instrutor1", "password": "outraSenha1" }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}
