use serde_json::json;

use crate::auth;
use crate::ipc::helpers::{db_conn, require_session, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;

const MIN_SENHA: usize = 6;

fn change_password(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_session(state)?;
    let conn = db_conn(state)?;

    let senha_atual = req
        .params
        .get("currentPassword")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let nova_senha = req
        .params
        .get("newPassword")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let confirmacao = req
        .params
        .get("confirmPassword")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let Some(usuario) = store::get_user(conn, &session.user_id)? else {
        return Err(HandlerErr::not_found("usuário not found"));
    };
    if !auth::verify_password(senha_atual, &usuario.password_hash) {
        return Err(HandlerErr::invalid("Senha atual incorreta."));
    }
    if nova_senha != confirmacao {
        return Err(HandlerErr::invalid("A confirmação não confere."));
    }
    if nova_senha.chars().count() < MIN_SENHA {
        return Err(HandlerErr::invalid(
            "A nova senha deve ter ao menos 6 caracteres.",
        ));
    }

    let hash = auth::hash_password(nova_senha)?;
    conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (&hash, &usuario.id),
    )?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "settings.changePassword" => Some(respond(&req.id, change_password(state, req))),
        _ => None,
    }
}
