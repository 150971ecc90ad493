use serde_json::json;

use crate::auth;
use crate::ipc::helpers::{db_conn, respond, trimmed_str, HandlerErr};
use crate::ipc::types::{AppState, Request, SessionUser};
use crate::store;

fn login(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let username = trimmed_str(&req.params, "username").to_lowercase();
    let password = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let user = {
        let conn = db_conn(state)?;
        store::get_user_by_username(conn, &username)?
    };
    let Some(user) = user else {
        return Err(HandlerErr::new(
            "invalid_credentials",
            "Usuário ou senha inválidos.",
        ));
    };
    if !auth::verify_password(password, &user.password_hash) {
        return Err(HandlerErr::new(
            "invalid_credentials",
            "Usuário ou senha inválidos.",
        ));
    }

    let session = SessionUser::from_row(&user);
    state.session = Some(session);
    Ok(json!({
        "userId": user.id,
        "username": user.username,
        "role": user.role_raw,
        "roleLabel": user.role_label(),
    }))
}

fn logout(state: &mut AppState) -> Result<serde_json::Value, HandlerErr> {
    state.session = None;
    Ok(json!({ "ok": true }))
}

fn session_info(state: &AppState) -> Result<serde_json::Value, HandlerErr> {
    match state.session.as_ref() {
        Some(session) => Ok(json!({
            "authenticated": true,
            "userId": session.user_id,
            "username": session.username,
            "role": session.role_raw,
        })),
        None => Ok(json!({ "authenticated": false })),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.login" => Some(respond(&req.id, login(state, req))),
        "auth.logout" => Some(respond(&req.id, logout(state))),
        "auth.session" => Some(respond(&req.id, session_info(state))),
        _ => None,
    }
}
