use serde_json::json;
use uuid::Uuid;

use crate::auth::{self, Capability, Role};
use crate::ipc::helpers::{db_conn, require_capability, respond, trimmed_str, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store;

const MIN_SENHA: usize = 6;

fn users_list(state: &AppState, _req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Users)?;
    let conn = db_conn(state)?;

    let usuarios: Vec<serde_json::Value> = store::list_users(conn)?
        .iter()
        .map(|u| {
            json!({
                "userId": u.id,
                "username": u.username,
                "role": u.role_raw,
                "roleLabel": u.role_label(),
            })
        })
        .collect();
    let role_options: Vec<serde_json::Value> = Role::CHOICES
        .iter()
        .map(|r| json!({ "value": r.as_str(), "label": r.label() }))
        .collect();

    Ok(json!({
        "usuarios": usuarios,
        "roleOptions": role_options,
        "adminCount": store::count_admins(conn)?,
    }))
}

fn users_create(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Users)?;
    let conn = db_conn(state)?;

    let username = trimmed_str(&req.params, "username").to_lowercase();
    let senha = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let confirmacao = req
        .params
        .get("confirmPassword")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let role_raw = trimmed_str(&req.params, "role");
    let role_raw = if role_raw.is_empty() {
        "gestor".to_string()
    } else {
        role_raw
    };

    if username.is_empty() || senha.is_empty() {
        return Err(HandlerErr::invalid("Informe usuário e senha."));
    }
    if senha != confirmacao {
        return Err(HandlerErr::invalid("A confirmação de senha não confere."));
    }
    if senha.chars().count() < MIN_SENHA {
        return Err(HandlerErr::invalid(
            "A senha deve ter ao menos 6 caracteres.",
        ));
    }
    let Some(role) = Role::parse(&role_raw) else {
        return Err(HandlerErr::invalid("Selecione um perfil válido."));
    };
    if store::get_user_by_username(conn, &username)?.is_some() {
        return Err(HandlerErr::invalid("Já existe um usuário com esse nome."));
    }

    let user_id = Uuid::new_v4().to_string();
    let hash = auth::hash_password(senha)?;
    conn.execute(
        "INSERT INTO users(id, username, password_hash, role, created_at)
         VALUES(?, ?, ?, ?, datetime('now'))",
        (&user_id, &username, &hash, role.as_str()),
    )?;
    Ok(json!({ "userId": user_id, "username": username, "role": role.as_str() }))
}

fn users_update_role(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Users)?;
    let conn = db_conn(state)?;

    let user_id = trimmed_str(&req.params, "userId");
    let role_raw = trimmed_str(&req.params, "role");
    let Some(role) = Role::parse(&role_raw) else {
        return Err(HandlerErr::invalid("Selecione um perfil válido."));
    };
    let Some(usuario) = store::get_user(conn, &user_id)? else {
        return Err(HandlerErr::not_found("usuário not found"));
    };

    // Demoting the only admin would lock everyone out.
    if usuario.role() == Some(Role::Admin)
        && role != Role::Admin
        && store::count_admins(conn)? == 1
    {
        return Err(HandlerErr::invalid(
            "Não é possível remover o último administrador.",
        ));
    }

    conn.execute(
        "UPDATE users SET role = ? WHERE id = ?",
        (role.as_str(), &user_id),
    )?;
    Ok(json!({ "userId": user_id, "role": role.as_str() }))
}

fn users_reset_password(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    require_capability(state, Capability::Users)?;
    let conn = db_conn(state)?;

    let user_id = trimmed_str(&req.params, "userId");
    let senha = req
        .params
        .get("password")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    let confirmacao = req
        .params
        .get("confirmPassword")
        .and_then(|v| v.as_str())
        .unwrap_or_default();

    let Some(usuario) = store::get_user(conn, &user_id)? else {
        return Err(HandlerErr::not_found("usuário not found"));
    };
    if senha.chars().count() < MIN_SENHA {
        return Err(HandlerErr::invalid(
            "A nova senha deve ter ao menos 6 caracteres.",
        ));
    }
    if senha != confirmacao {
        return Err(HandlerErr::invalid("A confirmação de senha não confere."));
    }

    let hash = auth::hash_password(senha)?;
    conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (&hash, &usuario.id),
    )?;
    Ok(json!({ "userId": usuario.id }))
}

fn users_delete(state: &AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let session = require_capability(state, Capability::Users)?;
    let conn = db_conn(state)?;

    let user_id = trimmed_str(&req.params, "userId");
    let Some(usuario) = store::get_user(conn, &user_id)? else {
        return Err(HandlerErr::not_found("usuário not found"));
    };

    if usuario.username.to_lowercase() == "admin" {
        return Err(HandlerErr::invalid(
            "O usuário padrão 'admin' não pode ser removido.",
        ));
    }
    if usuario.id == session.user_id {
        return Err(HandlerErr::invalid(
            "Não é possível remover o usuário logado.",
        ));
    }
    if usuario.role() == Some(Role::Admin) && store::count_admins(conn)? == 1 {
        return Err(HandlerErr::invalid(
            "Não é possível remover o último administrador.",
        ));
    }

    conn.execute("DELETE FROM users WHERE id = ?", [&usuario.id])?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.list" => Some(respond(&req.id, users_list(state, req))),
        "users.create" => Some(respond(&req.id, users_create(state, req))),
        "users.updateRole" => Some(respond(&req.id, users_update_role(state, req))),
        "users.resetPassword" => Some(respond(&req.id, users_reset_password(state, req))),
        "users.delete" => Some(respond(&req.id, users_delete(state, req))),
        _ => None,
    }
}
