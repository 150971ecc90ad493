use rusqlite::Connection;
use serde_json::json;

use super::error::{err, ok};
use super::types::{AppState, SessionUser};
use crate::auth::Capability;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> HandlerErr {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid(message: impl Into<String>) -> HandlerErr {
        HandlerErr::new("invalid_input", message)
    }

    pub fn not_found(message: impl Into<String>) -> HandlerErr {
        HandlerErr::new("not_found", message)
    }

    pub fn bad_params(message: impl Into<String>) -> HandlerErr {
        HandlerErr::new("bad_params", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> HandlerErr {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

impl From<rusqlite::Error> for HandlerErr {
    fn from(e: rusqlite::Error) -> HandlerErr {
        if is_constraint_violation(&e) {
            return HandlerErr::new("conflict", e.to_string());
        }
        HandlerErr::new("db_query_failed", e.to_string())
    }
}

impl From<anyhow::Error> for HandlerErr {
    fn from(e: anyhow::Error) -> HandlerErr {
        if let Some(sql_err) = e.downcast_ref::<rusqlite::Error>() {
            if is_constraint_violation(sql_err) {
                return HandlerErr::new("conflict", format!("{e:#}"));
            }
        }
        HandlerErr::new("internal", format!("{e:#}"))
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(info, _)
            if info.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(value) => ok(id, value),
        Err(error) => error.response(id),
    }
}

pub fn optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

pub fn trimmed_str(params: &serde_json::Value, key: &str) -> String {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

/// Checkbox-style list: absent or empty both mean "nothing selected".
pub fn str_list(params: &serde_json::Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, HandlerErr> {
    state
        .db
        .as_ref()
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

/// The permission gate: unauthenticated callers are turned away, callers
/// without the capability are bounced with a warning.
pub fn require_capability(
    state: &AppState,
    capability: Capability,
) -> Result<SessionUser, HandlerErr> {
    let Some(session) = state.session.as_ref() else {
        return Err(HandlerErr::new(
            "not_authenticated",
            "Faça login para acessar o sistema.",
        ));
    };
    if !session.allows(capability) {
        return Err(HandlerErr::new(
            "forbidden",
            "Você não tem permissão para acessar este módulo.",
        )
        .with_details(json!({ "redirect": "dashboard" })));
    }
    Ok(session.clone())
}

pub fn require_session(state: &AppState) -> Result<SessionUser, HandlerErr> {
    state.session.clone().ok_or_else(|| {
        HandlerErr::new("not_authenticated", "Faça login para acessar o sistema.")
    })
}
