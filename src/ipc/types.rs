use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::auth::Capability;
use crate::store::UserRow;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The user currently logged in on this connection.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: String,
    pub username: String,
    pub role_raw: String,
}

impl SessionUser {
    pub fn from_row(row: &UserRow) -> SessionUser {
        SessionUser {
            user_id: row.id.clone(),
            username: row.username.clone(),
            role_raw: row.role_raw.clone(),
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        crate::auth::Role::parse(&self.role_raw)
            .map(|r| r.allows(capability))
            .unwrap_or(false)
    }
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub session: Option<SessionUser>,
}
