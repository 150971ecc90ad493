use anyhow::Context;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Dashboard,
    Alunos,
    Turmas,
    Presencas,
    Pagamentos,
    Config,
    Users,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Gestor,
    Instrutor,
}

impl Role {
    pub const CHOICES: [Role; 3] = [Role::Admin, Role::Gestor, Role::Instrutor];

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "admin" => Some(Role::Admin),
            "gestor" => Some(Role::Gestor),
            "instrutor" => Some(Role::Instrutor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Gestor => "gestor",
            Role::Instrutor => "instrutor",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Admin => "Administrador",
            Role::Gestor => "Gestor",
            Role::Instrutor => "Instrutor",
        }
    }

    /// Fixed capability table. Admin holds every capability implicitly.
    pub fn allows(self, capability: Capability) -> bool {
        match self {
            Role::Admin => true,
            Role::Gestor => matches!(
                capability,
                Capability::Dashboard
                    | Capability::Alunos
                    | Capability::Turmas
                    | Capability::Pagamentos
            ),
            Role::Instrutor => {
                matches!(capability, Capability::Dashboard | Capability::Presencas)
            }
        }
    }
}

pub fn hash_password(password: &str) -> anyhow::Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).context("failed to hash password")
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    bcrypt::verify(password, stored_hash).unwrap_or(false)
}
