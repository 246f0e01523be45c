use serde::Deserialize;

/// Role of the acting user.
///
/// Gates output verbosity for failed runs: students get a generic
/// message, staff and admins see captured stderr verbatim. This is a
/// pedagogical choice, not a security one.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Staff,
    Admin,
}

impl Role {
    /// Parses a role string, normalizing unknown values to `Student`.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "staff" => Role::Staff,
            "admin" => Role::Admin,
            _ => Role::Student,
        }
    }

    /// Capitalized display label (e.g. for a role badge).
    pub fn label(&self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Staff => "Staff",
            Role::Admin => "Admin",
        }
    }

    /// Staff and admins see raw stderr; students don't.
    pub fn sees_raw_errors(&self) -> bool {
        matches!(self, Role::Staff | Role::Admin)
    }
}

/// Identity of the acting user.
///
/// Passed explicitly into the playground at construction — never read
/// from ambient state. Consumed read-only: namespaces project storage
/// and gates run-output verbosity.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub id: String,
    pub role: Role,
}

impl UserContext {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}
