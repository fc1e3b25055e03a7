//! Reference data owned by the identity and configuration subsystems.
//!
//! The workflow engine only reads these records: roles and departments feed the
//! permission matrix, `default_assignee_id`/`manager_id` feed routing and
//! notification fan-out, contact fields decide which channels a user can receive.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DepartmentId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NatureTypeId(pub String);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for DepartmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Employee,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Employee => "employee",
            Self::Client => "client",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "employee" => Some(Self::Employee),
            "client" => Some(Self::Client),
            _ => None,
        }
    }

    pub fn is_staff(&self) -> bool {
        !matches!(self, Self::Client)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An already-authenticated caller, as handed over by the session layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
    pub department_id: Option<DepartmentId>,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role, department_id: Option<&str>) -> Self {
        Self {
            id: UserId(id.into()),
            role,
            department_id: department_id.map(|value| DepartmentId(value.to_owned())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
    pub department_id: Option<DepartmentId>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal { id: self.id.clone(), role: self.role, department_id: self.department_id.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
    pub manager_id: Option<UserId>,
    pub default_assignee_id: Option<UserId>,
    pub is_active: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NatureType {
    pub id: NatureTypeId,
    pub name: String,
    pub is_active: bool,
}

#[cfg(test)]
mod tests {
    use super::Role;

    #[test]
    fn role_round_trips_from_storage_encoding() {
        for role in [Role::Admin, Role::Manager, Role::Employee, Role::Client] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse(" Manager "), Some(Role::Manager));
        assert_eq!(Role::parse("superuser"), None);
    }
}
