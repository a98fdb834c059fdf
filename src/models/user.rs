use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Lecturer,
    Student,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown role '{0}' (expected lecturer or student)")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lecturer" => Ok(Role::Lecturer),
            "student" => Ok(Role::Student),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Lecturer => f.write_str("lecturer"),
            Role::Student => f.write_str("student"),
        }
    }
}

/// A person known to the identity provider. Only the id and role matter to
/// the lifecycle rules; the rest is display data.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Who is performing an operation. Passed explicitly into every lifecycle
/// call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn lecturer(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Lecturer,
        }
    }

    pub fn student(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Student,
        }
    }

    pub fn is_lecturer(&self) -> bool {
        self.role == Role::Lecturer
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            role: user.role,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.role)
    }
}
