use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Advisor,
    Student,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Advisor => "advisor",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "advisor" => Ok(Role::Advisor),
            "student" => Ok(Role::Student),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    pub display_name: String,
    pub role: Role,
    pub approved: bool,
    pub active: bool,
    pub team_id: Option<Uuid>,         // project a student belongs to
    pub assigned_projects: Vec<Uuid>,  // projects an advisor supervises
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl User {
    /// Approved and not deactivated.
    pub fn can_sign_in(&self) -> bool {
        self.approved && self.active
    }
}

#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub role: String,
    pub approved: bool,
    pub active: bool,
    pub team_id: Option<Uuid>,
    pub assigned_projects: Vec<Uuid>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            display_name: r.display_name,
            role: r.role.parse()?,
            approved: r.approved,
            active: r.active,
            team_id: r.team_id,
            assigned_projects: r.assigned_projects,
            created_at: r.created_at,
        })
    }
}
