use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

/// Lifecycle of a thesis project.
///
/// ```text
/// pending → in_progress → completed
///    ↓           ↓
/// rejected   suspended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
    Suspended,
}

impl ProjectStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Rejected => "rejected",
            ProjectStatus::Suspended => "suspended",
        }
    }

    /// Students may only submit work while the project is open.
    pub const fn accepts_deliveries(self) -> bool {
        matches!(self, ProjectStatus::Pending | ProjectStatus::InProgress)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProjectStatus::Pending),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "completed" => Ok(ProjectStatus::Completed),
            "rejected" => Ok(ProjectStatus::Rejected),
            "suspended" => Ok(ProjectStatus::Suspended),
            other => anyhow::bail!("unknown project status {other:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub name: String,
    pub completed: bool,
}

impl Milestone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            completed: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: ProjectStatus,
    pub milestones: Vec<Milestone>,
    pub advisor_id: Uuid,
    pub student_ids: Vec<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Project {
    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.student_ids.contains(&user_id)
    }

    pub fn milestone_index(&self, name: &str) -> Option<usize> {
        self.milestones.iter().position(|m| m.name == name)
    }

    /// First milestone in sequence that is not yet completed.
    pub fn current_milestone(&self) -> Option<&Milestone> {
        self.milestones.iter().find(|m| !m.completed)
    }

    pub fn all_milestones_completed(&self) -> bool {
        self.milestones.iter().all(|m| m.completed)
    }
}

#[derive(Debug, FromRow)]
pub struct ProjectRow {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: String,
    pub milestones: Json<Vec<Milestone>>,
    pub advisor_id: Uuid,
    pub student_ids: Vec<Uuid>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<ProjectRow> for Project {
    type Error = anyhow::Error;

    fn try_from(r: ProjectRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            title: r.title,
            description: r.description,
            status: r.status.parse()?,
            milestones: r.milestones.0,
            advisor_id: r.advisor_id,
            student_ids: r.student_ids,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
