use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{Project, ProjectStatus};
use crate::deliveries::dto::MilestoneCard;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub advisor_id: Option<Uuid>,
    #[serde(default)]
    pub student_ids: Vec<Uuid>,
    /// Milestone names in order; the default sequence when omitted.
    pub milestones: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProjectDetails {
    #[serde(flatten)]
    pub project: Project,
    pub board: Vec<MilestoneCard>,
}
