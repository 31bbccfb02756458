use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{Delivery, ReviewStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryFilter {
    pub milestone: Option<String>,
    pub status: Option<ReviewStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestDelivery {
    pub id: Uuid,
    pub version: i32,
    pub status: ReviewStatus,
}

impl From<&Delivery> for LatestDelivery {
    fn from(d: &Delivery) -> Self {
        Self {
            id: d.id,
            version: d.version,
            status: d.status,
        }
    }
}

/// One row of the milestone board shown to students and advisors.
#[derive(Debug, Clone, Serialize)]
pub struct MilestoneCard {
    pub name: String,
    pub completed: bool,
    pub versions: usize,
    pub latest: Option<LatestDelivery>,
    pub can_upload: bool,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PendingReview {
    pub project_id: Uuid,
    pub project_title: String,
    pub delivery: Delivery,
}

#[derive(Debug, Serialize)]
pub struct DownloadLink {
    pub url: String,
}
