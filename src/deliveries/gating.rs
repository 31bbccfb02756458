//! Milestone gating and delivery versioning.
//!
//! Milestones are worked through in order. A student may upload to the first
//! incomplete milestone only, and only while no earlier version of it waits
//! for review. Approving a delivery completes its milestone and thereby
//! unlocks the next one.

use thiserror::Error;

use super::{
    dto::{LatestDelivery, MilestoneCard},
    repo_types::{Delivery, ReviewStatus},
};
use crate::projects::repo_types::{Project, ProjectStatus};

/// Why an upload for a milestone is not allowed right now.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadBlock {
    #[error("El proyecto no admite entregas en estado {0}")]
    ProjectClosed(ProjectStatus),

    #[error("El hito no pertenece al proyecto")]
    UnknownMilestone,

    #[error("El hito ya fue aprobado")]
    AlreadyApproved,

    #[error("Debe completar primero el hito \"{current}\"")]
    OutOfOrder { current: String },

    #[error("La versión {version} de este hito está pendiente de revisión")]
    PendingReview { version: i32 },
}

/// Version assigned to the next delivery of `milestone`: one more than the
/// number of deliveries it already has.
pub fn next_version(deliveries: &[Delivery], milestone: &str) -> i32 {
    deliveries.iter().filter(|d| d.milestone == milestone).count() as i32 + 1
}

/// Newest delivery of `milestone`, by version.
pub fn latest_delivery<'a>(deliveries: &'a [Delivery], milestone: &str) -> Option<&'a Delivery> {
    deliveries
        .iter()
        .filter(|d| d.milestone == milestone)
        .max_by_key(|d| d.version)
}

pub fn check_upload(
    project: &Project,
    deliveries: &[Delivery],
    milestone: &str,
) -> Result<(), UploadBlock> {
    if !project.status.accepts_deliveries() {
        return Err(UploadBlock::ProjectClosed(project.status));
    }
    let idx = project
        .milestone_index(milestone)
        .ok_or(UploadBlock::UnknownMilestone)?;
    if project.milestones[idx].completed {
        return Err(UploadBlock::AlreadyApproved);
    }
    if let Some(current) = project.current_milestone() {
        if current.name != milestone {
            return Err(UploadBlock::OutOfOrder {
                current: current.name.clone(),
            });
        }
    }
    if let Some(pending) = deliveries
        .iter()
        .find(|d| d.milestone == milestone && d.status == ReviewStatus::Pending)
    {
        return Err(UploadBlock::PendingReview {
            version: pending.version,
        });
    }
    Ok(())
}

/// Per-milestone progress with the upload gate evaluated.
pub fn milestone_board(project: &Project, deliveries: &[Delivery]) -> Vec<MilestoneCard> {
    project
        .milestones
        .iter()
        .map(|m| {
            let gate = check_upload(project, deliveries, &m.name);
            MilestoneCard {
                name: m.name.clone(),
                completed: m.completed,
                versions: deliveries.iter().filter(|d| d.milestone == m.name).count(),
                latest: latest_delivery(deliveries, &m.name).map(LatestDelivery::from),
                can_upload: gate.is_ok(),
                blocked_reason: gate.err().map(|b| b.to_string()),
            }
        })
        .collect()
}
