use anyhow::Context;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{DeliveryFilter, PendingReview, ReviewDecision, ReviewRequest},
    gating::{self, UploadBlock},
    repo_types::{Delivery, ReviewStatus},
};
use crate::{
    error::AppError,
    projects::{
        dto::ProjectDetails,
        repo_types::{Project, ProjectStatus},
        services::{load_project, load_visible_project},
    },
    state::AppState,
    users::repo_types::{Role, User},
};

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
    pub file_name: String,
}

pub struct Submission {
    pub milestone: String,
    pub note: Option<String>,
    pub file: UploadItem,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "application/pdf" => Some("pdf"),
        "application/msword" => Some("doc"),
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => Some("docx"),
        "application/vnd.oasis.opendocument.text" => Some("odt"),
        "application/zip" | "application/x-zip-compressed" => Some("zip"),
        "text/plain" => Some("txt"),
        _ => None,
    }
}

fn ext_from_file_name(name: &str) -> Option<&str> {
    let (_, ext) = name.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}

fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn delivery_key(project_id: Uuid, milestone: &str, version: i32, id: Uuid, file: &UploadItem) -> String {
    let ext = ext_from_mime(&file.content_type)
        .map(str::to_string)
        .or_else(|| ext_from_file_name(&file.file_name).map(|e| e.to_ascii_lowercase()))
        .unwrap_or_else(|| "bin".into());
    format!(
        "deliveries/{}/{}/v{}-{}.{}",
        project_id,
        slugify(milestone),
        version,
        id,
        ext
    )
}

impl From<UploadBlock> for AppError {
    fn from(block: UploadBlock) -> Self {
        match block {
            UploadBlock::UnknownMilestone => AppError::Validation(block.to_string()),
            _ => AppError::Conflict(block.to_string()),
        }
    }
}

/// Orders by milestone sequence, newest version first.
fn sort_for_project(project: &Project, deliveries: &mut [Delivery]) {
    deliveries.sort_by(|a, b| {
        let ia = project.milestone_index(&a.milestone).unwrap_or(usize::MAX);
        let ib = project.milestone_index(&b.milestone).unwrap_or(usize::MAX);
        ia.cmp(&ib).then(b.version.cmp(&a.version))
    });
}

pub async fn submit_delivery(
    st: &AppState,
    student: &User,
    project_id: Uuid,
    submission: Submission,
) -> Result<Delivery, AppError> {
    let mut project = load_project(st, project_id).await?;
    if student.role != Role::Student || !project.is_member(student.id) {
        warn!(user_id = %student.id, project_id = %project_id, "upload by non-member");
        return Err(AppError::forbidden());
    }
    let milestone = submission.milestone.trim().to_string();
    if submission.file.body.is_empty() {
        return Err(AppError::validation("El archivo está vacío"));
    }
    if submission.file.body.len() > st.config.upload_max_bytes {
        warn!(project_id = %project_id, size = submission.file.body.len(), "upload over size limit");
        return Err(AppError::too_large(st.config.upload_max_bytes));
    }

    let existing = st.db.list_deliveries(project_id).await?;
    if let Err(block) = gating::check_upload(&project, &existing, &milestone) {
        warn!(project_id = %project_id, milestone = %milestone, reason = %block, "upload blocked");
        return Err(block.into());
    }
    let version = gating::next_version(&existing, &milestone);

    let id = Uuid::new_v4();
    let key = delivery_key(project_id, &milestone, version, id, &submission.file);
    let size_bytes = submission.file.body.len() as i64;
    st.storage
        .put_object(&key, submission.file.body, &submission.file.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;

    let delivery = Delivery {
        id,
        project_id,
        milestone,
        version,
        s3_key: key,
        file_name: submission.file.file_name,
        content_type: submission.file.content_type,
        size_bytes,
        uploaded_by: student.id,
        note: submission
            .note
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty()),
        status: ReviewStatus::Pending,
        comments: None,
        reviewed_by: None,
        created_at: OffsetDateTime::now_utc(),
        reviewed_at: None,
    };

    if !st.db.insert_delivery(&delivery).await? {
        warn!(project_id = %project_id, milestone = %delivery.milestone, version, "version taken by concurrent upload");
        if let Err(e) = st.storage.delete_object(&delivery.s3_key).await {
            warn!(error = %e, key = %delivery.s3_key, "failed to remove orphaned upload");
        }
        return Err(AppError::Conflict(
            "Otra entrega para este hito se registró al mismo tiempo".into(),
        ));
    }

    if project.status == ProjectStatus::Pending {
        project.status = ProjectStatus::InProgress;
        project.updated_at = OffsetDateTime::now_utc();
        st.db.save_project(&project).await?;
    }

    info!(delivery_id = %delivery.id, project_id = %project_id, milestone = %delivery.milestone, version, "delivery submitted");
    Ok(delivery)
}

pub async fn list_deliveries(
    st: &AppState,
    user: &User,
    project_id: Uuid,
    filter: &DeliveryFilter,
) -> Result<Vec<Delivery>, AppError> {
    let project = load_visible_project(st, user, project_id).await?;
    let mut deliveries: Vec<Delivery> = st
        .db
        .list_deliveries(project_id)
        .await?
        .into_iter()
        .filter(|d| {
            filter
                .milestone
                .as_deref()
                .map_or(true, |m| d.milestone == m.trim())
        })
        .filter(|d| filter.status.map_or(true, |s| d.status == s))
        .collect();
    sort_for_project(&project, &mut deliveries);
    Ok(deliveries)
}

pub async fn project_details(
    st: &AppState,
    user: &User,
    project_id: Uuid,
) -> Result<ProjectDetails, AppError> {
    let project = load_visible_project(st, user, project_id).await?;
    let deliveries = st.db.list_deliveries(project_id).await?;
    let board = gating::milestone_board(&project, &deliveries);
    Ok(ProjectDetails { project, board })
}

fn can_review(reviewer: &User, project: &Project) -> bool {
    match reviewer.role {
        Role::Admin => true,
        Role::Advisor => project.advisor_id == reviewer.id,
        Role::Student => false,
    }
}

pub async fn review_delivery(
    st: &AppState,
    reviewer: &User,
    delivery_id: Uuid,
    req: ReviewRequest,
) -> Result<Delivery, AppError> {
    let comment = req
        .comment
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if req.decision == ReviewDecision::Reject && comment.is_none() {
        return Err(AppError::validation(
            "Debe indicar un comentario al rechazar una entrega",
        ));
    }

    let mut delivery = st
        .db
        .get_delivery(delivery_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Entrega no encontrada".into()))?;
    let mut project = load_project(st, delivery.project_id).await?;
    if !can_review(reviewer, &project) {
        warn!(user_id = %reviewer.id, delivery_id = %delivery_id, "review by non-advisor");
        return Err(AppError::forbidden());
    }
    if delivery.status != ReviewStatus::Pending {
        return Err(AppError::Conflict("La entrega ya fue revisada".into()));
    }

    let now = OffsetDateTime::now_utc();
    delivery.status = match req.decision {
        ReviewDecision::Approve => ReviewStatus::Approved,
        ReviewDecision::Reject => ReviewStatus::Rejected,
    };
    delivery.comments = comment;
    delivery.reviewed_by = Some(reviewer.id);
    delivery.reviewed_at = Some(now);
    st.db.save_delivery(&delivery).await?;

    if delivery.status == ReviewStatus::Approved {
        match project.milestone_index(&delivery.milestone) {
            Some(idx) => {
                project.milestones[idx].completed = true;
                if project.all_milestones_completed() {
                    project.status = ProjectStatus::Completed;
                    info!(project_id = %project.id, "all milestones approved, project completed");
                } else if project.status == ProjectStatus::Pending {
                    project.status = ProjectStatus::InProgress;
                }
                project.updated_at = now;
                st.db.save_project(&project).await?;
            }
            None => warn!(project_id = %project.id, milestone = %delivery.milestone, "approved delivery for unknown milestone"),
        }
    }

    info!(delivery_id = %delivery.id, status = %delivery.status, reviewer_id = %reviewer.id, "delivery reviewed");
    Ok(delivery)
}

/// Presigned URL of the delivered file, for anyone who can see the project.
pub async fn download_url(st: &AppState, user: &User, delivery_id: Uuid) -> Result<String, AppError> {
    let delivery = st
        .db
        .get_delivery(delivery_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Entrega no encontrada".into()))?;
    load_visible_project(st, user, delivery.project_id).await?;
    let url = st
        .storage
        .presign_get(&delivery.s3_key, st.config.download_url_ttl_secs)
        .await
        .with_context(|| format!("presign url for s3_key {}", delivery.s3_key))?;
    Ok(url)
}

/// Deliveries waiting on the advisor, oldest first.
pub async fn pending_reviews(st: &AppState, advisor: &User) -> Result<Vec<PendingReview>, AppError> {
    if advisor.role != Role::Advisor {
        return Err(AppError::forbidden());
    }
    let mut out = Vec::new();
    for project_id in &advisor.assigned_projects {
        let Some(project) = st.db.get_project(*project_id).await? else {
            warn!(project_id = %project_id, advisor_id = %advisor.id, "assigned project missing");
            continue;
        };
        for delivery in st.db.list_deliveries(project.id).await? {
            if delivery.status == ReviewStatus::Pending {
                out.push(PendingReview {
                    project_id: project.id,
                    project_title: project.title.clone(),
                    delivery,
                });
            }
        }
    }
    out.sort_by_key(|r| r.delivery.created_at);
    Ok(out)
}
