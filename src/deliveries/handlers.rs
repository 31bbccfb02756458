use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, Query, State},
    handler::Handler,
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{DeliveryFilter, DownloadLink, MilestoneCard, PendingReview, ReviewRequest},
    repo_types::Delivery,
    services::{self, Submission, UploadItem},
};
use crate::{auth::extractors::AuthUser, error::AppError, state::AppState};

/// Room for multipart boundaries and the text fields on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// --- public routers ---

pub fn routes(upload_max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/projects/:id/deliveries",
            get(list_deliveries)
                // multipart: milestone, file, note?
                .post(upload_delivery.layer(DefaultBodyLimit::max(
                    upload_max_bytes + MULTIPART_OVERHEAD,
                ))),
        )
        .route("/projects/:id/milestones", get(milestone_board))
        .route("/deliveries/:id/review", post(review_delivery))
        .route("/deliveries/:id/file", get(download_file))
        .route("/deliveries/:id/link", get(download_link))
        .route("/reviews/pending", get(pending_reviews))
}

// --- handlers ---

#[instrument(skip_all, fields(user_id = %user.id, project_id = %id))]
pub async fn upload_delivery(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    mut mp: Multipart,
) -> Result<(StatusCode, Json<Delivery>), AppError> {
    let max_bytes = state.config.upload_max_bytes;
    let bad_form = |e: MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::too_large(max_bytes)
        } else {
            AppError::validation(format!("Formulario inválido: {}", e.body_text()))
        }
    };

    let mut milestone = None;
    let mut note = None;
    let mut file = None;
    while let Some(field) = mp.next_field().await.map_err(bad_form)? {
        let name = field.name().map(|s| s.to_string());
        match name.as_deref() {
            Some("milestone") => milestone = Some(field.text().await.map_err(bad_form)?),
            Some("note") => note = Some(field.text().await.map_err(bad_form)?),
            Some("file") => {
                let file_name = field.file_name().unwrap_or("entrega").to_string();
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field.bytes().await.map_err(bad_form)?;
                file = Some(UploadItem {
                    body,
                    content_type,
                    file_name,
                });
            }
            _ => {}
        }
    }

    let milestone = milestone.ok_or_else(|| AppError::validation("Debe indicar el hito"))?;
    let file = file.ok_or_else(|| AppError::validation("Debe adjuntar un archivo"))?;

    let delivery =
        services::submit_delivery(&state, &user, id, Submission { milestone, note, file }).await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

#[instrument(skip_all, fields(user_id = %user.id, project_id = %id))]
pub async fn list_deliveries(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Query(filter): Query<DeliveryFilter>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    Ok(Json(services::list_deliveries(&state, &user, id, &filter).await?))
}

#[instrument(skip_all, fields(user_id = %user.id, project_id = %id))]
pub async fn milestone_board(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MilestoneCard>>, AppError> {
    let details = services::project_details(&state, &user, id).await?;
    Ok(Json(details.board))
}

#[instrument(skip_all, fields(user_id = %user.id, delivery_id = %id))]
pub async fn review_delivery(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ReviewRequest>,
) -> Result<Json<Delivery>, AppError> {
    Ok(Json(services::review_delivery(&state, &user, id, body).await?))
}

/// 307 → presigned url of the delivered file.
#[instrument(skip_all, fields(user_id = %user.id, delivery_id = %id))]
pub async fn download_file(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Redirect, AppError> {
    let url = services::download_url(&state, &user, id).await?;
    Ok(Redirect::temporary(&url))
}

#[instrument(skip_all, fields(user_id = %user.id, delivery_id = %id))]
pub async fn download_link(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DownloadLink>, AppError> {
    let url = services::download_url(&state, &user, id).await?;
    Ok(Json(DownloadLink { url }))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn pending_reviews(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<PendingReview>>, AppError> {
    Ok(Json(services::pending_reviews(&state, &user).await?))
}
