use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateProjectRequest, ProjectDetails, ProjectFilter, UpdateProjectRequest},
    repo_types::Project,
    services,
};
use crate::{
    auth::extractors::{AdminUser, AuthUser},
    deliveries,
    error::AppError,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:id",
            get(get_project).patch(update_project).delete(delete_project),
        )
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn create_project(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(body): Json<CreateProjectRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Project>), AppError> {
    let project = services::create_project(&state, body).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/projects/{}", project.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(project)))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_projects(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(filter): Query<ProjectFilter>,
) -> Result<Json<Vec<Project>>, AppError> {
    Ok(Json(services::list_projects(&state, &user, &filter).await?))
}

#[instrument(skip_all, fields(user_id = %user.id, project_id = %id))]
pub async fn get_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ProjectDetails>, AppError> {
    Ok(Json(deliveries::services::project_details(&state, &user, id).await?))
}

#[instrument(skip_all, fields(admin_id = %admin.id, project_id = %id))]
pub async fn update_project(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, AppError> {
    Ok(Json(services::update_project(&state, id, body).await?))
}

#[instrument(skip_all, fields(admin_id = %admin.id, project_id = %id))]
pub async fn delete_project(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_project(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
