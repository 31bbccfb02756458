use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{SetActiveRequest, UserFilter},
    services,
};
use crate::{
    auth::{dto::PublicUser, extractors::AdminUser},
    error::AppError,
    state::AppState,
    users::repo_types::User,
};

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id/approve", post(approve_user))
        .route("/users/:id/active", post(set_active))
        .route("/advisors", get(list_advisors))
        .route("/students/available", get(available_students))
}

fn public(users: Vec<User>) -> Json<Vec<PublicUser>> {
    Json(users.iter().map(PublicUser::from).collect())
}

#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn list_users(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(filter): Query<UserFilter>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    Ok(public(services::list_users(&state, &filter).await?))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn approve_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::approve_user(&state, id).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn set_active(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let user = services::set_active(&state, &admin, id, body.active).await?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip_all)]
pub async fn list_advisors(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    Ok(public(services::list_advisors(&state).await?))
}

#[instrument(skip_all)]
pub async fn available_students(
    State(state): State<AppState>,
    AdminUser(_): AdminUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    Ok(public(services::available_students(&state).await?))
}
