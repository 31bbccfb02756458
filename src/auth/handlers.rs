use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest},
        extractors::AuthUser,
        services::{self, JwtKeys},
    },
    error::AppError,
    state::AppState,
    users::repo_types::User,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

fn session(state: &AppState, user: &User) -> Result<Json<AuthResponse>, AppError> {
    let (access_token, refresh_token) = JwtKeys::from_ref(state).issue_pair(user.id)?;
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser::from(user),
    }))
}

/// Creates an account pending approval; no tokens are issued.
#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = services::register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(PublicUser::from(&user))))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = services::authenticate(&state, &payload.email, &payload.password).await?;
    session(&state, &user)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = services::refresh_session(&state, &payload.refresh_token).await?;
    session(&state, &user)
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(PublicUser::from(&user))
}

#[cfg(test)]
mod me_tests {
    use super::*;
    use crate::users::repo_types::Role;

    #[test]
    fn test_me_response_serialization() {
        let response = PublicUser {
            id: uuid::Uuid::new_v4(),
            email: "test@example.com".to_string(),
            display_name: "Test".to_string(),
            role: Role::Advisor,
            approved: true,
            active: true,
            team_id: None,
            assigned_projects: vec![],
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(json.contains("\"role\":\"advisor\""));
        assert!(!json.contains("password"));
    }
}
