use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::services::{ensure_can_sign_in, JwtKeys, TokenKind};
use crate::{
    error::AppError,
    state::AppState,
    users::repo_types::{Role, User},
};

/// Extracts and validates the access token, then loads the signed-in user.
pub struct AuthUser(pub User);

impl AuthUser {
    pub fn require(&self, role: Role) -> Result<(), AppError> {
        if self.0.role != role {
            warn!(user_id = %self.0.id, role = %self.0.role, required = %role, "role check failed");
            return Err(AppError::forbidden());
        }
        Ok(())
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = |msg: &str| AppError::Unauthorized(msg.to_string());

        // Read Authorization header
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| unauthorized("Falta el encabezado de autorización"))?;

        // Expect "Bearer <token>"
        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or_else(|| unauthorized("Esquema de autorización inválido"))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify(token).map_err(|_| {
            warn!("invalid or expired token");
            unauthorized("Sesión inválida o expirada")
        })?;
        if claims.kind != TokenKind::Access {
            return Err(unauthorized("Se requiere un token de acceso"));
        }

        let user = state
            .db
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| unauthorized("Usuario no encontrado"))?;
        ensure_can_sign_in(&user)?;

        Ok(AuthUser(user))
    }
}

/// An [`AuthUser`] holding the admin role.
pub struct AdminUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        user.require(Role::Admin)?;
        Ok(AdminUser(user.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::services::hash_password;
    use axum::http::{header::AUTHORIZATION, Request};
    use time::OffsetDateTime;
    use uuid::Uuid;

    async fn seed(st: &AppState, role: Role, active: bool) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: format!("{}@uni.edu", Uuid::new_v4()),
            password_hash: hash_password("irrelevant-pw").unwrap(),
            display_name: "Test".into(),
            role,
            approved: true,
            active,
            team_id: None,
            assigned_projects: vec![],
            created_at: OffsetDateTime::now_utc(),
        };
        st.db.insert_user(&user).await.unwrap();
        user
    }

    fn parts_with(token: Option<&str>) -> Parts {
        let mut req = Request::builder().uri("/api/v1/me");
        if let Some(t) = token {
            req = req.header(AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn accepts_access_token_of_active_user() {
        let st = AppState::fake();
        let user = seed(&st, Role::Student, true).await;
        let token = JwtKeys::from_ref(&st).sign_access(user.id).unwrap();
        let AuthUser(got) = AuthUser::from_request_parts(&mut parts_with(Some(&token)), &st)
            .await
            .unwrap();
        assert_eq!(got.id, user.id);
    }

    #[tokio::test]
    async fn rejects_missing_header_and_refresh_tokens() {
        let st = AppState::fake();
        let user = seed(&st, Role::Student, true).await;
        assert!(AuthUser::from_request_parts(&mut parts_with(None), &st)
            .await
            .is_err());

        let refresh = JwtKeys::from_ref(&st).sign_refresh(user.id).unwrap();
        let err = AuthUser::from_request_parts(&mut parts_with(Some(&refresh)), &st)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn rejects_deactivated_user() {
        let st = AppState::fake();
        let user = seed(&st, Role::Advisor, false).await;
        let token = JwtKeys::from_ref(&st).sign_access(user.id).unwrap();
        let err = AuthUser::from_request_parts(&mut parts_with(Some(&token)), &st)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn admin_extractor_requires_admin_role() {
        let st = AppState::fake();
        let advisor = seed(&st, Role::Advisor, true).await;
        let admin = seed(&st, Role::Admin, true).await;
        let keys = JwtKeys::from_ref(&st);

        let t = keys.sign_access(advisor.id).unwrap();
        assert!(AdminUser::from_request_parts(&mut parts_with(Some(&t)), &st)
            .await
            .is_err());

        let t = keys.sign_access(admin.id).unwrap();
        assert!(AdminUser::from_request_parts(&mut parts_with(Some(&t)), &st)
            .await
            .is_ok());
    }
}
