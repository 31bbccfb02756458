pub(crate) use crate::auth::dto::{Claims, JwtKeys, TokenKind};
use crate::auth::dto::RegisterRequest;
use crate::config::{AdminSeed, JwtConfig};
use crate::error::AppError;
use crate::state::AppState;
use crate::users::repo_types::{Role, User};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use lazy_static::lazy_static;
use rand::rngs::OsRng;
use regex::Regex;
use std::time::Duration;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

pub fn verify_password(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
            refresh_ttl_minutes,
        } = cfg.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_minutes as u64) * 60),
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let exp = now + TimeDuration::seconds(ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            kind,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, kind = ?kind, "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }
    pub fn sign_refresh(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, kind = ?data.claims.kind, "jwt verified");
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.kind != TokenKind::Refresh {
            anyhow::bail!("not a refresh token");
        }
        Ok(claims)
    }

    /// Access + refresh pair for a signed-in user.
    pub fn issue_pair(&self, user_id: Uuid) -> anyhow::Result<(String, String)> {
        Ok((self.sign_access(user_id)?, self.sign_refresh(user_id)?))
    }
}

/// Rejects accounts that have not been approved or were deactivated.
pub(crate) fn ensure_can_sign_in(user: &User) -> Result<(), AppError> {
    if !user.approved {
        warn!(user_id = %user.id, "sign in before approval");
        return Err(AppError::Forbidden(
            "Su cuenta está pendiente de aprobación por un administrador".into(),
        ));
    }
    if !user.active {
        warn!(user_id = %user.id, "sign in on deactivated account");
        return Err(AppError::Forbidden("Su cuenta ha sido desactivada".into()));
    }
    Ok(())
}

pub async fn register_user(st: &AppState, req: RegisterRequest) -> Result<User, AppError> {
    let email = normalize_email(&req.email);
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Correo electrónico inválido"));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "La contraseña debe tener al menos 8 caracteres",
        ));
    }
    let display_name = req.display_name.trim();
    if display_name.is_empty() {
        return Err(AppError::validation("El nombre es obligatorio"));
    }
    if req.role == Role::Admin {
        warn!(email = %email, "admin self-registration attempt");
        return Err(AppError::validation(
            "No es posible registrarse como administrador",
        ));
    }

    let user = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(&req.password)?,
        display_name: display_name.to_string(),
        role: req.role,
        approved: false,
        active: true,
        team_id: None,
        assigned_projects: Vec::new(),
        created_at: OffsetDateTime::now_utc(),
    };

    if !st.db.insert_user(&user).await? {
        warn!(email = %user.email, "email already registered");
        return Err(AppError::Conflict(
            "El correo electrónico ya está registrado".into(),
        ));
    }

    info!(user_id = %user.id, role = %user.role, "user registered, awaiting approval");
    Ok(user)
}

pub async fn authenticate(st: &AppState, email: &str, password: &str) -> Result<User, AppError> {
    let invalid = || AppError::Unauthorized("Credenciales inválidas".into());
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AppError::validation("Correo electrónico inválido"));
    }

    let Some(user) = st.db.find_user_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(invalid());
    };

    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(invalid());
    }

    ensure_can_sign_in(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(user)
}

/// Validates a refresh token and reloads its user.
pub async fn refresh_session(st: &AppState, refresh_token: &str) -> Result<User, AppError> {
    let keys = JwtKeys::from_ref(st);
    let claims = keys.verify_refresh(refresh_token).map_err(|e| {
        warn!(error = %e, "refresh rejected");
        AppError::Unauthorized("Sesión inválida o expirada".into())
    })?;

    let user = st
        .db
        .get_user(claims.sub)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Usuario no encontrado".into()))?;
    ensure_can_sign_in(&user)?;
    Ok(user)
}

/// Creates the configured administrator when no account uses that email.
pub async fn ensure_admin(st: &AppState, seed: &AdminSeed) -> anyhow::Result<()> {
    let email = normalize_email(&seed.email);
    if st.db.find_user_by_email(&email).await?.is_some() {
        debug!(email = %email, "admin account present");
        return Ok(());
    }
    let admin = User {
        id: Uuid::new_v4(),
        email,
        password_hash: hash_password(&seed.password)?,
        display_name: "Administrador".into(),
        role: Role::Admin,
        approved: true,
        active: true,
        team_id: None,
        assigned_projects: Vec::new(),
        created_at: OffsetDateTime::now_utc(),
    };
    if st.db.insert_user(&admin).await? {
        info!(user_id = %admin.id, email = %admin.email, "admin account seeded");
    }
    Ok(())
}



#[cfg(test)]
mod account_tests {
    use super::*;

    fn request(email: &str, role: Role) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: "long-enough-pw".into(),
            display_name: "Ana Pérez".into(),
            role,
        }
    }

    #[tokio::test]
    async fn registration_waits_for_approval() {
        let st = AppState::fake();
        let user = register_user(&st, request(" Ana@Uni.edu ", Role::Student))
            .await
            .unwrap();
        assert_eq!(user.email, "ana@uni.edu");
        assert!(!user.approved);

        let err = authenticate(&st, "ana@uni.edu", "long-enough-pw")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let st = AppState::fake();
        register_user(&st, request("ana@uni.edu", Role::Student))
            .await
            .unwrap();
        let err = register_user(&st, request("ANA@uni.edu", Role::Advisor))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn admins_cannot_self_register() {
        let st = AppState::fake();
        let err = register_user(&st, request("root@uni.edu", Role::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn short_password_rejected() {
        let st = AppState::fake();
        let mut req = request("ana@uni.edu", Role::Student);
        req.password = "short".into();
        assert!(matches!(
            register_user(&st, req).await.unwrap_err(),
            AppError::Validation(_)
        ));
    }

    #[tokio::test]
    async fn seeded_admin_can_log_in_and_refresh() {
        let st = AppState::fake();
        let seed = AdminSeed {
            email: "Admin@Uni.edu".into(),
            password: "admin-password".into(),
        };
        ensure_admin(&st, &seed).await.unwrap();
        ensure_admin(&st, &seed).await.unwrap();
        assert_eq!(st.db.list_users().await.unwrap().len(), 1);

        let admin = authenticate(&st, "admin@uni.edu", "admin-password")
            .await
            .unwrap();
        assert_eq!(admin.role, Role::Admin);

        let err = authenticate(&st, "admin@uni.edu", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let keys = JwtKeys::from_ref(&st);
        let (access, refresh) = keys.issue_pair(admin.id).unwrap();
        assert_eq!(refresh_session(&st, &refresh).await.unwrap().id, admin.id);
        assert!(matches!(
            refresh_session(&st, &access).await.unwrap_err(),
            AppError::Unauthorized(_)
        ));
    }
}
