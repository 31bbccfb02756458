use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::UserFilter,
    repo_types::{Role, User},
};
use crate::{error::AppError, state::AppState};

pub(crate) async fn load_user(st: &AppState, id: Uuid) -> Result<User, AppError> {
    st.db
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("Usuario"))
}

fn passes_filter(user: &User, filter: &UserFilter) -> bool {
    if filter.role.is_some_and(|r| r != user.role) {
        return false;
    }
    if filter.approved.is_some_and(|a| a != user.approved) {
        return false;
    }
    if filter.active.is_some_and(|a| a != user.active) {
        return false;
    }
    match filter.q.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => {
            let q = q.to_lowercase();
            user.display_name.to_lowercase().contains(&q) || user.email.contains(&q)
        }
        _ => true,
    }
}

fn sort_by_name(users: &mut [User]) {
    users.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
            .then_with(|| a.email.cmp(&b.email))
    });
}

pub async fn list_users(st: &AppState, filter: &UserFilter) -> Result<Vec<User>, AppError> {
    let mut users: Vec<User> = st
        .db
        .list_users()
        .await?
        .into_iter()
        .filter(|u| passes_filter(u, filter))
        .collect();
    sort_by_name(&mut users);
    Ok(users)
}

pub async fn approve_user(st: &AppState, id: Uuid) -> Result<User, AppError> {
    let mut user = load_user(st, id).await?;
    if !user.approved {
        user.approved = true;
        st.db.save_user(&user).await?;
        info!(user_id = %user.id, role = %user.role, "user approved");
    }
    Ok(user)
}

pub async fn set_active(
    st: &AppState,
    actor: &User,
    id: Uuid,
    active: bool,
) -> Result<User, AppError> {
    if actor.id == id && !active {
        warn!(user_id = %id, "admin tried to deactivate own account");
        return Err(AppError::validation("No puede desactivar su propia cuenta"));
    }
    let mut user = load_user(st, id).await?;
    if user.active != active {
        user.active = active;
        st.db.save_user(&user).await?;
        info!(user_id = %user.id, active, "user activation changed");
    }
    Ok(user)
}

/// Advisors that can be assigned to a new project.
pub async fn list_advisors(st: &AppState) -> Result<Vec<User>, AppError> {
    let filter = UserFilter {
        role: Some(Role::Advisor),
        approved: Some(true),
        active: Some(true),
        q: None,
    };
    list_users(st, &filter).await
}

/// Students not yet on a team.
pub async fn available_students(st: &AppState) -> Result<Vec<User>, AppError> {
    let filter = UserFilter {
        role: Some(Role::Student),
        approved: Some(true),
        active: Some(true),
        q: None,
    };
    let mut students = list_users(st, &filter).await?;
    students.retain(|s| s.team_id.is_none());
    Ok(students)
}
