use anyhow::Context;
use async_trait::async_trait;
use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use super::Database;
use crate::{
    deliveries::repo_types::{Delivery, DeliveryRow},
    projects::repo_types::{Project, ProjectRow},
    users::repo_types::{User, UserRow},
};

const USER_COLS: &str = "id, email, password_hash, display_name, role, approved, active, \
                         team_id, assigned_projects, created_at";
const PROJECT_COLS: &str =
    "id, title, description, status, milestones, advisor_id, student_ids, created_at, updated_at";
const DELIVERY_COLS: &str = "id, project_id, milestone, version, s3_key, file_name, content_type, \
                             size_bytes, uploaded_by, note, status, comments, reviewed_by, \
                             created_at, reviewed_at";

#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Database for PgDatabase {
    async fn insert_user(&self, user: &User) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO users (id, email, password_hash, display_name, role, approved, active,
                               team_id, assigned_projects, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.approved)
        .bind(user.active)
        .bind(user.team_id)
        .bind(&user.assigned_projects)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .context("insert user")?;
        Ok(res.rows_affected() == 1)
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("get user")?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let row =
            sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLS} FROM users WHERE email = $1"))
                .bind(email)
                .fetch_optional(&self.pool)
                .await
                .context("find user by email")?;
        row.map(User::try_from).transpose()
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLS} FROM users"))
            .fetch_all(&self.pool)
            .await
            .context("list users")?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn save_user(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
               SET display_name = $2, role = $3, approved = $4, active = $5,
                   team_id = $6, assigned_projects = $7
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.display_name)
        .bind(user.role.as_str())
        .bind(user.approved)
        .bind(user.active)
        .bind(user.team_id)
        .bind(&user.assigned_projects)
        .execute(&self.pool)
        .await
        .context("save user")?;
        Ok(())
    }

    async fn insert_project(&self, project: &Project) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (id, title, description, status, milestones, advisor_id,
                                  student_ids, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(Json(&project.milestones))
        .bind(project.advisor_id)
        .bind(&project.student_ids)
        .bind(project.created_at)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await
        .context("insert project")?;
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> anyhow::Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLS} FROM projects WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("get project")?;
        row.map(Project::try_from).transpose()
    }

    async fn list_projects(&self) -> anyhow::Result<Vec<Project>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!("SELECT {PROJECT_COLS} FROM projects"))
            .fetch_all(&self.pool)
            .await
            .context("list projects")?;
        rows.into_iter().map(Project::try_from).collect()
    }

    async fn save_project(&self, project: &Project) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE projects
               SET title = $2, description = $3, status = $4, milestones = $5,
                   advisor_id = $6, student_ids = $7, updated_at = $8
             WHERE id = $1
            "#,
        )
        .bind(project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(project.status.as_str())
        .bind(Json(&project.milestones))
        .bind(project.advisor_id)
        .bind(&project.student_ids)
        .bind(project.updated_at)
        .execute(&self.pool)
        .await
        .context("save project")?;
        Ok(())
    }

    async fn delete_project(&self, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM projects WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("delete project")?;
        Ok(())
    }

    async fn insert_delivery(&self, d: &Delivery) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO deliveries (id, project_id, milestone, version, s3_key, file_name,
                                    content_type, size_bytes, uploaded_by, note, status,
                                    comments, reviewed_by, created_at, reviewed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (project_id, milestone, version) DO NOTHING
            "#,
        )
        .bind(d.id)
        .bind(d.project_id)
        .bind(&d.milestone)
        .bind(d.version)
        .bind(&d.s3_key)
        .bind(&d.file_name)
        .bind(&d.content_type)
        .bind(d.size_bytes)
        .bind(d.uploaded_by)
        .bind(&d.note)
        .bind(d.status.as_str())
        .bind(&d.comments)
        .bind(d.reviewed_by)
        .bind(d.created_at)
        .bind(d.reviewed_at)
        .execute(&self.pool)
        .await
        .context("insert delivery")?;
        Ok(res.rows_affected() == 1)
    }

    async fn get_delivery(&self, id: Uuid) -> anyhow::Result<Option<Delivery>> {
        let row = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {DELIVERY_COLS} FROM deliveries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("get delivery")?;
        row.map(Delivery::try_from).transpose()
    }

    async fn list_deliveries(&self, project_id: Uuid) -> anyhow::Result<Vec<Delivery>> {
        let rows = sqlx::query_as::<_, DeliveryRow>(&format!(
            "SELECT {DELIVERY_COLS} FROM deliveries WHERE project_id = $1 ORDER BY created_at ASC"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .context("list deliveries by project")?;
        rows.into_iter().map(Delivery::try_from).collect()
    }

    async fn save_delivery(&self, d: &Delivery) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE deliveries
               SET status = $2, comments = $3, reviewed_by = $4, reviewed_at = $5
             WHERE id = $1
            "#,
        )
        .bind(d.id)
        .bind(d.status.as_str())
        .bind(&d.comments)
        .bind(d.reviewed_by)
        .bind(d.reviewed_at)
        .execute(&self.pool)
        .await
        .context("save delivery")?;
        Ok(())
    }

    async fn delete_deliveries(&self, project_id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM deliveries WHERE project_id = $1")
            .bind(project_id)
            .execute(&self.pool)
            .await
            .context("delete deliveries by project")?;
        Ok(())
    }
}
