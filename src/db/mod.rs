use async_trait::async_trait;
use uuid::Uuid;

use crate::{deliveries::repo_types::Delivery, projects::repo_types::Project, users::repo_types::User};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgDatabase;

/// Record store behind the services. Inserts that can collide on a unique
/// key return `Ok(false)` instead of failing.
#[async_trait]
pub trait Database: Send + Sync {
    async fn insert_user(&self, user: &User) -> anyhow::Result<bool>;
    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn list_users(&self) -> anyhow::Result<Vec<User>>;
    async fn save_user(&self, user: &User) -> anyhow::Result<()>;

    async fn insert_project(&self, project: &Project) -> anyhow::Result<()>;
    async fn get_project(&self, id: Uuid) -> anyhow::Result<Option<Project>>;
    async fn list_projects(&self) -> anyhow::Result<Vec<Project>>;
    async fn save_project(&self, project: &Project) -> anyhow::Result<()>;
    async fn delete_project(&self, id: Uuid) -> anyhow::Result<()>;

    /// `Ok(false)` when `(project_id, milestone, version)` already exists.
    async fn insert_delivery(&self, delivery: &Delivery) -> anyhow::Result<bool>;
    async fn get_delivery(&self, id: Uuid) -> anyhow::Result<Option<Delivery>>;
    async fn list_deliveries(&self, project_id: Uuid) -> anyhow::Result<Vec<Delivery>>;
    async fn save_delivery(&self, delivery: &Delivery) -> anyhow::Result<()>;
    async fn delete_deliveries(&self, project_id: Uuid) -> anyhow::Result<()>;
}
