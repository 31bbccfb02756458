use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Database;
use crate::{deliveries::repo_types::Delivery, projects::repo_types::Project, users::repo_types::User};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    projects: HashMap<Uuid, Project>,
    deliveries: HashMap<Uuid, Delivery>,
}

/// In-process stand-in for the PostgreSQL store, used by tests.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: RwLock<Tables>,
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn insert_user(&self, user: &User) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|u| u.email == user.email) {
            return Ok(false);
        }
        t.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn get_user(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let t = self.tables.read().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> anyhow::Result<Vec<User>> {
        Ok(self.tables.read().await.users.values().cloned().collect())
    }

    async fn save_user(&self, user: &User) -> anyhow::Result<()> {
        let mut t = self.tables.write().await;
        let slot = t
            .users
            .get_mut(&user.id)
            .ok_or_else(|| anyhow::anyhow!("user {} not found", user.id))?;
        *slot = user.clone();
        Ok(())
    }

    async fn insert_project(&self, project: &Project) -> anyhow::Result<()> {
        let mut t = self.tables.write().await;
        t.projects.insert(project.id, project.clone());
        Ok(())
    }

    async fn get_project(&self, id: Uuid) -> anyhow::Result<Option<Project>> {
        Ok(self.tables.read().await.projects.get(&id).cloned())
    }

    async fn list_projects(&self) -> anyhow::Result<Vec<Project>> {
        Ok(self.tables.read().await.projects.values().cloned().collect())
    }

    async fn save_project(&self, project: &Project) -> anyhow::Result<()> {
        let mut t = self.tables.write().await;
        let slot = t
            .projects
            .get_mut(&project.id)
            .ok_or_else(|| anyhow::anyhow!("project {} not found", project.id))?;
        *slot = project.clone();
        Ok(())
    }

    async fn delete_project(&self, id: Uuid) -> anyhow::Result<()> {
        self.tables.write().await.projects.remove(&id);
        Ok(())
    }

    async fn insert_delivery(&self, delivery: &Delivery) -> anyhow::Result<bool> {
        let mut t = self.tables.write().await;
        let taken = t.deliveries.values().any(|d| {
            d.project_id == delivery.project_id
                && d.milestone == delivery.milestone
                && d.version == delivery.version
        });
        if taken {
            return Ok(false);
        }
        t.deliveries.insert(delivery.id, delivery.clone());
        Ok(true)
    }

    async fn get_delivery(&self, id: Uuid) -> anyhow::Result<Option<Delivery>> {
        Ok(self.tables.read().await.deliveries.get(&id).cloned())
    }

    async fn list_deliveries(&self, project_id: Uuid) -> anyhow::Result<Vec<Delivery>> {
        let t = self.tables.read().await;
        let mut out: Vec<Delivery> = t
            .deliveries
            .values()
            .filter(|d| d.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by_key(|d| d.created_at);
        Ok(out)
    }

    async fn save_delivery(&self, delivery: &Delivery) -> anyhow::Result<()> {
        let mut t = self.tables.write().await;
        let slot = t
            .deliveries
            .get_mut(&delivery.id)
            .ok_or_else(|| anyhow::anyhow!("delivery {} not found", delivery.id))?;
        *slot = delivery.clone();
        Ok(())
    }

    async fn delete_deliveries(&self, project_id: Uuid) -> anyhow::Result<()> {
        self.tables
            .write()
            .await
            .deliveries
            .retain(|_, d| d.project_id != project_id);
        Ok(())
    }
}
