use std::collections::HashMap;

use async_trait::async_trait;
use flowpay_core::{LedgerStore, PaymentRecord, Project};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    projects: HashMap<Uuid, Project>,
    milestone_index: HashMap<Uuid, Uuid>,
    payments: Vec<PaymentRecord>,
}

/// Process-local store. Both tables sit behind one lock so a commit is atomic.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    tables: RwLock<Tables>,
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn insert_project(&self, project: &Project) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        if tables.projects.contains_key(&project.id) {
            anyhow::bail!("project {} already exists", project.id);
        }

        for milestone in &project.milestones {
            tables.milestone_index.insert(milestone.id, project.id);
        }
        tables.projects.insert(project.id, project.clone());

        Ok(())
    }

    async fn project(&self, project_id: Uuid) -> anyhow::Result<Option<Project>> {
        let tables = self.tables.read().await;
        Ok(tables.projects.get(&project_id).cloned())
    }

    async fn projects(&self, party: Option<&str>) -> anyhow::Result<Vec<Project>> {
        let tables = self.tables.read().await;
        let mut projects: Vec<Project> = tables
            .projects
            .values()
            .filter(|project| {
                party.is_none_or(|party| project.client == party || project.freelancer == party)
            })
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        Ok(projects)
    }

    async fn project_for_milestone(&self, milestone_id: Uuid) -> anyhow::Result<Option<Uuid>> {
        let tables = self.tables.read().await;
        Ok(tables.milestone_index.get(&milestone_id).copied())
    }

    async fn payments(&self, project_id: Uuid) -> anyhow::Result<Vec<PaymentRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .iter()
            .filter(|record| record.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn commit(
        &self,
        project: &Project,
        payment: Option<&PaymentRecord>,
    ) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.projects.contains_key(&project.id) {
            anyhow::bail!("project {} not found", project.id);
        }

        if let Some(record) = payment {
            if record.project_id != project.id {
                anyhow::bail!("payment {} belongs to another project", record.id);
            }
            if tables.payments.iter().any(|existing| existing.id == record.id) {
                anyhow::bail!("payment {} already recorded", record.id);
            }
            tables.payments.push(record.clone());
        }
        tables.projects.insert(project.id, project.clone());

        Ok(())
    }
}
