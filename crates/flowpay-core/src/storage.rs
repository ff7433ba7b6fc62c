use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{PaymentKind, PaymentRecord, Project};

/// Durable home of project aggregates and the payment audit trail.
///
/// `commit` must write the project document and the optional payment record
/// together or not at all. Payment records are never updated once written.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn insert_project(&self, project: &Project) -> anyhow::Result<()>;

    async fn project(&self, project_id: Uuid) -> anyhow::Result<Option<Project>>;

    /// Projects newest first, limited to those where `party` is the client or
    /// the freelancer when given.
    async fn projects(&self, party: Option<&str>) -> anyhow::Result<Vec<Project>>;

    async fn project_for_milestone(&self, milestone_id: Uuid) -> anyhow::Result<Option<Uuid>>;

    async fn payments(&self, project_id: Uuid) -> anyhow::Result<Vec<PaymentRecord>>;

    async fn commit(&self, project: &Project, payment: Option<&PaymentRecord>)
    -> anyhow::Result<()>;

    async fn has_payment(
        &self,
        project_id: Uuid,
        milestone_id: Option<Uuid>,
        kind: PaymentKind,
    ) -> anyhow::Result<bool> {
        let payments = self.payments(project_id).await?;
        Ok(payments
            .iter()
            .any(|record| record.kind == kind && record.milestone_id == milestone_id))
    }
}
