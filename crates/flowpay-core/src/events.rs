use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainEventKind {
    ProjectCreated,
    ProjectCancelled,
    EscrowLocked,
    MilestoneSubmitted,
    MilestoneUnderReview,
    MilestoneRejected,
    MilestoneVerified,
    MilestoneReleased,
    MilestoneDisputed,
    ProjectCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub kind: DomainEventKind,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    pub fn new(aggregate_id: Uuid, kind: DomainEventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            milestone_id: None,
            kind,
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn for_milestone(mut self, milestone_id: Uuid) -> Self {
        self.milestone_id = Some(milestone_id);
        self
    }
}

/// Receives lifecycle events after they are committed.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: &DomainEvent) -> anyhow::Result<()> {
        Ok(())
    }
}
