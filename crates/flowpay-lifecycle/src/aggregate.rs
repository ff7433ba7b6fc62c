use chrono::{DateTime, Utc};
use flowpay_core::{
    DeliverableDraft, Milestone, MilestoneStatus, Project, ProjectDraft, ProjectStatus,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{engine::select_verification_method, error::LifecycleError};

/// Validates `draft` and builds a pending project from it.
pub fn open_project(draft: ProjectDraft, now: DateTime<Utc>) -> Result<Project, LifecycleError> {
    let client = required(&draft.client, "client")?;
    let freelancer = required(&draft.freelancer, "freelancer")?;
    let title = required(&draft.title, "title")?;

    if client == freelancer {
        return Err(LifecycleError::validation(
            "client and freelancer must be different parties",
        ));
    }

    if draft.milestones.is_empty() {
        return Err(LifecycleError::validation(
            "at least one milestone is required",
        ));
    }

    if draft.total_amount <= Decimal::ZERO {
        return Err(LifecycleError::validation("total_amount must be positive"));
    }

    let project_id = Uuid::new_v4();
    let mut milestones = Vec::with_capacity(draft.milestones.len());
    let mut sum = Decimal::ZERO;

    for (position, milestone) in draft.milestones.into_iter().enumerate() {
        let milestone_title = required(&milestone.title, &format!("milestones[{position}].title"))?;
        if milestone.amount <= Decimal::ZERO {
            return Err(LifecycleError::validation(format!(
                "milestones[{position}].amount must be positive"
            )));
        }
        sum += milestone.amount;

        let verification_method = milestone
            .verification_method
            .unwrap_or_else(|| select_verification_method(&milestone.deliverables));

        milestones.push(Milestone {
            id: Uuid::new_v4(),
            project_id,
            title: milestone_title,
            description: milestone.description,
            amount: milestone.amount,
            deliverables: milestone
                .deliverables
                .into_iter()
                .map(DeliverableDraft::into_deliverable)
                .collect(),
            status: MilestoneStatus::Pending,
            due_date: milestone.due_date,
            submitted_at: None,
            verified_at: None,
            paid_at: None,
            release_tx_ref: None,
            verification_method,
            last_verdict: None,
        });
    }

    if sum != draft.total_amount {
        return Err(LifecycleError::validation(format!(
            "milestone amounts sum to {sum} but total_amount is {}",
            draft.total_amount
        )));
    }

    Ok(Project {
        id: project_id,
        client,
        freelancer,
        title,
        description: draft.description,
        total_amount: draft.total_amount,
        status: ProjectStatus::Pending,
        milestones,
        escrow_tx_ref: None,
        escrow_target: None,
        created_at: now,
        updated_at: now,
    })
}

/// Project status as implied by its milestones.
pub fn derive_project_status(project: &Project) -> ProjectStatus {
    if project.status == ProjectStatus::Cancelled {
        return ProjectStatus::Cancelled;
    }

    let statuses = || project.milestones.iter().map(|milestone| milestone.status);

    if !project.milestones.is_empty() && statuses().all(|status| status == MilestoneStatus::Paid) {
        ProjectStatus::Completed
    } else if statuses().any(|status| status == MilestoneStatus::Disputed) {
        ProjectStatus::Disputed
    } else if project.is_funded() {
        ProjectStatus::Active
    } else {
        project.status
    }
}

fn required(value: &str, field: &str) -> Result<String, LifecycleError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LifecycleError::validation(format!("{field} is required")));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use flowpay_core::{MilestoneDraft, VerificationMethod};

    use super::*;

    fn draft(amounts: &[Decimal], total: Decimal) -> ProjectDraft {
        ProjectDraft {
            client: "client-addr".to_string(),
            freelancer: "freelancer-addr".to_string(),
            title: "Marketplace".to_string(),
            description: String::new(),
            total_amount: total,
            milestones: amounts
                .iter()
                .enumerate()
                .map(|(i, amount)| MilestoneDraft {
                    title: format!("Milestone {i}"),
                    amount: *amount,
                    ..MilestoneDraft::default()
                })
                .collect(),
        }
    }

    #[test]
    fn opens_pending_project_when_amounts_reconcile() {
        let amounts = [Decimal::new(25, 1), Decimal::new(5, 0), Decimal::new(25, 1)];
        let project = open_project(draft(&amounts, Decimal::new(10, 0)), Utc::now()).unwrap();

        assert_eq!(project.status, ProjectStatus::Pending);
        assert_eq!(project.milestones.len(), 3);
        assert!(
            project
                .milestones
                .iter()
                .all(|m| m.status == MilestoneStatus::Pending && m.project_id == project.id)
        );
        assert!(!project.is_funded());
    }

    #[test]
    fn rejects_mismatched_total() {
        let amounts = [Decimal::new(25, 1), Decimal::new(5, 0)];
        let err = open_project(draft(&amounts, Decimal::new(10, 0)), Utc::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(message) if message.contains("sum")));
    }

    #[test]
    fn rejects_non_positive_amounts_and_missing_titles() {
        let zero = open_project(
            draft(&[Decimal::ZERO, Decimal::new(10, 0)], Decimal::new(10, 0)),
            Utc::now(),
        );
        assert!(matches!(zero, Err(LifecycleError::Validation(_))));

        let mut untitled = draft(&[Decimal::new(10, 0)], Decimal::new(10, 0));
        untitled.milestones[0].title = " ".to_string();
        assert!(open_project(untitled, Utc::now()).is_err());

        let mut anonymous = draft(&[Decimal::new(10, 0)], Decimal::new(10, 0));
        anonymous.client = String::new();
        assert!(open_project(anonymous, Utc::now()).is_err());

        assert!(open_project(draft(&[], Decimal::new(10, 0)), Utc::now()).is_err());
    }

    #[test]
    fn rejects_same_client_and_freelancer() {
        let mut own = draft(&[Decimal::new(10, 0)], Decimal::new(10, 0));
        own.freelancer = own.client.clone();
        let err = open_project(own, Utc::now()).unwrap_err();
        assert!(
            matches!(err, LifecycleError::Validation(message) if message.contains("different"))
        );
    }

    #[test]
    fn verification_method_follows_planned_deliverables() {
        let mut planned = draft(&[Decimal::new(4, 0), Decimal::new(6, 0)], Decimal::new(10, 0));
        planned.milestones[0].deliverables =
            vec![DeliverableDraft::titled("repo").with_url("https://github.com/x")];
        planned.milestones[1].verification_method = Some(VerificationMethod::Client);

        let project = open_project(planned, Utc::now()).unwrap();
        assert_eq!(
            project.milestones[0].verification_method,
            VerificationMethod::Ai
        );
        assert_eq!(
            project.milestones[1].verification_method,
            VerificationMethod::Client
        );
    }

    #[test]
    fn derives_aggregate_status() {
        let amounts = [Decimal::new(5, 0), Decimal::new(5, 0)];
        let mut project = open_project(draft(&amounts, Decimal::new(10, 0)), Utc::now()).unwrap();
        assert_eq!(derive_project_status(&project), ProjectStatus::Pending);

        project.escrow_tx_ref = Some("lock-1".to_string());
        assert_eq!(derive_project_status(&project), ProjectStatus::Active);

        project.milestones[0].status = MilestoneStatus::Paid;
        assert_eq!(derive_project_status(&project), ProjectStatus::Active);

        project.milestones[1].status = MilestoneStatus::Disputed;
        assert_eq!(derive_project_status(&project), ProjectStatus::Disputed);

        project.milestones[1].status = MilestoneStatus::Paid;
        assert_eq!(derive_project_status(&project), ProjectStatus::Completed);

        project.status = ProjectStatus::Cancelled;
        assert_eq!(derive_project_status(&project), ProjectStatus::Cancelled);
    }
}
