use std::collections::HashMap;

use flowpay_core::{MilestoneStatus, PaymentKind, PaymentRecord, PaymentStatus, Project};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LifecycleError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub project_id: Uuid,
    pub locked: Decimal,
    pub released: Decimal,
    /// Funds still under escrow custody.
    pub held: Decimal,
    pub milestones_paid: usize,
}

/// Checks a project's custody trail against its milestone states.
pub fn reconcile(
    project: &Project,
    payments: &[PaymentRecord],
) -> Result<Reconciliation, LifecycleError> {
    let inconsistent = |message: String| -> Result<Reconciliation, LifecycleError> {
        Err(LifecycleError::LedgerInconsistency(message))
    };

    let confirmed = payments
        .iter()
        .filter(|record| record.project_id == project.id)
        .filter(|record| record.status == PaymentStatus::Confirmed);

    let mut locks = Vec::new();
    let mut releases: HashMap<Uuid, &PaymentRecord> = HashMap::new();

    for record in confirmed {
        match record.kind {
            PaymentKind::EscrowLock => locks.push(record),
            PaymentKind::MilestoneRelease => {
                let Some(milestone_id) = record.milestone_id else {
                    return inconsistent(format!("release {} has no milestone", record.id));
                };
                if releases.insert(milestone_id, record).is_some() {
                    return inconsistent(format!("milestone {milestone_id} was released twice"));
                }
            }
            PaymentKind::Refund | PaymentKind::ValidatorFee => {}
        }
    }

    let locked = match (locks.as_slice(), project.escrow_tx_ref.as_deref()) {
        ([], None) => Decimal::ZERO,
        ([lock], Some(escrow_ref)) => {
            if lock.tx_ref != escrow_ref {
                return inconsistent(format!(
                    "escrow lock {} does not match project escrow ref {escrow_ref}",
                    lock.tx_ref
                ));
            }
            if lock.amount != project.total_amount {
                return inconsistent(format!(
                    "locked {} but project total is {}",
                    lock.amount, project.total_amount
                ));
            }
            lock.amount
        }
        ([], Some(escrow_ref)) => {
            return inconsistent(format!("escrow ref {escrow_ref} has no lock record"));
        }
        ([_], None) => return inconsistent("lock record without escrow ref".to_string()),
        (many, _) => {
            return inconsistent(format!("{} escrow locks recorded", many.len()));
        }
    };

    let mut released = Decimal::ZERO;
    let mut milestones_paid = 0;

    for milestone in &project.milestones {
        let release = releases.remove(&milestone.id);
        match (milestone.status, release) {
            (MilestoneStatus::Paid, Some(record)) => {
                if record.amount != milestone.amount {
                    return inconsistent(format!(
                        "milestone {} released {} instead of {}",
                        milestone.id, record.amount, milestone.amount
                    ));
                }
                if milestone.release_tx_ref.as_deref() != Some(record.tx_ref.as_str()) {
                    return inconsistent(format!(
                        "milestone {} release ref does not match the ledger",
                        milestone.id
                    ));
                }
                released += record.amount;
                milestones_paid += 1;
            }
            (MilestoneStatus::Paid, None) => {
                return inconsistent(format!(
                    "milestone {} is paid without a release",
                    milestone.id
                ));
            }
            (status, Some(_)) => {
                return inconsistent(format!(
                    "milestone {} has a release but is {status}",
                    milestone.id
                ));
            }
            (_, None) => {}
        }
    }

    if let Some(orphan) = releases.keys().next() {
        return inconsistent(format!("release for unknown milestone {orphan}"));
    }

    if released > locked {
        return inconsistent(format!("released {released} exceeds locked {locked}"));
    }

    Ok(Reconciliation {
        project_id: project.id,
        locked,
        released,
        held: locked - released,
        milestones_paid,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use flowpay_core::{MilestoneDraft, ProjectDraft};

    use super::*;
    use crate::aggregate::open_project;

    fn funded_project() -> Project {
        let mut project = open_project(
            ProjectDraft {
                client: "client".to_string(),
                freelancer: "freelancer".to_string(),
                title: "Site".to_string(),
                total_amount: Decimal::new(10, 0),
                milestones: vec![
                    MilestoneDraft {
                        title: "Design".to_string(),
                        amount: Decimal::new(4, 0),
                        ..MilestoneDraft::default()
                    },
                    MilestoneDraft {
                        title: "Build".to_string(),
                        amount: Decimal::new(6, 0),
                        ..MilestoneDraft::default()
                    },
                ],
                ..ProjectDraft::default()
            },
            Utc::now(),
        )
        .unwrap();
        project.escrow_tx_ref = Some("lock-1".to_string());
        project
    }

    fn lock(project: &Project) -> PaymentRecord {
        PaymentRecord::confirmed(
            project.id,
            None,
            PaymentKind::EscrowLock,
            project.total_amount,
            "client",
            "escrow",
            "lock-1",
            Utc::now(),
        )
    }

    fn release(project: &Project, index: usize, tx_ref: &str) -> PaymentRecord {
        let milestone = &project.milestones[index];
        PaymentRecord::confirmed(
            project.id,
            Some(milestone.id),
            PaymentKind::MilestoneRelease,
            milestone.amount,
            "escrow",
            "freelancer",
            tx_ref,
            Utc::now(),
        )
    }

    #[test]
    fn balances_locked_against_released() {
        let mut project = funded_project();
        project.milestones[0].status = MilestoneStatus::Paid;
        project.milestones[0].release_tx_ref = Some("rel-1".to_string());
        let payments = vec![lock(&project), release(&project, 0, "rel-1")];

        let summary = reconcile(&project, &payments).unwrap();
        assert_eq!(summary.locked, Decimal::new(10, 0));
        assert_eq!(summary.released, Decimal::new(4, 0));
        assert_eq!(summary.held, Decimal::new(6, 0));
        assert_eq!(summary.milestones_paid, 1);
    }

    #[test]
    fn flags_double_release() {
        let mut project = funded_project();
        project.milestones[0].status = MilestoneStatus::Paid;
        project.milestones[0].release_tx_ref = Some("rel-1".to_string());
        let payments = vec![
            lock(&project),
            release(&project, 0, "rel-1"),
            release(&project, 0, "rel-2"),
        ];

        let err = reconcile(&project, &payments).unwrap_err();
        assert!(matches!(err, LifecycleError::LedgerInconsistency(m) if m.contains("twice")));
    }

    #[test]
    fn flags_release_before_payment_state() {
        let mut project = funded_project();
        project.milestones[0].status = MilestoneStatus::Verified;
        let payments = vec![lock(&project), release(&project, 0, "rel-1")];
        assert!(reconcile(&project, &payments).is_err());
    }

    #[test]
    fn flags_missing_or_duplicate_lock() {
        let project = funded_project();
        assert!(reconcile(&project, &[]).is_err());
        assert!(reconcile(&project, &[lock(&project), lock(&project)]).is_err());

        let mut unfunded = funded_project();
        unfunded.escrow_tx_ref = None;
        let summary = reconcile(&unfunded, &[]).unwrap();
        assert_eq!(summary.held, Decimal::ZERO);
    }
}
