use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use flowpay_core::{
    DeliverableDraft, DomainEvent, DomainEventKind, EventSink, LedgerStore, Milestone,
    MilestoneStatus, PaymentKind, PaymentRecord, Project, ProjectDraft, ProjectStatus,
    ReviewMode, Verdict,
};
use flowpay_custody::{CustodyError, CustodyReceipt, FundCustody};
use flowpay_lifecycle::{
    MilestoneEvent, Reconciliation, advance, derive_project_status, open_project, reconcile,
    validate_deliverables,
};
use flowpay_verify::{VerificationRequest, VerifierSet};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{config::CoordinatorConfig, error::EscrowError, locks::ProjectLocks};

type EscrowResult<T> = Result<T, EscrowError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activation {
    pub project_id: Uuid,
    pub status: ProjectStatus,
    pub escrow_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub approved: bool,
    pub milestone: Milestone,
    pub verdict: Option<Verdict>,
}

/// Projects an address takes part in, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyProjects {
    pub address: String,
    pub as_client: Vec<Project>,
    pub as_freelancer: Vec<Project>,
}

/// Sequences custody and verification calls against milestone transitions.
///
/// Every mutating operation runs inside its project's scope from
/// [`ProjectLocks`], so the "no record yet" check, the custody call and the
/// commit that appends the record cannot interleave with another request for
/// the same project.
pub struct EscrowCoordinator {
    store: Arc<dyn LedgerStore>,
    custody: Arc<dyn FundCustody>,
    verifiers: VerifierSet,
    events: Arc<dyn EventSink>,
    config: CoordinatorConfig,
    locks: ProjectLocks,
}

impl EscrowCoordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        custody: Arc<dyn FundCustody>,
        verifiers: VerifierSet,
        events: Arc<dyn EventSink>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            custody,
            verifiers,
            events,
            config,
            locks: ProjectLocks::default(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub async fn create_project(&self, draft: ProjectDraft) -> EscrowResult<Project> {
        let project = open_project(draft, Utc::now())?;
        self.store.insert_project(&project).await?;

        info!(
            project_id = %project.id,
            total = %project.total_amount,
            milestones = project.milestones.len(),
            "project created"
        );
        self.publish(DomainEvent::new(
            project.id,
            DomainEventKind::ProjectCreated,
            json!({ "total_amount": project.total_amount }),
        ))
        .await;

        Ok(project)
    }

    pub async fn get_project(&self, project_id: Uuid) -> EscrowResult<Project> {
        self.load(project_id).await
    }

    pub async fn list_projects(&self) -> EscrowResult<Vec<Project>> {
        Ok(self.store.projects(None).await?)
    }

    pub async fn party_projects(&self, address: &str) -> EscrowResult<PartyProjects> {
        let address = address.trim();
        if address.is_empty() {
            return Err(EscrowError::Validation("address is required".to_string()));
        }

        let (as_client, as_freelancer): (Vec<Project>, Vec<Project>) = self
            .store
            .projects(Some(address))
            .await?
            .into_iter()
            .partition(|project| project.client == address);

        Ok(PartyProjects {
            address: address.to_string(),
            as_client,
            as_freelancer,
        })
    }

    pub async fn milestone(&self, milestone_id: Uuid) -> EscrowResult<Milestone> {
        let project_id = self.project_id_for(milestone_id).await?;
        let project = self.load(project_id).await?;
        project
            .milestone(milestone_id)
            .cloned()
            .ok_or(EscrowError::MilestoneNotFound(milestone_id))
    }

    pub async fn payments(&self, project_id: Uuid) -> EscrowResult<Vec<PaymentRecord>> {
        self.load(project_id).await?;
        Ok(self.store.payments(project_id).await?)
    }

    pub async fn audit_project(&self, project_id: Uuid) -> EscrowResult<Reconciliation> {
        let project = self.load(project_id).await?;
        let payments = self.store.payments(project_id).await?;
        Ok(reconcile(&project, &payments)?)
    }

    /// Locks the project total in escrow and starts the first milestone.
    pub async fn activate_project(&self, project_id: Uuid) -> EscrowResult<Activation> {
        let _scope = self.locks.acquire(project_id).await;
        let mut project = self.load(project_id).await?;

        if project.status != ProjectStatus::Pending {
            return Err(EscrowError::InvalidTransition {
                from: format!("project is {}", project.status),
                event: "activate",
            });
        }

        if self
            .store
            .has_payment(project_id, None, PaymentKind::EscrowLock)
            .await?
        {
            return Err(EscrowError::LedgerInconsistency(format!(
                "pending project {project_id} already has an escrow lock"
            )));
        }

        // Checked on the working copy before any money moves.
        let now = Utc::now();
        let first = project
            .milestones
            .first_mut()
            .ok_or_else(|| EscrowError::Validation("project has no milestones".to_string()))?;
        advance(first, MilestoneEvent::Start, now)?;

        let available = self
            .custody_call("balance", self.custody.balance(&project.client))
            .await?;
        if available < project.total_amount {
            warn!(
                %project_id,
                required = %project.total_amount,
                %available,
                "activation refused: insufficient funds"
            );
            return Err(EscrowError::InsufficientFunds {
                required: project.total_amount,
                available,
            });
        }

        let target = self.config.escrow_target.clone();
        let receipt = self
            .custody_call(
                "lock_funds",
                self.custody
                    .lock_funds(&project.client, &target, project.total_amount),
            )
            .await
            .and_then(|receipt| confirmed("lock_funds", receipt))
            .inspect_err(|err| error!(%project_id, "escrow lock failed: {err}"))?;

        project.escrow_tx_ref = Some(receipt.tx_ref.clone());
        project.escrow_target = Some(target.clone());
        project.status = derive_project_status(&project);
        project.updated_at = now;

        let record = PaymentRecord::confirmed(
            project_id,
            None,
            PaymentKind::EscrowLock,
            project.total_amount,
            &project.client,
            &target,
            &receipt.tx_ref,
            now,
        );
        self.commit_after_custody(&project, &record).await?;

        info!(
            %project_id,
            tx_ref = %receipt.tx_ref,
            amount = %project.total_amount,
            "escrow locked"
        );
        self.publish(DomainEvent::new(
            project_id,
            DomainEventKind::EscrowLocked,
            json!({ "tx_ref": receipt.tx_ref, "amount": project.total_amount }),
        ))
        .await;

        Ok(Activation {
            project_id,
            status: project.status,
            escrow_ref: receipt.tx_ref,
        })
    }

    pub async fn submit_milestone(
        &self,
        milestone_id: Uuid,
        deliverables: Vec<DeliverableDraft>,
    ) -> EscrowResult<Milestone> {
        let project_id = self.project_id_for(milestone_id).await?;
        let _scope = self.locks.acquire(project_id).await;
        let mut project = self.load(project_id).await?;
        ensure_active(&project, "submit")?;
        let index = milestone_index(&project, milestone_id)?;

        let now = Utc::now();
        let milestone = &mut project.milestones[index];
        advance(milestone, MilestoneEvent::Submit(deliverables), now)?;
        let mut kind = DomainEventKind::MilestoneSubmitted;
        if self.config.policy.review == ReviewMode::Deferred {
            advance(milestone, MilestoneEvent::BeginReview, now)?;
            kind = DomainEventKind::MilestoneUnderReview;
        }

        let milestone = self.commit_transition(&mut project, index).await?;
        info!(%project_id, %milestone_id, status = %milestone.status, "milestone submitted");
        let payload = json!({ "deliverables": milestone.deliverables.len() });
        self.publish(milestone_event(&milestone, kind, payload)).await;

        Ok(milestone)
    }

    /// Parks a submitted milestone for asynchronous review.
    pub async fn begin_review(&self, milestone_id: Uuid) -> EscrowResult<Milestone> {
        let project_id = self.project_id_for(milestone_id).await?;
        let _scope = self.locks.acquire(project_id).await;
        let mut project = self.load(project_id).await?;
        ensure_active(&project, "review")?;
        let index = milestone_index(&project, milestone_id)?;

        advance(
            &mut project.milestones[index],
            MilestoneEvent::BeginReview,
            Utc::now(),
        )?;
        let milestone = self.commit_transition(&mut project, index).await?;
        self.publish(milestone_event(
            &milestone,
            DomainEventKind::MilestoneUnderReview,
            json!({}),
        ))
        .await;

        Ok(milestone)
    }

    /// Verifies `deliverables` against the milestone and, when approved,
    /// releases its amount to the freelancer.
    ///
    /// A milestone left `verified` by an earlier failed release goes straight
    /// to the release step without being verified again.
    pub async fn verify_and_release(
        &self,
        milestone_id: Uuid,
        deliverables: Vec<DeliverableDraft>,
    ) -> EscrowResult<Release> {
        self.verify_inner(milestone_id, Some(deliverables)).await
    }

    /// Like [`verify_and_release`](Self::verify_and_release), judging the
    /// deliverables already stored on the milestone.
    pub async fn verify_submission(&self, milestone_id: Uuid) -> EscrowResult<Release> {
        self.verify_inner(milestone_id, None).await
    }

    pub async fn file_dispute(&self, milestone_id: Uuid) -> EscrowResult<Milestone> {
        let project_id = self.project_id_for(milestone_id).await?;
        let _scope = self.locks.acquire(project_id).await;
        let mut project = self.load(project_id).await?;
        ensure_active(&project, "dispute")?;
        let index = milestone_index(&project, milestone_id)?;

        advance(
            &mut project.milestones[index],
            MilestoneEvent::Dispute,
            Utc::now(),
        )?;
        let milestone = self.commit_transition(&mut project, index).await?;

        warn!(%project_id, %milestone_id, "milestone disputed");
        self.publish(milestone_event(
            &milestone,
            DomainEventKind::MilestoneDisputed,
            json!({}),
        ))
        .await;

        Ok(milestone)
    }

    /// Cancels a project whose funds were never locked.
    pub async fn cancel_project(&self, project_id: Uuid) -> EscrowResult<Project> {
        let _scope = self.locks.acquire(project_id).await;
        let mut project = self.load(project_id).await?;

        if project.status != ProjectStatus::Pending || project.is_funded() {
            return Err(EscrowError::InvalidTransition {
                from: format!("project is {}", project.status),
                event: "cancel",
            });
        }

        project.status = ProjectStatus::Cancelled;
        project.updated_at = Utc::now();
        self.store.commit(&project, None).await?;

        info!(%project_id, "project cancelled");
        self.publish(DomainEvent::new(
            project_id,
            DomainEventKind::ProjectCancelled,
            json!({}),
        ))
        .await;

        Ok(project)
    }

    async fn verify_inner(
        &self,
        milestone_id: Uuid,
        evidence: Option<Vec<DeliverableDraft>>,
    ) -> EscrowResult<Release> {
        let project_id = self.project_id_for(milestone_id).await?;
        let _scope = self.locks.acquire(project_id).await;
        let mut project = self.load(project_id).await?;
        ensure_active(&project, "verify")?;
        let index = milestone_index(&project, milestone_id)?;

        let status = project.milestones[index].status;
        if status == MilestoneStatus::Verified {
            info!(%project_id, %milestone_id, "retrying release of verified milestone");
            let verdict = project.milestones[index].last_verdict.clone();
            let milestone = self.release(&mut project, index).await?;
            return Ok(Release {
                approved: true,
                milestone,
                verdict,
            });
        }

        if !status.awaiting_verification() {
            return Err(EscrowError::InvalidTransition {
                from: format!("milestone is {status}"),
                event: "verify",
            });
        }

        if let Some(drafts) = &evidence
            && !drafts.is_empty()
        {
            validate_deliverables(drafts)?;
        }

        let milestone = &mut project.milestones[index];
        let deliverables = match evidence {
            Some(drafts) => {
                let submitted: Vec<_> = drafts
                    .into_iter()
                    .map(DeliverableDraft::into_deliverable)
                    .collect();
                if !submitted.is_empty() {
                    milestone.deliverables = submitted.clone();
                }
                submitted
            }
            None => milestone.deliverables.clone(),
        };

        let request = VerificationRequest {
            milestone_id,
            milestone_title: milestone.title.clone(),
            milestone_description: milestone.description.clone(),
            deliverables,
        };
        let verifier = self.verifiers.for_method(milestone.verification_method);

        // No evidence is a rejection whichever verifier is configured; a
        // recorded reviewer decision stays pending for the next submission.
        let outcome = if request.deliverables.is_empty() {
            Ok(Ok(Verdict::reject(0, "no deliverables were submitted")))
        } else {
            timeout(self.config.verification_timeout, verifier.verify(&request)).await
        };
        let verdict = match outcome {
            Err(_) => {
                warn!(%project_id, %milestone_id, "verification timed out");
                return Err(EscrowError::Timeout {
                    operation: "verification",
                });
            }
            Ok(Ok(verdict)) => verdict,
            Ok(Err(err)) => {
                warn!(
                    %project_id,
                    %milestone_id,
                    "verifier failed, treating as rejection: {err:#}"
                );
                Verdict::reject(0, format!("verification unavailable: {err}"))
            }
        };

        let now = Utc::now();
        milestone.last_verdict = Some(verdict.clone());

        if !verdict.approved {
            advance(
                milestone,
                MilestoneEvent::Reject(self.config.policy.rejection),
                now,
            )?;
            let milestone = self.commit_transition(&mut project, index).await?;

            info!(
                %project_id,
                %milestone_id,
                confidence = verdict.confidence,
                "milestone rejected"
            );
            self.publish(milestone_event(
                &milestone,
                DomainEventKind::MilestoneRejected,
                json!({ "confidence": verdict.confidence, "reasoning": verdict.reasoning }),
            ))
            .await;

            return Ok(Release {
                approved: false,
                milestone,
                verdict: Some(verdict),
            });
        }

        advance(milestone, MilestoneEvent::Approve, now)?;
        let verified = self.commit_transition(&mut project, index).await?;
        info!(%project_id, %milestone_id, confidence = verdict.confidence, "milestone verified");
        self.publish(milestone_event(
            &verified,
            DomainEventKind::MilestoneVerified,
            json!({ "confidence": verdict.confidence }),
        ))
        .await;

        let milestone = self.release(&mut project, index).await?;
        Ok(Release {
            approved: true,
            milestone,
            verdict: Some(verdict),
        })
    }

    /// Pays out a verified milestone. Must run inside the project scope.
    async fn release(&self, project: &mut Project, index: usize) -> EscrowResult<Milestone> {
        let project_id = project.id;
        let milestone_id = project.milestones[index].id;
        let amount = project.milestones[index].amount;

        if self
            .store
            .has_payment(project_id, Some(milestone_id), PaymentKind::MilestoneRelease)
            .await?
        {
            return Err(EscrowError::LedgerInconsistency(format!(
                "milestone {milestone_id} already has a release record"
            )));
        }

        let target = project.escrow_target.clone().ok_or_else(|| {
            EscrowError::LedgerInconsistency(format!("project {project_id} has no escrow target"))
        })?;

        let receipt = self
            .custody_call(
                "release_funds",
                self.custody
                    .release_funds(&target, &project.freelancer, amount),
            )
            .await
            .and_then(|receipt| confirmed("release_funds", receipt))
            .inspect_err(|err| {
                error!(
                    %project_id,
                    %milestone_id,
                    "release failed, milestone stays verified: {err}"
                );
            })?;

        let now = Utc::now();
        advance(
            &mut project.milestones[index],
            MilestoneEvent::ConfirmRelease {
                tx_ref: receipt.tx_ref.clone(),
            },
            now,
        )?;
        if let Some(next) = project.milestones.get_mut(index + 1)
            && next.status == MilestoneStatus::Pending
        {
            advance(next, MilestoneEvent::Start, now)?;
        }
        project.status = derive_project_status(project);
        project.updated_at = now;

        let record = PaymentRecord::confirmed(
            project_id,
            Some(milestone_id),
            PaymentKind::MilestoneRelease,
            amount,
            &target,
            &project.freelancer,
            &receipt.tx_ref,
            now,
        );
        self.commit_after_custody(project, &record).await?;

        let milestone = project.milestones[index].clone();
        info!(%project_id, %milestone_id, tx_ref = %receipt.tx_ref, %amount, "milestone released");
        self.publish(milestone_event(
            &milestone,
            DomainEventKind::MilestoneReleased,
            json!({ "tx_ref": receipt.tx_ref, "amount": amount }),
        ))
        .await;

        if project.status == ProjectStatus::Completed {
            info!(%project_id, "project completed");
            self.publish(DomainEvent::new(
                project_id,
                DomainEventKind::ProjectCompleted,
                json!({ "total_amount": project.total_amount }),
            ))
            .await;
        }

        Ok(milestone)
    }

    async fn commit_transition(
        &self,
        project: &mut Project,
        index: usize,
    ) -> EscrowResult<Milestone> {
        project.status = derive_project_status(project);
        project.updated_at = Utc::now();
        self.store.commit(project, None).await?;
        Ok(project.milestones[index].clone())
    }

    async fn commit_after_custody(
        &self,
        project: &Project,
        record: &PaymentRecord,
    ) -> EscrowResult<()> {
        self.store
            .commit(project, Some(record))
            .await
            .inspect_err(|err| {
                error!(
                    project_id = %project.id,
                    kind = %record.kind,
                    tx_ref = %record.tx_ref,
                    "custody call succeeded but the ledger commit failed: {err:#}"
                )
            })?;
        Ok(())
    }

    async fn custody_call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, CustodyError>>,
    ) -> EscrowResult<T> {
        with_deadline(self.config.custody_timeout, operation, call).await
    }

    async fn project_id_for(&self, milestone_id: Uuid) -> EscrowResult<Uuid> {
        self.store
            .project_for_milestone(milestone_id)
            .await?
            .ok_or(EscrowError::MilestoneNotFound(milestone_id))
    }

    async fn load(&self, project_id: Uuid) -> EscrowResult<Project> {
        self.store
            .project(project_id)
            .await?
            .ok_or(EscrowError::ProjectNotFound(project_id))
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(err) = self.events.publish(&event).await {
            warn!(
                kind = ?event.kind,
                aggregate_id = %event.aggregate_id,
                "event publish failed: {err:#}"
            );
        }
    }
}

async fn with_deadline<T>(
    limit: Duration,
    operation: &'static str,
    call: impl Future<Output = Result<T, CustodyError>>,
) -> EscrowResult<T> {
    match timeout(limit, call).await {
        Ok(result) => result.map_err(EscrowError::from),
        Err(_) => Err(EscrowError::Timeout { operation }),
    }
}

fn confirmed(operation: &str, receipt: CustodyReceipt) -> EscrowResult<CustodyReceipt> {
    if receipt.confirmed {
        Ok(receipt)
    } else {
        Err(EscrowError::Custody {
            reason: format!("{operation} {} was not confirmed", receipt.tx_ref),
        })
    }
}

fn ensure_active(project: &Project, event: &'static str) -> EscrowResult<()> {
    if project.status == ProjectStatus::Active {
        Ok(())
    } else {
        Err(EscrowError::InvalidTransition {
            from: format!("project is {}", project.status),
            event,
        })
    }
}

fn milestone_index(project: &Project, milestone_id: Uuid) -> EscrowResult<usize> {
    project
        .milestone_index(milestone_id)
        .ok_or(EscrowError::MilestoneNotFound(milestone_id))
}

fn milestone_event(
    milestone: &Milestone,
    kind: DomainEventKind,
    payload: serde_json::Value,
) -> DomainEvent {
    DomainEvent::new(milestone.project_id, kind, payload).for_milestone(milestone.id)
}
