use chrono::{DateTime, Utc};
use flowpay_core::{
    DeliverableDraft, DeliverableStatus, Milestone, MilestoneStatus, RejectionPolicy,
    VerificationMethod,
};

use crate::error::LifecycleError;

const AUTO_VERIFIABLE_MARKERS: [&str; 2] = ["github", "code"];

#[derive(Debug, Clone, PartialEq)]
pub enum MilestoneEvent {
    Start,
    Submit(Vec<DeliverableDraft>),
    BeginReview,
    Approve,
    Reject(RejectionPolicy),
    ConfirmRelease { tx_ref: String },
    Dispute,
}

impl MilestoneEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Submit(_) => "submit",
            Self::BeginReview => "review",
            Self::Approve => "approve",
            Self::Reject(_) => "reject",
            Self::ConfirmRelease { .. } => "release",
            Self::Dispute => "dispute",
        }
    }
}

/// Applies `event` to `milestone` and returns the resulting status.
///
/// The milestone is left untouched when the event is not legal from its
/// current status or its payload fails validation.
pub fn advance(
    milestone: &mut Milestone,
    event: MilestoneEvent,
    now: DateTime<Utc>,
) -> Result<MilestoneStatus, LifecycleError> {
    use MilestoneStatus::*;

    let from = milestone.status;
    let illegal = || LifecycleError::InvalidTransition {
        from,
        event: event.name(),
    };

    let next = match (&event, from) {
        (MilestoneEvent::Start, Pending) => InProgress,
        (MilestoneEvent::Submit(drafts), InProgress) => {
            validate_deliverables(drafts)?;
            Submitted
        }
        (MilestoneEvent::BeginReview, Submitted) => UnderReview,
        (MilestoneEvent::Approve, Submitted | UnderReview) => Verified,
        (MilestoneEvent::Reject(_), Submitted | UnderReview) => InProgress,
        (MilestoneEvent::ConfirmRelease { tx_ref }, Verified) => {
            if tx_ref.trim().is_empty() {
                return Err(LifecycleError::validation("release tx ref is required"));
            }
            Paid
        }
        (MilestoneEvent::Dispute, status) if !status.is_terminal() => Disputed,
        _ => return Err(illegal()),
    };

    match event {
        MilestoneEvent::Submit(drafts) => {
            milestone.deliverables = drafts
                .into_iter()
                .map(DeliverableDraft::into_deliverable)
                .collect();
            milestone.submitted_at = Some(now);
        }
        MilestoneEvent::Approve => {
            mark_deliverables(milestone, DeliverableStatus::Verified);
            milestone.verified_at = Some(now);
        }
        MilestoneEvent::Reject(RejectionPolicy::Retain) => {
            mark_deliverables(milestone, DeliverableStatus::Rejected);
        }
        MilestoneEvent::Reject(RejectionPolicy::Discard) => {
            milestone.deliverables.clear();
        }
        MilestoneEvent::ConfirmRelease { tx_ref } => {
            milestone.release_tx_ref = Some(tx_ref);
            milestone.paid_at = Some(now);
        }
        MilestoneEvent::Start | MilestoneEvent::BeginReview | MilestoneEvent::Dispute => {}
    }

    milestone.status = next;
    Ok(next)
}

/// Picks how a milestone will be verified from the deliverables planned for it.
pub fn select_verification_method(deliverables: &[DeliverableDraft]) -> VerificationMethod {
    let auto_verifiable = deliverables.iter().any(|deliverable| {
        let reference = deliverable
            .url
            .as_deref()
            .unwrap_or(&deliverable.title)
            .to_ascii_lowercase();
        AUTO_VERIFIABLE_MARKERS
            .iter()
            .any(|marker| reference.contains(marker))
    });

    if auto_verifiable {
        VerificationMethod::Ai
    } else {
        VerificationMethod::Validator
    }
}

/// The evidence rule `Submit` enforces: at least one deliverable, each titled.
pub fn validate_deliverables(drafts: &[DeliverableDraft]) -> Result<(), LifecycleError> {
    if drafts.is_empty() {
        return Err(LifecycleError::validation(
            "at least one deliverable is required",
        ));
    }

    if drafts.iter().any(|draft| draft.title.trim().is_empty()) {
        return Err(LifecycleError::validation("deliverable title is required"));
    }

    Ok(())
}

fn mark_deliverables(milestone: &mut Milestone, status: DeliverableStatus) {
    for deliverable in &mut milestone.deliverables {
        deliverable.verification_status = status;
    }
}
