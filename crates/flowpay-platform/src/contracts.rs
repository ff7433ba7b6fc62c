use chrono::{DateTime, Utc};
use flowpay_core::{DeliverableDraft, Milestone, MilestoneStatus, PaymentRecord, Verdict};
use flowpay_escrow::Release;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitMilestoneRequest {
    pub deliverables: Vec<DeliverableDraft>,
}

/// Omitting `deliverables` verifies what was stored at submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyMilestoneRequest {
    #[serde(default)]
    pub deliverables: Option<Vec<DeliverableDraft>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyMilestoneResponse {
    pub milestone_id: Uuid,
    pub approved: bool,
    pub status: MilestoneStatus,
    pub confidence: Option<u8>,
    pub reasoning: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub release_tx_ref: Option<String>,
    pub milestone: Milestone,
}

impl From<Release> for VerifyMilestoneResponse {
    fn from(release: Release) -> Self {
        let Release {
            approved,
            milestone,
            verdict,
        } = release;

        Self {
            milestone_id: milestone.id,
            approved,
            status: milestone.status,
            confidence: verdict.as_ref().map(|verdict| verdict.confidence),
            reasoning: verdict.as_ref().map(|verdict| verdict.reasoning.clone()),
            suggestions: verdict.map(|verdict| verdict.suggestions).unwrap_or_default(),
            release_tx_ref: milestone.release_tx_ref.clone(),
            milestone,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub approved: bool,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionResponse {
    pub milestone_id: Uuid,
    pub verdict: Verdict,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsResponse {
    pub project_id: Uuid,
    pub payments: Vec<PaymentRecord>,
}

#[cfg(test)]
mod tests {
    use flowpay_core::VerificationMethod;
    use rust_decimal::Decimal;

    use super::*;

    fn milestone(status: MilestoneStatus) -> Milestone {
        Milestone {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            title: "Launch".to_string(),
            description: String::new(),
            amount: Decimal::new(3, 0),
            deliverables: Vec::new(),
            status,
            due_date: None,
            submitted_at: None,
            verified_at: None,
            paid_at: None,
            release_tx_ref: None,
            verification_method: VerificationMethod::Validator,
            last_verdict: None,
        }
    }

    #[test]
    fn verify_request_accepts_empty_body() {
        let request: VerifyMilestoneRequest = serde_json::from_str("{}").unwrap();
        assert!(request.deliverables.is_none());

        let request: VerifyMilestoneRequest =
            serde_json::from_str(r#"{"deliverables": []}"#).unwrap();
        assert_eq!(request.deliverables.map(|list| list.len()), Some(0));
    }

    #[test]
    fn flattens_rejection_verdict() {
        let response = VerifyMilestoneResponse::from(Release {
            approved: false,
            milestone: milestone(MilestoneStatus::InProgress),
            verdict: Some(
                Verdict::reject(40, "no proof").with_suggestions(vec!["Attach proof".to_string()]),
            ),
        });

        assert!(!response.approved);
        assert_eq!(response.status, MilestoneStatus::InProgress);
        assert_eq!(response.confidence, Some(40));
        assert_eq!(response.suggestions, vec!["Attach proof"]);
        assert!(response.release_tx_ref.is_none());
    }
}
