use anyhow::Result;
use async_trait::async_trait;
use flowpay_core::Verdict;

use crate::{VerificationRequest, Verifier};

const URL_WEIGHT: u8 = 40;
const PROOF_WEIGHT: u8 = 30;
const DESCRIPTION_WEIGHT: u8 = 30;
const APPROVAL_THRESHOLD: u8 = 70;

/// Scores deliverables on links, proof of work and complete descriptions.
#[derive(Debug, Default, Clone)]
pub struct HeuristicVerifier;

impl HeuristicVerifier {
    pub fn score(&self, request: &VerificationRequest) -> Verdict {
        let deliverables = &request.deliverables;
        if deliverables.is_empty() {
            return Verdict::reject(0, "No deliverables were submitted.")
                .with_suggestions(vec!["Submit at least one deliverable".to_string()]);
        }

        let has_urls = deliverables.iter().any(|d| d.url.is_some());
        let has_proof = deliverables.iter().any(|d| d.proof.is_some());
        let described = deliverables
            .iter()
            .all(|d| !d.description.trim().is_empty());

        let score = [
            (has_urls, URL_WEIGHT),
            (has_proof, PROOF_WEIGHT),
            (described, DESCRIPTION_WEIGHT),
        ]
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, weight)| weight)
        .sum::<u8>();

        let mut reasoning = String::from("Deliverables have been reviewed.");
        if has_urls {
            reasoning.push_str(" Links provided.");
        }
        if has_proof {
            reasoning.push_str(" Proof of work submitted.");
        }
        reasoning.push_str(if described {
            " All descriptions complete."
        } else {
            " Some descriptions missing."
        });

        if score >= APPROVAL_THRESHOLD {
            return Verdict::approve(score, reasoning);
        }

        let suggestions = [
            (!has_urls, "Consider adding links to deliverables"),
            (!has_proof, "Add proof of work (commits, screenshots, etc.)"),
            (!described, "Complete all deliverable descriptions"),
        ]
        .into_iter()
        .filter(|(missing, _)| *missing)
        .map(|(_, suggestion)| suggestion.to_string())
        .collect();

        Verdict::reject(score, reasoning).with_suggestions(suggestions)
    }
}

#[async_trait]
impl Verifier for HeuristicVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<Verdict> {
        Ok(self.score(request))
    }
}

#[cfg(test)]
mod tests {
    use flowpay_core::{DeliverableDraft, DeliverableKind};
    use uuid::Uuid;

    use super::*;

    fn request(deliverables: Vec<DeliverableDraft>) -> VerificationRequest {
        VerificationRequest {
            milestone_id: Uuid::new_v4(),
            milestone_title: "API".to_string(),
            milestone_description: "REST endpoints".to_string(),
            deliverables: deliverables
                .into_iter()
                .map(DeliverableDraft::into_deliverable)
                .collect(),
        }
    }

    #[test]
    fn link_and_description_pass() {
        let verdict = HeuristicVerifier.score(&request(vec![DeliverableDraft {
            kind: DeliverableKind::Code,
            title: "repo".to_string(),
            description: "service source".to_string(),
            url: Some("https://github.com/x".to_string()),
            proof: None,
        }]));

        assert!(verdict.approved);
        assert_eq!(verdict.confidence, 70);
        assert!(verdict.suggestions.is_empty());
    }

    #[test]
    fn bare_title_is_rejected_with_suggestions() {
        let verdict = HeuristicVerifier.score(&request(vec![DeliverableDraft::titled("notes")]));

        assert!(!verdict.approved);
        assert_eq!(verdict.confidence, 0);
        assert_eq!(verdict.suggestions.len(), 3);
        assert!(verdict.reasoning.contains("Some descriptions missing"));
    }

    #[test]
    fn nothing_submitted_is_a_zero_confidence_reject() {
        let verdict = HeuristicVerifier.score(&request(Vec::new()));
        assert!(!verdict.approved);
        assert_eq!(verdict.confidence, 0);
    }
}
