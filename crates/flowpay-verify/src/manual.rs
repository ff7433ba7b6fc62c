use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use flowpay_core::Verdict;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{VerificationRequest, Verifier};

/// Verdicts given by a person (validator or client), recorded ahead of the
/// verification call and consumed by it.
#[derive(Default)]
pub struct ManualVerifier {
    decisions: RwLock<HashMap<Uuid, Verdict>>,
}

impl ManualVerifier {
    pub async fn record(&self, milestone_id: Uuid, approved: bool, reasoning: &str) -> Verdict {
        let reasoning = match reasoning.trim() {
            "" if approved => "Approved by reviewer".to_string(),
            "" => "Rejected by reviewer".to_string(),
            text => text.to_string(),
        };
        let verdict = if approved {
            Verdict::approve(100, reasoning)
        } else {
            Verdict::reject(100, reasoning)
        };

        self.decisions
            .write()
            .await
            .insert(milestone_id, verdict.clone());
        verdict
    }

    pub async fn pending(&self, milestone_id: Uuid) -> Option<Verdict> {
        self.decisions.read().await.get(&milestone_id).cloned()
    }
}

#[async_trait]
impl Verifier for ManualVerifier {
    async fn verify(&self, request: &VerificationRequest) -> Result<Verdict> {
        let decision = self.decisions.write().await.remove(&request.milestone_id);
        decision.ok_or_else(|| {
            anyhow::anyhow!(
                "no reviewer decision recorded for milestone {}",
                request.milestone_id
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(milestone_id: Uuid) -> VerificationRequest {
        VerificationRequest {
            milestone_id,
            milestone_title: "Logo".to_string(),
            milestone_description: String::new(),
            deliverables: Vec::new(),
        }
    }

    #[tokio::test]
    async fn decision_is_consumed_once() {
        let verifier = ManualVerifier::default();
        let milestone_id = Uuid::new_v4();
        verifier.record(milestone_id, true, "").await;
        assert!(verifier.pending(milestone_id).await.is_some());

        let verdict = verifier.verify(&request(milestone_id)).await.unwrap();
        assert!(verdict.approved);
        assert_eq!(verdict.reasoning, "Approved by reviewer");

        assert!(verifier.verify(&request(milestone_id)).await.is_err());
    }
}
