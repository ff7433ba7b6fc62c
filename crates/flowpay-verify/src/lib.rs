pub mod ai;
pub mod heuristic;
pub mod manual;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use flowpay_core::{Deliverable, Verdict, VerificationMethod};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use ai::{AiVerifier, CompletionClient};
pub use heuristic::HeuristicVerifier;
pub use manual::ManualVerifier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub milestone_id: Uuid,
    pub milestone_title: String,
    pub milestone_description: String,
    pub deliverables: Vec<Deliverable>,
}

/// Decides whether submitted deliverables satisfy a milestone.
///
/// An empty deliverable list is a valid request and should produce a
/// rejection. Errors are reserved for the verifier itself being unavailable.
#[async_trait]
pub trait Verifier: Send + Sync {
    async fn verify(&self, request: &VerificationRequest) -> Result<Verdict>;
}

/// One verifier per verification method.
#[derive(Clone)]
pub struct VerifierSet {
    pub ai: Arc<dyn Verifier>,
    pub validator: Arc<dyn Verifier>,
    pub client: Arc<dyn Verifier>,
}

impl VerifierSet {
    pub fn uniform(verifier: Arc<dyn Verifier>) -> Self {
        Self {
            ai: verifier.clone(),
            validator: verifier.clone(),
            client: verifier,
        }
    }

    pub fn for_method(&self, method: VerificationMethod) -> &Arc<dyn Verifier> {
        match method {
            VerificationMethod::Ai => &self.ai,
            VerificationMethod::Validator => &self.validator,
            VerificationMethod::Client => &self.client,
        }
    }
}
