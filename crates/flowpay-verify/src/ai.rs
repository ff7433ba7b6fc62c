use anyhow::Result;
use async_trait::async_trait;
use flowpay_core::Verdict;
use serde::Deserialize;
use tracing::warn;

use crate::{HeuristicVerifier, VerificationRequest, Verifier};

const FALLBACK_REASONING_CHARS: usize = 200;

/// Text completion backend used by [`AiVerifier`].
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Asks a language model to judge deliverables, falling back to
/// [`HeuristicVerifier`] when the model cannot be reached.
pub struct AiVerifier<C> {
    client: C,
    fallback: HeuristicVerifier,
}

impl<C: CompletionClient> AiVerifier<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            fallback: HeuristicVerifier,
        }
    }
}

#[async_trait]
impl<C: CompletionClient> Verifier for AiVerifier<C> {
    async fn verify(&self, request: &VerificationRequest) -> Result<Verdict> {
        if request.deliverables.is_empty() {
            return Ok(self.fallback.score(request));
        }

        match self.client.complete(&build_prompt(request)).await {
            Ok(content) => Ok(parse_verdict(&content)),
            Err(err) => {
                warn!(
                    milestone_id = %request.milestone_id,
                    "completion failed, scoring heuristically: {err:#}"
                );
                Ok(self.fallback.score(request))
            }
        }
    }
}

pub fn build_prompt(request: &VerificationRequest) -> String {
    let mut listing = String::new();
    for (position, deliverable) in request.deliverables.iter().enumerate() {
        listing.push_str(&format!(
            "\n{}. {}\n   Type: {}\n   Description: {}\n",
            position + 1,
            deliverable.title,
            deliverable.kind,
            deliverable.description
        ));
        if let Some(url) = &deliverable.url {
            listing.push_str(&format!("   URL: {url}\n"));
        }
        if let Some(proof) = &deliverable.proof {
            listing.push_str(&format!("   Proof: {proof}\n"));
        }
    }

    format!(
        r#"You are a verification agent for a milestone-based escrow platform. Decide whether the deliverables meet the milestone requirements.

Milestone: {title}
Description: {description}

Deliverables submitted:
{listing}
Provide:
1. Whether the milestone should be APPROVED or REJECTED
2. Confidence level (0-100)
3. Brief reasoning (2-3 sentences)
4. Suggestions for improvement (if any)

Respond ONLY in this JSON format:
{{
  "approved": true,
  "confidence": 85,
  "reasoning": "Your reasoning here",
  "suggestions": ["suggestion 1", "suggestion 2"]
}}"#,
        title = request.milestone_title,
        description = request.milestone_description,
    )
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ModelVerdict {
    approved: Option<bool>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    suggestions: Option<Vec<String>>,
}

/// Reads a verdict out of free-form model output.
///
/// The outermost `{...}` span is parsed as JSON. Output without one is judged
/// by keyword.
pub fn parse_verdict(content: &str) -> Verdict {
    let parsed =
        json_span(content).and_then(|span| serde_json::from_str::<ModelVerdict>(span).ok());
    if let Some(parsed) = parsed {
        let confidence = parsed.confidence.unwrap_or(0.0).clamp(0.0, 100.0).round() as u8;
        return Verdict {
            approved: parsed.approved.unwrap_or(false),
            confidence,
            reasoning: parsed
                .reasoning
                .filter(|reasoning| !reasoning.trim().is_empty())
                .unwrap_or_else(|| "AI verification completed".to_string()),
            suggestions: parsed.suggestions.unwrap_or_default(),
        };
    }

    let lowered = content.to_lowercase();
    let approved = lowered.contains("approved") && !lowered.contains("rejected");
    let reasoning: String = content.chars().take(FALLBACK_REASONING_CHARS).collect();

    if approved {
        Verdict::approve(75, reasoning)
    } else {
        Verdict::reject(25, reasoning)
    }
}

fn json_span(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    (end > start).then(|| &content[start..=end])
}
