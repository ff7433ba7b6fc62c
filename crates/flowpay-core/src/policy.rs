use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::UnknownVariant;

/// What happens to submitted deliverables when verification rejects them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Keep them, marked rejected, so the freelancer can amend and resubmit.
    #[default]
    Retain,
    Discard,
}

impl FromStr for RejectionPolicy {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "discard" => Ok(Self::Discard),
            _ => Err(UnknownVariant {
                kind: "rejection policy",
                value: value.to_string(),
            }),
        }
    }
}

/// Whether a submission is verified in the same request or parked for review.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReviewMode {
    #[default]
    Synchronous,
    /// Submissions move straight to `under_review`.
    Deferred,
}

impl FromStr for ReviewMode {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "synchronous" | "sync" => Ok(Self::Synchronous),
            "deferred" | "async" => Ok(Self::Deferred),
            _ => Err(UnknownVariant {
                kind: "review mode",
                value: value.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EscrowPolicy {
    pub rejection: RejectionPolicy,
    pub review: ReviewMode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_retain_and_verify_synchronously() {
        let policy = EscrowPolicy::default();
        assert_eq!(policy.rejection, RejectionPolicy::Retain);
        assert_eq!(policy.review, ReviewMode::Synchronous);
    }

    #[test]
    fn parses_policy_names() {
        assert_eq!("DISCARD".parse::<RejectionPolicy>(), Ok(RejectionPolicy::Discard));
        assert_eq!("async".parse::<ReviewMode>(), Ok(ReviewMode::Deferred));
        assert!("later".parse::<ReviewMode>().is_err());
    }
}
