use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(UnknownVariant {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    Active,
    Completed,
    Disputed,
    Cancelled,
}

string_enum!(ProjectStatus, "project status", {
    Pending => "pending",
    Active => "active",
    Completed => "completed",
    Disputed => "disputed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Submitted,
    UnderReview,
    Verified,
    Paid,
    Disputed,
}

string_enum!(MilestoneStatus, "milestone status", {
    Pending => "pending",
    InProgress => "in_progress",
    Submitted => "submitted",
    UnderReview => "under_review",
    Verified => "verified",
    Paid => "paid",
    Disputed => "disputed",
});

impl MilestoneStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Disputed)
    }

    pub fn awaiting_verification(&self) -> bool {
        matches!(self, Self::Submitted | Self::UnderReview)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    Ai,
    Validator,
    Client,
}

string_enum!(VerificationMethod, "verification method", {
    Ai => "ai",
    Validator => "validator",
    Client => "client",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableKind {
    Code,
    Document,
    Design,
    Link,
    #[default]
    Other,
}

string_enum!(DeliverableKind, "deliverable kind", {
    Code => "code",
    Document => "document",
    Design => "design",
    Link => "link",
    Other => "other",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliverableStatus {
    #[default]
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deliverable {
    pub id: Uuid,
    pub kind: DeliverableKind,
    pub title: String,
    pub description: String,
    pub url: Option<String>,
    pub proof: Option<String>,
    pub verification_status: DeliverableStatus,
}

/// Deliverable as supplied by a caller, before it is given an identity.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeliverableDraft {
    #[serde(default)]
    pub kind: DeliverableKind,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub url: Option<String>,
    pub proof: Option<String>,
}

impl DeliverableDraft {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn into_deliverable(self) -> Deliverable {
        Deliverable {
            id: Uuid::new_v4(),
            kind: self.kind,
            title: self.title.trim().to_string(),
            description: self.description,
            url: self.url.filter(|value| !value.trim().is_empty()),
            proof: self.proof.filter(|value| !value.trim().is_empty()),
            verification_status: DeliverableStatus::Pending,
        }
    }
}

/// Outcome of a verification round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub approved: bool,
    pub confidence: u8,
    pub reasoning: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl Verdict {
    pub fn approve(confidence: u8, reasoning: impl Into<String>) -> Self {
        Self {
            approved: true,
            confidence: confidence.min(100),
            reasoning: reasoning.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn reject(confidence: u8, reasoning: impl Into<String>) -> Self {
        Self {
            approved: false,
            confidence: confidence.min(100),
            reasoning: reasoning.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub description: String,
    pub amount: Decimal,
    pub deliverables: Vec<Deliverable>,
    pub status: MilestoneStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub release_tx_ref: Option<String>,
    pub verification_method: VerificationMethod,
    pub last_verdict: Option<Verdict>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub client: String,
    pub freelancer: String,
    pub title: String,
    pub description: String,
    pub total_amount: Decimal,
    pub status: ProjectStatus,
    pub milestones: Vec<Milestone>,
    pub escrow_tx_ref: Option<String>,
    pub escrow_target: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn milestone_index(&self, milestone_id: Uuid) -> Option<usize> {
        self.milestones
            .iter()
            .position(|milestone| milestone.id == milestone_id)
    }

    pub fn milestone(&self, milestone_id: Uuid) -> Option<&Milestone> {
        self.milestones
            .iter()
            .find(|milestone| milestone.id == milestone_id)
    }

    pub fn is_funded(&self) -> bool {
        self.escrow_tx_ref.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MilestoneDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub amount: Decimal,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub deliverables: Vec<DeliverableDraft>,
    pub verification_method: Option<VerificationMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectDraft {
    pub client: String,
    pub freelancer: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub total_amount: Decimal,
    pub milestones: Vec<MilestoneDraft>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    EscrowLock,
    MilestoneRelease,
    Refund,
    ValidatorFee,
}

string_enum!(PaymentKind, "payment kind", {
    EscrowLock => "escrow_lock",
    MilestoneRelease => "milestone_release",
    Refund => "refund",
    ValidatorFee => "validator_fee",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Confirmed => "confirmed",
    Failed => "failed",
});

/// Append-only audit entry for a custody movement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub milestone_id: Option<Uuid>,
    pub kind: PaymentKind,
    pub amount: Decimal,
    pub from: String,
    pub to: String,
    pub tx_ref: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn confirmed(
        project_id: Uuid,
        milestone_id: Option<Uuid>,
        kind: PaymentKind,
        amount: Decimal,
        from: &str,
        to: &str,
        tx_ref: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            milestone_id,
            kind,
            amount,
            from: from.to_string(),
            to: to.to_string(),
            tx_ref: tx_ref.to_string(),
            status: PaymentStatus::Confirmed,
            created_at: at,
            confirmed_at: Some(at),
        }
    }
}
