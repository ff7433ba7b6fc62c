use flowpay_core::MilestoneStatus;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{0}")]
    Validation(String),

    #[error("cannot {event} a milestone that is {from}")]
    InvalidTransition {
        from: MilestoneStatus,
        event: &'static str,
    },

    #[error("ledger inconsistency: {0}")]
    LedgerInconsistency(String),
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
