use flowpay_custody::CustodyError;
use flowpay_lifecycle::LifecycleError;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("{0}")]
    Validation(String),

    #[error("cannot {event} while {from}")]
    InvalidTransition { from: String, event: &'static str },

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },

    #[error("custody failure: {reason}")]
    Custody { reason: String },

    #[error("{operation} timed out")]
    Timeout { operation: &'static str },

    #[error("project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("milestone {0} not found")]
    MilestoneNotFound(Uuid),

    #[error("ledger inconsistency: {0}")]
    LedgerInconsistency(String),

    #[error("store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl From<LifecycleError> for EscrowError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation(message) => Self::Validation(message),
            LifecycleError::InvalidTransition { from, event } => Self::InvalidTransition {
                from: format!("milestone is {from}"),
                event,
            },
            LifecycleError::LedgerInconsistency(message) => Self::LedgerInconsistency(message),
        }
    }
}

impl From<CustodyError> for EscrowError {
    fn from(err: CustodyError) -> Self {
        Self::Custody { reason: err.reason }
    }
}
