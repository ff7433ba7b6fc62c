pub mod sandbox;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sandbox::SandboxCustody;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct CustodyError {
    pub reason: String,
}

impl CustodyError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustodyReceipt {
    pub tx_ref: String,
    pub confirmed: bool,
}

/// Moves funds between custody accounts.
///
/// Calls are not idempotent: every successful `lock_funds` or `release_funds`
/// moves money again. Callers own deduplication.
#[async_trait]
pub trait FundCustody: Send + Sync {
    async fn balance(&self, owner: &str) -> Result<Decimal, CustodyError>;

    async fn lock_funds(
        &self,
        owner: &str,
        target: &str,
        amount: Decimal,
    ) -> Result<CustodyReceipt, CustodyError>;

    async fn release_funds(
        &self,
        target: &str,
        recipient: &str,
        amount: Decimal,
    ) -> Result<CustodyReceipt, CustodyError>;
}
