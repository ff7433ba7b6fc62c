use std::time::Duration;

use flowpay_core::EscrowPolicy;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Custody account that holds locked project funds.
    pub escrow_target: String,
    pub custody_timeout: Duration,
    pub verification_timeout: Duration,
    pub policy: EscrowPolicy,
}

impl CoordinatorConfig {
    pub fn new(escrow_target: impl Into<String>) -> Self {
        Self {
            escrow_target: escrow_target.into(),
            custody_timeout: Duration::from_secs(60),
            verification_timeout: Duration::from_secs(30),
            policy: EscrowPolicy::default(),
        }
    }
}
