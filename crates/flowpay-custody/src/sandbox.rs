use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{CustodyError, CustodyReceipt, FundCustody};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub tx_ref: String,
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

#[derive(Default)]
struct Accounts {
    balances: HashMap<String, Decimal>,
    transfers: Vec<Transfer>,
}

/// Account-balance custody kept in memory, confirming every transfer at once.
#[derive(Default)]
pub struct SandboxCustody {
    accounts: RwLock<Accounts>,
}

impl SandboxCustody {
    pub fn with_balances<I, S>(balances: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let accounts = Accounts {
            balances: balances
                .into_iter()
                .map(|(owner, amount)| (owner.into(), amount))
                .collect(),
            transfers: Vec::new(),
        };

        Self {
            accounts: RwLock::new(accounts),
        }
    }

    pub async fn fund(&self, owner: &str, amount: Decimal) {
        let mut accounts = self.accounts.write().await;
        *accounts.balances.entry(owner.to_string()).or_default() += amount;
    }

    pub async fn transfers(&self) -> Vec<Transfer> {
        self.accounts.read().await.transfers.clone()
    }

    async fn transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<CustodyReceipt, CustodyError> {
        if amount <= Decimal::ZERO {
            return Err(CustodyError::new("transfer amount must be positive"));
        }

        let mut accounts = self.accounts.write().await;
        let available = accounts.balances.get(from).copied().unwrap_or_default();
        if available < amount {
            return Err(CustodyError::new(format!(
                "{from} holds {available}, cannot transfer {amount}"
            )));
        }

        *accounts.balances.entry(from.to_string()).or_default() -= amount;
        *accounts.balances.entry(to.to_string()).or_default() += amount;

        let tx_ref = format!("sandbox-{}", Uuid::new_v4().simple());
        accounts.transfers.push(Transfer {
            tx_ref: tx_ref.clone(),
            from: from.to_string(),
            to: to.to_string(),
            amount,
        });
        debug!(%tx_ref, %from, %to, %amount, "sandbox transfer");

        Ok(CustodyReceipt {
            tx_ref,
            confirmed: true,
        })
    }
}

#[async_trait]
impl FundCustody for SandboxCustody {
    async fn balance(&self, owner: &str) -> Result<Decimal, CustodyError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.balances.get(owner).copied().unwrap_or_default())
    }

    async fn lock_funds(
        &self,
        owner: &str,
        target: &str,
        amount: Decimal,
    ) -> Result<CustodyReceipt, CustodyError> {
        self.transfer(owner, target, amount).await
    }

    async fn release_funds(
        &self,
        target: &str,
        recipient: &str,
        amount: Decimal,
    ) -> Result<CustodyReceipt, CustodyError> {
        self.transfer(target, recipient, amount).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_and_release_move_balances() {
        let custody = SandboxCustody::with_balances([("client", Decimal::new(10, 0))]);

        let lock = custody
            .lock_funds("client", "escrow", Decimal::new(10, 0))
            .await
            .unwrap();
        assert!(lock.confirmed);
        assert_eq!(custody.balance("client").await.unwrap(), Decimal::ZERO);

        custody
            .release_funds("escrow", "freelancer", Decimal::new(25, 1))
            .await
            .unwrap();
        assert_eq!(
            custody.balance("escrow").await.unwrap(),
            Decimal::new(75, 1)
        );
        assert_eq!(
            custody.balance("freelancer").await.unwrap(),
            Decimal::new(25, 1)
        );
        assert_eq!(custody.transfers().await.len(), 2);
    }

    #[tokio::test]
    async fn refuses_overdraft() {
        let custody = SandboxCustody::default();
        custody.fund("client", Decimal::new(9, 0)).await;

        let err = custody
            .lock_funds("client", "escrow", Decimal::new(10, 0))
            .await
            .unwrap_err();
        assert!(err.reason.contains("cannot transfer"));
        assert_eq!(custody.balance("client").await.unwrap(), Decimal::new(9, 0));
        assert!(custody.transfers().await.is_empty());
    }
}
