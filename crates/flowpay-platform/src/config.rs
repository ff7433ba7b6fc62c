use std::time::Duration;

use anyhow::{Context, Result, bail};
use flowpay_core::{RejectionPolicy, ReviewMode};
use flowpay_escrow::CoordinatorConfig;
use rust_decimal::Decimal;

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub http_addr: String,
    /// Postgres ledger when set, in-memory otherwise.
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub escrow: CoordinatorConfig,
    /// Opening balances for the sandbox custody accounts.
    pub sandbox_balances: Vec<(String, Decimal)>,
}

impl ServiceConfig {
    pub fn from_env(default_http_addr: &str) -> Result<Self> {
        Self::from_lookup(default_http_addr, |key| std::env::var(key).ok())
    }

    pub fn from_lookup(
        default_http_addr: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let http_addr = var("HTTP_ADDR").unwrap_or_else(|| default_http_addr.to_string());
        let escrow_target = var("ESCROW_TARGET").context("ESCROW_TARGET is required")?;

        let mut escrow = CoordinatorConfig::new(escrow_target);
        if let Some(secs) = var("CUSTODY_TIMEOUT_SECS") {
            escrow.custody_timeout = parse_secs("CUSTODY_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = var("VERIFICATION_TIMEOUT_SECS") {
            escrow.verification_timeout = parse_secs("VERIFICATION_TIMEOUT_SECS", &secs)?;
        }
        if let Some(policy) = var("REJECTION_POLICY") {
            escrow.policy.rejection = policy
                .parse::<RejectionPolicy>()
                .context("invalid REJECTION_POLICY")?;
        }
        if let Some(mode) = var("REVIEW_MODE") {
            escrow.policy.review = mode.parse::<ReviewMode>().context("invalid REVIEW_MODE")?;
        }

        let sandbox_balances = match var("SANDBOX_BALANCES") {
            Some(raw) => parse_balances(&raw).context("invalid SANDBOX_BALANCES")?,
            None => Vec::new(),
        };

        Ok(Self {
            http_addr,
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            escrow,
            sandbox_balances,
        })
    }
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a whole number of seconds"))?;
    if secs == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

/// Parses `owner=amount,owner=amount`.
pub fn parse_balances(raw: &str) -> Result<Vec<(String, Decimal)>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| -> Result<(String, Decimal)> {
            let (owner, amount) = entry
                .split_once('=')
                .with_context(|| format!("expected owner=amount, got {entry:?}"))?;
            let owner = owner.trim();
            if owner.is_empty() {
                bail!("balance entry {entry:?} has no owner");
            }
            let amount: Decimal = amount
                .trim()
                .parse()
                .with_context(|| format!("invalid amount for {owner}"))?;
            Ok((owner.to_string(), amount))
        })
        .collect()
}
