//! Transaction intent policies
//!
//! An [`IntentPolicy`] is a pure function from the wallet's current state to
//! a [`TransactionIntent`]. The [`TransactionOrchestrator`] snapshots the
//! wallet, applies the policy, then populates and sends the result. Callers
//! may plug in any policy, including closures.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mpc_vault_core::orchestrator::{FractionOfBalance, TransactionOrchestrator};
//!
//! let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
//! let result = TransactionOrchestrator::new().execute(&wallet, &policy).await?;
//! ```

use crate::chain::{ChainWallet, FeePolicy, TransactionIntent, TransactionResult};
use crate::error::TxBuildError;
use crate::{ChainType, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Wallet state a policy may look at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub chain: ChainType,
    pub address: String,
    /// Balance in the chain's smallest unit
    pub balance: u128,
}

/// Turns wallet state into a transaction intent
pub trait IntentPolicy: Send + Sync {
    fn intent(&self, snapshot: &WalletSnapshot) -> Result<TransactionIntent>;
}

impl<F> IntentPolicy for F
where
    F: Fn(&WalletSnapshot) -> Result<TransactionIntent> + Send + Sync,
{
    fn intent(&self, snapshot: &WalletSnapshot) -> Result<TransactionIntent> {
        self(snapshot)
    }
}

/// Send `balance / divisor`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FractionOfBalance {
    pub to: String,
    pub divisor: u128,
    pub fee: FeePolicy,
}

impl FractionOfBalance {
    pub fn new(to: impl Into<String>, divisor: u128, fee: FeePolicy) -> Self {
        Self {
            to: to.into(),
            divisor,
            fee,
        }
    }

    /// Amount this policy sends for a balance
    pub fn amount(&self, balance: u128) -> Result<u128> {
        if self.divisor == 0 {
            return Err(TxBuildError::InvalidAmount("divisor must be non-zero".into()).into());
        }
        Ok(balance / self.divisor)
    }
}

impl IntentPolicy for FractionOfBalance {
    fn intent(&self, snapshot: &WalletSnapshot) -> Result<TransactionIntent> {
        let value = self.amount(snapshot.balance)?;
        if value == 0 {
            return Err(TxBuildError::InvalidAmount(format!(
                "1/{} of balance {} rounds to zero",
                self.divisor, snapshot.balance
            ))
            .into());
        }
        Ok(TransactionIntent::new(self.to.clone(), value, self.fee))
    }
}

/// Send a fixed amount with a fixed fee policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedAmount {
    pub to: String,
    pub value: u128,
    pub fee: FeePolicy,
}

impl FixedAmount {
    pub fn new(to: impl Into<String>, value: u128, fee: FeePolicy) -> Self {
        Self {
            to: to.into(),
            value,
            fee,
        }
    }
}

impl IntentPolicy for FixedAmount {
    fn intent(&self, _snapshot: &WalletSnapshot) -> Result<TransactionIntent> {
        Ok(TransactionIntent::new(self.to.clone(), self.value, self.fee))
    }
}

/// Drives policies through wallets
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOrchestrator;

impl TransactionOrchestrator {
    pub fn new() -> Self {
        Self
    }

    /// Current state of a wallet
    pub async fn snapshot<W>(&self, wallet: &W) -> Result<WalletSnapshot>
    where
        W: ChainWallet + ?Sized,
    {
        let balance = wallet.get_balance().await?;
        Ok(WalletSnapshot {
            chain: wallet.chain(),
            address: wallet.address().to_string(),
            balance: balance.raw_value(),
        })
    }

    /// Intent a policy yields for the wallet's current state
    pub async fn plan<W>(&self, wallet: &W, policy: &dyn IntentPolicy) -> Result<TransactionIntent>
    where
        W: ChainWallet + ?Sized,
    {
        let snapshot = self.snapshot(wallet).await?;
        let intent = policy.intent(&snapshot)?;
        debug!(
            balance = snapshot.balance,
            to = %intent.to,
            value = intent.value,
            "Policy applied"
        );
        Ok(intent)
    }

    /// Apply a policy, then populate, co-sign and broadcast
    #[instrument(skip(self, wallet, policy), fields(chain = %wallet.chain(), from = %wallet.address()))]
    pub async fn execute<W>(&self, wallet: &W, policy: &dyn IntentPolicy) -> Result<TransactionResult>
    where
        W: ChainWallet + ?Sized,
    {
        let intent = self.plan(wallet, policy).await?;
        let unsigned = wallet.populate_transaction(&intent).await?;
        let result = wallet.send_transaction(unsigned).await?;
        info!(hash = %result.hash, "Policy executed");
        Ok(result)
    }
}
