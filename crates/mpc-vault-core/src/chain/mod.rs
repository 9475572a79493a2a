//! # Chain Wallets
//!
//! This module binds a key share and an established SIGN session into
//! chain-specific wallets. Each chain implements the [`ChainWallet`] trait;
//! the [`Wallet`] enum gives the facade one statically dispatched type.
//!
//! ## Supported Chains
//!
//! - **Ethereum** - EVM chains, EIP-1559 and legacy EIP-155 transactions
//! - **Bitcoin** - native segwit (P2WPKH) wallets with local coin selection
//!
//! ## Example
//!
//! ```rust,ignore
//! use mpc_vault_core::chain::{ChainWallet, FeePolicy, TransactionIntent};
//!
//! let wallet = EthereumWallet::new(config, provider, key_share, session)?;
//! let intent = TransactionIntent::new(ZERO_ADDRESS, 1_000, FeePolicy::ProviderDefault);
//! let unsigned = wallet.populate_transaction(&intent).await?;
//! let result = wallet.send_transaction(unsigned).await?;
//! ```

pub mod bitcoin;
pub mod evm;

use crate::{ChainType, Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use self::bitcoin::{
    BitcoinConfig, BitcoinNetwork, BitcoinUnsignedTx, BitcoinWallet, EsploraProvider, Utxo,
    UtxoProvider,
};
pub use evm::{
    CallRequest, EthereumUnsignedTx, EthereumWallet, EvmConfig, EvmProvider, GasPrice, GasPrices,
    JsonRpcProvider,
};

// ============================================================================
// Core Types
// ============================================================================

/// EVM chain identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const ETHEREUM_MAINNET: ChainId = ChainId(1);
    pub const ETHEREUM_SEPOLIA: ChainId = ChainId(11155111);
    pub const ETHEREUM_HOLESKY: ChainId = ChainId(17000);

    /// Get the name for this chain
    pub fn name(&self) -> &'static str {
        match self.0 {
            1 => "Ethereum Mainnet",
            11155111 => "Ethereum Sepolia",
            17000 => "Ethereum Holesky",
            _ => "Unknown Chain",
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        ChainId(id)
    }
}

/// Balance representation for any chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Raw balance value (smallest unit: wei for ETH, satoshi for BTC)
    pub raw: String,
    /// Human-readable balance with decimals
    pub formatted: String,
    /// Symbol of the native currency
    pub symbol: String,
    /// Number of decimals
    pub decimals: u8,
}

impl Balance {
    /// Create a new balance
    pub fn new(raw: impl Into<String>, decimals: u8, symbol: impl Into<String>) -> Self {
        let raw_str = raw.into();
        let symbol_str = symbol.into();
        let formatted = Self::format_balance(&raw_str, decimals);

        Self {
            raw: raw_str,
            formatted,
            symbol: symbol_str,
            decimals,
        }
    }

    /// Create a balance from an amount in the smallest unit
    pub fn from_units(units: u128, decimals: u8, symbol: impl Into<String>) -> Self {
        Self::new(units.to_string(), decimals, symbol)
    }

    /// Format a raw balance with decimals
    fn format_balance(raw: &str, decimals: u8) -> String {
        let raw_value: u128 = raw.parse().unwrap_or(0);
        if raw_value == 0 {
            return "0".to_string();
        }

        // Past 38 decimals every u128 is below one whole unit
        let (whole, fraction) = match 10u128.checked_pow(u32::from(decimals)) {
            Some(divisor) => (raw_value / divisor, raw_value % divisor),
            None => (0, raw_value),
        };

        if fraction == 0 {
            whole.to_string()
        } else {
            let fraction_str = format!("{:0>width$}", fraction, width = decimals as usize);
            let trimmed = fraction_str.trim_end_matches('0');
            format!("{}.{}", whole, trimmed)
        }
    }

    /// Check if balance is zero
    pub fn is_zero(&self) -> bool {
        self.raw_value() == 0
    }

    /// Parse raw value as u128
    pub fn raw_value(&self) -> u128 {
        self.raw.parse().unwrap_or(0)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.formatted, self.symbol)
    }
}

/// How the sender pays for inclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// Use the provider's suggested prices (EVM only)
    ProviderDefault,
    /// Explicit EIP-1559 fees in wei per gas
    Eip1559 {
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    },
    /// Explicit legacy gas price in wei per gas
    GasPrice(u128),
    /// Satoshi per virtual byte (Bitcoin only)
    PerByte(u64),
}

/// What the caller wants to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    /// Recipient address in the chain's native format
    pub to: String,
    /// Amount in the chain's smallest unit
    pub value: u128,
    /// Fee policy
    pub fee: FeePolicy,
}

impl TransactionIntent {
    pub fn new(to: impl Into<String>, value: u128, fee: FeePolicy) -> Self {
        Self {
            to: to.into(),
            value,
            fee,
        }
    }
}

/// Identifier of a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    /// The transaction hash (EVM) or txid (Bitcoin)
    pub hash: String,
    /// Explorer URL (if available)
    pub explorer_url: Option<String>,
}

impl TransactionResult {
    /// Create a new transaction result
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            explorer_url: None,
        }
    }

    /// Add explorer URL
    pub fn with_explorer_url(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }
}

// ============================================================================
// Chain Wallet Trait
// ============================================================================

/// Capabilities every chain wallet provides
///
/// Wallets are immutable after construction. All coordination state lives
/// in the signing session they were built from.
#[async_trait]
pub trait ChainWallet: Send + Sync {
    /// Chain-formatted transaction awaiting signatures
    type Unsigned: Send + Sync + fmt::Debug;

    /// Chain family of this wallet
    fn chain(&self) -> ChainType;

    /// Address derived from the group public key
    fn address(&self) -> &str;

    /// Current balance as reported by the chain context
    async fn get_balance(&self) -> Result<Balance>;

    /// Validate an intent and build the unsigned transaction
    async fn populate_transaction(&self, intent: &TransactionIntent) -> Result<Self::Unsigned>;

    /// Co-sign, assemble and broadcast a populated transaction
    async fn send_transaction(&self, unsigned: Self::Unsigned) -> Result<TransactionResult>;

    /// Populate then send
    async fn send_intent(&self, intent: &TransactionIntent) -> Result<TransactionResult> {
        let unsigned = self.populate_transaction(intent).await?;
        self.send_transaction(unsigned).await
    }
}

/// A wallet on any supported chain
#[derive(Debug, Clone)]
pub enum Wallet {
    Ethereum(EthereumWallet),
    Bitcoin(BitcoinWallet),
}

/// Unsigned transaction of any supported chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedTransaction {
    Ethereum(EthereumUnsignedTx),
    Bitcoin(BitcoinUnsignedTx),
}

#[async_trait]
impl ChainWallet for Wallet {
    type Unsigned = UnsignedTransaction;

    fn chain(&self) -> ChainType {
        match self {
            Wallet::Ethereum(w) => w.chain(),
            Wallet::Bitcoin(w) => w.chain(),
        }
    }

    fn address(&self) -> &str {
        match self {
            Wallet::Ethereum(w) => w.address(),
            Wallet::Bitcoin(w) => w.address(),
        }
    }

    async fn get_balance(&self) -> Result<Balance> {
        match self {
            Wallet::Ethereum(w) => w.get_balance().await,
            Wallet::Bitcoin(w) => w.get_balance().await,
        }
    }

    async fn populate_transaction(&self, intent: &TransactionIntent) -> Result<UnsignedTransaction> {
        match self {
            Wallet::Ethereum(w) => w
                .populate_transaction(intent)
                .await
                .map(UnsignedTransaction::Ethereum),
            Wallet::Bitcoin(w) => w
                .populate_transaction(intent)
                .await
                .map(UnsignedTransaction::Bitcoin),
        }
    }

    async fn send_transaction(&self, unsigned: UnsignedTransaction) -> Result<TransactionResult> {
        match (self, unsigned) {
            (Wallet::Ethereum(w), UnsignedTransaction::Ethereum(tx)) => w.send_transaction(tx).await,
            (Wallet::Bitcoin(w), UnsignedTransaction::Bitcoin(tx)) => w.send_transaction(tx).await,
            (wallet, _) => Err(Error::InvalidConfig(format!(
                "transaction was populated for another chain than {}",
                wallet.chain()
            ))),
        }
    }
}

impl From<EthereumWallet> for Wallet {
    fn from(wallet: EthereumWallet) -> Self {
        Wallet::Ethereum(wallet)
    }
}

impl From<BitcoinWallet> for Wallet {
    fn from(wallet: BitcoinWallet) -> Self {
        Wallet::Bitcoin(wallet)
    }
}
