//! # Ethereum Wallet
//!
//! Wallet for Ethereum and EVM-compatible chains with support for:
//! - EIP-1559 and legacy (EIP-155) transaction building
//! - Gas estimation and provider fee suggestions
//! - RPC failover
//! - Nonce lookup
//!
//! ## Example
//!
//! ```rust,ignore
//! use mpc_vault_core::chain::{EthereumWallet, EvmConfig, JsonRpcProvider};
//!
//! let config = EvmConfig::ethereum_sepolia();
//! let provider = Arc::new(JsonRpcProvider::new(&config)?);
//! let wallet = EthereumWallet::new(config, provider, key_share, session)?;
//!
//! let balance = wallet.get_balance().await?;
//! ```

mod rpc;
mod tx;

pub use rpc::RpcClient;
pub use tx::{AccessListItem, Eip1559Transaction, EvmTransaction, LegacyTransaction, transaction_hash};

use super::{
    Balance, ChainId, ChainWallet, FeePolicy, TransactionIntent, TransactionResult,
};
use crate::error::TxBuildError;
use crate::session::SigningSession;
use crate::types::decode_point;
use crate::{ChainType, Error, KeyShare, Result, keccak256_hash};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Gas added on top of the provider's estimate, in percent
const GAS_BUFFER_PERCENT: u64 = 20;

/// The all-zero address
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for an EVM chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvmConfig {
    /// Chain identifier
    pub chain_id: ChainId,
    /// RPC endpoint URLs (for failover)
    pub rpc_urls: Vec<String>,
    /// Block explorer URL (optional)
    #[serde(default)]
    pub explorer_url: Option<String>,
    /// Native currency symbol
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Native currency decimals (18 for most EVM chains)
    #[serde(default = "default_decimals")]
    pub decimals: u8,
    /// Whether EIP-1559 is supported
    #[serde(default = "default_eip1559")]
    pub eip1559_supported: bool,
}

fn default_symbol() -> String {
    "ETH".to_string()
}

fn default_decimals() -> u8 {
    18
}

fn default_eip1559() -> bool {
    true
}

impl EvmConfig {
    /// Create config for Ethereum Mainnet
    pub fn ethereum_mainnet() -> Self {
        Self {
            chain_id: ChainId::ETHEREUM_MAINNET,
            rpc_urls: vec![
                "https://eth.llamarpc.com".to_string(),
                "https://rpc.ankr.com/eth".to_string(),
                "https://cloudflare-eth.com".to_string(),
            ],
            explorer_url: Some("https://etherscan.io".to_string()),
            symbol: "ETH".to_string(),
            decimals: 18,
            eip1559_supported: true,
        }
    }

    /// Create config for Ethereum Sepolia testnet
    pub fn ethereum_sepolia() -> Self {
        Self {
            chain_id: ChainId::ETHEREUM_SEPOLIA,
            rpc_urls: vec![
                "https://rpc.sepolia.org".to_string(),
                "https://rpc.ankr.com/eth_sepolia".to_string(),
            ],
            explorer_url: Some("https://sepolia.etherscan.io".to_string()),
            symbol: "ETH".to_string(),
            decimals: 18,
            eip1559_supported: true,
        }
    }

    /// Create a custom config
    pub fn custom(chain_id: u64, rpc_urls: Vec<String>, symbol: &str) -> Self {
        Self {
            chain_id: ChainId(chain_id),
            rpc_urls,
            explorer_url: None,
            symbol: symbol.to_string(),
            decimals: 18,
            eip1559_supported: true,
        }
    }

    /// Set explorer URL
    pub fn with_explorer(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }

    /// Set EIP-1559 support
    pub fn with_eip1559(mut self, supported: bool) -> Self {
        self.eip1559_supported = supported;
        self
    }

    /// Explorer URL for a transaction
    pub fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base, tx_hash))
    }

    /// Explorer URL for an address
    pub fn explorer_address_url(&self, address: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/address/{}", base, address))
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Gas price information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPrices {
    /// Low priority gas price
    pub low: GasPrice,
    /// Medium priority gas price
    pub medium: GasPrice,
    /// High priority gas price
    pub high: GasPrice,
    /// Current base fee (EIP-1559)
    pub base_fee: Option<u128>,
}

/// Individual gas price entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPrice {
    /// Max fee per gas in wei (the gas price on legacy chains)
    pub max_fee: u128,
    /// Max priority fee (tip) in wei
    pub max_priority_fee: u128,
}

/// Call description for gas estimation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRequest {
    pub from: String,
    pub to: String,
    pub value: u128,
    #[serde(default)]
    pub data: Vec<u8>,
}

/// Account-chain execution context
#[async_trait]
pub trait EvmProvider: Send + Sync {
    /// Balance in wei, including pending transactions
    async fn get_balance(&self, address: &str) -> Result<u128>;

    /// Next nonce for the address, including pending transactions
    async fn get_transaction_count(&self, address: &str) -> Result<u64>;

    /// Suggested fees
    async fn gas_prices(&self) -> Result<GasPrices>;

    /// Gas a call is expected to use
    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64>;

    /// Submit a signed transaction, returning its hash
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String>;
}

/// [`EvmProvider`] over HTTP JSON-RPC
#[derive(Debug, Clone)]
pub struct JsonRpcProvider {
    rpc: RpcClient,
    eip1559: bool,
}

impl JsonRpcProvider {
    /// Create a provider for the configured endpoints
    pub fn new(config: &EvmConfig) -> Result<Self> {
        Ok(Self {
            rpc: RpcClient::new(config.rpc_urls.clone())?,
            eip1559: config.eip1559_supported,
        })
    }

    /// Get gas prices using eth_feeHistory
    async fn get_eip1559_prices(&self) -> Result<GasPrices> {
        #[derive(Deserialize)]
        struct FeeHistory {
            #[serde(rename = "baseFeePerGas")]
            base_fee_per_gas: Vec<String>,
            reward: Option<Vec<Vec<String>>>,
        }

        let result: FeeHistory = self
            .rpc
            .request(
                "eth_feeHistory",
                serde_json::json!([20, "latest", [10, 50, 90]]),
            )
            .await?;

        // Last value is the predicted next-block base fee
        let base_fee = result
            .base_fee_per_gas
            .last()
            .and_then(|s| parse_hex_u128(s).ok())
            .unwrap_or(0);

        let percentile = |index: usize, fallback: u128| {
            let tips: Vec<u128> = result
                .reward
                .iter()
                .flatten()
                .filter_map(|r| r.get(index).and_then(|s| parse_hex_u128(s).ok()))
                .collect();
            median(&tips).unwrap_or(fallback)
        };

        let low_tip = percentile(0, 1_000_000_000);
        let medium_tip = percentile(1, 2_000_000_000);
        let high_tip = percentile(2, 5_000_000_000);

        Ok(GasPrices {
            low: GasPrice {
                max_fee: base_fee + low_tip,
                max_priority_fee: low_tip,
            },
            medium: GasPrice {
                max_fee: base_fee * 2 + medium_tip,
                max_priority_fee: medium_tip,
            },
            high: GasPrice {
                max_fee: base_fee * 3 + high_tip,
                max_priority_fee: high_tip,
            },
            base_fee: Some(base_fee),
        })
    }

    /// Get legacy gas price
    async fn get_legacy_price(&self) -> Result<GasPrices> {
        let gas_price: String = self
            .rpc
            .request("eth_gasPrice", serde_json::json!([]))
            .await?;
        let price = parse_hex_u128(&gas_price)?;

        Ok(GasPrices {
            low: GasPrice {
                max_fee: price,
                max_priority_fee: 0,
            },
            medium: GasPrice {
                max_fee: price * 110 / 100, // +10%
                max_priority_fee: 0,
            },
            high: GasPrice {
                max_fee: price * 130 / 100, // +30%
                max_priority_fee: 0,
            },
            base_fee: None,
        })
    }
}

#[async_trait]
impl EvmProvider for JsonRpcProvider {
    async fn get_balance(&self, address: &str) -> Result<u128> {
        let result: String = self
            .rpc
            .request("eth_getBalance", serde_json::json!([address, "pending"]))
            .await?;
        parse_hex_u128(&result)
    }

    async fn get_transaction_count(&self, address: &str) -> Result<u64> {
        let result: String = self
            .rpc
            .request(
                "eth_getTransactionCount",
                serde_json::json!([address, "pending"]),
            )
            .await?;
        parse_hex_u64(&result)
    }

    async fn gas_prices(&self) -> Result<GasPrices> {
        if self.eip1559 {
            self.get_eip1559_prices().await
        } else {
            self.get_legacy_price().await
        }
    }

    async fn estimate_gas(&self, request: &CallRequest) -> Result<u64> {
        let tx_object = serde_json::json!({
            "from": request.from,
            "to": request.to,
            "value": format!("0x{:x}", request.value),
            "data": format!("0x{}", hex::encode(&request.data)),
        });

        let result: String = self
            .rpc
            .request("eth_estimateGas", serde_json::json!([tx_object]))
            .await?;
        parse_hex_u64(&result)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        let raw_hex = format!("0x{}", hex::encode(raw));
        self.rpc
            .request("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await
    }
}

// ============================================================================
// Wallet
// ============================================================================

/// Populated EVM transaction awaiting co-signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthereumUnsignedTx {
    /// Sender address
    pub from: String,
    /// The transaction body
    pub transaction: EvmTransaction,
}

impl EthereumUnsignedTx {
    /// Most the sender can be charged: value plus gas limit at max fee
    pub fn max_cost(&self) -> U256 {
        self.transaction.value()
            + U256::from(self.transaction.gas_limit()) * U256::from(self.transaction.max_fee_per_gas())
    }
}

/// Wallet on an EVM chain
#[derive(Clone)]
pub struct EthereumWallet {
    config: EvmConfig,
    address: String,
    provider: Arc<dyn EvmProvider>,
    key_share: Arc<KeyShare>,
    session: Arc<SigningSession>,
}

impl EthereumWallet {
    /// Bind a key share and an established SIGN session into a wallet
    ///
    /// Fails when the session is not established, is not a SIGN session or
    /// was opened for a different party set than the share.
    pub fn new(
        config: EvmConfig,
        provider: Arc<dyn EvmProvider>,
        key_share: Arc<KeyShare>,
        session: Arc<SigningSession>,
    ) -> Result<Self> {
        session.ensure_signing_for(&key_share)?;
        let address = ethereum_address(&key_share.public_key)?;

        debug!(%address, chain = %config.chain_id, "Ethereum wallet constructed");

        Ok(Self {
            config,
            address,
            provider,
            key_share,
            session,
        })
    }

    pub fn config(&self) -> &EvmConfig {
        &self.config
    }

    fn resolve_fees(&self, fee: FeePolicy, prices: Option<&GasPrices>) -> Result<(u128, u128)> {
        let invalid = |reason: &str| Error::from(TxBuildError::InvalidFeePolicy(reason.into()));

        match fee {
            FeePolicy::ProviderDefault => {
                let prices = prices.ok_or_else(|| invalid("no provider prices"))?;
                Ok((prices.medium.max_fee, prices.medium.max_priority_fee))
            }
            FeePolicy::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                if !self.config.eip1559_supported {
                    return Err(invalid("chain does not support EIP-1559 fees"));
                }
                if max_fee_per_gas == 0 {
                    return Err(invalid("max fee per gas must be non-zero"));
                }
                if max_priority_fee_per_gas > max_fee_per_gas {
                    return Err(invalid("priority fee exceeds max fee"));
                }
                Ok((max_fee_per_gas, max_priority_fee_per_gas))
            }
            FeePolicy::GasPrice(price) => {
                if self.config.eip1559_supported {
                    return Err(invalid("legacy gas price on an EIP-1559 chain"));
                }
                if price == 0 {
                    return Err(invalid("gas price must be non-zero"));
                }
                Ok((price, 0))
            }
            FeePolicy::PerByte(_) => Err(invalid("per-byte fees apply to UTXO chains")),
        }
    }
}

impl fmt::Debug for EthereumWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthereumWallet")
            .field("address", &self.address)
            .field("chain_id", &self.config.chain_id)
            .field("session", &self.session.id())
            .finish()
    }
}

#[async_trait]
impl ChainWallet for EthereumWallet {
    type Unsigned = EthereumUnsignedTx;

    fn chain(&self) -> ChainType {
        ChainType::Evm
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn get_balance(&self) -> Result<Balance> {
        let wei = self.provider.get_balance(&self.address).await?;
        Ok(Balance::from_units(
            wei,
            self.config.decimals,
            &self.config.symbol,
        ))
    }

    #[instrument(skip(self, intent), fields(from = %self.address, to = %intent.to, value = intent.value))]
    async fn populate_transaction(&self, intent: &TransactionIntent) -> Result<EthereumUnsignedTx> {
        let to = parse_recipient(&intent.to)?;
        let value = U256::from(intent.value);

        let prices = match intent.fee {
            FeePolicy::ProviderDefault => Some(self.provider.gas_prices().await?),
            _ => None,
        };
        let (max_fee, max_priority_fee) = self.resolve_fees(intent.fee, prices.as_ref())?;

        let nonce = self.provider.get_transaction_count(&self.address).await?;

        let call = CallRequest {
            from: self.address.clone(),
            to: intent.to.clone(),
            value: intent.value,
            data: Vec::new(),
        };
        let estimate = self.provider.estimate_gas(&call).await?;
        let gas_limit = estimate.saturating_mul(100 + GAS_BUFFER_PERCENT) / 100;

        let transaction = if self.config.eip1559_supported {
            EvmTransaction::Eip1559(Eip1559Transaction {
                chain_id: self.config.chain_id.0,
                nonce,
                max_priority_fee_per_gas: max_priority_fee,
                max_fee_per_gas: max_fee,
                gas_limit,
                to,
                value,
                data: Bytes::new(),
                access_list: vec![],
            })
        } else {
            EvmTransaction::Legacy {
                tx: LegacyTransaction {
                    nonce,
                    gas_price: max_fee,
                    gas_limit,
                    to,
                    value,
                    data: Bytes::new(),
                },
                chain_id: self.config.chain_id.0,
            }
        };

        let unsigned = EthereumUnsignedTx {
            from: self.address.clone(),
            transaction,
        };

        let balance = self.provider.get_balance(&self.address).await?;
        let required = unsigned.max_cost();
        if required > U256::from(balance) {
            return Err(TxBuildError::InsufficientFunds {
                required: u128::try_from(required).unwrap_or(u128::MAX),
                available: balance,
            }
            .into());
        }

        debug!(nonce, gas_limit, max_fee, "Transaction populated");
        Ok(unsigned)
    }

    #[instrument(skip(self, unsigned), fields(from = %self.address, nonce = unsigned.transaction.nonce()))]
    async fn send_transaction(&self, unsigned: EthereumUnsignedTx) -> Result<TransactionResult> {
        if unsigned.from != self.address {
            return Err(Error::InvalidConfig(format!(
                "transaction was populated by {}, not this wallet",
                unsigned.from
            )));
        }

        let digest = unsigned.transaction.signing_hash();
        let signature = self.session.co_sign(&self.key_share, &digest).await?;

        let raw = unsigned.transaction.encode_signed(&signature);
        let hash = transaction_hash(&raw);

        let reported = self
            .provider
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| match e {
                Error::Broadcast(_) => e,
                other => Error::Broadcast(other.to_string()),
            })?;

        // The result always carries the locally computed hash
        if !reported.eq_ignore_ascii_case(&hash) {
            tracing::warn!(%reported, %hash, "Provider reported an unexpected hash");
        }

        info!(%hash, "Transaction broadcast");

        let mut result = TransactionResult::new(hash);
        result.explorer_url = self.config.explorer_tx_url(&result.hash);
        Ok(result)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Derive the `0x`-prefixed address of a SEC1 public key
pub fn ethereum_address(public_key: &[u8]) -> Result<String> {
    let point = decode_point(public_key)?;
    let uncompressed = point.to_affine().to_encoded_point(false);

    // Keccak256 of the 64-byte key, without the 0x04 prefix
    let hash = keccak256_hash(&uncompressed.as_bytes()[1..]);
    Ok(format!("0x{}", hex::encode(&hash[12..])))
}

/// Check if an address has the `0x` + 40 hex digits form
pub fn is_valid_address(address: &str) -> bool {
    address.len() == 42
        && address.starts_with("0x")
        && address[2..].chars().all(|c| c.is_ascii_hexdigit())
}

fn parse_recipient(address: &str) -> Result<Address> {
    let invalid = |reason: String| TxBuildError::InvalidRecipient {
        address: address.to_string(),
        reason,
    };

    if address.is_empty() {
        return Err(invalid("empty recipient".into()).into());
    }
    if !is_valid_address(address) {
        return Err(invalid("expected 0x followed by 40 hex digits".into()).into());
    }
    Address::from_str(address).map_err(|e| invalid(e.to_string()).into())
}

fn parse_hex_u128(s: &str) -> Result<u128> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(s, 16).map_err(|e| Error::Provider(format!("Failed to parse hex: {}", e)))
}

fn parse_hex_u64(s: &str) -> Result<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).map_err(|e| Error::Provider(format!("Failed to parse hex: {}", e)))
}

fn median(values: &[u128]) -> Option<u128> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    Some(sorted[sorted.len() / 2])
}
