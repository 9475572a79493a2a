//! # Bitcoin Wallet
//!
//! Native segwit (P2WPKH) wallet over the group key. Balances and inputs
//! come from an Esplora-compatible indexer; coin selection, fee
//! computation and BIP-143 signing happen locally. One co-signing round
//! runs per input.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mpc_vault_core::chain::{BitcoinConfig, BitcoinWallet, EsploraProvider};
//!
//! let config = BitcoinConfig::testnet();
//! let provider = Arc::new(EsploraProvider::new(&config)?);
//! let wallet = BitcoinWallet::new(config, provider, key_share, session)?;
//!
//! let intent = TransactionIntent::new("tb1q...", 800, FeePolicy::PerByte(1));
//! let result = wallet.send_intent(&intent).await?;
//! ```

mod tx;

pub use tx::{
    MAX_MONEY, dust_limit, estimate_vsize, p2wpkh_sighashes, p2wpkh_witness, recipient_script,
    unsigned_transaction, wallet_key,
};

use super::{Balance, ChainWallet, FeePolicy, TransactionIntent, TransactionResult};
use crate::error::TxBuildError;
use crate::session::SigningSession;
use crate::types::decode_point;
use crate::{ChainType, Error, KeyShare, Result};
use async_trait::async_trait;
use bitcoin::consensus::encode::serialize_hex;
use bitcoin::{Amount, CompressedPublicKey, Network, Script, ScriptBuf, Transaction, TxOut};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

const BTC_DECIMALS: u8 = 8;

// ============================================================================
// Configuration
// ============================================================================

/// Bitcoin network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitcoinNetwork {
    Mainnet,
    Testnet,
    Regtest,
}

impl BitcoinNetwork {
    pub fn network(&self) -> Network {
        match self {
            BitcoinNetwork::Mainnet => Network::Bitcoin,
            BitcoinNetwork::Testnet => Network::Testnet,
            BitcoinNetwork::Regtest => Network::Regtest,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BitcoinNetwork::Mainnet => "BTC",
            BitcoinNetwork::Testnet | BitcoinNetwork::Regtest => "tBTC",
        }
    }
}

impl fmt::Display for BitcoinNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitcoinNetwork::Mainnet => write!(f, "mainnet"),
            BitcoinNetwork::Testnet => write!(f, "testnet"),
            BitcoinNetwork::Regtest => write!(f, "regtest"),
        }
    }
}

/// Configuration for a Bitcoin wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitcoinConfig {
    pub network: BitcoinNetwork,
    /// Esplora API base URL
    pub esplora_url: String,
    /// Block explorer URL (optional)
    #[serde(default)]
    pub explorer_url: Option<String>,
}

impl BitcoinConfig {
    pub fn mainnet() -> Self {
        Self {
            network: BitcoinNetwork::Mainnet,
            esplora_url: "https://blockstream.info/api".to_string(),
            explorer_url: Some("https://blockstream.info".to_string()),
        }
    }

    pub fn testnet() -> Self {
        Self {
            network: BitcoinNetwork::Testnet,
            esplora_url: "https://blockstream.info/testnet/api".to_string(),
            explorer_url: Some("https://blockstream.info/testnet".to_string()),
        }
    }

    /// Explorer URL for a transaction
    pub fn explorer_tx_url(&self, txid: &str) -> Option<String> {
        self.explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base, txid))
    }
}

// ============================================================================
// Provider
// ============================================================================

/// Unspent output owned by the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Funding transaction ID (display order)
    pub txid: String,
    pub vout: u32,
    /// Value in satoshi
    pub value: u64,
    #[serde(default)]
    pub confirmed: bool,
}

/// UTXO-chain execution context
#[async_trait]
pub trait UtxoProvider: Send + Sync {
    /// Unspent outputs paying to the address
    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>>;

    /// Submit a raw transaction (hex), returning its txid
    async fn broadcast(&self, raw_hex: &str) -> Result<String>;
}

/// [`UtxoProvider`] over the Esplora REST API
#[derive(Debug, Clone)]
pub struct EsploraProvider {
    base_url: String,
    client: reqwest::Client,
}

impl EsploraProvider {
    pub fn new(config: &BitcoinConfig) -> Result<Self> {
        if config.esplora_url.is_empty() {
            return Err(Error::InvalidConfig("Esplora URL required".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Provider(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.esplora_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[derive(Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: EsploraStatus,
}

#[derive(Deserialize)]
struct EsploraStatus {
    confirmed: bool,
}

#[async_trait]
impl UtxoProvider for EsploraProvider {
    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>> {
        let url = format!("{}/address/{}/utxo", self.base_url, address);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("UTXO request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Provider(format!(
                "UTXO request returned {}",
                response.status()
            )));
        }

        let utxos: Vec<EsploraUtxo> = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("Failed to parse UTXO response: {}", e)))?;

        Ok(utxos
            .into_iter()
            .map(|u| Utxo {
                txid: u.txid,
                vout: u.vout,
                value: u.value,
                confirmed: u.status.confirmed,
            })
            .collect())
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String> {
        let url = format!("{}/tx", self.base_url);
        let response = self
            .client
            .post(&url)
            .body(raw_hex.to_string())
            .send()
            .await
            .map_err(|e| Error::Broadcast(format!("Broadcast request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Broadcast(format!("Failed to read broadcast response: {}", e)))?;

        if !status.is_success() {
            return Err(Error::Broadcast(format!("{}: {}", status, body.trim())));
        }
        Ok(body.trim().to_string())
    }
}

// ============================================================================
// Coin Selection
// ============================================================================

/// Inputs, outputs and fee chosen for an intent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<Utxo>,
    pub fee: u64,
    /// Change returned to the wallet, absent when it would be dust
    pub change: Option<u64>,
}

/// Largest-first coin selection
///
/// Adds inputs until they cover the value plus the fee of the transaction
/// that spends them. Change below the dust limit is left to the fee. A fee
/// rate whose fee does not fit in a `u64` is an invalid fee policy.
pub fn select_coins(
    utxos: &[Utxo],
    value: u64,
    fee_rate: u64,
    recipient: &TxOut,
    change_script: &Script,
    change_dust: u64,
) -> std::result::Result<Selection, TxBuildError> {
    let mut sorted = utxos.to_vec();
    sorted.sort_by(|a, b| b.value.cmp(&a.value));

    let change_template = TxOut {
        value: Amount::ZERO,
        script_pubkey: change_script.to_owned(),
    };
    let fee_for = |n_inputs: usize, outputs: &[TxOut]| {
        estimate_vsize(n_inputs, outputs)
            .checked_mul(fee_rate)
            .ok_or_else(|| {
                TxBuildError::InvalidFeePolicy(format!(
                    "fee at {} sat/vB overflows for {} inputs",
                    fee_rate, n_inputs
                ))
            })
    };

    let mut total: u64 = 0;
    let mut selected = Vec::new();
    let mut required = value;

    for utxo in sorted {
        total = total.saturating_add(utxo.value);
        selected.push(utxo);

        let fee_without_change = fee_for(selected.len(), std::slice::from_ref(recipient))?;
        required = value.saturating_add(fee_without_change);
        if total < required {
            continue;
        }

        let fee_with_change =
            fee_for(selected.len(), &[recipient.clone(), change_template.clone()])?;
        let change = total
            .checked_sub(value)
            .and_then(|rest| rest.checked_sub(fee_with_change))
            .filter(|change| *change >= change_dust);

        return Ok(match change {
            Some(change) => Selection {
                inputs: selected,
                fee: fee_with_change,
                change: Some(change),
            },
            None => Selection {
                inputs: selected,
                fee: total - value,
                change: None,
            },
        });
    }

    Err(TxBuildError::InsufficientFunds {
        required: required as u128,
        available: total as u128,
    })
}

// ============================================================================
// Wallet
// ============================================================================

/// Populated Bitcoin transaction awaiting co-signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitcoinUnsignedTx {
    /// Sender address
    pub from: String,
    /// Spent outputs, in input order
    pub inputs: Vec<Utxo>,
    /// Unsigned transaction: recipient output first, then change when present
    pub transaction: Transaction,
    /// Fee in satoshi
    pub fee: u64,
    pub change: Option<u64>,
    /// Fee rate in satoshi per virtual byte
    pub fee_rate: u64,
}

impl BitcoinUnsignedTx {
    pub fn total_input(&self) -> u64 {
        self.inputs.iter().map(|u| u.value).sum()
    }

    pub fn total_output(&self) -> u64 {
        self.transaction.output.iter().map(|o| o.value.to_sat()).sum()
    }

    /// Estimated virtual size once signed
    pub fn vsize(&self) -> u64 {
        estimate_vsize(self.inputs.len(), &self.transaction.output)
    }
}

/// Wallet on the Bitcoin network
#[derive(Clone)]
pub struct BitcoinWallet {
    config: BitcoinConfig,
    address: String,
    /// Compressed group public key
    public_key: CompressedPublicKey,
    /// P2WPKH script of the wallet, also used for change
    script_pubkey: ScriptBuf,
    provider: Arc<dyn UtxoProvider>,
    key_share: Arc<KeyShare>,
    session: Arc<SigningSession>,
}

impl BitcoinWallet {
    /// Bind a key share and an established SIGN session into a wallet
    pub fn new(
        config: BitcoinConfig,
        provider: Arc<dyn UtxoProvider>,
        key_share: Arc<KeyShare>,
        session: Arc<SigningSession>,
    ) -> Result<Self> {
        session.ensure_signing_for(&key_share)?;

        let public_key = compressed_public_key(&key_share.public_key)?;
        let script_pubkey = ScriptBuf::new_p2wpkh(&public_key.wpubkey_hash());
        let address = bitcoin::Address::p2wpkh(&public_key, config.network.network()).to_string();

        debug!(%address, network = %config.network, "Bitcoin wallet constructed");

        Ok(Self {
            config,
            address,
            public_key,
            script_pubkey,
            provider,
            key_share,
            session,
        })
    }

    pub fn config(&self) -> &BitcoinConfig {
        &self.config
    }
}

impl fmt::Debug for BitcoinWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitcoinWallet")
            .field("address", &self.address)
            .field("network", &self.config.network)
            .field("session", &self.session.id())
            .finish()
    }
}

#[async_trait]
impl ChainWallet for BitcoinWallet {
    type Unsigned = BitcoinUnsignedTx;

    fn chain(&self) -> ChainType {
        ChainType::Bitcoin
    }

    fn address(&self) -> &str {
        &self.address
    }

    async fn get_balance(&self) -> Result<Balance> {
        let utxos = self.provider.list_unspent(&self.address).await?;
        let total: u128 = utxos.iter().map(|u| u128::from(u.value)).sum();
        Ok(Balance::from_units(
            total,
            BTC_DECIMALS,
            self.config.network.symbol(),
        ))
    }

    #[instrument(skip(self, intent), fields(from = %self.address, to = %intent.to, value = intent.value))]
    async fn populate_transaction(&self, intent: &TransactionIntent) -> Result<BitcoinUnsignedTx> {
        let recipient = recipient_script(&intent.to, self.config.network.network())?;

        let value = u64::try_from(intent.value)
            .ok()
            .filter(|v| *v <= MAX_MONEY)
            .ok_or_else(|| {
                TxBuildError::InvalidAmount(format!("{} exceeds the money supply", intent.value))
            })?;
        let dust = dust_limit(&recipient);
        if value < dust {
            return Err(TxBuildError::InvalidAmount(format!(
                "{} sat is below the dust limit of {} sat",
                value, dust
            ))
            .into());
        }

        let fee_rate = match intent.fee {
            FeePolicy::PerByte(rate) if rate >= 1 => rate,
            FeePolicy::PerByte(_) => {
                return Err(
                    TxBuildError::InvalidFeePolicy("fee rate must be at least 1 sat/vB".into())
                        .into(),
                );
            }
            _ => {
                return Err(TxBuildError::InvalidFeePolicy(
                    "Bitcoin transactions need a per-byte fee rate".into(),
                )
                .into());
            }
        };

        let utxos = self.provider.list_unspent(&self.address).await?;
        if utxos.is_empty() {
            return Err(TxBuildError::NoSpendableInputs(self.address.clone()).into());
        }

        let recipient_output = TxOut {
            value: Amount::from_sat(value),
            script_pubkey: recipient,
        };
        let selection = select_coins(
            &utxos,
            value,
            fee_rate,
            &recipient_output,
            &self.script_pubkey,
            dust_limit(&self.script_pubkey),
        )?;

        let mut outputs = vec![recipient_output];
        if let Some(change) = selection.change {
            outputs.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: self.script_pubkey.clone(),
            });
        }
        let transaction = unsigned_transaction(&selection.inputs, outputs)?;

        debug!(
            inputs = selection.inputs.len(),
            fee = selection.fee,
            change = ?selection.change,
            "Transaction populated"
        );

        Ok(BitcoinUnsignedTx {
            from: self.address.clone(),
            inputs: selection.inputs,
            transaction,
            fee: selection.fee,
            change: selection.change,
            fee_rate,
        })
    }

    #[instrument(skip(self, unsigned), fields(from = %self.address, inputs = unsigned.inputs.len()))]
    async fn send_transaction(&self, unsigned: BitcoinUnsignedTx) -> Result<TransactionResult> {
        if unsigned.from != self.address {
            return Err(Error::InvalidConfig(format!(
                "transaction was populated by {}, not this wallet",
                unsigned.from
            )));
        }

        let values: Vec<u64> = unsigned.inputs.iter().map(|u| u.value).collect();
        let digests = p2wpkh_sighashes(&unsigned.transaction, &values, &self.script_pubkey)?;

        let fee = unsigned.fee;
        let mut transaction = unsigned.transaction;
        for (input, digest) in transaction.input.iter_mut().zip(digests) {
            let signature = self.session.co_sign(&self.key_share, &digest).await?;
            input.witness = p2wpkh_witness(signature.to_der()?, &self.public_key);
        }

        let txid = transaction.compute_txid().to_string();
        let reported = self
            .provider
            .broadcast(&serialize_hex(&transaction))
            .await
            .map_err(|e| match e {
                Error::Broadcast(_) => e,
                other => Error::Broadcast(other.to_string()),
            })?;

        if !reported.is_empty() && reported != txid {
            tracing::warn!(%reported, %txid, "Indexer reported an unexpected txid");
        }

        info!(%txid, fee, "Transaction broadcast");

        let mut result = TransactionResult::new(txid);
        result.explorer_url = self.config.explorer_tx_url(&result.hash);
        Ok(result)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Compressed form of a SEC1 public key in either encoding
fn compressed_public_key(public_key: &[u8]) -> Result<CompressedPublicKey> {
    let point = decode_point(public_key)?;
    wallet_key(point.to_affine().to_encoded_point(true).as_bytes())
}

/// Derive the P2WPKH address of a SEC1 public key
pub fn bitcoin_address(public_key: &[u8], network: BitcoinNetwork) -> Result<String> {
    let compressed = compressed_public_key(public_key)?;
    Ok(bitcoin::Address::p2wpkh(&compressed, network.network()).to_string())
}

/// Check if a string is a segwit address for the network
pub fn is_valid_address(address: &str, network: BitcoinNetwork) -> bool {
    recipient_script(address, network.network()).is_ok()
}
