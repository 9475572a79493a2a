//! Mock chain providers and a vault harness

#![allow(dead_code)]

use mpc_vault_core::chain::evm::transaction_hash;
use mpc_vault_core::chain::{CallRequest, EvmProvider, GasPrice, GasPrices, Utxo, UtxoProvider};
use mpc_vault_core::mpc::{LocalMpcRuntime, async_trait};
use mpc_vault_core::{Credentials, Error, MpcVault, Result, VaultConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

pub const EMAIL: &str = "alice@example.com";
pub const PASSWORD: &str = "correct horse";

/// Bitcoin testnet recipient used by the demo flow
pub const BTC_RECIPIENT: &str = "tb1qw2c3lxufxqe2x9s4rdzh65tpf4d7fssjgh8nv6";

pub const ONE_ETH: u128 = 1_000_000_000_000_000_000;

// ============================================================================
// EVM
// ============================================================================

/// In-memory account chain
pub struct MockEvmProvider {
    balance: Mutex<u128>,
    nonce: AtomicU64,
    gas_estimate: u64,
    reject: AtomicBool,
    /// Hash reported back for broadcasts instead of the real one
    reported_hash: Mutex<Option<String>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
}

impl MockEvmProvider {
    pub fn new(balance: u128) -> Self {
        Self {
            balance: Mutex::new(balance),
            nonce: AtomicU64::new(0),
            gas_estimate: 21_000,
            reject: AtomicBool::new(false),
            reported_hash: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_balance(&self, balance: u128) {
        *self.balance.lock() = balance;
    }

    /// Make the node reject every broadcast
    pub fn reject_broadcasts(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Make the node answer broadcasts with `hash`
    pub fn report_hash(&self, hash: &str) {
        *self.reported_hash.lock() = Some(hash.to_string());
    }

    pub fn broadcasts(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn nonce(&self) -> u64 {
        self.nonce.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EvmProvider for MockEvmProvider {
    async fn get_balance(&self, _address: &str) -> Result<u128> {
        Ok(*self.balance.lock())
    }

    async fn get_transaction_count(&self, _address: &str) -> Result<u64> {
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn gas_prices(&self) -> Result<GasPrices> {
        let price = |tip: u128| GasPrice {
            max_fee: 30_000_000_000,
            max_priority_fee: tip,
        };
        Ok(GasPrices {
            low: price(1_000_000_000),
            medium: price(2_000_000_000),
            high: price(3_000_000_000),
            base_fee: Some(14_000_000_000),
        })
    }

    async fn estimate_gas(&self, _request: &CallRequest) -> Result<u64> {
        Ok(self.gas_estimate)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::Provider("RPC error: nonce too low".into()));
        }
        self.sent.lock().push(raw.to_vec());
        self.nonce.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .reported_hash
            .lock()
            .clone()
            .unwrap_or_else(|| transaction_hash(raw)))
    }
}

// ============================================================================
// Bitcoin
// ============================================================================

/// In-memory UTXO indexer
pub struct MockUtxoProvider {
    utxos: Mutex<Vec<Utxo>>,
    lookups: AtomicUsize,
    reject: AtomicBool,
    pub sent: Mutex<Vec<String>>,
}

impl MockUtxoProvider {
    pub fn new(values: &[u64]) -> Self {
        Self {
            utxos: Mutex::new(utxos(values)),
            lookups: AtomicUsize::new(0),
            reject: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_utxos(&self, values: &[u64]) {
        *self.utxos.lock() = utxos(values);
    }

    pub fn reject_broadcasts(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn broadcasts(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UtxoProvider for MockUtxoProvider {
    async fn list_unspent(&self, _address: &str) -> Result<Vec<Utxo>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.utxos.lock().clone())
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(Error::Broadcast("400 Bad Request: bad-txns-inputs-missingorspent".into()));
        }
        self.sent.lock().push(raw_hex.to_string());
        Ok(String::new())
    }
}

/// Confirmed outputs with distinct funding txids
pub fn utxos(values: &[u64]) -> Vec<Utxo> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| Utxo {
            txid: format!("{:064x}", i as u64 + 0xabc0),
            vout: i as u32,
            value: *value,
            confirmed: true,
        })
        .collect()
}

// ============================================================================
// Harness
// ============================================================================

pub fn credentials() -> Credentials {
    Credentials::password(EMAIL, PASSWORD)
}

pub fn runtime() -> Arc<LocalMpcRuntime> {
    Arc::new(
        LocalMpcRuntime::new()
            .with_account(EMAIL, PASSWORD)
            .with_timeout_secs(10),
    )
}

/// A signed-in vault over mock providers, with no key share yet
pub struct Harness {
    pub vault: MpcVault,
    pub runtime: Arc<LocalMpcRuntime>,
    pub evm: Arc<MockEvmProvider>,
    pub utxo: Arc<MockUtxoProvider>,
}

pub async fn harness() -> Harness {
    harness_with(ONE_ETH, &[5_000, 3_000, 1_200]).await
}

pub async fn harness_with(eth_balance: u128, btc_utxos: &[u64]) -> Harness {
    let runtime = runtime();
    let evm = Arc::new(MockEvmProvider::new(eth_balance));
    let utxo = Arc::new(MockUtxoProvider::new(btc_utxos));

    let vault = MpcVault::init(
        runtime.clone(),
        VaultConfig::default(),
        evm.clone(),
        utxo.clone(),
    )
    .expect("default config is valid");
    vault.sign_in(&credentials()).await.expect("sign-in");

    Harness {
        vault,
        runtime,
        evm,
        utxo,
    }
}

/// True for `0x` followed by 64 lowercase hex digits
pub fn is_evm_hash(hash: &str) -> bool {
    hash.len() == 66
        && hash.starts_with("0x")
        && hash[2..].chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// True for 64 lowercase hex digits
pub fn is_txid(txid: &str) -> bool {
    txid.len() == 64 && txid.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
