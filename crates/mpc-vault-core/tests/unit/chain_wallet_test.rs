//! Unit tests for chain wallet transaction population
//!
//! Every build failure must surface as a `TransactionBuild` error before
//! anything is signed or broadcast.

use crate::support::{BTC_RECIPIENT, Harness, ONE_ETH, harness, harness_with};
use mpc_vault_core::chain::bitcoin::MAX_MONEY;
use mpc_vault_core::chain::evm::{EvmTransaction, ZERO_ADDRESS};
use mpc_vault_core::chain::{BitcoinWallet, ChainWallet, EthereumWallet, FeePolicy, TransactionIntent};
use mpc_vault_core::{Error, KeygenScheme, TxBuildError};

async fn ready(harness: &Harness) -> (EthereumWallet, BitcoinWallet) {
    harness
        .vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    (
        harness.vault.ethereum_wallet().unwrap(),
        harness.vault.bitcoin_wallet().unwrap(),
    )
}

fn build_error(result: mpc_vault_core::Result<impl std::fmt::Debug>) -> TxBuildError {
    match result {
        Err(Error::TransactionBuild(e)) => e,
        other => panic!("expected a transaction build error, got {other:?}"),
    }
}

// ============================================================================
// Ethereum
// ============================================================================

#[tokio::test]
async fn test_eth_populate_uses_provider_context() {
    let h = harness().await;
    let (eth, _) = ready(&h).await;

    let intent = TransactionIntent::new(ZERO_ADDRESS, ONE_ETH / 10, FeePolicy::ProviderDefault);
    let unsigned = eth.populate_transaction(&intent).await.unwrap();

    assert_eq!(unsigned.from, eth.address());
    assert_eq!(unsigned.transaction.nonce(), 0);
    // 21000 estimate plus 20%
    assert_eq!(unsigned.transaction.gas_limit(), 25_200);
    match &unsigned.transaction {
        EvmTransaction::Eip1559(tx) => {
            assert_eq!(tx.chain_id, 11_155_111);
            assert_eq!(tx.max_fee_per_gas, 30_000_000_000);
            assert_eq!(tx.max_priority_fee_per_gas, 2_000_000_000);
        }
        other => panic!("expected an EIP-1559 transaction, got {other:?}"),
    }
}

#[tokio::test]
async fn test_eth_invalid_recipient() {
    let h = harness().await;
    let (eth, _) = ready(&h).await;

    for to in ["", "0x1234", "vitalik.eth", BTC_RECIPIENT] {
        let intent = TransactionIntent::new(to, 1, FeePolicy::ProviderDefault);
        assert!(matches!(
            build_error(eth.populate_transaction(&intent).await),
            TxBuildError::InvalidRecipient { .. }
        ));
    }
}

#[tokio::test]
async fn test_eth_insufficient_funds() {
    let h = harness_with(ONE_ETH / 1_000, &[]).await;
    let (eth, _) = ready(&h).await;

    // Value fits but value + gas does not
    let intent = TransactionIntent::new(ZERO_ADDRESS, ONE_ETH / 1_000, FeePolicy::ProviderDefault);
    match build_error(eth.populate_transaction(&intent).await) {
        TxBuildError::InsufficientFunds {
            required,
            available,
        } => {
            assert_eq!(available, ONE_ETH / 1_000);
            assert!(required > available);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_eth_fee_policies() {
    let h = harness().await;
    let (eth, _) = ready(&h).await;

    let explicit = TransactionIntent::new(
        ZERO_ADDRESS,
        1,
        FeePolicy::Eip1559 {
            max_fee_per_gas: 10_000_000_000,
            max_priority_fee_per_gas: 1_000_000_000,
        },
    );
    let unsigned = eth.populate_transaction(&explicit).await.unwrap();
    assert_eq!(unsigned.transaction.max_fee_per_gas(), 10_000_000_000);

    let rejected = [
        FeePolicy::Eip1559 {
            max_fee_per_gas: 1,
            max_priority_fee_per_gas: 2,
        },
        FeePolicy::Eip1559 {
            max_fee_per_gas: 0,
            max_priority_fee_per_gas: 0,
        },
        FeePolicy::GasPrice(1_000_000_000),
        FeePolicy::PerByte(1),
    ];
    for fee in rejected {
        let intent = TransactionIntent::new(ZERO_ADDRESS, 1, fee);
        assert!(matches!(
            build_error(eth.populate_transaction(&intent).await),
            TxBuildError::InvalidFeePolicy(_)
        ));
    }
}

// ============================================================================
// Bitcoin
// ============================================================================

#[tokio::test]
async fn test_btc_balance_sums_utxos() {
    let h = harness().await;
    let (_, btc) = ready(&h).await;

    let balance = btc.get_balance().await.unwrap();
    assert_eq!(balance.raw_value(), 9_200);
    assert_eq!(balance.to_string(), "0.000092 tBTC");
}

#[tokio::test]
async fn test_btc_populate_800_at_one_sat_per_byte() {
    let h = harness().await;
    let (_, btc) = ready(&h).await;

    let intent = TransactionIntent::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(1));
    let unsigned = btc.populate_transaction(&intent).await.unwrap();

    assert!(unsigned.total_input() >= 800 + unsigned.fee);
    assert_eq!(unsigned.total_input(), unsigned.total_output() + unsigned.fee);
    assert_eq!(unsigned.transaction.output[0].value.to_sat(), 800);
    assert!(unsigned.fee >= unsigned.vsize());
    // Largest output alone covers it, change goes back to the wallet
    assert_eq!(unsigned.inputs.len(), 1);
    assert_eq!(unsigned.inputs[0].value, 5_000);
    assert_eq!(unsigned.transaction.output.len(), 2);
    assert_eq!(unsigned.transaction.input.len(), 1);
}

#[tokio::test]
async fn test_btc_overflowing_fee_rate_is_rejected() {
    let h = harness().await;
    let (_, btc) = ready(&h).await;

    let intent = TransactionIntent::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(u64::MAX / 50));
    assert!(matches!(
        build_error(btc.populate_transaction(&intent).await),
        TxBuildError::InvalidFeePolicy(_)
    ));
    assert_eq!(h.utxo.broadcasts(), 0);
}

#[tokio::test]
async fn test_btc_invalid_recipient() {
    let h = harness().await;
    let (eth, btc) = ready(&h).await;

    for to in [
        "",
        ZERO_ADDRESS,
        eth.address(),
        // Mainnet address on a testnet wallet
        "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
        // Corrupted checksum
        "tb1qw2c3lxufxqe2x9s4rdzh65tpf4d7fssjgh8nv7",
    ] {
        let intent = TransactionIntent::new(to, 800, FeePolicy::PerByte(1));
        assert!(matches!(
            build_error(btc.populate_transaction(&intent).await),
            TxBuildError::InvalidRecipient { .. }
        ));
    }
}

#[tokio::test]
async fn test_btc_invalid_amounts_and_fees() {
    let h = harness().await;
    let (_, btc) = ready(&h).await;

    for value in [0u128, 100, MAX_MONEY as u128 + 1, u128::MAX] {
        let intent = TransactionIntent::new(BTC_RECIPIENT, value, FeePolicy::PerByte(1));
        assert!(matches!(
            build_error(btc.populate_transaction(&intent).await),
            TxBuildError::InvalidAmount(_)
        ));
    }

    for fee in [FeePolicy::PerByte(0), FeePolicy::ProviderDefault, FeePolicy::GasPrice(1)] {
        let intent = TransactionIntent::new(BTC_RECIPIENT, 800, fee);
        assert!(matches!(
            build_error(btc.populate_transaction(&intent).await),
            TxBuildError::InvalidFeePolicy(_)
        ));
    }
}

#[tokio::test]
async fn test_btc_no_inputs_and_insufficient_funds() {
    let h = harness_with(ONE_ETH, &[]).await;
    let (_, btc) = ready(&h).await;

    let intent = TransactionIntent::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(1));
    assert!(matches!(
        build_error(btc.populate_transaction(&intent).await),
        TxBuildError::NoSpendableInputs(_)
    ));

    h.utxo.set_utxos(&[400, 450]);
    match build_error(btc.populate_transaction(&intent).await) {
        TxBuildError::InsufficientFunds {
            required,
            available,
        } => {
            assert_eq!(available, 850);
            assert!(required > 800);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.utxo.broadcasts(), 0);
}
