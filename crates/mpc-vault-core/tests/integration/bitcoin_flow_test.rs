//! Key generation to segwit broadcast

use crate::support::{BTC_RECIPIENT, ONE_ETH, harness, harness_with, is_txid};
use mpc_vault_core::chain::BitcoinNetwork;
use mpc_vault_core::chain::bitcoin::is_valid_address;
use mpc_vault_core::{ChainWallet, Error, FeePolicy, FixedAmount, KeygenScheme};

#[tokio::test]
async fn test_send_800_sat_at_one_sat_per_vbyte() {
    let h = harness().await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();

    let wallet = h.vault.bitcoin_wallet().unwrap();
    assert!(wallet.address().starts_with("tb1q"));
    assert!(is_valid_address(wallet.address(), BitcoinNetwork::Testnet));

    let policy = FixedAmount::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(1));
    let result = h.vault.send_bitcoin(&policy).await.unwrap();

    assert!(is_txid(&result.hash), "unexpected txid {}", result.hash);
    assert_eq!(
        result.explorer_url.as_deref(),
        Some(format!("https://blockstream.info/testnet/tx/{}", result.hash).as_str())
    );

    let sent = h.utxo.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    // version 2, segwit marker and flag, one input
    assert!(sent[0].starts_with("02000000000101"), "raw {}", sent[0]);
    assert_eq!(h.runtime.signatures_issued(), 1);
}

#[tokio::test]
async fn test_every_input_is_co_signed() {
    let h = harness_with(ONE_ETH, &[600, 500, 400]).await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();

    let policy = FixedAmount::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(1));
    let result = h.vault.send_bitcoin(&policy).await.unwrap();

    assert!(is_txid(&result.hash));
    assert_eq!(h.runtime.signatures_issued(), 2);
    assert!(h.utxo.sent.lock()[0].starts_with("02000000000102"));
}

#[tokio::test]
async fn test_rejected_broadcast_keeps_wallet_usable() {
    let h = harness().await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    h.utxo.reject_broadcasts(true);

    let policy = FixedAmount::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(1));
    let err = h.vault.send_bitcoin(&policy).await.unwrap_err();
    assert!(matches!(err, Error::Broadcast(_)));
    assert_eq!(h.utxo.broadcasts(), 0);

    h.utxo.reject_broadcasts(false);
    let result = h.vault.send_bitcoin(&policy).await.unwrap();
    assert!(is_txid(&result.hash));
    assert_eq!(h.utxo.broadcasts(), 1);
}

#[tokio::test]
async fn test_build_failure_signs_nothing() {
    let h = harness_with(ONE_ETH, &[500]).await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();

    let policy = FixedAmount::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(1));
    let err = h.vault.send_bitcoin(&policy).await.unwrap_err();

    assert!(matches!(err, Error::TransactionBuild(_)));
    assert_eq!(h.runtime.signatures_issued(), 0);
    assert_eq!(h.utxo.broadcasts(), 0);
}
