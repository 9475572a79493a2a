//! Key generation to EVM broadcast

use crate::support::{ONE_ETH, harness, is_evm_hash};
use mpc_vault_core::chain::evm::{ZERO_ADDRESS, transaction_hash};
use mpc_vault_core::{
    ChainType, ChainWallet, Error, FeePolicy, FractionOfBalance, KeygenScheme, SessionState,
    TransactionOrchestrator,
};

#[tokio::test]
async fn test_send_tenth_of_balance_to_zero_address() {
    let h = harness().await;

    let share = h
        .vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    assert_eq!(share.parameters.parties.len(), 2);

    let session = h.vault.sign_session().unwrap();
    assert_eq!(session.state(), SessionState::Established);

    let wallet = h.vault.ethereum_wallet().unwrap();
    assert!(wallet.address().starts_with("0x"));
    assert_eq!(wallet.get_balance().await.unwrap().raw_value(), ONE_ETH);

    let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
    let result = h.vault.send_ethereum(&policy).await.unwrap();

    assert!(is_evm_hash(&result.hash), "unexpected hash {}", result.hash);
    assert_eq!(
        result.explorer_url.as_deref(),
        Some(format!("https://sepolia.etherscan.io/tx/{}", result.hash).as_str())
    );

    let sent = h.evm.sent.lock().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0][0], 0x02);
    assert_eq!(result.hash, transaction_hash(&sent[0]));
    assert_eq!(h.evm.nonce(), 1);
    assert_eq!(h.runtime.signatures_issued(), 1);
    assert!(!h.vault.is_busy());
}

#[tokio::test]
async fn test_result_hash_is_computed_locally() {
    let h = harness().await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);

    for reported in ["", "0xdeadbeef"] {
        h.evm.report_hash(reported);
        let result = h.vault.send_ethereum(&policy).await.unwrap();

        let raw = h.evm.sent.lock().last().cloned().unwrap();
        assert_eq!(result.hash, transaction_hash(&raw));
        assert!(is_evm_hash(&result.hash));
        assert_eq!(
            result.explorer_url.as_deref(),
            Some(format!("https://sepolia.etherscan.io/tx/{}", result.hash).as_str())
        );
    }
    assert_eq!(h.evm.broadcasts(), 2);
}

#[tokio::test]
async fn test_consecutive_sends_advance_nonce() {
    let h = harness().await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();

    let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
    let first = h.vault.send_ethereum(&policy).await.unwrap();
    let second = h.vault.send_ethereum(&policy).await.unwrap();

    assert_ne!(first.hash, second.hash);
    assert_eq!(h.evm.broadcasts(), 2);
    assert_eq!(h.evm.nonce(), 2);
}

#[tokio::test]
async fn test_threshold_share_sends() {
    let h = harness().await;
    h.vault
        .generate_key_share(KeygenScheme::ThresholdNofN(3))
        .await
        .unwrap();

    let wallet = h.vault.wallet(ChainType::Evm).unwrap();
    let result = TransactionOrchestrator::new()
        .execute(
            &wallet,
            &FractionOfBalance::new(ZERO_ADDRESS, 4, FeePolicy::ProviderDefault),
        )
        .await
        .unwrap();

    assert!(is_evm_hash(&result.hash));
    assert_eq!(h.evm.broadcasts(), 1);
}

#[tokio::test]
async fn test_refused_signature_is_not_broadcast() {
    let h = harness().await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    h.runtime.behavior().set_approve_signing(false);

    let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
    let err = h.vault.send_ethereum(&policy).await.unwrap_err();

    assert!(matches!(err, Error::Signing(_)));
    assert!(err.is_pre_broadcast());
    assert_eq!(h.evm.broadcasts(), 0);
    assert_eq!(h.evm.nonce(), 0);
}

#[tokio::test]
async fn test_rejected_broadcast_maps_to_broadcast_error() {
    let h = harness().await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    h.evm.reject_broadcasts(true);

    let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
    let err = h.vault.send_ethereum(&policy).await.unwrap_err();
    assert!(matches!(err, Error::Broadcast(_)));
    assert!(!err.is_pre_broadcast());

    h.evm.reject_broadcasts(false);
    h.vault.send_ethereum(&policy).await.unwrap();
    assert_eq!(h.evm.broadcasts(), 1);
}
