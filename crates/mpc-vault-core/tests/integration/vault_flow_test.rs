//! Facade lifecycle and key share changes

use crate::support::{BTC_RECIPIENT, harness};
use mpc_vault_core::chain::evm::ZERO_ADDRESS;
use mpc_vault_core::{
    ChainType, ChainWallet, Error, FeePolicy, FixedAmount, FractionOfBalance, KeygenScheme,
    SessionState, SigningError,
};

#[tokio::test]
async fn test_send_before_session_fails_without_broadcast() {
    let h = harness().await;
    assert!(h.vault.key_share().is_none());
    assert!(h.vault.sign_session().is_none());

    let eth = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
    let err = h.vault.send_ethereum(&eth).await.unwrap_err();
    assert!(matches!(err, Error::Signing(SigningError::NoSession)));

    let btc = FixedAmount::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(1));
    let err = h.vault.send_bitcoin(&btc).await.unwrap_err();
    assert!(matches!(err, Error::Signing(SigningError::NoSession)));

    assert_eq!(h.evm.broadcasts(), 0);
    assert_eq!(h.utxo.broadcasts(), 0);
    assert_eq!(h.utxo.lookups(), 0);
}

#[tokio::test]
async fn test_key_share_change_rebuilds_wallets() {
    let h = harness().await;

    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    let first_session = h.vault.sign_session().unwrap();
    let first_eth = h.vault.ethereum_wallet().unwrap().address().to_string();
    let first_btc = h.vault.bitcoin_wallet().unwrap().address().to_string();

    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    let second_session = h.vault.sign_session().unwrap();

    assert_eq!(first_session.state(), SessionState::Closed);
    assert_eq!(second_session.state(), SessionState::Established);
    assert_ne!(first_session.id(), second_session.id());
    assert_ne!(h.vault.ethereum_wallet().unwrap().address(), first_eth);
    assert_ne!(h.vault.bitcoin_wallet().unwrap().address(), first_btc);
    assert_eq!(h.runtime.open_connections(), 1);
}

#[tokio::test]
async fn test_load_key_share_restores_addresses() {
    let h = harness().await;
    let share = h
        .vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    let address = h.vault.ethereum_wallet().unwrap().address().to_string();

    let serialized = serde_json::to_string(share.as_ref()).unwrap();
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();

    let restored = serde_json::from_str(&serialized).unwrap();
    h.vault.load_key_share(restored).await.unwrap();

    assert_eq!(h.vault.ethereum_wallet().unwrap().address(), address);
    assert_eq!(
        h.vault.key_share().unwrap().public_key,
        share.public_key
    );
}

#[tokio::test]
async fn test_unreachable_counterparty_leaves_no_wallet() {
    let h = harness().await;
    let share = h
        .vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();

    h.runtime.behavior().set_online(false);
    let err = h.vault.on_key_share_change(share).await.unwrap_err();
    assert!(matches!(err, Error::SessionEstablishment(_)));

    assert!(h.vault.sign_session().is_none());
    assert!(h.vault.wallet(ChainType::Evm).is_none());
    assert!(h.vault.wallet(ChainType::Bitcoin).is_none());

    let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
    let err = h.vault.send_ethereum(&policy).await.unwrap_err();
    assert!(matches!(err, Error::Signing(SigningError::NoSession)));
    assert_eq!(h.evm.broadcasts(), 0);

    h.runtime.behavior().set_online(true);
    let share = h.vault.key_share().unwrap();
    h.vault.on_key_share_change(share).await.unwrap();
    h.vault.send_ethereum(&policy).await.unwrap();
    assert_eq!(h.evm.broadcasts(), 1);
}

#[tokio::test]
async fn test_key_share_change_switches_back_to_earlier_share() {
    let h = harness().await;
    let first = h
        .vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    let first_eth = h.vault.ethereum_wallet().unwrap().address().to_string();
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();

    h.vault.on_key_share_change(first.clone()).await.unwrap();

    assert_eq!(h.vault.key_share().unwrap().public_key, first.public_key);
    assert_eq!(h.vault.ethereum_wallet().unwrap().address(), first_eth);

    // The earlier group still co-signs
    let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
    h.vault.send_ethereum(&policy).await.unwrap();
    assert_eq!(h.evm.broadcasts(), 1);
}

#[tokio::test]
async fn test_shutdown_is_terminal() {
    let h = harness().await;
    h.vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap();
    let session = h.vault.sign_session().unwrap();

    h.vault.shutdown().await.unwrap();
    h.vault.shutdown().await.unwrap();

    assert!(h.vault.is_shut_down());
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(h.runtime.open_connections(), 0);
    assert!(h.vault.ethereum_wallet().is_none());

    let err = h
        .vault
        .generate_key_share(KeygenScheme::Pairwise2of2)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));

    let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
    assert!(h.vault.send_ethereum(&policy).await.is_err());
    assert_eq!(h.evm.broadcasts(), 0);
}
