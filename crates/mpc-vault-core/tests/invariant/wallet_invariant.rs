//! Wallet invariants
//!
//! Wallets fail closed: a mismatched or closed session never signs, and a
//! failed signature never reaches the chain.

use crate::support::{BTC_RECIPIENT, MockEvmProvider, MockUtxoProvider, ONE_ETH, credentials, runtime};
use mpc_vault_core::chain::bitcoin::bitcoin_address;
use mpc_vault_core::chain::evm::{ZERO_ADDRESS, ethereum_address};
use mpc_vault_core::chain::{
    BitcoinConfig, BitcoinNetwork, BitcoinWallet, EthereumWallet, EvmConfig,
};
use mpc_vault_core::mpc::{Authenticator, LocalMpcRuntime};
use mpc_vault_core::{
    ChainWallet, Error, FeePolicy, KeyShare, KeyShareStore, KeygenScheme, SessionKind,
    SessionManager, SessionState, SigningError, SigningSession, TransactionIntent,
};
use std::sync::Arc;

struct Fixture {
    runtime: Arc<LocalMpcRuntime>,
    store: KeyShareStore,
    sessions: Arc<SessionManager>,
    evm: Arc<MockEvmProvider>,
    utxo: Arc<MockUtxoProvider>,
}

impl Fixture {
    async fn new() -> Self {
        let runtime = runtime();
        runtime.sign_in(&credentials()).await.unwrap();
        let sessions = Arc::new(SessionManager::new(runtime.clone()));
        Self {
            runtime,
            store: KeyShareStore::new(Arc::clone(&sessions)),
            sessions,
            evm: Arc::new(MockEvmProvider::new(ONE_ETH)),
            utxo: Arc::new(MockUtxoProvider::new(&[5_000, 3_000])),
        }
    }

    async fn share(&self) -> Arc<KeyShare> {
        self.store.generate(KeygenScheme::Pairwise2of2).await.unwrap()
    }

    async fn session_for(&self, share: &KeyShare) -> Arc<SigningSession> {
        self.sessions
            .establish(SessionKind::Sign, Some(share.parameters.clone()))
            .await
            .unwrap()
    }

    fn ethereum(&self, share: Arc<KeyShare>, session: Arc<SigningSession>) -> mpc_vault_core::Result<EthereumWallet> {
        EthereumWallet::new(EvmConfig::ethereum_sepolia(), self.evm.clone(), share, session)
    }

    fn bitcoin(&self, share: Arc<KeyShare>, session: Arc<SigningSession>) -> mpc_vault_core::Result<BitcoinWallet> {
        BitcoinWallet::new(BitcoinConfig::testnet(), self.utxo.clone(), share, session)
    }
}

// ============================================================================
// Parameter mismatch
// ============================================================================

#[tokio::test]
async fn invariant_mismatched_parameters_fail_closed() {
    let f = Fixture::new().await;
    let share_a = f.share().await;
    let share_b = f.share().await;
    let session_a = f.session_for(&share_a).await;

    let eth = f.ethereum(Arc::clone(&share_b), Arc::clone(&session_a));
    assert!(matches!(eth, Err(Error::PartiesMismatch { .. })));

    let btc = f.bitcoin(Arc::clone(&share_b), Arc::clone(&session_a));
    assert!(matches!(btc, Err(Error::PartiesMismatch { .. })));

    // Signing directly with the foreign share is refused as well
    let err = session_a.co_sign(&share_b, &[7u8; 32]).await.unwrap_err();
    assert!(matches!(err, Error::PartiesMismatch { .. }));
    assert_eq!(f.runtime.signatures_issued(), 0);
}

#[tokio::test]
async fn invariant_keygen_session_never_yields_wallet() {
    let f = Fixture::new().await;
    let share = f.share().await;
    let keygen = f.sessions.establish(SessionKind::Keygen, None).await.unwrap();

    assert!(matches!(
        f.ethereum(Arc::clone(&share), Arc::clone(&keygen)),
        Err(Error::Signing(SigningError::WrongSessionKind))
    ));
    assert!(matches!(
        f.bitcoin(share, keygen),
        Err(Error::Signing(SigningError::WrongSessionKind))
    ));
}

// ============================================================================
// Closed sessions
// ============================================================================

#[tokio::test]
async fn invariant_closed_session_never_broadcasts() {
    let f = Fixture::new().await;
    let share = f.share().await;
    let session = f.session_for(&share).await;

    let eth = f.ethereum(Arc::clone(&share), Arc::clone(&session)).unwrap();
    let btc = f.bitcoin(Arc::clone(&share), Arc::clone(&session)).unwrap();

    let eth_tx = eth
        .populate_transaction(&TransactionIntent::new(ZERO_ADDRESS, ONE_ETH / 10, FeePolicy::ProviderDefault))
        .await
        .unwrap();
    let btc_tx = btc
        .populate_transaction(&TransactionIntent::new(BTC_RECIPIENT, 800, FeePolicy::PerByte(1)))
        .await
        .unwrap();

    session.close().await.unwrap();

    for err in [
        eth.send_transaction(eth_tx).await.unwrap_err(),
        btc.send_transaction(btc_tx).await.unwrap_err(),
    ] {
        assert!(matches!(
            err,
            Error::Signing(SigningError::SessionNotEstablished(SessionState::Closed))
        ));
        assert!(err.is_pre_broadcast());
    }

    assert_eq!(f.evm.broadcasts(), 0);
    assert_eq!(f.utxo.broadcasts(), 0);
    assert_eq!(f.runtime.signatures_issued(), 0);

    // A closed session cannot back a new wallet either
    assert!(matches!(
        f.ethereum(share, session),
        Err(Error::Signing(SigningError::SessionNotEstablished(SessionState::Closed)))
    ));
}

// ============================================================================
// Address determinism
// ============================================================================

#[tokio::test]
async fn invariant_address_depends_on_key_and_network() {
    let f = Fixture::new().await;
    let share = f.share().await;
    let first = f.session_for(&share).await;
    let second = f.session_for(&share).await;

    let eth_a = f.ethereum(Arc::clone(&share), Arc::clone(&first)).unwrap();
    let eth_b = f.ethereum(Arc::clone(&share), Arc::clone(&second)).unwrap();
    assert_eq!(eth_a.address(), eth_b.address());
    assert_eq!(eth_a.address(), ethereum_address(&share.public_key).unwrap());

    let btc_a = f.bitcoin(Arc::clone(&share), Arc::clone(&first)).unwrap();
    let btc_b = f.bitcoin(Arc::clone(&share), second).unwrap();
    assert_eq!(btc_a.address(), btc_b.address());

    let mainnet = BitcoinWallet::new(BitcoinConfig::mainnet(), f.utxo.clone(), Arc::clone(&share), first).unwrap();
    assert_ne!(mainnet.address(), btc_a.address());
    assert_eq!(
        mainnet.address(),
        bitcoin_address(&share.public_key, BitcoinNetwork::Mainnet).unwrap()
    );
    assert!(mainnet.address().starts_with("bc1q"));

    let other = f.share().await;
    assert_ne!(
        ethereum_address(&other.public_key).unwrap(),
        eth_a.address()
    );
}
