//! # MPC Vault
//!
//! The facade that wires everything together. A vault owns the runtime
//! handle, the key share and the SIGN session, and rebuilds its chain
//! wallets whenever the key share changes:
//!
//! ```text
//! generate_key_share / load_key_share
//!     -> on_key_share_change
//!         -> close old SIGN sessions
//!         -> establish SIGN session for the share's party set
//!         -> construct Ethereum and Bitcoin wallets
//! ```
//!
//! User-triggered actions are guarded by a busy flag: a second action
//! started while one is outstanding fails with [`Error::Busy`]. The flag is
//! a usability guard only. Protocol safety comes from the per-session
//! signing lock.
//!
//! ## Example
//!
//! ```rust,ignore
//! use mpc_vault_core::{KeygenScheme, MpcVault, VaultConfig};
//!
//! let vault = MpcVault::connect(runtime, VaultConfig::default())?;
//! vault.sign_in(&Credentials::password("bob@example.com", "secret")).await?;
//! vault.generate_key_share(KeygenScheme::Pairwise2of2).await?;
//!
//! let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
//! let result = vault.send_ethereum(&policy).await?;
//! vault.shutdown().await?;
//! ```

use crate::chain::{
    BitcoinWallet, ChainWallet, EsploraProvider, EthereumWallet, EvmProvider, JsonRpcProvider,
    TransactionResult, UtxoProvider, Wallet,
};
use crate::config::VaultConfig;
use crate::error::SigningError;
use crate::mpc::{Authenticator, Identity, MpcRuntime};
use crate::orchestrator::{IntentPolicy, TransactionOrchestrator};
use crate::session::{SessionManager, SigningSession};
use crate::storage::KeyShareStore;
use crate::types::Credentials;
use crate::{ChainType, Error, KeyShare, KeygenScheme, Result, SessionKind};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, instrument, warn};

/// Process-wide vault state
pub struct MpcVault {
    config: VaultConfig,
    authenticator: Arc<dyn Authenticator>,
    sessions: Arc<SessionManager>,
    store: KeyShareStore,
    evm_provider: Arc<dyn EvmProvider>,
    utxo_provider: Arc<dyn UtxoProvider>,
    sign_session: RwLock<Option<Arc<SigningSession>>>,
    ethereum: RwLock<Option<EthereumWallet>>,
    bitcoin: RwLock<Option<BitcoinWallet>>,
    orchestrator: TransactionOrchestrator,
    busy: AtomicBool,
    shut_down: AtomicBool,
}

/// Clears the busy flag when the action ends
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::Busy)?;
        Ok(Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MpcVault {
    /// Initialize a vault over a runtime and explicit chain providers
    pub fn init<R>(
        runtime: Arc<R>,
        config: VaultConfig,
        evm_provider: Arc<dyn EvmProvider>,
        utxo_provider: Arc<dyn UtxoProvider>,
    ) -> Result<Self>
    where
        R: MpcRuntime + Authenticator + 'static,
    {
        config.validate()?;

        let mpc_runtime: Arc<dyn MpcRuntime> = runtime.clone();
        let authenticator: Arc<dyn Authenticator> = runtime;
        let sessions = Arc::new(SessionManager::new(mpc_runtime));

        info!(
            chain = %config.evm.chain_id,
            bitcoin = %config.bitcoin.network,
            "Vault initialized"
        );

        Ok(Self {
            store: KeyShareStore::new(Arc::clone(&sessions)),
            config,
            authenticator,
            sessions,
            evm_provider,
            utxo_provider,
            sign_session: RwLock::new(None),
            ethereum: RwLock::new(None),
            bitcoin: RwLock::new(None),
            orchestrator: TransactionOrchestrator::new(),
            busy: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Initialize a vault with JSON-RPC and Esplora providers from the config
    pub fn connect<R>(runtime: Arc<R>, config: VaultConfig) -> Result<Self>
    where
        R: MpcRuntime + Authenticator + 'static,
    {
        let evm_provider = Arc::new(JsonRpcProvider::new(&config.evm)?);
        let utxo_provider = Arc::new(EsploraProvider::new(&config.bitcoin)?);
        Self::init(runtime, config, evm_provider, utxo_provider)
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Sign in with the signing service
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Identity> {
        self.ensure_running()?;
        let identity = self.authenticator.sign_in(credentials).await?;
        info!(account = %identity.account, "Signed in");
        Ok(identity)
    }

    /// Generate a fresh key share and rebuild the wallets around it
    #[instrument(skip(self))]
    pub async fn generate_key_share(&self, scheme: KeygenScheme) -> Result<Arc<KeyShare>> {
        self.ensure_running()?;
        let _guard = BusyGuard::acquire(&self.busy)?;

        let share = self.store.generate(scheme).await?;
        self.rebuild(Arc::clone(&share)).await?;
        Ok(share)
    }

    /// Install a caller-held key share and rebuild the wallets around it
    pub async fn load_key_share(&self, share: KeyShare) -> Result<Arc<KeyShare>> {
        self.ensure_running()?;
        let _guard = BusyGuard::acquire(&self.busy)?;

        let share = self.store.load(share)?;
        self.rebuild(Arc::clone(&share)).await?;
        Ok(share)
    }

    /// Make `share` the current key share, then re-establish the SIGN
    /// session and reconstruct the wallets around it
    pub async fn on_key_share_change(&self, share: Arc<KeyShare>) -> Result<()> {
        self.ensure_running()?;
        let _guard = BusyGuard::acquire(&self.busy)?;

        self.store.install(Arc::clone(&share))?;
        self.rebuild(share).await
    }

    #[instrument(skip(self, share), fields(group = %share.parameters.group_id))]
    async fn rebuild(&self, share: Arc<KeyShare>) -> Result<()> {
        self.drop_wallets();
        if let Err(e) = self.sessions.close_kind(SessionKind::Sign).await {
            warn!(error = %e, "Failed to close previous SIGN session");
        }
        self.sign_session.write().take();

        self.sessions
            .set_default_parameters(Some(share.parameters.clone()));
        let session = self
            .sessions
            .establish(SessionKind::Sign, Some(share.parameters.clone()))
            .await?;
        *self.sign_session.write() = Some(Arc::clone(&session));

        let ethereum = EthereumWallet::new(
            self.config.evm.clone(),
            Arc::clone(&self.evm_provider),
            Arc::clone(&share),
            Arc::clone(&session),
        );
        let bitcoin = BitcoinWallet::new(
            self.config.bitcoin.clone(),
            Arc::clone(&self.utxo_provider),
            Arc::clone(&share),
            session,
        );

        let mut first_error = None;
        match ethereum {
            Ok(wallet) => {
                info!(address = %wallet.address(), chain = %wallet.config().chain_id, "Ethereum wallet ready");
                *self.ethereum.write() = Some(wallet);
            }
            Err(e) => {
                warn!(error = %e, "Ethereum wallet construction failed");
                first_error.get_or_insert(e);
            }
        }
        match bitcoin {
            Ok(wallet) => {
                info!(address = %wallet.address(), network = %wallet.config().network, "Bitcoin wallet ready");
                *self.bitcoin.write() = Some(wallet);
            }
            Err(e) => {
                warn!(error = %e, "Bitcoin wallet construction failed");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// The current key share, if any
    pub fn key_share(&self) -> Option<Arc<KeyShare>> {
        self.store.current()
    }

    /// The current SIGN session, if any
    pub fn sign_session(&self) -> Option<Arc<SigningSession>> {
        self.sign_session.read().clone()
    }

    pub fn ethereum_wallet(&self) -> Option<EthereumWallet> {
        self.ethereum.read().clone()
    }

    pub fn bitcoin_wallet(&self) -> Option<BitcoinWallet> {
        self.bitcoin.read().clone()
    }

    /// The wallet for a chain family, if constructed
    pub fn wallet(&self, chain: ChainType) -> Option<Wallet> {
        match chain {
            ChainType::Evm => self.ethereum_wallet().map(Wallet::from),
            ChainType::Bitcoin => self.bitcoin_wallet().map(Wallet::from),
        }
    }

    /// True while a user-triggered action is running
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Send on the Ethereum wallet according to a policy
    pub async fn send_ethereum(&self, policy: &dyn IntentPolicy) -> Result<TransactionResult> {
        self.send(ChainType::Evm, policy).await
    }

    /// Send on the Bitcoin wallet according to a policy
    pub async fn send_bitcoin(&self, policy: &dyn IntentPolicy) -> Result<TransactionResult> {
        self.send(ChainType::Bitcoin, policy).await
    }

    /// Send on the wallet of a chain family according to a policy
    ///
    /// Fails with `Signing(NoSession)` when no wallet is constructed, in
    /// which case nothing is built or broadcast.
    #[instrument(skip(self, policy))]
    pub async fn send(&self, chain: ChainType, policy: &dyn IntentPolicy) -> Result<TransactionResult> {
        self.ensure_running()?;
        let _guard = BusyGuard::acquire(&self.busy)?;

        let wallet = self
            .wallet(chain)
            .ok_or(Error::Signing(SigningError::NoSession))?;
        self.orchestrator.execute(&wallet, policy).await
    }

    /// Close every session and drop the wallets
    ///
    /// The vault refuses further actions afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.drop_wallets();
        self.sign_session.write().take();
        self.sessions.set_default_parameters(None);
        self.sessions.close_all().await?;

        info!("Vault shut down");
        Ok(())
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn drop_wallets(&self) {
        self.ethereum.write().take();
        self.bitcoin.write().take();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::InvalidConfig("vault has been shut down".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for MpcVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MpcVault")
            .field("key_share", &self.store.current().map(|s| s.public_key_hex()))
            .field("sessions", &self.sessions.active_count())
            .field("ethereum", &self.ethereum.read().is_some())
            .field("bitcoin", &self.bitcoin.read().is_some())
            .field("busy", &self.is_busy())
            .finish()
    }
}
