//! # MPC Vault Core
//!
//! Client-side orchestration for two-party (or N-of-N) threshold ECDSA
//! wallets on secp256k1.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Key Share Store**: holds the local party's share, generated with the
//!   counter-party or loaded from a caller-held copy
//! - **Signing Sessions**: KEYGEN and SIGN sessions with a one-way state
//!   machine and per-session serialization of signing requests
//! - **Chain Wallets**: Ethereum (EIP-1559 and legacy) and Bitcoin (native
//!   segwit) wallets bound to a key share and an established SIGN session
//! - **Intent Policies**: pure rules that turn wallet state into
//!   transaction intents
//! - **Vault Facade**: explicit init and shutdown, sign-in, key share
//!   changes and the transaction entry points
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mpc_vault_core::{KeygenScheme, MpcVault, VaultConfig};
//! use mpc_vault_core::chain::{FeePolicy, evm::ZERO_ADDRESS};
//! use mpc_vault_core::mpc::LocalMpcRuntime;
//! use mpc_vault_core::orchestrator::{FixedAmount, FractionOfBalance};
//!
//! let runtime = Arc::new(LocalMpcRuntime::new().with_account("bob@example.com", "secret"));
//! let vault = MpcVault::connect(runtime, VaultConfig::default())?;
//!
//! vault.sign_in(&Credentials::password("bob@example.com", "secret")).await?;
//! vault.generate_key_share(KeygenScheme::Pairwise2of2).await?;
//!
//! // Send a tenth of the balance to the zero address
//! let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
//! let result = vault.send_ethereum(&policy).await?;
//!
//! // Send 800 sat at 1 sat/vB
//! let policy = FixedAmount::new("tb1q...", 800, FeePolicy::PerByte(1));
//! let result = vault.send_bitcoin(&policy).await?;
//!
//! vault.shutdown().await?;
//! ```
//!
//! ## Security Model
//!
//! Key generation never assembles the private key: each party only holds
//! its own share. Signing is weaker. Round 2 of the co-signing protocol
//! broadcasts Lagrange-weighted shares, so any party that sees every
//! round 2 message can sum them into the key. The in-process co-signer of
//! [`mpc::LocalMpcRuntime`] is therefore a simulation of a remote
//! counter-party and not a key-isolation boundary.
//!
//! Every signature still needs the counter-party's cooperation over an
//! established SIGN session, and a wallet can only be built from a session
//! opened for the same party set as its key share.

pub mod chain;
pub mod config;
pub mod error;
pub mod keygen;
pub mod mpc;
pub mod orchestrator;
pub mod session;
pub mod sign;
pub mod storage;
pub mod types;
pub mod vault;

pub use error::{Error, Result, SigningError, TxBuildError};
pub use config::{SessionSettings, VaultConfig};
pub use orchestrator::{FixedAmount, FractionOfBalance, IntentPolicy, TransactionOrchestrator, WalletSnapshot};
pub use session::{SessionManager, SessionState, SigningSession};
pub use storage::KeyShareStore;
pub use types::{
    ChainType, Credentials, KeyShare, KeyShareMetadata, KeygenScheme, LOCAL_PARTY,
    PartiesParameters, PartyId, SessionConfig, SessionId, SessionKind, Signature,
    keccak256_hash,
};
pub use vault::MpcVault;

pub use chain::{
    Balance, ChainId, ChainWallet, FeePolicy, TransactionIntent, TransactionResult,
    UnsignedTransaction, Wallet,
};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
