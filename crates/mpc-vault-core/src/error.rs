//! Error types for MPC vault operations

use crate::session::SessionState;
use thiserror::Error;

/// Result type alias for MPC vault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during MPC vault operations
#[derive(Debug, Error)]
pub enum Error {
    // ============ Lifecycle Errors ============
    /// Authentication with the signing service failed or is missing
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Key generation did not complete
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Handshake with the counter-party signer failed
    #[error("Session establishment failed: {0}")]
    SessionEstablishment(String),

    /// Key share and session were created for different party sets
    #[error("Parties parameters mismatch: key share group {key_share}, session group {session}")]
    PartiesMismatch { key_share: String, session: String },

    /// Another user-triggered action is still running
    #[error("Another operation is in progress")]
    Busy,

    // ============ Transaction Errors ============
    /// Transaction could not be built from the intent
    #[error("Transaction build failed: {0}")]
    TransactionBuild(#[from] TxBuildError),

    /// Signing did not produce a signature
    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    /// The network rejected the signed transaction
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    // ============ Configuration Errors ============
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid party ID
    #[error("Invalid party ID: {0}")]
    InvalidPartyId(usize),

    // ============ Cryptographic Errors ============
    /// Message verification failed
    #[error("Message verification failed: {0}")]
    VerificationFailed(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    // ============ Serialization Errors ============
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ============ Network/Protocol Errors ============
    /// Chain provider request failed
    #[error("Provider error: {0}")]
    Provider(String),

    /// Relay transport error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Timeout waiting for message
    #[error("Timeout waiting for {0}")]
    Timeout(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a transaction intent cannot be turned into an unsigned transaction
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TxBuildError {
    /// Recipient is empty, malformed or on another network
    #[error("invalid recipient {address}: {reason}")]
    InvalidRecipient { address: String, reason: String },

    /// Value outside the chain's representable range
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Fee policy not usable on this chain
    #[error("invalid fee policy: {0}")]
    InvalidFeePolicy(String),

    /// Balance does not cover value plus fee
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u128, available: u128 },

    /// The wallet owns no unspent outputs
    #[error("no spendable inputs for {0}")]
    NoSpendableInputs(String),
}

/// Reasons the co-signing round did not produce a signature
#[derive(Debug, Error)]
pub enum SigningError {
    /// No signing session exists for the wallet
    #[error("no signing session established")]
    NoSession,

    /// Session exists but is not usable for signing
    #[error("session is {0}, expected established")]
    SessionNotEstablished(SessionState),

    /// Session was opened for key generation
    #[error("session was opened for key generation, not signing")]
    WrongSessionKind,

    /// The counter-party declined to co-sign
    #[error("counter-party rejected the request: {0}")]
    Rejected(String),

    /// The protocol aborted
    #[error("protocol failure: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Deserialization(e.to_string())
    }
}

impl Error {
    /// True when the failure happened before anything reached the network
    pub fn is_pre_broadcast(&self) -> bool {
        !matches!(self, Error::Broadcast(_))
    }
}
