//! MPC runtime and message transport
//!
//! Two seams live here:
//!
//! - [`MpcRuntime`] and [`Authenticator`] abstract the signing service: the
//!   remote counter-party plus the local cryptographic engine. The vault only
//!   ever talks to these traits.
//! - [`Relay`] abstracts round-based message passing between protocol
//!   participants. [`LocalMpcRuntime`] runs every party in-process over a
//!   [`MemoryRelay`].

use crate::{
    KeyShare, KeygenScheme, PartiesParameters, PartyId, Result, SessionId, SessionKind, Signature,
    types::Credentials,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

pub use async_trait::async_trait;

pub mod local;
pub mod memory;

pub use local::{CounterpartyBehavior, LocalMpcRuntime};
pub use memory::MemoryRelay;

/// Opaque transport handle for a session with the counter-party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHandle {
    /// Connection identifier assigned by the runtime
    pub id: String,
    /// Purpose the connection was opened for
    pub kind: SessionKind,
    /// Party set negotiated during the handshake
    pub parameters: Option<PartiesParameters>,
}

/// Identity established by a successful sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Account the runtime is signed in as
    pub account: String,
}

/// Authentication collaborator
///
/// Sign-in must complete before the runtime will open any connection that
/// needs a counter-party identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Sign in with the given credentials
    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity>;

    /// The current identity, if signed in
    fn identity(&self) -> Option<Identity>;
}

/// Remote signer plus local cryptographic engine
#[async_trait]
pub trait MpcRuntime: Send + Sync {
    /// Perform the transport handshake for a new session
    ///
    /// SIGN connections carry the parties parameters of the key share they
    /// will sign with; KEYGEN connections may omit them.
    async fn establish_connection(
        &self,
        kind: SessionKind,
        parameters: Option<&PartiesParameters>,
    ) -> Result<ConnectionHandle>;

    /// Run distributed key generation over a KEYGEN connection
    async fn generate_key_share(
        &self,
        connection: &ConnectionHandle,
        scheme: KeygenScheme,
    ) -> Result<KeyShare>;

    /// Run the co-signing round for a 32-byte digest over a SIGN connection
    async fn co_sign(
        &self,
        connection: &ConnectionHandle,
        key_share: &KeyShare,
        digest: &[u8; 32],
    ) -> Result<Signature>;

    /// Release the transport handle
    async fn close_connection(&self, connection: &ConnectionHandle) -> Result<()>;
}

/// Message relay trait for MPC communication
///
/// Implementations handle the transport of messages between protocol
/// participants: broadcasts to all parties, point-to-point messages, and
/// collection of messages by round.
#[async_trait]
pub trait Relay: Send + Sync {
    /// Broadcast a message to all parties in the session
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        message: &T,
    ) -> Result<()>;

    /// Send a direct message to a specific party
    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: PartyId,
        message: &T,
    ) -> Result<()>;

    /// Collect `count` broadcast messages for a round
    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
    ) -> Result<Vec<T>>;

    /// Collect `count` direct messages sent to `my_id` for a round
    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        my_id: PartyId,
        count: usize,
    ) -> Result<Vec<T>>;

    /// Drop every message stored for a finished session
    async fn purge(&self, session_id: &SessionId);
}

/// Extension trait for relay with timeout support
#[async_trait]
pub trait RelayExt: Relay {
    /// Collect broadcasts, failing with [`crate::Error::Timeout`] after `timeout`
    async fn collect_broadcasts_with_timeout<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<T>>;

    /// Collect direct messages, failing with [`crate::Error::Timeout`] after `timeout`
    async fn collect_direct_with_timeout<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        my_id: PartyId,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<T>>;
}

#[async_trait]
impl<R: Relay + ?Sized> RelayExt for R {
    async fn collect_broadcasts_with_timeout<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<T>> {
        tokio::time::timeout(timeout, self.collect_broadcasts(session_id, round, count))
            .await
            .map_err(|_| crate::Error::Timeout(format!("round {} broadcasts", round)))?
    }

    async fn collect_direct_with_timeout<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        my_id: PartyId,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<T>> {
        tokio::time::timeout(timeout, self.collect_direct(session_id, round, my_id, count))
            .await
            .map_err(|_| crate::Error::Timeout(format!("round {} direct messages", round)))?
    }
}
