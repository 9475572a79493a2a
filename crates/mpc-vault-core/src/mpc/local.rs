//! In-process MPC runtime
//!
//! [`LocalMpcRuntime`] plays the signing service: it authenticates accounts,
//! hands out connection handles and runs every remote party of the DKG and
//! DSG protocols in spawned tasks over a shared [`MemoryRelay`]. Remote key
//! shares stay inside the runtime, keyed by group ID, so a SIGN handshake
//! for a group it never generated fails like a real service would.
//!
//! [`CounterpartyBehavior`] switches let tests take the counter-party offline
//! or make it refuse to co-sign.

use super::{Authenticator, ConnectionHandle, Identity, MemoryRelay, MpcRuntime, Relay, async_trait};
use crate::error::SigningError;
use crate::keygen::run_dkg;
use crate::sign::run_dsg;
use crate::types::{Credentials, LOCAL_PARTY};
use crate::{
    Error, KeyShare, KeygenScheme, PartiesParameters, Result, SessionConfig, SessionKind,
    Signature,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, instrument, warn};

/// Failure-injection switches for the simulated counter-party
#[derive(Debug)]
pub struct CounterpartyBehavior {
    online: AtomicBool,
    approve_signing: AtomicBool,
}

impl Default for CounterpartyBehavior {
    fn default() -> Self {
        Self {
            online: AtomicBool::new(true),
            approve_signing: AtomicBool::new(true),
        }
    }
}

impl CounterpartyBehavior {
    /// Make the counter-party reachable or unreachable
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make the counter-party approve or refuse co-signing requests
    pub fn set_approve_signing(&self, approve: bool) {
        self.approve_signing.store(approve, Ordering::SeqCst);
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn approves_signing(&self) -> bool {
        self.approve_signing.load(Ordering::SeqCst)
    }
}

/// Signing service simulated in-process
///
/// The counter-party keeps the shares of every group it generated, not just
/// the latest one, so a key share reloaded or switched back to later can
/// still co-sign. Retained groups live as long as the runtime.
pub struct LocalMpcRuntime {
    relay: MemoryRelay,
    accounts: DashMap<String, String>,
    identity: RwLock<Option<Identity>>,
    connections: DashMap<String, ConnectionHandle>,
    /// Counter-party shares by group ID, never evicted
    remote_shares: DashMap<String, Vec<KeyShare>>,
    behavior: Arc<CounterpartyBehavior>,
    timeout_secs: u64,
    signatures: AtomicUsize,
}

impl LocalMpcRuntime {
    pub fn new() -> Self {
        Self {
            relay: MemoryRelay::new(),
            accounts: DashMap::new(),
            identity: RwLock::new(None),
            connections: DashMap::new(),
            remote_shares: DashMap::new(),
            behavior: Arc::new(CounterpartyBehavior::default()),
            timeout_secs: 30,
            signatures: AtomicUsize::new(0),
        }
    }

    /// Register an account that may sign in
    pub fn with_account(self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.accounts.insert(email.into(), password.into());
        self
    }

    /// Protocol round timeout
    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Shared failure-injection switches
    pub fn behavior(&self) -> Arc<CounterpartyBehavior> {
        Arc::clone(&self.behavior)
    }

    /// Number of open connection handles
    pub fn open_connections(&self) -> usize {
        self.connections.len()
    }

    /// Number of key groups the counter-party holds shares for
    pub fn key_groups(&self) -> usize {
        self.remote_shares.len()
    }

    /// Number of co-signatures produced
    pub fn signatures_issued(&self) -> usize {
        self.signatures.load(Ordering::SeqCst)
    }

    fn protocol_config(
        &self,
        session_id: [u8; 32],
        party_id: usize,
        parameters: &PartiesParameters,
    ) -> Result<SessionConfig> {
        let mut config = SessionConfig::new(session_id, party_id, parameters.clone())?;
        config.timeout_secs = self.timeout_secs;
        Ok(config)
    }

    fn connection(&self, handle: &ConnectionHandle) -> Option<ConnectionHandle> {
        self.connections.get(&handle.id).map(|c| c.value().clone())
    }
}

impl Default for LocalMpcRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Authenticator for LocalMpcRuntime {
    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity> {
        let valid = self
            .accounts
            .get(&credentials.email)
            .is_some_and(|password| *password == credentials.password);
        if !valid {
            warn!(account = %credentials.email, "Sign-in rejected");
            return Err(Error::Auth(format!(
                "invalid credentials for {}",
                credentials.email
            )));
        }

        let identity = Identity {
            account: credentials.email.clone(),
        };
        *self.identity.write() = Some(identity.clone());
        info!(account = %identity.account, "Signed in");
        Ok(identity)
    }

    fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }
}

#[async_trait]
impl MpcRuntime for LocalMpcRuntime {
    async fn establish_connection(
        &self,
        kind: SessionKind,
        parameters: Option<&PartiesParameters>,
    ) -> Result<ConnectionHandle> {
        if self.identity().is_none() {
            return Err(Error::Auth("sign-in required before connecting".into()));
        }
        if !self.behavior.is_online() {
            return Err(Error::SessionEstablishment(
                "counter-party unreachable".into(),
            ));
        }
        if kind == SessionKind::Sign {
            let params = parameters.ok_or_else(|| {
                Error::SessionEstablishment("SIGN handshake without parties parameters".into())
            })?;
            if !self.remote_shares.contains_key(&params.group_id) {
                return Err(Error::SessionEstablishment(format!(
                    "counter-party holds no share for group {}",
                    params.group_id
                )));
            }
        }

        let handle = ConnectionHandle {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            parameters: parameters.cloned(),
        };
        self.connections.insert(handle.id.clone(), handle.clone());
        debug!(connection = %handle.id, %kind, "Connection opened");
        Ok(handle)
    }

    #[instrument(skip(self, connection), fields(connection = %connection.id))]
    async fn generate_key_share(
        &self,
        connection: &ConnectionHandle,
        scheme: KeygenScheme,
    ) -> Result<KeyShare> {
        let connection = self
            .connection(connection)
            .ok_or_else(|| Error::KeyGeneration("unknown connection".into()))?;
        if connection.kind != SessionKind::Keygen {
            return Err(Error::KeyGeneration(format!(
                "connection opened for {}",
                connection.kind
            )));
        }
        if !self.behavior.is_online() {
            return Err(Error::KeyGeneration("counter-party unreachable".into()));
        }

        let parameters = scheme.parameters()?;
        let session_id: [u8; 32] = rand::random();

        let mut handles = Vec::with_capacity(parameters.parties.len());
        for party_id in &parameters.parties {
            let config = self.protocol_config(session_id, *party_id, &parameters)?;
            let relay = self.relay.clone();
            handles.push(tokio::spawn(async move {
                run_dkg(&config, scheme, &relay).await
            }));
        }

        let mut local = None;
        let mut remote = Vec::new();
        let mut failure = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(result)) if result.share.party_id == LOCAL_PARTY => {
                    local = Some(result.share)
                }
                Ok(Ok(result)) => remote.push(result.share),
                Ok(Err(e)) => {
                    failure.get_or_insert(e.to_string());
                }
                Err(e) => {
                    failure.get_or_insert(e.to_string());
                }
            }
        }
        self.relay.purge(&session_id).await;

        if let Some(reason) = failure {
            return Err(Error::KeyGeneration(reason));
        }
        let local = local.ok_or_else(|| Error::KeyGeneration("no local share produced".into()))?;

        self.remote_shares
            .insert(parameters.group_id.clone(), remote);
        info!(group = %parameters.group_id, %scheme, "Key share generated");
        Ok(local)
    }

    #[instrument(skip(self, connection, key_share, digest), fields(connection = %connection.id))]
    async fn co_sign(
        &self,
        connection: &ConnectionHandle,
        key_share: &KeyShare,
        digest: &[u8; 32],
    ) -> Result<Signature> {
        let connection = self
            .connection(connection)
            .ok_or(Error::Signing(SigningError::NoSession))?;
        if connection.kind != SessionKind::Sign {
            return Err(SigningError::WrongSessionKind.into());
        }
        if connection.parameters.as_ref() != Some(&key_share.parameters) {
            return Err(Error::PartiesMismatch {
                key_share: key_share.parameters.group_id.clone(),
                session: connection
                    .parameters
                    .as_ref()
                    .map(|p| p.group_id.clone())
                    .unwrap_or_default(),
            });
        }
        if !self.behavior.is_online() {
            return Err(SigningError::Protocol("counter-party unreachable".into()).into());
        }
        if !self.behavior.approves_signing() {
            return Err(SigningError::Rejected("counter-party declined to co-sign".into()).into());
        }

        let remote = self
            .remote_shares
            .get(&key_share.parameters.group_id)
            .map(|shares| shares.value().clone())
            .ok_or_else(|| SigningError::Rejected("unknown key group".into()))?;

        let session_id: [u8; 32] = rand::random();
        let mut handles = Vec::with_capacity(remote.len());
        for share in remote {
            let config = self.protocol_config(session_id, share.party_id, &share.parameters)?;
            let relay = self.relay.clone();
            let digest = *digest;
            handles.push(tokio::spawn(async move {
                run_dsg(&config, &share, &digest, &relay).await
            }));
        }

        let config = self.protocol_config(session_id, key_share.party_id, &key_share.parameters)?;
        let result = run_dsg(&config, key_share, digest, &self.relay).await;

        for handle in handles {
            match handle.await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Remote party failed to co-sign"),
                Err(e) => warn!(error = %e, "Remote party task failed"),
            }
        }
        self.relay.purge(&session_id).await;

        let signature = result?;
        self.signatures.fetch_add(1, Ordering::SeqCst);
        Ok(signature)
    }

    async fn close_connection(&self, connection: &ConnectionHandle) -> Result<()> {
        if self.connections.remove(&connection.id).is_some() {
            debug!(connection = %connection.id, "Connection closed");
        }
        Ok(())
    }
}
