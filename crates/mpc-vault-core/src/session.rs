//! Signing sessions with the counter-party signer
//!
//! A [`SigningSession`] is one logical channel to the signing service, opened
//! for a single purpose ([`SessionKind`]) and a fixed party set. Sessions move
//! through a one-way state machine:
//!
//! ```text
//! Uninitialized -> Connecting -> Established -> Closed
//!                       \______________________/
//!                        handshake failure
//! ```
//!
//! Co-signing requests on one session are serialized by an async mutex, so a
//! session never runs two signing rounds at once.

use crate::mpc::{ConnectionHandle, MpcRuntime};
use crate::{Error, KeyShare, KeygenScheme, PartiesParameters, Result, SessionKind, Signature};
use crate::error::SigningError;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Lifecycle state of a signing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created, handshake not started
    Uninitialized,
    /// Handshake in flight
    Connecting,
    /// Usable for protocol rounds
    Established,
    /// Terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "uninitialized"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Established => write!(f, "established"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// A logical session with the counter-party signer
pub struct SigningSession {
    id: String,
    kind: SessionKind,
    parameters: Option<PartiesParameters>,
    state: RwLock<SessionState>,
    connection: RwLock<Option<ConnectionHandle>>,
    runtime: Arc<dyn MpcRuntime>,
    sign_lock: tokio::sync::Mutex<()>,
}

impl SigningSession {
    /// Create an uninitialized session
    pub fn new(
        kind: SessionKind,
        parameters: Option<PartiesParameters>,
        runtime: Arc<dyn MpcRuntime>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            parameters,
            state: RwLock::new(SessionState::Uninitialized),
            connection: RwLock::new(None),
            runtime,
            sign_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn parameters(&self) -> Option<&PartiesParameters> {
        self.parameters.as_ref()
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_established(&self) -> bool {
        self.state() == SessionState::Established
    }

    /// Perform the transport handshake
    ///
    /// Only valid from `Uninitialized`. A failed handshake leaves the session
    /// `Closed`; callers open a new session to retry.
    #[instrument(skip(self), fields(session = %self.id, kind = %self.kind))]
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            if *state != SessionState::Uninitialized {
                return Err(Error::SessionEstablishment(format!(
                    "session is {}, expected uninitialized",
                    *state
                )));
            }
            *state = SessionState::Connecting;
        }

        match self
            .runtime
            .establish_connection(self.kind, self.parameters.as_ref())
            .await
        {
            Ok(handle) => {
                *self.connection.write() = Some(handle);
                *self.state.write() = SessionState::Established;
                info!("Session established");
                Ok(())
            }
            Err(e) => {
                *self.state.write() = SessionState::Closed;
                warn!(error = %e, "Session handshake failed");
                Err(match e {
                    Error::Auth(_) | Error::SessionEstablishment(_) => e,
                    other => Error::SessionEstablishment(other.to_string()),
                })
            }
        }
    }

    /// Close the session and release its transport handle
    ///
    /// Closing is idempotent. The session is `Closed` afterwards even if the
    /// runtime fails to release the handle.
    pub async fn close(&self) -> Result<()> {
        let previous = std::mem::replace(&mut *self.state.write(), SessionState::Closed);
        let handle = self.connection.write().take();

        if let Some(handle) = handle {
            debug!(session = %self.id, ?previous, "Closing session");
            self.runtime.close_connection(&handle).await?;
        }
        Ok(())
    }

    /// Check that this session can sign for `key_share`
    ///
    /// Wallets call this at construction so that a mismatched or unusable
    /// session never yields a wallet.
    pub fn ensure_signing_for(&self, key_share: &KeyShare) -> Result<()> {
        if self.kind != SessionKind::Sign {
            return Err(SigningError::WrongSessionKind.into());
        }
        let state = self.state();
        if state != SessionState::Established {
            return Err(SigningError::SessionNotEstablished(state).into());
        }
        self.check_parameters(key_share)
    }

    fn check_parameters(&self, key_share: &KeyShare) -> Result<()> {
        match &self.parameters {
            Some(params) if *params == key_share.parameters => Ok(()),
            Some(params) => Err(Error::PartiesMismatch {
                key_share: key_share.parameters.group_id.clone(),
                session: params.group_id.clone(),
            }),
            None => Err(Error::PartiesMismatch {
                key_share: key_share.parameters.group_id.clone(),
                session: "<none>".into(),
            }),
        }
    }

    fn handle(&self) -> Result<ConnectionHandle> {
        let state = self.state();
        if state != SessionState::Established {
            return Err(SigningError::SessionNotEstablished(state).into());
        }
        self.connection
            .read()
            .clone()
            .ok_or_else(|| SigningError::SessionNotEstablished(state).into())
    }

    /// Run key generation over this KEYGEN session
    #[instrument(skip(self), fields(session = %self.id))]
    pub async fn generate_key_share(&self, scheme: KeygenScheme) -> Result<KeyShare> {
        if self.kind != SessionKind::Keygen {
            return Err(Error::KeyGeneration(format!(
                "session {} was opened for {}",
                self.id, self.kind
            )));
        }
        let handle = self
            .handle()
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;

        self.runtime
            .generate_key_share(&handle, scheme)
            .await
            .map_err(|e| match e {
                Error::KeyGeneration(_) | Error::Auth(_) => e,
                other => Error::KeyGeneration(other.to_string()),
            })
    }

    /// Request the counter-party's co-signature over a 32-byte digest
    ///
    /// Requests on one session are queued; each one re-checks the state
    /// after acquiring the lock, so a session closed while a request waited
    /// fails with [`SigningError::SessionNotEstablished`].
    #[instrument(skip(self, key_share, digest), fields(session = %self.id))]
    pub async fn co_sign(&self, key_share: &KeyShare, digest: &[u8; 32]) -> Result<Signature> {
        if self.kind != SessionKind::Sign {
            return Err(SigningError::WrongSessionKind.into());
        }

        let _guard = self.sign_lock.lock().await;

        let handle = self.handle()?;
        self.check_parameters(key_share)?;

        debug!(digest = hex::encode(digest), "Requesting co-signature");

        self.runtime
            .co_sign(&handle, key_share, digest)
            .await
            .map_err(|e| match e {
                Error::Signing(_) | Error::PartiesMismatch { .. } => e,
                other => SigningError::Protocol(other.to_string()).into(),
            })
    }
}

impl fmt::Debug for SigningSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field(
                "group",
                &self.parameters.as_ref().map(|p| p.group_id.as_str()),
            )
            .finish()
    }
}

/// Opens and tracks sessions with the counter-party signer
pub struct SessionManager {
    runtime: Arc<dyn MpcRuntime>,
    sessions: DashMap<String, Arc<SigningSession>>,
    default_parameters: RwLock<Option<PartiesParameters>>,
}

impl SessionManager {
    pub fn new(runtime: Arc<dyn MpcRuntime>) -> Self {
        Self {
            runtime,
            sessions: DashMap::new(),
            default_parameters: RwLock::new(None),
        }
    }

    /// Parameters used by `establish` for SIGN sessions when none are given
    pub fn set_default_parameters(&self, parameters: Option<PartiesParameters>) {
        *self.default_parameters.write() = parameters;
    }

    /// Open a session and perform its handshake
    ///
    /// SIGN sessions need parties parameters, explicit or the default.
    /// Sessions whose handshake fails are returned to nobody and not tracked.
    pub async fn establish(
        &self,
        kind: SessionKind,
        parameters: Option<PartiesParameters>,
    ) -> Result<Arc<SigningSession>> {
        let parameters = match kind {
            SessionKind::Sign => parameters.or_else(|| self.default_parameters.read().clone()),
            SessionKind::Keygen => parameters,
        };

        if let Some(params) = &parameters {
            params
                .validate()
                .map_err(|e| Error::SessionEstablishment(e.to_string()))?;
        } else if kind == SessionKind::Sign {
            return Err(Error::SessionEstablishment(
                "SIGN sessions need parties parameters".into(),
            ));
        }

        let session = Arc::new(SigningSession::new(
            kind,
            parameters,
            Arc::clone(&self.runtime),
        ));
        session.connect().await?;

        self.sessions
            .insert(session.id().to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Close and forget one session
    pub async fn close(&self, id: &str) -> Result<()> {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.close().await?;
        }
        Ok(())
    }

    /// Close every tracked session of one kind
    pub async fn close_kind(&self, kind: SessionKind) -> Result<()> {
        let ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().kind() == kind)
            .map(|entry| entry.key().clone())
            .collect();
        self.close_ids(ids).await
    }

    /// Close every tracked session
    pub async fn close_all(&self) -> Result<()> {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        self.close_ids(ids).await
    }

    async fn close_ids(&self, ids: Vec<String>) -> Result<()> {
        let mut first_error = None;
        for id in ids {
            if let Err(e) = self.close(&id).await {
                warn!(session = %id, error = %e, "Failed to close session");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Number of tracked sessions
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}
