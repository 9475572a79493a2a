//! Key share holder
//!
//! The vault keeps exactly one key share at a time. It is produced by
//! [`KeyShareStore::generate`] over a transient KEYGEN session, or installed
//! from a caller-held copy with [`KeyShareStore::load`]. Nothing is written
//! to disk: the share is serde-serializable and persisting it is up to the
//! caller.

use crate::session::SessionManager;
use crate::{Error, KeyShare, KeygenScheme, Result, SessionKind};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Holds the local party's key share
#[derive(Debug)]
pub struct KeyShareStore {
    sessions: Arc<SessionManager>,
    share: RwLock<Option<Arc<KeyShare>>>,
}

impl KeyShareStore {
    pub fn new(sessions: Arc<SessionManager>) -> Self {
        Self {
            sessions,
            share: RwLock::new(None),
        }
    }

    /// Generate a fresh key share with the counter-party
    ///
    /// Opens a KEYGEN session, runs the protocol and closes the session
    /// whatever the outcome. Every call yields an independent share with
    /// its own public key and party-set parameters.
    #[instrument(skip(self))]
    pub async fn generate(&self, scheme: KeygenScheme) -> Result<Arc<KeyShare>> {
        let session = self
            .sessions
            .establish(SessionKind::Keygen, None)
            .await
            .map_err(|e| match e {
                Error::Auth(_) => e,
                other => Error::KeyGeneration(other.to_string()),
            })?;

        let generated = session.generate_key_share(scheme).await;

        if let Err(e) = self.sessions.close(session.id()).await {
            warn!(error = %e, "Failed to close KEYGEN session");
        }

        let share = Arc::new(generated?);
        info!(
            public_key = %share.public_key_hex(),
            group = %share.parameters.group_id,
            "Stored generated key share"
        );
        *self.share.write() = Some(Arc::clone(&share));
        Ok(share)
    }

    /// Install a key share obtained elsewhere
    pub fn load(&self, share: KeyShare) -> Result<Arc<KeyShare>> {
        let share = Arc::new(share);
        self.install(Arc::clone(&share))?;
        Ok(share)
    }

    /// Validate a shared key share and make it the current one
    pub fn install(&self, share: Arc<KeyShare>) -> Result<()> {
        share.parameters.validate()?;
        share.public_key_point()?;
        if share.party_id != share.parameters.local_party {
            return Err(Error::InvalidPartyId(share.party_id));
        }

        *self.share.write() = Some(share);
        Ok(())
    }

    /// The current key share, if any
    pub fn current(&self) -> Option<Arc<KeyShare>> {
        self.share.read().clone()
    }

    /// Discard the current key share
    pub fn clear(&self) {
        self.share.write().take();
    }
}
