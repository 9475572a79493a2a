//! In-memory relay used by the local runtime and tests

use super::{Relay, async_trait};
use crate::{Error, PartyId, Result, SessionId};
use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Mailbox key: broadcasts use `to = None`
type MailboxKey = (SessionId, u32, Option<PartyId>);

/// In-memory message relay
///
/// Messages are stored serialized, exactly as a network transport would carry
/// them, and waiters are woken through a shared [`Notify`]. Clones share the
/// same mailboxes.
#[derive(Debug, Clone)]
pub struct MemoryRelay {
    mailboxes: Arc<DashMap<MailboxKey, Vec<Vec<u8>>>>,
    notify: Arc<Notify>,
    timeout: Duration,
}

impl MemoryRelay {
    /// Create a relay with a 30 second collection timeout
    pub fn new() -> Self {
        Self::with_timeout(30_000)
    }

    /// Create a relay with a custom collection timeout
    pub fn with_timeout(timeout_ms: u64) -> Self {
        Self {
            mailboxes: Arc::new(DashMap::new()),
            notify: Arc::new(Notify::new()),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Number of messages waiting in a mailbox
    pub fn pending(&self, session_id: &SessionId, round: u32, to: Option<PartyId>) -> usize {
        self.mailboxes
            .get(&(*session_id, round, to))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Number of sessions with stored messages
    pub fn session_count(&self) -> usize {
        let mut sessions: Vec<SessionId> = self.mailboxes.iter().map(|e| e.key().0).collect();
        sessions.sort();
        sessions.dedup();
        sessions.len()
    }

    fn deliver(&self, key: MailboxKey, bytes: Vec<u8>) {
        self.mailboxes.entry(key).or_default().push(bytes);
        self.notify.notify_waiters();
    }

    async fn collect<T: DeserializeOwned>(&self, key: MailboxKey, count: usize) -> Result<Vec<T>> {
        let deadline = Instant::now() + self.timeout;

        loop {
            // Register interest before checking so a concurrent delivery is not missed
            let notified = self.notify.notified();

            if let Some(messages) = self.mailboxes.get(&key)
                && messages.len() >= count
            {
                return messages
                    .iter()
                    .take(count)
                    .map(|bytes| {
                        serde_json::from_slice(bytes)
                            .map_err(|e| Error::Deserialization(e.to_string()))
                    })
                    .collect();
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                let target = match key.2 {
                    Some(party) => format!("party {}", party),
                    None => "broadcast".to_string(),
                };
                return Err(Error::Timeout(format!(
                    "{} messages for {} in round {}",
                    count, target, key.1
                )));
            }

            let _ = tokio::time::timeout(remaining, notified).await;
        }
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

#[async_trait]
impl Relay for MemoryRelay {
    async fn broadcast<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        message: &T,
    ) -> Result<()> {
        self.deliver((*session_id, round, None), serialize(message)?);
        Ok(())
    }

    async fn send_direct<T: Serialize + Send + Sync>(
        &self,
        session_id: &SessionId,
        round: u32,
        to: PartyId,
        message: &T,
    ) -> Result<()> {
        self.deliver((*session_id, round, Some(to)), serialize(message)?);
        Ok(())
    }

    async fn collect_broadcasts<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        count: usize,
    ) -> Result<Vec<T>> {
        self.collect((*session_id, round, None), count).await
    }

    async fn collect_direct<T: DeserializeOwned + Send>(
        &self,
        session_id: &SessionId,
        round: u32,
        my_id: PartyId,
        count: usize,
    ) -> Result<Vec<T>> {
        self.collect((*session_id, round, Some(my_id)), count).await
    }

    async fn purge(&self, session_id: &SessionId) {
        self.mailboxes.retain(|key, _| key.0 != *session_id);
    }
}
