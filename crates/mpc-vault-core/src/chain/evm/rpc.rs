//! JSON-RPC transport with endpoint failover

use crate::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<NodeError>,
}

#[derive(Debug, Deserialize)]
struct NodeError {
    code: i64,
    message: String,
}

/// Why one endpoint failed a call
#[derive(Debug)]
enum Failure {
    /// Endpoint unreachable or the reply unreadable; try the next one
    Transport(String),
    /// The node answered with an error object
    Node(NodeError),
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Transport(msg) => f.write_str(msg),
            Failure::Node(e) => write!(f, "RPC error {}: {}", e.code, e.message),
        }
    }
}

impl From<Failure> for Error {
    fn from(failure: Failure) -> Self {
        Error::Provider(failure.to_string())
    }
}

/// HTTP JSON-RPC client over an ordered list of endpoints
///
/// Calls stick to the endpoint that last answered and move to the next one
/// on transport failures.
#[derive(Clone)]
pub struct RpcClient {
    urls: Arc<[String]>,
    client: reqwest::Client,
    preferred: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

impl RpcClient {
    pub fn new(urls: Vec<String>) -> Result<Self> {
        if urls.iter().all(|url| url.trim().is_empty()) {
            return Err(Error::InvalidConfig("at least one RPC URL is required".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            urls: urls.into(),
            client,
            preferred: Arc::new(AtomicUsize::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Call `method`, trying each endpoint at most once
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let start = self.preferred.load(Ordering::Relaxed);
        let mut last = None;

        for offset in 0..self.urls.len() {
            let index = (start + offset) % self.urls.len();
            let url = &self.urls[index];

            match self.call(url, method, &params).await {
                Ok(value) => {
                    self.preferred.store(index, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(e @ Failure::Node(_)) => return Err(e.into()),
                Err(e) => {
                    warn!(%url, method, error = %e, "RPC endpoint failed");
                    last = Some(e);
                }
            }
        }

        Err(last.map_or_else(
            || Error::Provider("no RPC endpoint answered".into()),
            Error::from,
        ))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: &Value,
    ) -> std::result::Result<T, Failure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(%url, method, id, "RPC call");

        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let envelope: Envelope = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Failure::Transport(format!("{method} request failed: {e}")))?
            .json()
            .await
            .map_err(|e| Failure::Transport(format!("unreadable {method} response: {e}")))?;

        if let Some(error) = envelope.error {
            return Err(Failure::Node(error));
        }
        let result = envelope
            .result
            .ok_or_else(|| Failure::Transport(format!("{method} response has no result")))?;

        serde_json::from_value(result)
            .map_err(|e| Failure::Transport(format!("unexpected {method} result: {e}")))
    }
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("urls", &self.urls)
            .field("preferred", &self.preferred.load(Ordering::Relaxed))
            .finish()
    }
}
