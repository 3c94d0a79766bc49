// src/correlator.rs
// DApp-only pending-request table: id generation, resolve/reject,
// timeout sweep, and global cancellation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::{oneshot, Mutex};

use crate::error::PhoenixError;
use crate::model::{OperationType, SignResponse};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SWEEP_INTERVAL: Duration = Duration::from_millis(250);

struct PendingEntry {
    #[allow(dead_code)]
    kind: OperationType,
    deadline: Instant,
    waiter: Option<oneshot::Sender<std::result::Result<SignResponse, PhoenixError>>>,
}

/// Generates request ids of the form `"{prefix}-{unix_ms}-{suffix}"`.
pub fn generate_request_id(kind: OperationType) -> String {
    let prefix = kind.id_prefix();
    let unix_ms = chrono::Utc::now().timestamp_millis();
    let suffix: String = {
        let mut rng = rand::thread_rng();
        (0..6)
            .map(|_| {
                let n = rng.gen_range(0..36);
                std::char::from_digit(n, 36).unwrap()
            })
            .collect()
    };
    format!("{prefix}-{unix_ms}-{suffix}")
}

/// Table of outstanding request ids awaiting a response, with a
/// per-request timeout and a background sweep task.
pub struct RequestCorrelator {
    pending: Arc<Mutex<HashMap<String, PendingEntry>>>,
    timeout: Duration,
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let correlator = RequestCorrelator {
            pending: Arc::new(Mutex::new(HashMap::new())),
            timeout,
        };
        correlator.spawn_sweeper();
        correlator
    }

    fn spawn_sweeper(&self) {
        let pending = Arc::clone(&self.pending);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(SWEEP_INTERVAL).await;
                let now = Instant::now();
                let mut table = pending.lock().await;
                let expired: Vec<String> = table
                    .iter()
                    .filter(|(_, entry)| entry.deadline <= now)
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in expired {
                    if let Some(mut entry) = table.remove(&id) {
                        if let Some(waiter) = entry.waiter.take() {
                            let _ = waiter.send(Err(PhoenixError::RequestTimeout));
                        }
                        tracing::warn!(request_id = %id, "request timed out");
                    }
                }
            }
        });
    }

    /// Inserts a new pending entry and returns a future resolved by
    /// `resolve`/`reject`/timeout/`clear_all`. Fails with
    /// `DuplicateRequestId` if `id` is already present.
    pub async fn add(
        &self,
        id: String,
        kind: OperationType,
    ) -> crate::error::Result<oneshot::Receiver<std::result::Result<SignResponse, PhoenixError>>> {
        let mut table = self.pending.lock().await;
        if table.contains_key(&id) {
            return Err(PhoenixError::DuplicateRequestId(id));
        }
        let (tx, rx) = oneshot::channel();
        table.insert(
            id,
            PendingEntry {
                kind,
                deadline: Instant::now() + self.timeout,
                waiter: Some(tx),
            },
        );
        Ok(rx)
    }

    /// Removes `id` and resolves its waiter. No-op if absent (late or
    /// unknown responses are ignored silently).
    pub async fn resolve(&self, id: &str, response: SignResponse) {
        let mut table = self.pending.lock().await;
        if let Some(mut entry) = table.remove(id) {
            if let Some(waiter) = entry.waiter.take() {
                let _ = waiter.send(Ok(response));
            }
        }
    }

    /// Removes `id` and rejects its waiter with `error`. No-op if absent.
    pub async fn reject(&self, id: &str, error: PhoenixError) {
        let mut table = self.pending.lock().await;
        if let Some(mut entry) = table.remove(id) {
            if let Some(waiter) = entry.waiter.take() {
                let _ = waiter.send(Err(error));
            }
        }
    }

    /// Rejects every pending entry with `error` — used on session
    /// teardown (`disconnect()`).
    pub async fn clear_all(&self, error: PhoenixError) {
        let mut table = self.pending.lock().await;
        for (_, mut entry) in table.drain() {
            if let Some(waiter) = entry.waiter.take() {
                let _ = waiter.send(Err(error.clone()));
            }
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}
