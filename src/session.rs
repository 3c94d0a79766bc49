// src/session.rs
// Session persistence: a pluggable async key/value store plus the
// policy for when a restored session is still trustworthy.

use async_trait::async_trait;

use crate::config::PhoenixConfig;
use crate::crypto::{CryptoEngine, StoredKeys};
use crate::error::{PhoenixError, Result};
use crate::model::{Session, StoredSession};

pub const DAPP_STORAGE_KEY: &str = "phoenix_session";
pub const WALLET_STORAGE_KEY: &str = "phoenix_wallet_session";

/// External key/value persistence, implemented by the embedding
/// application (disk, IndexedDB, keychain, ...). All operations are
/// async so a real implementation can do I/O without blocking the
/// client's task queue.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn get_item(&self, key: &str) -> std::result::Result<Option<String>, String>;
    async fn set_item(&self, key: &str, value: String) -> std::result::Result<(), String>;
    async fn remove_item(&self, key: &str) -> std::result::Result<(), String>;
}

/// Serializes/deserializes a `StoredSession` to a single storage key.
/// The store is advisory: the in-memory `Session` is authoritative while
/// the process runs; the store is read once at startup and written
/// after meaningful state changes.
pub struct SessionStore {
    storage: std::sync::Arc<dyn StorageAdapter>,
    key: &'static str,
    enabled: bool,
}

impl SessionStore {
    pub fn new(storage: std::sync::Arc<dyn StorageAdapter>, key: &'static str, config: &PhoenixConfig) -> Self {
        SessionStore {
            storage,
            key,
            enabled: config.enable_persistence,
        }
    }

    /// Snapshots current keys + peer key + session and writes atomically.
    pub async fn save(&self, session: &Session, server_url: &str, crypto: &CryptoEngine) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let StoredKeys {
            secret_key,
            public_key,
            peer_public_key,
        } = crypto.export().ok_or(PhoenixError::NotConnected)?;

        if peer_public_key.is_none() && session.connected {
            return Err(PhoenixError::PersistenceError(
                "cannot persist a connected session without a bound peer key".into(),
            ));
        }

        let stored = StoredSession {
            session: session.clone(),
            server_url: server_url.to_string(),
            secret_key,
            public_key,
            peer_public_key,
            saved_at: chrono::Utc::now().timestamp_millis(),
        };

        let json = serde_json::to_string(&stored)?;
        self.storage.set_item(self.key, json).await.map_err(|e| {
            tracing::warn!(error = %e, "failed to persist session");
            PhoenixError::PersistenceError(e)
        })
    }

    /// Loads the stored session. Returns `None` (and schedules a clear)
    /// if it is missing, stale (older than `session_ttl`), or bound to a
    /// different `server_url` than currently configured.
    pub async fn load(&self, server_url: &str, config: &PhoenixConfig) -> Result<Option<StoredSession>> {
        if !self.enabled {
            return Ok(None);
        }
        let raw = match self.storage.get_item(self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(None),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load persisted session");
                return Ok(None);
            }
        };

        let stored: StoredSession = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "persisted session is corrupt, discarding");
                self.clear().await?;
                return Ok(None);
            }
        };

        let age = chrono::Utc::now().timestamp_millis() - stored.saved_at;
        let ttl_ms = config.session_ttl.as_millis() as i64;
        if age > ttl_ms {
            tracing::debug!("persisted session expired, clearing");
            self.clear().await?;
            return Ok(None);
        }

        if stored.server_url != server_url {
            tracing::debug!("persisted session bound to a different server, clearing");
            self.clear().await?;
            return Ok(None);
        }

        Ok(Some(stored))
    }

    pub async fn clear(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        self.storage.remove_item(self.key).await.map_err(|e| {
            tracing::warn!(error = %e, "failed to clear persisted session");
            PhoenixError::PersistenceError(e)
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::MemoryStorageAdapter;
    use super::*;
    use std::sync::Arc;

    fn config() -> PhoenixConfig {
        PhoenixConfig::new("https://relay.example")
    }

    #[tokio::test]
    async fn save_then_load_round_trips_modulo_saved_at() {
        let storage = Arc::new(MemoryStorageAdapter::new());
        let store = SessionStore::new(storage, DAPP_STORAGE_KEY, &config());

        let mut crypto = CryptoEngine::new();
        crypto.generate();
        let mut peer = CryptoEngine::new();
        let peer_pk = peer.generate();
        crypto.bind_peer(&peer_pk).unwrap();

        let mut session = Session::new("abc-uuid");
        session.connected = true;

        store.save(&session, "https://relay.example", &crypto).await.unwrap();
        let loaded = store.load("https://relay.example", &config()).await.unwrap().unwrap();

        assert_eq!(loaded.session, session);
        assert_eq!(loaded.server_url, "https://relay.example");
        assert_eq!(loaded.public_key, crypto.public_key().unwrap());
    }

    #[tokio::test]
    async fn load_discards_session_from_a_different_server() {
        let storage = Arc::new(MemoryStorageAdapter::new());
        let store = SessionStore::new(storage, DAPP_STORAGE_KEY, &config());

        let mut crypto = CryptoEngine::new();
        crypto.generate();
        let session = Session::new("abc-uuid");

        store.save(&session, "https://old.example", &crypto).await.unwrap();
        let loaded = store.load("https://relay.example", &config()).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn save_rejects_connected_session_without_peer_key() {
        let storage = Arc::new(MemoryStorageAdapter::new());
        let store = SessionStore::new(storage, DAPP_STORAGE_KEY, &config());

        let mut crypto = CryptoEngine::new();
        crypto.generate();
        let mut session = Session::new("abc-uuid");
        session.connected = true;

        let err = store.save(&session, "https://relay.example", &crypto).await.unwrap_err();
        assert!(matches!(err, PhoenixError::PersistenceError(_)));
    }

    #[tokio::test]
    async fn disabled_persistence_is_a_no_op() {
        let storage = Arc::new(MemoryStorageAdapter::new());
        let cfg = config().with_persistence(false);
        let store = SessionStore::new(storage, DAPP_STORAGE_KEY, &cfg);

        let mut crypto = CryptoEngine::new();
        crypto.generate();
        let session = Session::new("abc-uuid");
        store.save(&session, "https://relay.example", &crypto).await.unwrap();
        assert!(store.load("https://relay.example", &cfg).await.unwrap().is_none());
    }
}
