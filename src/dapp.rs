// src/dapp.rs
// DApp (session initiator) state machine.
//
//   connect()                 connected_uuid{publicKey}
// IDLE ---------> PAIRING -------------------------> ACTIVE --sign_*--> (correlator pending)
//                                                       ^                      |
//                                                       |  response/timeout    |
//                                                       +----------------------+
//                                                       | disconnect() | fatal transport error
//                                                       v
//                                                    CLOSED

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::codec::{self, PairingUri};
use crate::config::PhoenixConfig;
use crate::correlator::{generate_request_id, RequestCorrelator};
use crate::crypto::CryptoEngine;
use crate::error::{PhoenixError, Result};
use crate::events::{DappEvent, DappEventBus};
use crate::model::{ChainType, EncryptedEnvelope, OperationType, Session, SignRequest, SignResponse};
use crate::payload;
use crate::session::{SessionStore, DAPP_STORAGE_KEY};
use crate::transport::{self, InboundMessage, TransportAdapter, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DappState {
    Idle,
    Pairing,
    Active,
    Reconnecting,
    Closed,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct PhoenixDappClient {
    config: PhoenixConfig,
    transport: Arc<dyn TransportAdapter>,
    store: SessionStore,
    crypto: Mutex<CryptoEngine>,
    correlator: RequestCorrelator,
    events: DappEventBus,
    state: Mutex<DappState>,
    session: Mutex<Option<Session>>,
    is_reconnecting: AtomicBool,
}

impl PhoenixDappClient {
    /// Awaits `SessionStore::load()` before returning, so the client is
    /// never observed mid-restore.
    pub async fn new(
        config: PhoenixConfig,
        transport: Arc<dyn TransportAdapter>,
        storage: Arc<dyn crate::session::StorageAdapter>,
    ) -> Arc<Self> {
        let store = SessionStore::new(storage, DAPP_STORAGE_KEY, &config);
        let request_timeout = config.request_timeout;

        let client = Arc::new(PhoenixDappClient {
            config,
            transport,
            store,
            crypto: Mutex::new(CryptoEngine::new()),
            correlator: RequestCorrelator::with_timeout(request_timeout),
            events: DappEventBus::new(),
            state: Mutex::new(DappState::Idle),
            session: Mutex::new(None),
            is_reconnecting: AtomicBool::new(false),
        });

        if let Ok(Some(stored)) = client.store.load(&client.config.server_url, &client.config).await {
            if let Ok(restored_crypto) = CryptoEngine::import(&crate::crypto::StoredKeys {
                secret_key: stored.secret_key.clone(),
                public_key: stored.public_key.clone(),
                peer_public_key: stored.peer_public_key.clone(),
            }) {
                *client.crypto.lock().await = restored_crypto;
                *client.session.lock().await = Some(stored.session.clone());
                client.events.emit(DappEvent::SessionRestored(stored.session));
            }
        }

        client
    }

    /// No-op by the time this returns: restore already completed in
    /// `new()`. Kept so callers don't need to special-case construction.
    pub async fn wait_for_initialization(&self) {}

    pub fn subscribe(&self) -> broadcast::Receiver<DappEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    /// Mints a uuid, emits a pairing URI, and opens the transport.
    /// Refuses if a session is already active. Takes `Arc<Self>` because
    /// it spawns the background receive loop; call as
    /// `client.clone().connect().await` to keep your own handle.
    pub async fn connect(self: Arc<Self>) -> Result<(String, String)> {
        {
            let state = self.state.lock().await;
            if *state == DappState::Active {
                return Err(PhoenixError::AlreadyConnected);
            }
        }

        let uuid = Uuid::new_v4();
        let public_key = {
            let mut crypto = self.crypto.lock().await;
            crypto.generate()
        };

        let pairing = PairingUri::new(uuid, &self.config.server_url, &public_key);
        let uri = codec::encode_uri(&pairing)?;

        let session = Session::new(uuid.to_string());
        *self.session.lock().await = Some(session.clone());
        {
            let crypto = self.crypto.lock().await;
            // Initial persist is best-effort: a fresh session has no peer
            // key yet, so this only succeeds because `connected` is false.
            let _ = self.store.save(&session, &self.config.server_url, &crypto).await;
        }

        *self.state.lock().await = DappState::Pairing;

        self.transport.connect(&self.config.server_url).await?;
        self.transport.join(&uuid.to_string()).await?;

        self.clone().spawn_pump();

        Ok((uri, uuid.to_string()))
    }

    /// Resumes a session restored from the store. Valid only if a
    /// non-active session with a bound peer key exists. Takes
    /// `Arc<Self>` for the same reason as `connect`.
    pub async fn reconnect(self: Arc<Self>) -> Result<()> {
        let session = self
            .session
            .lock()
            .await
            .clone()
            .ok_or(PhoenixError::NotConnected)?;

        self.is_reconnecting.store(true, Ordering::SeqCst);
        *self.state.lock().await = DappState::Reconnecting;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.connect(&self.config.server_url).await {
                Ok(()) => break,
                Err(e) if attempt >= self.config.reconnect_attempts || !self.config.reconnect => {
                    self.is_reconnecting.store(false, Ordering::SeqCst);
                    *self.state.lock().await = DappState::Closed;
                    self.events.emit(DappEvent::SessionDisconnected);
                    return Err(e);
                }
                Err(_) => {
                    tokio::time::sleep(self.config.reconnect_delay).await;
                }
            }
        }

        self.transport.join(&session.uuid).await?;
        self.clone().spawn_pump();

        let bound = self.crypto.lock().await.is_bound();
        let mut guard = self.session.lock().await;
        if let Some(s) = guard.as_mut() {
            s.connected = bound;
        }
        let updated = guard.clone();
        drop(guard);

        self.is_reconnecting.store(false, Ordering::SeqCst);
        *self.state.lock().await = if bound { DappState::Active } else { DappState::Pairing };

        if bound {
            if let Some(s) = updated {
                self.events.emit(DappEvent::SessionConnected(s));
            }
        }

        Ok(())
    }

    /// Rejects all pending requests, closes the transport, clears
    /// persisted state, and emits `session_disconnected`. No-op while a
    /// reconnect is in flight.
    pub async fn disconnect(&self) -> Result<()> {
        if self.is_reconnecting.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.correlator.clear_all(PhoenixError::SessionClosed).await;
        self.transport.disconnect().await?;
        self.store.clear().await?;
        *self.session.lock().await = None;
        *self.state.lock().await = DappState::Closed;
        self.events.emit(DappEvent::SessionDisconnected);
        Ok(())
    }

    pub async fn sign_message(&self, message: impl Into<String>, chain_type: ChainType, chain_id: impl Into<String>) -> Result<SignResponse> {
        let payload = serde_json::json!({ "message": message.into() });
        self.issue(OperationType::SignMessage, chain_type, chain_id, payload).await
    }

    pub async fn sign_transaction(&self, transaction: Value, chain_type: ChainType, chain_id: impl Into<String>) -> Result<SignResponse> {
        let payload = serde_json::json!({ "transaction": transaction });
        self.issue(OperationType::SignTransaction, chain_type, chain_id, payload).await
    }

    pub async fn sign_all_transactions(&self, transactions: Vec<Value>, chain_type: ChainType, chain_id: impl Into<String>) -> Result<SignResponse> {
        let payload = serde_json::json!({ "transactions": transactions });
        self.issue(OperationType::SignAllTransactions, chain_type, chain_id, payload).await
    }

    pub async fn send_transaction(&self, transaction: Value, chain_type: ChainType, chain_id: impl Into<String>) -> Result<SignResponse> {
        let payload = serde_json::json!({ "transaction": transaction });
        self.issue(OperationType::SendTransaction, chain_type, chain_id, payload).await
    }

    async fn issue(&self, kind: OperationType, chain_type: ChainType, chain_id: impl Into<String>, body: Value) -> Result<SignResponse> {
        {
            let state = self.state.lock().await;
            if *state != DappState::Active {
                return Err(PhoenixError::NotConnected);
            }
        }

        let id = generate_request_id(kind);
        let encoded_payload = payload::encode_payload(&body)?;
        let request = SignRequest {
            id: id.clone(),
            kind,
            chain_type,
            chain_id: chain_id.into(),
            payload: encoded_payload,
            timestamp: now_ms(),
        };

        let rx = self.correlator.add(id.clone(), kind).await?;

        let envelope = {
            let crypto = self.crypto.lock().await;
            let (ciphertext, nonce) = crypto.encrypt(&request)?;
            EncryptedEnvelope {
                uuid: self.session.lock().await.as_ref().map(|s| s.uuid.clone()).unwrap_or_default(),
                encrypted_payload: ciphertext,
                nonce,
                timestamp: now_ms(),
            }
        };

        self.transport
            .send(TransportEvent::DappRequest, transport::envelope_value(&envelope)?)
            .await?;
        self.events.emit(DappEvent::RequestSent(id));

        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PhoenixError::SessionClosed),
        }
    }

    fn spawn_pump(self: Arc<Self>) {
        let client = self;
        tokio::spawn(async move {
            loop {
                let closed = { *client.state.lock().await == DappState::Closed };
                if closed {
                    break;
                }
                match client.transport.try_recv().await {
                    Some(msg) => client.handle_inbound(msg).await,
                    None => tokio::time::sleep(Duration::from_millis(10)).await,
                }
            }
        });
    }

    async fn handle_inbound(&self, msg: InboundMessage) {
        match msg.event {
            TransportEvent::ConnectedUuid => {
                if let Err(e) = self.on_connected_uuid(msg.payload).await {
                    tracing::warn!(error = %e, "failed to process connected_uuid");
                    self.events.emit(DappEvent::Error(e));
                }
            }
            TransportEvent::DappResponse => {
                self.on_response(msg.payload).await;
            }
            TransportEvent::Disconnect => {
                if !self.is_reconnecting.load(Ordering::SeqCst) {
                    *self.state.lock().await = DappState::Closed;
                    self.events.emit(DappEvent::SessionDisconnected);
                }
                // else: socket-cleanup race guard — absorbed silently.
            }
            _ => {}
        }
    }

    async fn on_connected_uuid(&self, payload: Value) -> Result<()> {
        let parsed: transport::ConnectedUuidPayload = serde_json::from_value(payload)?;
        self.crypto.lock().await.bind_peer(&parsed.public_key)?;

        let mut guard = self.session.lock().await;
        let session = guard.get_or_insert_with(|| Session::new(parsed.uuid.clone()));
        session.connected = true;

        if let Some(envelope) = &parsed.info_envelope {
            if let Ok(info) = self.crypto.lock().await.decrypt::<WalletInfo>(&envelope.encrypted_payload, &envelope.nonce) {
                session.address = Some(info.address);
                session.chain_type = Some(ChainType::from(info.chain_type.as_str()));
            }
        }
        let updated = session.clone();
        drop(guard);

        {
            let crypto = self.crypto.lock().await;
            let _ = self.store.save(&updated, &self.config.server_url, &crypto).await;
        }

        *self.state.lock().await = DappState::Active;
        self.events.emit(DappEvent::SessionConnected(updated));
        Ok(())
    }

    async fn on_response(&self, payload: Value) {
        let envelope = match transport::parse_envelope(&payload) {
            Ok(e) => e,
            Err(_) => return,
        };

        let response: SignResponse = {
            let crypto = self.crypto.lock().await;
            match crypto.decrypt(&envelope.encrypted_payload, &envelope.nonce) {
                Ok(r) => r,
                Err(_) => return, // DecryptError: silent drop
            }
        };

        let age_ms = now_ms() - response.timestamp;
        let replay_ms = self.config.replay_window.as_millis() as i64;
        let skew_ms = self.config.future_skew_tolerance.as_millis() as i64;
        if age_ms > replay_ms || age_ms < -skew_ms {
            tracing::debug!(id = %response.id, "dropping response outside replay window");
            return; // TimestampOutOfWindow: silent drop, no signal to peer
        }

        self.events.emit(DappEvent::RequestResponse(response.clone()));
        // Error responses still carry a signed shape, so they resolve the
        // waiter (not reject it) — the caller inspects `status` itself.
        self.correlator.resolve(&response.id, response).await;
    }
}

#[derive(serde::Deserialize)]
struct WalletInfo {
    address: String,
    #[serde(rename = "chainType")]
    chain_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::MemoryStorageAdapter;
    use crate::transport::test_support::{MemoryTransport, TransportHub};

    async fn client() -> Arc<PhoenixDappClient> {
        let hub = TransportHub::new();
        let transport = Arc::new(MemoryTransport::new("dapp", hub));
        PhoenixDappClient::new(
            PhoenixConfig::new("https://relay.example"),
            transport,
            Arc::new(MemoryStorageAdapter::new()),
        )
        .await
    }

    #[tokio::test]
    async fn sign_message_before_connecting_is_rejected() {
        let dapp = client().await;
        let err = dapp.sign_message("hi", ChainType::Evm, "1").await.unwrap_err();
        assert!(matches!(err, PhoenixError::NotConnected));
    }

    #[tokio::test]
    async fn connect_mints_a_fresh_pairing_uri_each_time() {
        let dapp = client().await;
        let (uri, uuid) = dapp.clone().connect().await.unwrap();
        assert!(uri.starts_with("phoenix:"));
        let session = dapp.session().await.unwrap();
        assert_eq!(session.uuid, uuid);
        assert!(!session.connected);
    }

    #[tokio::test]
    async fn disconnect_without_a_session_is_a_no_op() {
        let dapp = client().await;
        assert!(dapp.disconnect().await.is_ok());
        assert!(dapp.session().await.is_none());
    }
}
