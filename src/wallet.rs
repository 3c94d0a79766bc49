// src/wallet.rs
// Wallet (session responder) state machine.
//
//   connect(uri, signer)   dapp:request
// IDLE -----------------> ACTIVE <-----------> (one pending request at a time)
//                            |        approve_request / reject_request
//                            v
//                         CLOSED

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::codec;
use crate::config::PhoenixConfig;
use crate::crypto::CryptoEngine;
use crate::error::{PhoenixError, Result};
use crate::events::{WalletEvent, WalletEventBus};
use crate::model::{ChainType, EncryptedEnvelope, OperationType, Session, SignRequest, SignResponse, SignResult};
use crate::payload;
use crate::session::{SessionStore, WALLET_STORAGE_KEY};
use crate::signer::WalletSigner;
use crate::transport::{self, ConnectedUuidPayload, InboundMessage, TransportAdapter, TransportEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalletState {
    Idle,
    Active,
    Reconnecting,
    Closed,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub struct PhoenixWalletClient {
    config: PhoenixConfig,
    transport: Arc<dyn TransportAdapter>,
    store: SessionStore,
    crypto: Mutex<CryptoEngine>,
    events: WalletEventBus,
    state: Mutex<WalletState>,
    session: Mutex<Option<Session>>,
    signer: Mutex<Option<Arc<dyn WalletSigner>>>,
    pending: Mutex<Option<SignRequest>>,
    is_reconnecting: AtomicBool,
}

impl PhoenixWalletClient {
    pub async fn new(
        config: PhoenixConfig,
        transport: Arc<dyn TransportAdapter>,
        storage: Arc<dyn crate::session::StorageAdapter>,
    ) -> Arc<Self> {
        let store = SessionStore::new(storage, WALLET_STORAGE_KEY, &config);

        let client = Arc::new(PhoenixWalletClient {
            config,
            transport,
            store,
            crypto: Mutex::new(CryptoEngine::new()),
            events: WalletEventBus::new(),
            state: Mutex::new(WalletState::Idle),
            session: Mutex::new(None),
            signer: Mutex::new(None),
            pending: Mutex::new(None),
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
                client.events.emit(WalletEvent::SessionRestored(stored.session));
            }
        }

        client
    }

    pub async fn wait_for_initialization(&self) {}

    pub fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }

    pub async fn session(&self) -> Option<Session> {
        self.session.lock().await.clone()
    }

    pub async fn pending_request(&self) -> Option<SignRequest> {
        self.pending.lock().await.clone()
    }

    /// Parses `uri`, binds the DApp's public key, joins the room, and
    /// announces `connected_uuid` with our own key (and an encrypted
    /// info envelope carrying `signer`'s address/chain). Takes
    /// `Arc<Self>` because it spawns the background receive loop.
    pub async fn connect(self: Arc<Self>, uri: &str, signer: Arc<dyn WalletSigner>) -> Result<()> {
        {
            let state = self.state.lock().await;
            if *state == WalletState::Active {
                return Err(PhoenixError::AlreadyConnected);
            }
        }

        let pairing = codec::parse_uri(uri)?;

        let own_public_key = {
            let mut crypto = self.crypto.lock().await;
            let pk = crypto.generate();
            crypto.bind_peer(&pairing.public_key)?;
            pk
        };

        let mut session = Session::new(pairing.uuid.clone());
        session.connected = true;
        session.address = Some(signer.address());
        session.chain_type = Some(signer.chain_type());
        *self.session.lock().await = Some(session.clone());
        *self.signer.lock().await = Some(signer.clone());

        {
            let crypto = self.crypto.lock().await;
            let _ = self.store.save(&session, &self.config.server_url, &crypto).await;
        }

        self.transport.connect(&pairing.server_url).await?;
        self.transport.join(&pairing.uuid).await?;

        let info_envelope = {
            let crypto = self.crypto.lock().await;
            let (ciphertext, nonce) = crypto.encrypt(&WalletInfo {
                address: signer.address(),
                chain_type: signer.chain_type().to_string(),
            })?;
            EncryptedEnvelope {
                uuid: pairing.uuid.clone(),
                encrypted_payload: ciphertext,
                nonce,
                timestamp: now_ms(),
            }
        };

        let announce = ConnectedUuidPayload {
            uuid: pairing.uuid.clone(),
            public_key: own_public_key,
            info_envelope: Some(info_envelope),
        };
        self.transport
            .send(TransportEvent::ConnectedUuid, serde_json::to_value(&announce)?)
            .await?;

        *self.state.lock().await = WalletState::Active;
        self.clone().spawn_pump();
        self.events.emit(WalletEvent::SessionConnected(session));

        Ok(())
    }

    /// Resumes a persisted session with a freshly supplied signer — the
    /// signer itself is never persisted.
    pub async fn reconnect_with_signer(self: Arc<Self>, signer: Arc<dyn WalletSigner>) -> Result<()> {
        let session = self
            .session
            .lock()
            .await
            .clone()
            .ok_or(PhoenixError::NotConnected)?;

        *self.signer.lock().await = Some(signer);
        self.is_reconnecting.store(true, Ordering::SeqCst);
        *self.state.lock().await = WalletState::Reconnecting;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.transport.connect(&self.config.server_url).await {
                Ok(()) => break,
                Err(e) if attempt >= self.config.reconnect_attempts || !self.config.reconnect => {
                    self.is_reconnecting.store(false, Ordering::SeqCst);
                    *self.state.lock().await = WalletState::Closed;
                    self.events.emit(WalletEvent::SessionDisconnected);
                    return Err(e);
                }
                Err(_) => tokio::time::sleep(self.config.reconnect_delay).await,
            }
        }

        self.transport.join(&session.uuid).await?;
        self.clone().spawn_pump();

        self.is_reconnecting.store(false, Ordering::SeqCst);
        *self.state.lock().await = WalletState::Active;
        self.events.emit(WalletEvent::SessionConnected(session));
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        if self.is_reconnecting.load(Ordering::SeqCst) {
            return Ok(());
        }

        *self.pending.lock().await = None;
        self.transport.disconnect().await?;
        self.store.clear().await?;
        *self.session.lock().await = None;
        *self.signer.lock().await = None;
        *self.state.lock().await = WalletState::Closed;
        self.events.emit(WalletEvent::SessionDisconnected);
        Ok(())
    }

    /// Approves the single pending request by dispatching it to the
    /// bound signer, then sends back a success (or signer-error)
    /// response. Fails with `NotConnected` if no request is pending.
    pub async fn approve_request(&self, id: &str) -> Result<()> {
        let request = self.take_pending(id).await?;
        let signer = self.signer.lock().await.clone().ok_or(PhoenixError::NotConnected)?;

        let decoded = payload::decode_payload(&request.payload)?;
        let outcome = dispatch(signer.as_ref(), request.kind, decoded).await;

        let response = match outcome {
            Ok(result) => SignResponse::success(request.id.clone(), request.kind, result, now_ms()),
            Err(e) => SignResponse::error(request.id.clone(), request.kind, e.to_string(), now_ms()),
        };

        self.send_response(response).await?;
        self.events.emit(WalletEvent::RequestApproved(id.to_string()));
        Ok(())
    }

    pub async fn reject_request(&self, id: &str, reason: impl Into<String>) -> Result<()> {
        let request = self.take_pending(id).await?;
        let response = SignResponse::error(request.id, request.kind, reason.into(), now_ms());
        self.send_response(response).await?;
        self.events.emit(WalletEvent::RequestRejected(id.to_string()));
        Ok(())
    }

    async fn take_pending(&self, id: &str) -> Result<SignRequest> {
        let mut guard = self.pending.lock().await;
        let matches_id = guard.as_ref().is_some_and(|r| r.id == id);
        if matches_id {
            Ok(guard.take().unwrap())
        } else {
            Err(PhoenixError::NotConnected)
        }
    }

    async fn send_response(&self, response: SignResponse) -> Result<()> {
        let uuid = self.session.lock().await.as_ref().map(|s| s.uuid.clone()).unwrap_or_default();
        let envelope = {
            let crypto = self.crypto.lock().await;
            let (ciphertext, nonce) = crypto.encrypt(&response)?;
            EncryptedEnvelope {
                uuid,
                encrypted_payload: ciphertext,
                nonce,
                timestamp: now_ms(),
            }
        };
        self.transport
            .send(TransportEvent::DappResponse, transport::envelope_value(&envelope)?)
            .await
    }

    fn spawn_pump(self: Arc<Self>) {
        let client = self;
        tokio::spawn(async move {
            loop {
                let closed = { *client.state.lock().await == WalletState::Closed };
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
            TransportEvent::DappRequest => {
                if let Err(e) = self.on_request(msg.payload).await {
                    tracing::warn!(error = %e, "failed to process dapp:request");
                    self.events.emit(WalletEvent::Error(e));
                }
            }
            TransportEvent::Disconnect => {
                if !self.is_reconnecting.load(Ordering::SeqCst) {
                    *self.state.lock().await = WalletState::Closed;
                    self.events.emit(WalletEvent::SessionDisconnected);
                }
            }
            _ => {}
        }
    }

    async fn on_request(&self, payload: Value) -> Result<()> {
        let envelope = transport::parse_envelope(&payload)?;
        let request: SignRequest = {
            let crypto = self.crypto.lock().await;
            match crypto.decrypt(&envelope.encrypted_payload, &envelope.nonce) {
                Ok(r) => r,
                Err(_) => return Ok(()), // DecryptError: silent drop
            }
        };

        let age_ms = now_ms() - request.timestamp;
        let replay_ms = self.config.replay_window.as_millis() as i64;
        let skew_ms = self.config.future_skew_tolerance.as_millis() as i64;
        if age_ms > replay_ms || age_ms < -skew_ms {
            tracing::debug!(id = %request.id, "dropping request outside replay window");
            return Ok(());
        }

        let signer_chain = self
            .signer
            .lock()
            .await
            .as_ref()
            .map(|s| s.chain_type())
            .ok_or(PhoenixError::NotConnected)?;

        if request.chain_type != signer_chain {
            let response = SignResponse::error(
                request.id.clone(),
                request.kind,
                PhoenixError::ChainTypeMismatch.to_string(),
                now_ms(),
            );
            self.send_response(response).await?;
            return Ok(());
        }

        let already_pending = self.pending.lock().await.is_some();
        if already_pending {
            let response = SignResponse::error(
                request.id.clone(),
                request.kind,
                "another request is already pending".into(),
                now_ms(),
            );
            self.send_response(response).await?;
            return Ok(());
        }

        *self.pending.lock().await = Some(request.clone());
        self.events.emit(WalletEvent::SignRequestReceived(request));
        Ok(())
    }
}

async fn dispatch(signer: &dyn WalletSigner, kind: OperationType, decoded: Value) -> Result<SignResult> {
    match kind {
        OperationType::SignMessage => {
            let message = decoded.get("message").and_then(Value::as_str).map(str::to_string);
            let signature = signer.sign_message(decoded).await?;
            Ok(SignResult {
                signature: Some(signature),
                message,
                ..Default::default()
            })
        }
        OperationType::SignTransaction => {
            let signature = signer.sign_transaction(decoded).await?;
            Ok(SignResult {
                signature: Some(signature),
                from: Some(signer.address()),
                ..Default::default()
            })
        }
        OperationType::SignAllTransactions => {
            let transactions = decoded
                .get("transactions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let signatures = signer.sign_all_transactions(transactions).await?;
            Ok(SignResult {
                signatures: Some(signatures),
                from: Some(signer.address()),
                ..Default::default()
            })
        }
        OperationType::SendTransaction => {
            match signer.send_transaction(decoded.clone()).await {
                Ok(tx_hash) => Ok(SignResult {
                    tx_hash: Some(tx_hash),
                    ..Default::default()
                }),
                Err(PhoenixError::UnsupportedRequestType(_)) => {
                    let signature = signer.sign_transaction(decoded).await?;
                    Ok(SignResult {
                        signature: Some(signature),
                        from: Some(signer.address()),
                        ..Default::default()
                    })
                }
                Err(e) => Err(e),
            }
        }
    }
}

#[derive(serde::Serialize)]
struct WalletInfo {
    address: String,
    #[serde(rename = "chainType")]
    chain_type: String,
}
