// src/transport.rs
// Thin abstraction over the room-scoped relay message bus.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::EncryptedEnvelope;

/// Wire-level event names, stable across implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportEvent {
    Connect,
    Disconnect,
    Error,
    Join,
    ConnectedUuid,
    DappRequest,
    WalletRequest,
    WalletResponse,
    DappResponse,
}

impl TransportEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportEvent::Connect => "connect",
            TransportEvent::Disconnect => "disconnect",
            TransportEvent::Error => "error",
            TransportEvent::Join => "join",
            TransportEvent::ConnectedUuid => "connected_uuid",
            TransportEvent::DappRequest => "dapp:request",
            TransportEvent::WalletRequest => "wallet:request",
            TransportEvent::WalletResponse => "wallet:response",
            TransportEvent::DappResponse => "dapp:response",
        }
    }
}

/// `{uuid, publicKey}`, plus an optional encrypted side-channel carrying
/// `{address, chainType, chainId}` — the spec treats the side channel as
/// optional, tolerated either way. The envelope is nested under its own
/// `info` key rather than flattened: `EncryptedEnvelope` has its own
/// `uuid` field, which would otherwise collide with the outer `uuid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedUuidPayload {
    pub uuid: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "info", skip_serializing_if = "Option::is_none")]
    pub info_envelope: Option<EncryptedEnvelope>,
}

/// A message as delivered to an `on` handler: the raw JSON payload for
/// the given event.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub event: TransportEvent,
    pub payload: Value,
}

/// Abstracts the relay transport: connect, join, send, receive,
/// disconnect, reconnect. Implementers own the underlying socket;
/// handler delivery must be single-threaded per client instance.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    async fn connect(&self, server_url: &str) -> Result<()>;
    async fn join(&self, uuid: &str) -> Result<()>;
    async fn send(&self, event: TransportEvent, payload: Value) -> Result<()>;
    async fn disconnect(&self) -> Result<()>;
    /// Pulls the next inbound message, if any, without blocking.
    async fn try_recv(&self) -> Option<InboundMessage>;
}

/// Helper for building the `dapp:request`/`wallet:response` envelope
/// payload as a `serde_json::Value`.
pub fn envelope_value(envelope: &EncryptedEnvelope) -> Result<Value> {
    Ok(serde_json::to_value(envelope)?)
}

pub fn parse_envelope(value: &Value) -> Result<EncryptedEnvelope> {
    Ok(serde_json::from_value(value.clone())?)
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// An in-process relay shared by two `MemoryTransport` instances —
    /// stands in for a real relay server in integration tests.
    #[derive(Default)]
    pub struct TransportHub {
        rooms: Mutex<HashMap<String, Vec<String>>>, // uuid -> member transport ids
        inboxes: Mutex<HashMap<String, Vec<InboundMessage>>>, // transport id -> queued messages
    }

    impl TransportHub {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        async fn join_room(&self, transport_id: &str, uuid: &str) {
            let mut rooms = self.rooms.lock().await;
            rooms.entry(uuid.to_string()).or_default().push(transport_id.to_string());
        }

        async fn broadcast(&self, uuid: &str, from: &str, event: TransportEvent, payload: Value) {
            let rooms = self.rooms.lock().await;
            let Some(members) = rooms.get(uuid) else { return };
            let mut inboxes = self.inboxes.lock().await;
            for member in members {
                if member == from {
                    continue;
                }
                inboxes
                    .entry(member.clone())
                    .or_default()
                    .push(InboundMessage { event, payload: payload.clone() });
            }
        }

        async fn pop(&self, transport_id: &str) -> Option<InboundMessage> {
            let mut inboxes = self.inboxes.lock().await;
            inboxes.get_mut(transport_id).and_then(|q| if q.is_empty() { None } else { Some(q.remove(0)) })
        }
    }

    pub struct MemoryTransport {
        id: String,
        hub: Arc<TransportHub>,
        uuid: Mutex<Option<String>>,
        connected: Mutex<bool>,
    }

    impl MemoryTransport {
        pub fn new(id: impl Into<String>, hub: Arc<TransportHub>) -> Self {
            MemoryTransport {
                id: id.into(),
                hub,
                uuid: Mutex::new(None),
                connected: Mutex::new(false),
            }
        }

        /// Test-only hook: inject a message as if it arrived from the relay.
        pub async fn deliver_directly(&self, event: TransportEvent, payload: Value) {
            let mut inboxes = self.hub.inboxes.lock().await;
            inboxes.entry(self.id.clone()).or_default().push(InboundMessage { event, payload });
        }
    }

    #[async_trait]
    impl TransportAdapter for MemoryTransport {
        async fn connect(&self, _server_url: &str) -> Result<()> {
            *self.connected.lock().await = true;
            Ok(())
        }

        async fn join(&self, uuid: &str) -> Result<()> {
            *self.uuid.lock().await = Some(uuid.to_string());
            self.hub.join_room(&self.id, uuid).await;
            Ok(())
        }

        async fn send(&self, event: TransportEvent, payload: Value) -> Result<()> {
            let uuid = self.uuid.lock().await.clone();
            if let Some(uuid) = uuid {
                self.hub.broadcast(&uuid, &self.id, event, payload).await;
            }
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            *self.connected.lock().await = false;
            Ok(())
        }

        async fn try_recv(&self) -> Option<InboundMessage> {
            self.hub.pop(&self.id).await
        }
    }
}
