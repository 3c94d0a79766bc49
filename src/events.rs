// src/events.rs
// Typed, synchronous-observer surface on both clients, backed by a
// broadcast channel so multiple subscribers can observe the same
// client without the protocol core owning UI concerns.

use tokio::sync::broadcast;

use crate::error::PhoenixError;
use crate::model::{Session, SignRequest, SignResponse};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub enum DappEvent {
    SessionConnected(Session),
    SessionDisconnected,
    SessionRestored(Session),
    Error(PhoenixError),
    RequestSent(String),
    RequestResponse(SignResponse),
}

#[derive(Debug, Clone)]
pub enum WalletEvent {
    SessionConnected(Session),
    SessionDisconnected,
    SessionRestored(Session),
    Error(PhoenixError),
    SignRequestReceived(SignRequest),
    RequestApproved(String),
    RequestRejected(String),
}

/// A fixed-enumeration typed pub/sub. Emitting never blocks on a slow
/// subscriber dropping behind — `broadcast` drops the oldest entries
/// for a lagging receiver rather than stalling the emitter.
pub struct EventBus<E: Clone> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        EventBus { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: E) {
        // No active subscribers is a normal, non-error state.
        let _ = self.sender.send(event);
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

pub type DappEventBus = EventBus<DappEvent>;
pub type WalletEventBus = EventBus<WalletEvent>;
