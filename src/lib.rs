// src/lib.rs
// Phoenix — an end-to-end encrypted pairing and signing protocol core.
//
// Two client roles share the same wire format and crypto: a DApp that
// initiates pairing and issues sign requests, and a Wallet that accepts
// a pairing URI, binds a signer, and answers requests. Both are
// transport- and storage-agnostic: callers plug in a `TransportAdapter`
// (the relay socket) and a `StorageAdapter` (session persistence).

pub mod codec;
pub mod config;
pub mod correlator;
pub mod crypto;
pub mod dapp;
pub mod error;
pub mod events;
pub mod model;
pub mod payload;
pub mod session;
pub mod signer;
pub mod transport;
pub mod wallet;

pub mod prelude {
    pub use crate::config::PhoenixConfig;
    pub use crate::dapp::PhoenixDappClient;
    pub use crate::error::{PhoenixError, Result};
    pub use crate::events::{DappEvent, WalletEvent};
    pub use crate::model::{ChainType, OperationType, Session, SignRequest, SignResponse, SignResult};
    pub use crate::session::StorageAdapter;
    pub use crate::signer::WalletSigner;
    pub use crate::transport::TransportAdapter;
    pub use crate::wallet::PhoenixWalletClient;
}
