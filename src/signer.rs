// src/signer.rs
// The external signing capability the wallet side dispatches to.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PhoenixError, Result};
use crate::model::ChainType;

/// Chain-specific signing capability supplied by the embedding wallet.
/// The core invokes exactly one method per request, based on the
/// request's `type`. `sign_all_transactions` and `send_transaction` are
/// optional; the default implementations report `UnsupportedRequestType`
/// so a signer only needs to override what it actually supports.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    fn address(&self) -> String;
    fn chain_type(&self) -> ChainType;

    async fn sign_message(&self, decoded: Value) -> Result<String>;
    async fn sign_transaction(&self, decoded: Value) -> Result<String>;

    async fn sign_all_transactions(&self, _decoded: Vec<Value>) -> Result<Vec<String>> {
        Err(PhoenixError::UnsupportedRequestType("sign_all_transactions".into()))
    }

    async fn send_transaction(&self, _decoded: Value) -> Result<String> {
        Err(PhoenixError::UnsupportedRequestType("send_transaction".into()))
    }
}
