// src/model.rs
// Shared wire/domain types: chains, operations, sessions, envelopes.

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

/// Chain family a request targets. Unknown chains round-trip through
/// `Other` rather than failing to deserialize — the payload codec keeps
/// chain semantics opaque to the core, so the chain enum should too.
/// Serialized/deserialized as a lowercase string (`"evm"`, `"solana"`,
/// or the raw chain name for anything else).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainType {
    Evm,
    Solana,
    Other(String),
}

impl std::fmt::Display for ChainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainType::Evm => write!(f, "evm"),
            ChainType::Solana => write!(f, "solana"),
            ChainType::Other(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for ChainType {
    fn from(s: &str) -> Self {
        match s {
            "evm" => ChainType::Evm,
            "solana" => ChainType::Solana,
            other => ChainType::Other(other.to_string()),
        }
    }
}

impl Serialize for ChainType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ChainType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("chainType must not be empty"));
        }
        Ok(ChainType::from(s.as_str()))
    }
}

/// One of the four sign operations Phoenix supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    SignMessage,
    SignTransaction,
    SignAllTransactions,
    SendTransaction,
}

impl OperationType {
    /// The request-id prefix for this operation type.
    pub fn id_prefix(self) -> &'static str {
        match self {
            OperationType::SignMessage => "msg",
            OperationType::SignTransaction => "tx",
            OperationType::SignAllTransactions => "all",
            OperationType::SendTransaction => "send",
        }
    }
}

/// The authenticated plaintext carried inside an encrypted envelope, in
/// the request direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OperationType,
    #[serde(rename = "chainType")]
    pub chain_type: ChainType,
    #[serde(rename = "chainId")]
    pub chain_id: String,
    pub payload: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<String>>,
    #[serde(rename = "txHash", skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

/// The authenticated plaintext carried inside an encrypted envelope, in
/// the response direction. Exactly one of `result`/`error` is present,
/// matching `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OperationType,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SignResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: i64,
}

impl SignResponse {
    pub fn success(id: impl Into<String>, kind: OperationType, result: SignResult, timestamp: i64) -> Self {
        SignResponse {
            id: id.into(),
            kind,
            status: ResponseStatus::Success,
            result: Some(result),
            error: None,
            timestamp,
        }
    }

    pub fn error(id: impl Into<String>, kind: OperationType, error: impl Into<String>, timestamp: i64) -> Self {
        SignResponse {
            id: id.into(),
            kind,
            status: ResponseStatus::Error,
            result: None,
            error: Some(error.into()),
            timestamp,
        }
    }
}

/// The relay-visible message. Integrity comes from the box MAC; the
/// envelope timestamp itself is advisory only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub uuid: String,
    #[serde(rename = "encryptedPayload")]
    pub encrypted_payload: String,
    pub nonce: String,
    pub timestamp: i64,
}

/// The in-memory, authoritative session state for one client instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub uuid: String,
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "chainType", skip_serializing_if = "Option::is_none")]
    pub chain_type: Option<ChainType>,
    #[serde(rename = "chainId", skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
}

impl Session {
    pub fn new(uuid: impl Into<String>) -> Self {
        Session {
            uuid: uuid.into(),
            connected: false,
            address: None,
            chain_type: None,
            chain_id: None,
        }
    }
}

/// The persisted form of a session, as written through the
/// `StorageAdapter`. Invariant: if `peer_public_key` is absent then
/// `session.connected` must be false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session: Session,
    #[serde(rename = "serverUrl")]
    pub server_url: String,
    #[serde(rename = "secretKey")]
    pub secret_key: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
    #[serde(rename = "peerPublicKey", skip_serializing_if = "Option::is_none")]
    pub peer_public_key: Option<String>,
    #[serde(rename = "savedAt")]
    pub saved_at: i64,
}
