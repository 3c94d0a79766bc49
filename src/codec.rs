// src/codec.rs
// Base64 conversion, pairing URI encode/parse.
//
// Field order in the serialized URI JSON is load-bearing: QR-code
// fixtures compare bytes, not just parsed structure, so PairingUri's
// field order mirrors the wire order exactly and must not be reordered.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PhoenixError, Result};

const URI_PREFIX: &str = "phoenix:";
const PAIRING_VERSION: &str = "1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairingUri {
    pub version: String,
    pub uuid: String,
    #[serde(rename = "serverUrl")]
    pub server_url: String,
    #[serde(rename = "publicKey")]
    pub public_key: String,
}

impl PairingUri {
    pub fn new(uuid: Uuid, server_url: impl Into<String>, public_key_b64: impl Into<String>) -> Self {
        PairingUri {
            version: PAIRING_VERSION.to_string(),
            uuid: uuid.to_string(),
            server_url: server_url.into(),
            public_key: public_key_b64.into(),
        }
    }
}

/// `"phoenix:" + json(pairing)`, field order {version, uuid, serverUrl, publicKey}.
pub fn encode_uri(pairing: &PairingUri) -> Result<String> {
    let json = serde_json::to_string(pairing)?;
    Ok(format!("{URI_PREFIX}{json}"))
}

/// Strips the `phoenix:` prefix (required), parses JSON, and validates
/// version/uuid/publicKey/serverUrl per spec.
pub fn parse_uri(uri: &str) -> Result<PairingUri> {
    let body = uri
        .strip_prefix(URI_PREFIX)
        .ok_or_else(|| PhoenixError::InvalidPairingUri("missing phoenix: prefix".into()))?;

    let pairing: PairingUri = serde_json::from_str(body)
        .map_err(|e| PhoenixError::InvalidPairingUri(format!("malformed JSON: {e}")))?;

    if pairing.version != PAIRING_VERSION {
        return Err(PhoenixError::InvalidPairingUri(format!(
            "unsupported version: {}",
            pairing.version
        )));
    }

    Uuid::parse_str(&pairing.uuid)
        .map_err(|_| PhoenixError::InvalidPairingUri("uuid is not a valid RFC 4122 string".into()))?;

    if pairing.server_url.is_empty() {
        return Err(PhoenixError::InvalidPairingUri("serverUrl is empty".into()));
    }

    let decoded = base64_decode(&pairing.public_key)
        .map_err(|_| PhoenixError::InvalidPairingUri("publicKey is not valid base64".into()))?;
    if decoded.len() != 32 {
        return Err(PhoenixError::InvalidPairingUri(
            "publicKey must decode to exactly 32 bytes".into(),
        ));
    }

    Ok(pairing)
}

pub fn base64_encode(bytes: impl AsRef<[u8]>) -> String {
    BASE64.encode(bytes)
}

pub fn base64_decode(s: &str) -> Result<Vec<u8>> {
    Ok(BASE64.decode(s)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_the_s1_fixture_byte_exact() {
        let pairing = PairingUri::new(
            Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            "https://r.example",
            "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=",
        );
        let uri = encode_uri(&pairing).unwrap();
        assert_eq!(
            uri,
            r#"phoenix:{"version":"1","uuid":"550e8400-e29b-41d4-a716-446655440000","serverUrl":"https://r.example","publicKey":"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="}"#
        );
    }

    #[test]
    fn round_trips_any_valid_pairing() {
        let pairing = PairingUri::new(Uuid::new_v4(), "wss://relay.example", base64_encode([7u8; 32]));
        let uri = encode_uri(&pairing).unwrap();
        assert!(uri.starts_with(URI_PREFIX));
        let parsed = parse_uri(&uri).unwrap();
        assert_eq!(parsed, pairing);
    }

    #[test]
    fn rejects_missing_prefix() {
        let err = parse_uri(r#"{"version":"1"}"#).unwrap_err();
        assert!(matches!(err, PhoenixError::InvalidPairingUri(_)));
    }

    #[test]
    fn rejects_wrong_version() {
        let body = r#"{"version":"2","uuid":"550e8400-e29b-41d4-a716-446655440000","serverUrl":"https://r.example","publicKey":"AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="}"#;
        let err = parse_uri(&format!("{URI_PREFIX}{body}")).unwrap_err();
        assert!(matches!(err, PhoenixError::InvalidPairingUri(_)));
    }

    #[test]
    fn rejects_short_public_key() {
        let body = r#"{"version":"1","uuid":"550e8400-e29b-41d4-a716-446655440000","serverUrl":"https://r.example","publicKey":"AAAA"}"#;
        let err = parse_uri(&format!("{URI_PREFIX}{body}")).unwrap_err();
        assert!(matches!(err, PhoenixError::InvalidPairingUri(_)));
    }

    #[test]
    fn base64_roundtrip_is_strict() {
        let encoded = base64_encode([1, 2, 3]);
        assert_eq!(base64_decode(&encoded).unwrap(), vec![1, 2, 3]);
        assert!(base64_decode("not base64!!").is_err());
    }
}
