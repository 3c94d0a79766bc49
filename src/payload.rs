// src/payload.rs
// Chain-agnostic operation payload codec.
//
// Payloads travel as a JSON string inside the authenticated envelope.
// Raw byte arrays (used by chains that sign bytes directly, e.g. Solana)
// are tagged `{__uint8array: base64}` so they survive the JSON round
// trip unambiguously instead of being coerced into a JSON array of
// numbers or a plain string.

use serde_json::Value;

use crate::codec::{base64_decode, base64_encode};
use crate::error::Result;

const BYTE_TAG_KEY: &str = "__uint8array";

/// Encodes an arbitrary JSON-serializable value to the transport string
/// form, tagging any raw byte payload the caller hands in directly.
pub fn encode_payload<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Tags a raw byte buffer as `{__uint8array: base64}` and serializes it.
pub fn encode_bytes_payload(bytes: &[u8]) -> String {
    let mut obj = serde_json::Map::new();
    obj.insert(BYTE_TAG_KEY.to_string(), Value::String(base64_encode(bytes)));
    Value::Object(obj).to_string()
}

/// Parses the payload string as opaque JSON; callers are responsible
/// for chain-specific shape.
pub fn decode_payload(payload: &str) -> Result<Value> {
    Ok(serde_json::from_str(payload)?)
}

/// If `value` is a tagged byte payload, decodes and returns the bytes.
pub fn decode_bytes_payload(value: &Value) -> Option<Result<Vec<u8>>> {
    let tagged = value.as_object()?.get(BYTE_TAG_KEY)?.as_str()?;
    Some(base64_decode(tagged))
}
