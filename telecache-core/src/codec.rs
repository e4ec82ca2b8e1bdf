//! Canonical serialized forms.
//!
//! Payloads and envelopes are encoded as compact JSON. `serde_json::Map` is
//! key-ordered, so the same logical payload always produces the same bytes.

use serde_json::Value;

use crate::error::CodecError;
use crate::record::{json_kind, Payload, TelemetryRecord};

/// Encode a payload to its canonical bytes.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(payload).map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })
}

/// Decode canonical payload bytes. The top level must be a JSON object.
pub fn decode_payload(bytes: &[u8]) -> Result<Payload, CodecError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
        reason: e.to_string(),
    })?;
    match value {
        Value::Object(map) => Ok(Payload::from(map)),
        other => Err(CodecError::NotAnObject {
            found: json_kind(&other).to_string(),
        }),
    }
}

/// Encode a full record to the envelope stored in the cache.
pub fn encode_record(record: &TelemetryRecord) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(record).map_err(|e| CodecError::Encode {
        reason: e.to_string(),
    })
}

/// Decode a cache envelope.
pub fn decode_record(bytes: &[u8]) -> Result<TelemetryRecord, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
        reason: e.to_string(),
    })
}
