//! Telemetry envelope and its durable row form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::codec::{decode_payload, encode_payload};
use crate::error::{CodecError, ValidationError};

// ============================================================================
// PAYLOAD
// ============================================================================

/// Open-ended device payload.
///
/// The coordinator never looks inside. It is an arbitrary JSON object carried
/// end-to-end, so unknown keys and nested values survive every hop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the underlying JSON object.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any key or string value, at any depth, holds a NUL character.
    pub fn contains_nul(&self) -> bool {
        self.0
            .iter()
            .any(|(key, value)| key.contains('\0') || value_contains_nul(value))
    }
}

fn value_contains_nul(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains('\0'),
        Value::Array(items) => items.iter().any(value_contains_nul),
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.contains('\0') || value_contains_nul(value)),
        _ => false,
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Payload {
    type Error = CodecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(CodecError::NotAnObject {
                found: json_kind(&other).to_string(),
            }),
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// TELEMETRY RECORD
// ============================================================================

/// A single time-stamped reading from a device.
///
/// This is both the inbound HTTP body and the cache envelope. `device_type`
/// and `data` default when absent so older simulators that omit them are
/// still accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TelemetryRecord {
    /// Cache key and durable lookup key. Must be non-empty.
    pub device_id: String,

    /// Informational classification, never interpreted.
    #[serde(default)]
    pub device_type: String,

    /// Caller-supplied epoch-like value. No server-side clock enforcement.
    pub timestamp: i64,

    /// Opaque device payload.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub data: Payload,
}

impl TelemetryRecord {
    pub fn new(
        device_id: impl Into<String>,
        device_type: impl Into<String>,
        timestamp: i64,
        data: Payload,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_type: device_type.into(),
            timestamp,
            data,
        }
    }

    /// Check the ingestion preconditions.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.device_id.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "device_id".to_string(),
            });
        }
        if let Some(field) = self.nul_field() {
            return Err(ValidationError::InvalidValue {
                field: field.to_string(),
                reason: "contains a NUL character".to_string(),
            });
        }
        Ok(())
    }

    /// The first field holding a NUL character, if any.
    ///
    /// PostgreSQL accepts NUL neither in `text` columns nor in `jsonb` strings.
    pub fn nul_field(&self) -> Option<&'static str> {
        if self.device_id.contains('\0') {
            Some("device_id")
        } else if self.device_type.contains('\0') {
            Some("device_type")
        } else if self.data.contains_nul() {
            Some("data")
        } else {
            None
        }
    }

    /// Convert to the durable row, encoding the payload canonically.
    pub fn to_row(&self) -> Result<TelemetryRow, CodecError> {
        Ok(TelemetryRow {
            device_id: self.device_id.clone(),
            device_type: self.device_type.clone(),
            timestamp: self.timestamp,
            payload: encode_payload(&self.data)?,
        })
    }

    /// Rebuild a record from a durable row.
    pub fn from_row(row: TelemetryRow) -> Result<Self, CodecError> {
        let data = decode_payload(&row.payload)?;
        Ok(Self {
            device_id: row.device_id,
            device_type: row.device_type,
            timestamp: row.timestamp,
            data,
        })
    }
}

// ============================================================================
// DURABLE ROW
// ============================================================================

/// The form a record takes inside the durable store.
///
/// `payload` is the canonical encoding of [`TelemetryRecord::data`]; the
/// store treats it as an opaque blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryRow {
    pub device_id: String,
    pub device_type: String,
    pub timestamp: i64,
    pub payload: Vec<u8>,
}
